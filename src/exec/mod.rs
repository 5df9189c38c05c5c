// src/exec/mod.rs

//! Process execution: launch specs, the runner, and the backend seam the
//! supervisor talks through.

pub mod backend;
pub mod installer;
pub mod runner;

pub use backend::{LaunchFuture, LaunchedRun, LauncherBackend, RealLauncher, StopRequest};
pub use installer::install_spec;
pub use runner::{resolve_interpreter, script_spec, venv_python, CommandSpec, LaunchSpec};
