// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level settings as read from a TOML file.
///
/// This is a direct mapping of the settings file:
///
/// ```toml
/// interpreter = "python3"
/// projects_dir = "projects"
/// state_dir = ".scriptdock"
/// tick_interval_secs = 30
/// stop_grace_secs = 3
/// output_buffer_lines = 1000
/// ```
///
/// Every field is optional and has a reasonable default; a missing settings
/// file is equivalent to an empty one.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    /// Interpreter executable used for projects that declare none and have
    /// no virtualenv. Used verbatim (resolved through `PATH` if relative).
    #[serde(default = "default_interpreter")]
    pub interpreter: PathBuf,

    /// Directory whose immediate subfolders are candidate projects.
    #[serde(default = "default_projects_dir")]
    pub projects_dir: PathBuf,

    /// Directory holding session and fire-record state files.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Scheduler wake interval in seconds.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// How long a stopped process gets to exit before it is killed.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// Lines of output replayed to late subscribers, per project.
    #[serde(default = "default_output_buffer_lines")]
    pub output_buffer_lines: usize,
}

fn default_interpreter() -> PathBuf {
    PathBuf::from("python3")
}

fn default_projects_dir() -> PathBuf {
    PathBuf::from("projects")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".scriptdock")
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_stop_grace_secs() -> u64 {
    3
}

fn default_output_buffer_lines() -> usize {
    1000
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            projects_dir: default_projects_dir(),
            state_dir: default_state_dir(),
            tick_interval_secs: default_tick_interval_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            output_buffer_lines: default_output_buffer_lines(),
        }
    }
}

impl AppSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}
