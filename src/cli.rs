// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `scriptdock`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scriptdock",
    version,
    about = "Supervise, schedule, and stream output from script projects.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the settings file (TOML).
    ///
    /// Default: `Scriptdock.toml` in the current working directory. Missing
    /// file means built-in defaults.
    #[arg(long, value_name = "PATH", default_value = "Scriptdock.toml")]
    pub config: String,

    /// Directory containing project folders. Overrides the settings file.
    #[arg(long, value_name = "DIR")]
    pub projects_dir: Option<String>,

    /// Do not relaunch the projects recorded in the previous session.
    #[arg(long)]
    pub no_restore: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRIPTDOCK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Discover projects, print their schedules, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
