// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons a child process could not be launched.
///
/// Surfaced to the caller immediately; no run handle is created when any of
/// these occur.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("interpreter not found: {0}")]
    InterpreterNotFound(PathBuf),

    #[error("required file missing: {0}")]
    EntryMissing(PathBuf),

    #[error("failed to spawn process: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// Reasons a start or install request failed before a process existed.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("unknown project: {0}")]
    UnknownProject(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

#[derive(Debug, Error)]
pub enum ScriptdockError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("supervisor is not running")]
    SupervisorGone,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ScriptdockError>;
