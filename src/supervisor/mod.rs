// src/supervisor/mod.rs

//! Process supervision.
//!
//! This module ties together:
//! - the pure run table (`core.rs`): who is running, state classification
//! - the async control loop (`runtime.rs`) that serializes every command
//!   and exit event through one channel
//! - the cloneable client handle (`handle.rs`) used by the CLI, the
//!   scheduler tick task, and tests.

pub mod core;
pub mod handle;
pub mod runtime;

pub use self::core::SupervisorCore;
pub use self::handle::SupervisorHandle;
pub use self::runtime::Supervisor;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::oneshot;

use crate::errors::StartError;

/// Project IDs are project folder names.
pub type ProjectId = String;

/// What a tracked run is doing: executing the project's script, or
/// installing its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    Script,
    Install,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Script => write!(f, "script"),
            RunKind::Install => write!(f, "install"),
        }
    }
}

/// How a stop concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// The process exited within the grace period.
    Graceful,
    /// The process had to be killed.
    Forced,
}

/// Lifecycle of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Starting,
    Running,
    Stopping,
    Exited(Option<i32>),
    Crashed(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Exited(_) | RunState::Crashed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Starting => write!(f, "starting"),
            RunState::Running => write!(f, "running"),
            RunState::Stopping => write!(f, "stopping"),
            RunState::Exited(Some(code)) => write!(f, "exited({code})"),
            RunState::Exited(None) => write!(f, "exited(signal)"),
            RunState::Crashed(reason) => write!(f, "crashed: {reason}"),
        }
    }
}

/// Snapshot of one run as seen from outside.
#[derive(Debug, Clone)]
pub struct RunStatus {
    pub project_id: ProjectId,
    pub kind: RunKind,
    pub pid: u32,
    pub started_at: DateTime<Local>,
    pub state: RunState,
}

/// What a finished process left behind.
#[derive(Debug, Clone)]
pub struct ExitReport {
    pub exit_code: Option<i32>,
    pub duration: Duration,
    /// `Some` when the exit was caused by an explicit stop request.
    pub stopped: Option<StopKind>,
}

#[derive(Debug)]
pub enum StartOutcome {
    /// A live run already exists; the request is a no-op.
    AlreadyRunning,
    Started(RunStatus),
    Failed(StartError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Stopped { forced: bool },
    Failed(String),
}

#[derive(Debug)]
pub enum InstallOutcome {
    /// An install for this project is already in flight.
    AlreadyInstalling,
    Started(RunStatus),
    Failed(StartError),
}

/// Broadcast on every run state transition. Per-project ordering is
/// guaranteed (all transitions happen in the control loop); cross-project
/// ordering is not.
#[derive(Debug, Clone)]
pub struct StateChanged {
    pub project_id: ProjectId,
    pub kind: RunKind,
    pub old: Option<RunState>,
    pub new: RunState,
}

/// Client commands, each carrying its reply channel.
#[derive(Debug)]
pub enum Command {
    Start {
        id: ProjectId,
        reply: oneshot::Sender<StartOutcome>,
    },
    Stop {
        id: ProjectId,
        reply: oneshot::Sender<StopOutcome>,
    },
    BulkStart {
        ids: Vec<ProjectId>,
        reply: oneshot::Sender<Vec<(ProjectId, StartOutcome)>>,
    },
    BulkStop {
        ids: Vec<ProjectId>,
        reply: oneshot::Sender<Vec<(ProjectId, StopOutcome)>>,
    },
    Install {
        id: ProjectId,
        reply: oneshot::Sender<InstallOutcome>,
    },
    BulkInstall {
        ids: Vec<ProjectId>,
        reply: oneshot::Sender<Vec<(ProjectId, InstallOutcome)>>,
    },
    Status {
        id: ProjectId,
        reply: oneshot::Sender<Option<RunStatus>>,
    },
    RunningIds {
        reply: oneshot::Sender<Vec<ProjectId>>,
    },
    /// Drop a terminal run entry. Replies with whether anything was dropped.
    Acknowledge {
        id: ProjectId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Everything the control loop consumes: client commands plus exit events
/// reported by runners.
#[derive(Debug)]
pub enum SupervisorMsg {
    Command(Command),
    RunExited {
        id: ProjectId,
        kind: RunKind,
        report: ExitReport,
    },
}
