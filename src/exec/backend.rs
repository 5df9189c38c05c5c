// src/exec/backend.rs

//! Pluggable launch backend.
//!
//! The supervisor control loop never spawns OS processes directly; it goes
//! through [`LauncherBackend`] so tests can substitute a fake that records
//! launches and injects exits.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::errors::LaunchError;
use crate::exec::runner::{self, LaunchSpec};
use crate::output::OutputBroker;
use crate::supervisor::SupervisorMsg;

/// Ask a running process to stop, waiting `grace` before escalating to a
/// hard kill.
#[derive(Debug, Clone, Copy)]
pub struct StopRequest {
    pub grace: Duration,
}

/// What the backend hands back for a successfully launched run.
///
/// The process itself lives in a detached task that reports its exit into
/// the supervisor channel; `stop` is the only lever the supervisor keeps.
pub struct LaunchedRun {
    pub pid: u32,
    pub stop: mpsc::Sender<StopRequest>,
}

pub type LaunchFuture = Pin<Box<dyn Future<Output = Result<LaunchedRun, LaunchError>> + Send>>;

pub trait LauncherBackend: Send + Sync {
    fn launch(&self, spec: LaunchSpec) -> LaunchFuture;
}

/// The real backend: spawns child processes via [`runner`], streaming their
/// output into the broker and reporting exits into the supervisor channel.
pub struct RealLauncher {
    broker: Arc<OutputBroker>,
    events: mpsc::Sender<SupervisorMsg>,
}

impl RealLauncher {
    pub fn new(broker: Arc<OutputBroker>, events: mpsc::Sender<SupervisorMsg>) -> Self {
        Self { broker, events }
    }
}

impl LauncherBackend for RealLauncher {
    fn launch(&self, spec: LaunchSpec) -> LaunchFuture {
        let broker = Arc::clone(&self.broker);
        let events = self.events.clone();
        Box::pin(async move { runner::launch(spec, broker, events).await })
    }
}
