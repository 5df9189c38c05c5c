// src/supervisor/handle.rs

//! Cloneable client handle for the supervisor.
//!
//! Front-ends, the scheduler tick task, and tests all talk to the control
//! loop through this: commands go over the mpsc channel with a oneshot
//! reply, events and output come back over broadcast receivers.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::errors::{Result, ScriptdockError};
use crate::output::{OutputBroker, OutputLine};
use crate::registry::ProjectRegistry;
use crate::schedule::ScheduleRule;
use crate::supervisor::{
    Command, InstallOutcome, ProjectId, RunStatus, StartOutcome, StateChanged, StopOutcome,
    SupervisorMsg,
};

#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorMsg>,
    state_tx: broadcast::Sender<StateChanged>,
    broker: Arc<OutputBroker>,
    registry: Arc<ProjectRegistry>,
}

impl SupervisorHandle {
    pub fn new(
        tx: mpsc::Sender<SupervisorMsg>,
        state_tx: broadcast::Sender<StateChanged>,
        broker: Arc<OutputBroker>,
        registry: Arc<ProjectRegistry>,
    ) -> Self {
        Self {
            tx,
            state_tx,
            broker,
            registry,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SupervisorMsg::Command(build(reply_tx)))
            .await
            .map_err(|_| ScriptdockError::SupervisorGone)?;
        reply_rx.await.map_err(|_| ScriptdockError::SupervisorGone)
    }

    pub async fn start(&self, id: ProjectId) -> Result<StartOutcome> {
        self.request(move |reply| Command::Start { id, reply }).await
    }

    pub async fn stop(&self, id: ProjectId) -> Result<StopOutcome> {
        self.request(move |reply| Command::Stop { id, reply }).await
    }

    pub async fn bulk_start(&self, ids: Vec<ProjectId>) -> Result<Vec<(ProjectId, StartOutcome)>> {
        self.request(move |reply| Command::BulkStart { ids, reply })
            .await
    }

    pub async fn bulk_stop(&self, ids: Vec<ProjectId>) -> Result<Vec<(ProjectId, StopOutcome)>> {
        self.request(move |reply| Command::BulkStop { ids, reply })
            .await
    }

    pub async fn install(&self, id: ProjectId) -> Result<InstallOutcome> {
        self.request(move |reply| Command::Install { id, reply })
            .await
    }

    pub async fn bulk_install(
        &self,
        ids: Vec<ProjectId>,
    ) -> Result<Vec<(ProjectId, InstallOutcome)>> {
        self.request(move |reply| Command::BulkInstall { ids, reply })
            .await
    }

    pub async fn status(&self, id: ProjectId) -> Result<Option<RunStatus>> {
        self.request(move |reply| Command::Status { id, reply }).await
    }

    pub async fn running_ids(&self) -> Result<Vec<ProjectId>> {
        self.request(|reply| Command::RunningIds { reply }).await
    }

    /// Drop a project's terminal run entry. Its buffered output goes with
    /// it; a live run is never touched.
    pub async fn acknowledge(&self, id: ProjectId) -> Result<bool> {
        let project = id.clone();
        let dropped = self
            .request(move |reply| Command::Acknowledge { id, reply })
            .await?;
        if dropped {
            self.broker.remove(&project);
        }
        Ok(dropped)
    }

    /// The project's current schedule rule.
    pub fn schedule(&self, id: &str) -> Option<ScheduleRule> {
        self.registry.get(id).map(|desc| desc.schedule)
    }

    /// Replace the project's schedule rule, rewriting its descriptor file.
    /// The scheduler picks the new rule up on its next tick.
    pub fn set_schedule(&self, id: &str, rule: ScheduleRule) -> Result<()> {
        self.registry.set_schedule(id, rule)?;
        Ok(())
    }

    /// Persist the session and stop every run, bounded by the grace window.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Every run state transition, at-least-once, per-project ordered.
    pub fn subscribe_state(&self) -> broadcast::Receiver<StateChanged> {
        self.state_tx.subscribe()
    }

    /// Replay tail plus live output for one project.
    pub fn subscribe_output(
        &self,
        id: &str,
    ) -> (Vec<OutputLine>, broadcast::Receiver<OutputLine>) {
        self.broker.subscribe(id)
    }

    /// Live output across all projects.
    pub fn subscribe_all_output(&self) -> broadcast::Receiver<OutputLine> {
        self.broker.subscribe_all()
    }

    /// Last `n` buffered lines for a project.
    pub fn output_tail(&self, id: &str, n: usize) -> Vec<OutputLine> {
        self.broker.tail(id, n)
    }
}
