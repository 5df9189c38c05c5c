// src/supervisor/runtime.rs

//! The async control loop.
//!
//! Every client command and every runner exit flows through one
//! `mpsc::Receiver<SupervisorMsg>`. Check-and-launch is atomic because
//! nothing else touches the run table; a start and a scheduler fire for the
//! same project can never race into two processes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::AppSettings;
use crate::errors::StartError;
use crate::exec::{install_spec, script_spec, LaunchSpec, LauncherBackend, StopRequest};
use crate::registry::ProjectRegistry;
use crate::session::SessionHandle;
use crate::supervisor::core::SupervisorCore;
use crate::supervisor::{
    Command, ExitReport, InstallOutcome, ProjectId, RunKind, RunState, RunStatus, StartOutcome,
    StateChanged, StopKind, StopOutcome, SupervisorMsg,
};

type RunKey = (ProjectId, RunKind);

pub struct Supervisor {
    core: SupervisorCore,
    backend: Arc<dyn LauncherBackend>,
    registry: Arc<ProjectRegistry>,
    settings: AppSettings,
    session: SessionHandle,

    rx: mpsc::Receiver<SupervisorMsg>,

    /// Stop channel per live run, removed when its exit arrives.
    stops: HashMap<RunKey, mpsc::Sender<StopRequest>>,
    /// Stop replies waiting for the run's exit.
    pending_stops: HashMap<RunKey, Vec<oneshot::Sender<StopOutcome>>>,

    state_tx: broadcast::Sender<StateChanged>,

    /// Once set, exits no longer feed the session writer; the flushed
    /// pre-teardown snapshot must be what the next start restores.
    shutting_down: bool,
}

impl Supervisor {
    pub fn new(
        registry: Arc<ProjectRegistry>,
        settings: AppSettings,
        backend: Arc<dyn LauncherBackend>,
        session: SessionHandle,
        state_tx: broadcast::Sender<StateChanged>,
        rx: mpsc::Receiver<SupervisorMsg>,
    ) -> Self {
        Self {
            core: SupervisorCore::new(),
            backend,
            registry,
            settings,
            session,
            rx,
            stops: HashMap::new(),
            pending_stops: HashMap::new(),
            state_tx,
            shutting_down: false,
        }
    }

    /// Main event loop. Returns after a `Shutdown` command or when every
    /// handle is gone.
    pub async fn run(mut self) {
        info!("supervisor control loop started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                SupervisorMsg::Command(cmd) => {
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
                SupervisorMsg::RunExited { id, kind, report } => {
                    self.handle_exit(&id, kind, &report);
                }
            }
        }

        info!("supervisor control loop finished");
    }

    /// Returns true when the loop should exit.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Start { id, reply } => {
                let outcome = self.start_one(&id).await;
                let _ = reply.send(outcome);
            }
            Command::Stop { id, reply } => {
                self.stop_one(&id, reply);
            }
            Command::BulkStart { ids, reply } => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    let outcome = self.start_one(&id).await;
                    out.push((id, outcome));
                }
                let _ = reply.send(out);
            }
            Command::BulkStop { ids, reply } => {
                // Per-item stop replies resolve when the exits arrive; the
                // aggregation must not block the control loop, so it moves
                // to its own task.
                let mut waiters = Vec::with_capacity(ids.len());
                for id in ids {
                    let (item_tx, item_rx) = oneshot::channel();
                    self.stop_one(&id, item_tx);
                    waiters.push((id, item_rx));
                }
                tokio::spawn(async move {
                    let mut out = Vec::with_capacity(waiters.len());
                    for (id, rx) in waiters {
                        let outcome = rx
                            .await
                            .unwrap_or_else(|_| StopOutcome::Failed("stop dropped".to_string()));
                        out.push((id, outcome));
                    }
                    let _ = reply.send(out);
                });
            }
            Command::Install { id, reply } => {
                let outcome = self.install_one(&id).await;
                let _ = reply.send(outcome);
            }
            Command::BulkInstall { ids, reply } => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    let outcome = self.install_one(&id).await;
                    out.push((id, outcome));
                }
                let _ = reply.send(out);
            }
            Command::Status { id, reply } => {
                let _ = reply.send(self.core.status(&id));
            }
            Command::RunningIds { reply } => {
                let _ = reply.send(self.core.running_ids());
            }
            Command::Acknowledge { id, reply } => {
                let _ = reply.send(self.core.acknowledge(&id));
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    async fn start_one(&mut self, id: &ProjectId) -> StartOutcome {
        if self.core.is_live(id, RunKind::Script) {
            debug!(project = %id, "start requested but already running");
            return StartOutcome::AlreadyRunning;
        }
        let desc = match self.registry.get(id) {
            Some(desc) => desc,
            None => return StartOutcome::Failed(StartError::UnknownProject(id.clone())),
        };
        let spec = match script_spec(&desc, &self.settings) {
            Ok(spec) => spec,
            Err(err) => return StartOutcome::Failed(err.into()),
        };
        match self.launch_run(id, RunKind::Script, spec).await {
            Ok(status) => StartOutcome::Started(status),
            Err(err) => StartOutcome::Failed(err),
        }
    }

    async fn install_one(&mut self, id: &ProjectId) -> InstallOutcome {
        if self.core.is_live(id, RunKind::Install) {
            debug!(project = %id, "install requested but already in flight");
            return InstallOutcome::AlreadyInstalling;
        }
        let desc = match self.registry.get(id) {
            Some(desc) => desc,
            None => return InstallOutcome::Failed(StartError::UnknownProject(id.clone())),
        };
        let spec = match install_spec(&desc, &self.settings) {
            Ok(spec) => spec,
            Err(err) => return InstallOutcome::Failed(err.into()),
        };
        match self.launch_run(id, RunKind::Install, spec).await {
            Ok(status) => InstallOutcome::Started(status),
            Err(err) => InstallOutcome::Failed(err),
        }
    }

    async fn launch_run(
        &mut self,
        id: &ProjectId,
        kind: RunKind,
        spec: LaunchSpec,
    ) -> Result<RunStatus, StartError> {
        let launched = self.backend.launch(spec).await.map_err(StartError::from)?;

        let mut status = RunStatus {
            project_id: id.clone(),
            kind,
            pid: launched.pid,
            started_at: Local::now(),
            state: RunState::Starting,
        };
        self.core.begin(status.clone());
        self.stops.insert((id.clone(), kind), launched.stop);
        self.emit(id, kind, None, RunState::Starting);

        if let Some((old, new)) = self.core.transition(id, kind, RunState::Running) {
            self.emit(id, kind, Some(old), new);
        }
        status.state = RunState::Running;

        if kind == RunKind::Script {
            self.session.snapshot(self.core.running_ids());
        }
        info!(project = %id, %kind, pid = status.pid, "run started");
        Ok(status)
    }

    /// Stop never blocks the loop: the reply is parked until the run's
    /// exit report comes back through the channel.
    fn stop_one(&mut self, id: &ProjectId, reply: oneshot::Sender<StopOutcome>) {
        let kind = if self.core.is_live(id, RunKind::Script) {
            RunKind::Script
        } else if self.core.is_live(id, RunKind::Install) {
            RunKind::Install
        } else {
            let _ = reply.send(StopOutcome::NotRunning);
            return;
        };

        if let Some((old, new)) = self.core.transition(id, kind, RunState::Stopping) {
            self.emit(id, kind, Some(old), new);
        }

        if let Some(stop) = self.stops.get(&(id.clone(), kind)) {
            // A full or closed channel means the runner is already on its
            // way out; the pending reply resolves on RunExited regardless.
            let _ = stop.try_send(StopRequest {
                grace: self.settings.stop_grace(),
            });
        }
        self.pending_stops
            .entry((id.clone(), kind))
            .or_default()
            .push(reply);
    }

    fn handle_exit(&mut self, id: &ProjectId, kind: RunKind, report: &ExitReport) {
        if let Some((old, new)) = self.core.note_exit(id, kind, report) {
            info!(
                project = %id,
                %kind,
                state = %new,
                secs = report.duration.as_secs_f64(),
                "run exited"
            );
            self.emit(id, kind, Some(old), new);
        }
        self.stops.remove(&(id.clone(), kind));

        if let Some(waiters) = self.pending_stops.remove(&(id.clone(), kind)) {
            let outcome = StopOutcome::Stopped {
                forced: report.stopped == Some(StopKind::Forced),
            };
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }

        if kind == RunKind::Script && !self.shutting_down {
            self.session.snapshot(self.core.running_ids());
        }
    }

    /// Persist the pre-teardown running set, then stop everything within a
    /// bounded window. Never waits indefinitely; stragglers are reaped by
    /// kill-on-drop.
    async fn shutdown(&mut self) {
        info!("supervisor shutting down");
        self.shutting_down = true;

        let running = self.core.running_ids();
        self.session.flush(running).await;

        let grace = self.settings.stop_grace();
        for stop in self.stops.values() {
            let _ = stop.try_send(StopRequest { grace });
        }

        let deadline = tokio::time::Instant::now() + grace + Duration::from_secs(2);
        while !self.core.live_ids(RunKind::Script).is_empty()
            || !self.core.live_ids(RunKind::Install).is_empty()
        {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(SupervisorMsg::RunExited { id, kind, report })) => {
                    self.handle_exit(&id, kind, &report);
                }
                Ok(Some(SupervisorMsg::Command(_))) => {
                    // Dropping the command (and its reply sender) tells the
                    // caller the supervisor is gone.
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("shutdown window elapsed with live runs");
                    break;
                }
            }
        }
    }

    fn emit(&self, id: &str, kind: RunKind, old: Option<RunState>, new: RunState) {
        let _ = self.state_tx.send(StateChanged {
            project_id: id.to_string(),
            kind,
            old,
            new,
        });
    }
}
