use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use scriptdock::errors::LaunchError;
use scriptdock::exec::{LaunchFuture, LaunchSpec, LaunchedRun, LauncherBackend};
use scriptdock::supervisor::{ExitReport, RunKind, StopKind, SupervisorMsg};

type RunKey = (String, RunKind);

/// A fake launch backend:
/// - records every launch spec it receives
/// - launched "runs" stay alive until a stop request or an injected exit
/// - stop requests resolve as graceful exits with code 0.
pub struct FakeLauncher {
    events: mpsc::Sender<SupervisorMsg>,
    launches: Mutex<Vec<LaunchSpec>>,
    exits: Mutex<HashMap<RunKey, oneshot::Sender<i32>>>,
    fail_spawn: Mutex<Vec<String>>,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    pub fn new(events: mpsc::Sender<SupervisorMsg>) -> Self {
        Self {
            events,
            launches: Mutex::new(Vec::new()),
            exits: Mutex::new(HashMap::new()),
            fail_spawn: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(1000),
        }
    }

    /// Every spec this backend has been asked to launch, in order.
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().unwrap().clone()
    }

    /// How many times a project's script has been launched.
    pub fn launch_count(&self, id: &str) -> usize {
        self.launches
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.id == id && s.kind == RunKind::Script)
            .count()
    }

    /// Make the next launch of this project fail at spawn.
    pub fn fail_spawn(&self, id: &str) {
        self.fail_spawn.lock().unwrap().push(id.to_string());
    }

    /// Let a fake run exit on its own with `code`. Returns false when no
    /// live fake run exists for the key.
    pub fn exit(&self, id: &str, kind: RunKind, code: i32) -> bool {
        let sender = self.exits.lock().unwrap().remove(&(id.to_string(), kind));
        match sender {
            Some(tx) => tx.send(code).is_ok(),
            None => false,
        }
    }
}

impl LauncherBackend for FakeLauncher {
    fn launch(&self, spec: LaunchSpec) -> LaunchFuture {
        {
            let mut failures = self.fail_spawn.lock().unwrap();
            if let Some(pos) = failures.iter().position(|f| f == &spec.id) {
                failures.remove(pos);
                return Box::pin(async {
                    Err(LaunchError::SpawnFailed(std::io::Error::other(
                        "fake spawn failure",
                    )))
                });
            }
        }

        self.launches.lock().unwrap().push(spec.clone());
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let key = (spec.id.clone(), spec.kind);

        let (stop_tx, mut stop_rx) = mpsc::channel(4);
        let (exit_tx, exit_rx) = oneshot::channel();
        self.exits.lock().unwrap().insert(key, exit_tx);

        let events = self.events.clone();
        let id = spec.id;
        let kind = spec.kind;
        tokio::spawn(async move {
            let started = Instant::now();
            let (exit_code, stopped) = tokio::select! {
                req = stop_rx.recv() => match req {
                    Some(_) => (Some(0), Some(StopKind::Graceful)),
                    None => return,
                },
                code = exit_rx => match code {
                    Ok(code) => (Some(code), None),
                    Err(_) => return,
                },
            };
            let report = ExitReport {
                exit_code,
                duration: started.elapsed(),
                stopped,
            };
            let _ = events
                .send(SupervisorMsg::RunExited { id, kind, report })
                .await;
        });

        Box::pin(async move {
            Ok(LaunchedRun {
                pid,
                stop: stop_tx,
            })
        })
    }
}
