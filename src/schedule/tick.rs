// src/schedule/tick.rs

//! The scheduler tick task.
//!
//! A single Tokio task wakes every `tick_interval_secs`, evaluates every
//! project's schedule rule against the window since the previous wake, and
//! asks the supervisor to start whatever is due. Evaluation itself lives in
//! [`crate::schedule::eval`]; this module is only the clock and the glue.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::ProjectRegistry;
use crate::schedule::eval::{due, FireTable, TickWindow};
use crate::supervisor::{StartOutcome, SupervisorHandle};

/// Best-effort persistence for the last-fired table.
///
/// Losing this file only costs interval-rule continuity across restarts, so
/// load falls back to empty and save failures are logged, never fatal.
pub struct FireRecordStore {
    path: PathBuf,
}

impl FireRecordStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("fire_records.json"),
        }
    }

    pub fn load(&self) -> HashMap<String, NaiveDateTime> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return HashMap::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring unreadable fire records");
                HashMap::new()
            }
        }
    }

    pub fn save(&self, records: &HashMap<String, NaiveDateTime>) {
        let tmp = self.path.with_extension("json.tmp");
        let write = serde_json::to_vec_pretty(records)
            .map_err(std::io::Error::other)
            .and_then(|bytes| std::fs::write(&tmp, bytes))
            .and_then(|()| std::fs::rename(&tmp, &self.path));
        if let Err(err) = write {
            warn!(path = %self.path.display(), %err, "failed to persist fire records");
        }
    }
}

pub struct Scheduler {
    handle: SupervisorHandle,
    registry: Arc<ProjectRegistry>,
    store: FireRecordStore,
    table: FireTable,
    tick: std::time::Duration,
}

impl Scheduler {
    pub fn new(
        handle: SupervisorHandle,
        registry: Arc<ProjectRegistry>,
        store: FireRecordStore,
        tick: std::time::Duration,
    ) -> Self {
        let table = FireTable::new(store.load());
        Self {
            handle,
            registry,
            store,
            table,
            tick,
        }
    }

    /// Run the tick loop until the supervisor goes away.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick completes immediately; consume it so
            // the first real evaluation window is one tick wide.
            interval.tick().await;
            let mut prev = Local::now().naive_local();

            loop {
                interval.tick().await;
                let now = Local::now().naive_local();
                let window = TickWindow { prev, now };
                prev = now;
                if self.evaluate(&window).await.is_err() {
                    info!("supervisor gone, scheduler stopping");
                    return;
                }
            }
        })
    }

    /// One evaluation pass. `Err` means the supervisor channel is closed.
    async fn evaluate(&mut self, window: &TickWindow) -> Result<(), ()> {
        let schedules = self.registry.schedules();
        self.table.retain(|id| schedules.iter().any(|(s, _)| s == id));

        let mut fired_any = false;
        for (id, rule) in &schedules {
            self.table.note_seen(id, window.prev);
            if !due(rule, id, &self.table, window) {
                continue;
            }
            // Mark before the outcome: an already-running project still
            // consumed this fire, otherwise every tick would retry it.
            self.table.mark_fired(id, window.now);
            fired_any = true;

            match self.handle.start(id.clone()).await.map_err(|_| ())? {
                StartOutcome::Started(status) => {
                    info!(project = %id, pid = status.pid, "scheduled start");
                }
                StartOutcome::AlreadyRunning => {
                    debug!(project = %id, "scheduled start skipped, already running");
                }
                StartOutcome::Failed(err) => {
                    warn!(project = %id, %err, "scheduled start failed");
                }
            }
        }

        if fired_any {
            self.store.save(self.table.records());
        }
        Ok(())
    }
}
