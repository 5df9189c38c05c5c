// src/session.rs

//! Crash-safe session persistence.
//!
//! The supervisor reports the running set on every transition; a background
//! writer task debounces bursts and writes `session.json` with a
//! write-tmp-then-rename so the file is never half-written. Last writer
//! wins; there is no transactional guarantee. Missing or corrupt snapshots
//! restore as empty, never as a startup error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::supervisor::ProjectId;

pub const SESSION_FILE: &str = "session.json";
const DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SessionSnapshot {
    running: Vec<ProjectId>,
}

/// Synchronous file access; the async writer task sits on top.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(SESSION_FILE),
        }
    }

    /// The running set recorded at last shutdown. Empty on anything wrong.
    pub fn restore(&self) -> Vec<ProjectId> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str::<SessionSnapshot>(&raw) {
            Ok(snapshot) => snapshot.running,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring corrupt session snapshot");
                Vec::new()
            }
        }
    }

    /// Like [`Self::restore`], but silently drops IDs the registry no
    /// longer knows about.
    pub fn restore_known(&self, registry: &crate::registry::ProjectRegistry) -> Vec<ProjectId> {
        self.restore()
            .into_iter()
            .filter(|id| registry.contains(id))
            .collect()
    }

    pub fn save(&self, running: &[ProjectId]) {
        let snapshot = SessionSnapshot {
            running: running.to_vec(),
        };
        let tmp = self.path.with_extension("json.tmp");
        let write = serde_json::to_vec_pretty(&snapshot)
            .map_err(std::io::Error::other)
            .and_then(|bytes| std::fs::write(&tmp, bytes))
            .and_then(|()| std::fs::rename(&tmp, &self.path));
        match write {
            Ok(()) => debug!(path = %self.path.display(), count = running.len(), "session saved"),
            Err(err) => warn!(path = %self.path.display(), %err, "failed to save session"),
        }
    }
}

enum SessionMsg {
    Snapshot(Vec<ProjectId>),
    /// Write immediately, bypassing the debounce, then ack.
    Flush(Vec<ProjectId>, oneshot::Sender<()>),
}

/// Cheap handle for reporting snapshots into the writer task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionMsg>,
}

impl SessionHandle {
    /// Queue a snapshot. Never blocks; under backpressure the newest
    /// snapshot that does get through still wins.
    pub fn snapshot(&self, running: Vec<ProjectId>) {
        let _ = self.tx.try_send(SessionMsg::Snapshot(running));
    }

    /// Write `running` now and wait for the write to land. Used once at
    /// shutdown, before child teardown.
    pub async fn flush(&self, running: Vec<ProjectId>) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(SessionMsg::Flush(running, ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

/// Spawn the debounced writer task.
pub fn spawn_writer(store: SessionStore) -> (SessionHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<SessionMsg>(64);

    let task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let mut pending = match msg {
                SessionMsg::Flush(running, ack) => {
                    store.save(&running);
                    let _ = ack.send(());
                    continue;
                }
                SessionMsg::Snapshot(running) => running,
            };

            // Coalesce the burst: keep absorbing snapshots until the
            // channel stays quiet for the debounce window.
            loop {
                match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                    Ok(Some(SessionMsg::Snapshot(running))) => pending = running,
                    Ok(Some(SessionMsg::Flush(running, ack))) => {
                        store.save(&running);
                        let _ = ack.send(());
                        pending = running;
                        break;
                    }
                    Ok(None) => {
                        store.save(&pending);
                        return;
                    }
                    Err(_) => {
                        store.save(&pending);
                        break;
                    }
                }
            }
        }
    });

    (SessionHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_round_trips_the_running_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        store.save(&["etl".to_string(), "bot".to_string()]);
        assert_eq!(store.restore(), vec!["etl".to_string(), "bot".to_string()]);
    }

    #[test]
    fn missing_and_corrupt_snapshots_restore_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.restore().is_empty());

        std::fs::write(dir.path().join(SESSION_FILE), b"][").unwrap();
        assert!(store.restore().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn writer_debounces_bursts_to_the_last_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let reader = SessionStore::new(dir.path());
        let (handle, task) = spawn_writer(store);

        handle.snapshot(vec!["a".to_string()]);
        handle.snapshot(vec!["a".to_string(), "b".to_string()]);
        handle.snapshot(vec!["b".to_string()]);

        // Let the debounce window elapse (auto-advanced while paused).
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(reader.restore(), vec!["b".to_string()]);

        drop(handle);
        let _ = task.await;
    }

    #[tokio::test]
    async fn flush_writes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let reader = SessionStore::new(dir.path());
        let (handle, task) = spawn_writer(store);

        handle.flush(vec!["x".to_string()]).await;
        assert_eq!(reader.restore(), vec!["x".to_string()]);

        drop(handle);
        let _ = task.await;
    }
}
