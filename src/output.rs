// src/output.rs

//! Output fan-out from running processes to any number of subscribers.
//!
//! One channel per project: a bounded replay ring (for late subscribers)
//! plus a `tokio::sync::broadcast` sender for live delivery. Publishing
//! never waits on consumers; a subscriber that falls behind sees
//! `RecvError::Lagged`, loses its oldest lines, and keeps receiving newer
//! ones. Lines from one stream arrive at each subscriber in the order the
//! process wrote them.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Local};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of process output, tagged with its origin.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub project_id: String,
    pub stream: StreamKind,
    pub text: String,
    pub timestamp: DateTime<Local>,
}

impl OutputLine {
    pub fn now(project_id: impl Into<String>, stream: StreamKind, text: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            stream,
            text: text.into(),
            timestamp: Local::now(),
        }
    }
}

struct ProjectChannel {
    ring: VecDeque<OutputLine>,
    tx: broadcast::Sender<OutputLine>,
}

impl ProjectChannel {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(16));
        Self {
            ring: VecDeque::with_capacity(capacity),
            tx,
        }
    }
}

pub struct OutputBroker {
    buffer_lines: usize,
    channels: RwLock<HashMap<String, Arc<Mutex<ProjectChannel>>>>,
    all_tx: broadcast::Sender<OutputLine>,
}

impl OutputBroker {
    pub fn new(buffer_lines: usize) -> Self {
        let (all_tx, _) = broadcast::channel(buffer_lines.max(16));
        Self {
            buffer_lines,
            channels: RwLock::new(HashMap::new()),
            all_tx,
        }
    }

    /// Publish a line. Never blocks on consumers; send errors just mean
    /// nobody is listening right now, which is fine.
    pub fn publish(&self, line: OutputLine) {
        let channel = self.channel(&line.project_id);
        {
            let mut chan = lock(&channel);
            if chan.ring.len() >= self.buffer_lines {
                chan.ring.pop_front();
            }
            chan.ring.push_back(line.clone());
            let _ = chan.tx.send(line.clone());
        }
        let _ = self.all_tx.send(line);
    }

    /// Replay tail plus a live receiver for one project. The receiver is
    /// created under the channel lock so no line published after the tail
    /// was captured can be missed.
    pub fn subscribe(&self, project_id: &str) -> (Vec<OutputLine>, broadcast::Receiver<OutputLine>) {
        let channel = self.channel(project_id);
        let chan = lock(&channel);
        let tail = chan.ring.iter().cloned().collect();
        let rx = chan.tx.subscribe();
        (tail, rx)
    }

    /// Live receiver for every project's output, no replay.
    pub fn subscribe_all(&self) -> broadcast::Receiver<OutputLine> {
        self.all_tx.subscribe()
    }

    /// The last `n` buffered lines for a project.
    pub fn tail(&self, project_id: &str, n: usize) -> Vec<OutputLine> {
        let guard = read(&self.channels);
        match guard.get(project_id) {
            Some(channel) => {
                let chan = lock(channel);
                let skip = chan.ring.len().saturating_sub(n);
                chan.ring.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Drop a project's buffer and live channel.
    pub fn remove(&self, project_id: &str) {
        write(&self.channels).remove(project_id);
    }

    fn channel(&self, project_id: &str) -> Arc<Mutex<ProjectChannel>> {
        if let Some(channel) = read(&self.channels).get(project_id) {
            return Arc::clone(channel);
        }
        let mut guard = write(&self.channels);
        Arc::clone(
            guard
                .entry(project_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ProjectChannel::new(self.buffer_lines)))),
        )
    }
}

fn lock(channel: &Arc<Mutex<ProjectChannel>>) -> MutexGuard<'_, ProjectChannel> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read(
    map: &RwLock<HashMap<String, Arc<Mutex<ProjectChannel>>>>,
) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Mutex<ProjectChannel>>>> {
    map.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(
    map: &RwLock<HashMap<String, Arc<Mutex<ProjectChannel>>>>,
) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Mutex<ProjectChannel>>>> {
    map.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, text: &str) -> OutputLine {
        OutputLine::now(id, StreamKind::Stdout, text)
    }

    #[tokio::test]
    async fn late_subscriber_gets_replay_then_live_lines() {
        let broker = OutputBroker::new(10);
        broker.publish(line("p", "one"));
        broker.publish(line("p", "two"));

        let (tail, mut rx) = broker.subscribe("p");
        let texts: Vec<_> = tail.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);

        broker.publish(line("p", "three"));
        assert_eq!(rx.recv().await.unwrap().text, "three");
    }

    #[test]
    fn ring_keeps_only_the_newest_lines() {
        let broker = OutputBroker::new(3);
        for i in 0..5 {
            broker.publish(line("p", &format!("l{i}")));
        }
        let texts: Vec<_> = broker
            .tail("p", 10)
            .into_iter()
            .map(|l| l.text)
            .collect();
        assert_eq!(texts, ["l2", "l3", "l4"]);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_but_publisher_proceeds() {
        let broker = OutputBroker::new(16);
        let (_, mut rx) = broker.subscribe("p");

        // Overflow the broadcast buffer without ever receiving.
        for i in 0..200 {
            broker.publish(line("p", &format!("l{i}")));
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => assert!(skipped > 0),
            other => panic!("expected lag, got {other:?}"),
        }
        // After the lag, newer lines still arrive in order.
        let next = rx.recv().await.unwrap();
        assert!(next.text.starts_with('l'));
    }

    #[tokio::test]
    async fn per_stream_order_is_preserved() {
        let broker = OutputBroker::new(100);
        let (_, mut rx) = broker.subscribe("p");
        for i in 0..50 {
            broker.publish(line("p", &format!("{i}")));
        }
        for i in 0..50 {
            assert_eq!(rx.recv().await.unwrap().text, format!("{i}"));
        }
    }

    #[tokio::test]
    async fn subscribe_all_sees_every_project() {
        let broker = OutputBroker::new(10);
        let mut rx = broker.subscribe_all();
        broker.publish(line("a", "from-a"));
        broker.publish(line("b", "from-b"));

        assert_eq!(rx.recv().await.unwrap().project_id, "a");
        assert_eq!(rx.recv().await.unwrap().project_id, "b");
    }
}
