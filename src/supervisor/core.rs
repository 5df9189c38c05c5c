// src/supervisor/core.rs

//! The pure run table.
//!
//! `SupervisorCore` is synchronous and deterministic: no channels, no IO,
//! no Tokio types. The async shell owns exactly one and mutates it only
//! from the control loop, which is what makes the one-live-run-per-project
//! invariant hold by construction.

use std::collections::BTreeMap;

use crate::supervisor::{ExitReport, ProjectId, RunKind, RunState, RunStatus};

#[derive(Default)]
pub struct SupervisorCore {
    /// Script runs, keyed by project. Terminal entries stay queryable until
    /// acknowledged or replaced by a new start.
    runs: BTreeMap<ProjectId, RunStatus>,
    /// Install runs, same retention rules.
    installs: BTreeMap<ProjectId, RunStatus>,
}

impl SupervisorCore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: RunKind) -> &BTreeMap<ProjectId, RunStatus> {
        match kind {
            RunKind::Script => &self.runs,
            RunKind::Install => &self.installs,
        }
    }

    fn table_mut(&mut self, kind: RunKind) -> &mut BTreeMap<ProjectId, RunStatus> {
        match kind {
            RunKind::Script => &mut self.runs,
            RunKind::Install => &mut self.installs,
        }
    }

    /// Is there a non-terminal run of this kind for the project?
    pub fn is_live(&self, id: &str, kind: RunKind) -> bool {
        self.table(kind)
            .get(id)
            .is_some_and(|run| !run.state.is_terminal())
    }

    /// Record a freshly launched run, replacing any terminal leftover.
    ///
    /// Returns the displaced terminal state, if any. Callers must check
    /// [`Self::is_live`] first; a live run is never displaced.
    pub fn begin(&mut self, status: RunStatus) -> Option<RunState> {
        let kind = status.kind;
        self.table_mut(kind)
            .insert(status.project_id.clone(), status)
            .map(|old| old.state)
    }

    /// Move a live run to a new state. Returns `(old, new)` for the event
    /// broadcast, or `None` when no live run exists.
    pub fn transition(&mut self, id: &str, kind: RunKind, new: RunState) -> Option<(RunState, RunState)> {
        let run = self.table_mut(kind).get_mut(id)?;
        if run.state.is_terminal() {
            return None;
        }
        let old = std::mem::replace(&mut run.state, new.clone());
        Some((old, new))
    }

    /// Fold an exit report into the table, classifying crash vs clean exit.
    ///
    /// A non-zero (or signal) exit without an explicit stop is a crash;
    /// anything that was asked to stop is a plain exit.
    pub fn note_exit(
        &mut self,
        id: &str,
        kind: RunKind,
        report: &ExitReport,
    ) -> Option<(RunState, RunState)> {
        let new = classify_exit(report);
        self.transition(id, kind, new)
    }

    /// Current status for a project: the script run if one is tracked,
    /// otherwise the install run.
    pub fn status(&self, id: &str) -> Option<RunStatus> {
        self.runs
            .get(id)
            .or_else(|| self.installs.get(id))
            .cloned()
    }

    /// IDs with a live script run, sorted. This is what session snapshots
    /// record.
    pub fn running_ids(&self) -> Vec<ProjectId> {
        self.runs
            .iter()
            .filter(|(_, run)| !run.state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// All live runs of a kind, for teardown.
    pub fn live_ids(&self, kind: RunKind) -> Vec<ProjectId> {
        self.table(kind)
            .iter()
            .filter(|(_, run)| !run.state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drop terminal entries for a project. Live runs are never dropped.
    pub fn acknowledge(&mut self, id: &str) -> bool {
        let mut dropped = false;
        for kind in [RunKind::Script, RunKind::Install] {
            let table = self.table_mut(kind);
            if table.get(id).is_some_and(|run| run.state.is_terminal()) {
                table.remove(id);
                dropped = true;
            }
        }
        dropped
    }
}

fn classify_exit(report: &ExitReport) -> RunState {
    if report.stopped.is_some() {
        return RunState::Exited(report.exit_code);
    }
    match report.exit_code {
        Some(0) => RunState::Exited(Some(0)),
        Some(code) => RunState::Crashed(format!("exit code {code}")),
        None => RunState::Crashed("terminated by signal".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn status(id: &str, kind: RunKind) -> RunStatus {
        RunStatus {
            project_id: id.to_string(),
            kind,
            pid: 4242,
            started_at: chrono::Local::now(),
            state: RunState::Running,
        }
    }

    fn exit(code: Option<i32>, stopped: Option<crate::supervisor::StopKind>) -> ExitReport {
        ExitReport {
            exit_code: code,
            duration: Duration::from_millis(10),
            stopped,
        }
    }

    #[test]
    fn live_run_blocks_a_second_start() {
        let mut core = SupervisorCore::new();
        core.begin(status("p", RunKind::Script));
        assert!(core.is_live("p", RunKind::Script));

        core.note_exit("p", RunKind::Script, &exit(Some(0), None));
        assert!(!core.is_live("p", RunKind::Script));
    }

    #[test]
    fn nonzero_exit_without_stop_is_a_crash() {
        let mut core = SupervisorCore::new();
        core.begin(status("p", RunKind::Script));
        let (_, new) = core
            .note_exit("p", RunKind::Script, &exit(Some(1), None))
            .unwrap();
        assert_eq!(new, RunState::Crashed("exit code 1".to_string()));
    }

    #[test]
    fn stopped_run_is_never_a_crash() {
        use crate::supervisor::StopKind;
        let mut core = SupervisorCore::new();
        core.begin(status("p", RunKind::Script));
        let (_, new) = core
            .note_exit("p", RunKind::Script, &exit(Some(1), Some(StopKind::Graceful)))
            .unwrap();
        assert_eq!(new, RunState::Exited(Some(1)));
    }

    #[test]
    fn terminal_entry_stays_until_acknowledged() {
        let mut core = SupervisorCore::new();
        core.begin(status("p", RunKind::Script));
        core.note_exit("p", RunKind::Script, &exit(Some(1), None));

        assert!(matches!(
            core.status("p").map(|s| s.state),
            Some(RunState::Crashed(_))
        ));
        assert!(core.acknowledge("p"));
        assert!(core.status("p").is_none());
        assert!(!core.acknowledge("p"));
    }

    #[test]
    fn acknowledge_never_drops_a_live_run() {
        let mut core = SupervisorCore::new();
        core.begin(status("p", RunKind::Script));
        assert!(!core.acknowledge("p"));
        assert!(core.is_live("p", RunKind::Script));
    }

    #[test]
    fn install_and_script_are_tracked_independently() {
        let mut core = SupervisorCore::new();
        core.begin(status("p", RunKind::Script));
        core.begin(status("p", RunKind::Install));
        assert!(core.is_live("p", RunKind::Script));
        assert!(core.is_live("p", RunKind::Install));

        core.note_exit("p", RunKind::Install, &exit(Some(0), None));
        assert!(core.is_live("p", RunKind::Script));
        assert!(!core.is_live("p", RunKind::Install));
    }

    #[test]
    fn running_ids_are_sorted_and_exclude_terminal() {
        let mut core = SupervisorCore::new();
        core.begin(status("b", RunKind::Script));
        core.begin(status("a", RunKind::Script));
        core.begin(status("c", RunKind::Script));
        core.note_exit("c", RunKind::Script, &exit(Some(0), None));

        assert_eq!(core.running_ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
