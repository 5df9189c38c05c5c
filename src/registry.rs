// src/registry.rs

//! Project discovery and lookup.
//!
//! The registry owns every [`ProjectDescriptor`]. It scans the immediate
//! subfolders of the projects directory; a subfolder is a project when it
//! carries a `project.toml`. Folders that fail to load are skipped with a
//! warning so one broken descriptor never hides the rest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::ProjectDescriptor;
use crate::schedule::ScheduleRule;

pub struct ProjectRegistry {
    projects_dir: PathBuf,
    projects: RwLock<BTreeMap<String, ProjectDescriptor>>,
}

impl ProjectRegistry {
    /// Scan `projects_dir` and build the registry.
    pub fn discover(projects_dir: impl Into<PathBuf>) -> Result<Self> {
        let registry = Self {
            projects_dir: projects_dir.into(),
            projects: RwLock::new(BTreeMap::new()),
        };
        registry.rescan()?;
        Ok(registry)
    }

    /// Re-scan the projects directory, replacing the project table.
    pub fn rescan(&self) -> Result<()> {
        let entries = std::fs::read_dir(&self.projects_dir)
            .with_context(|| format!("reading projects dir {:?}", self.projects_dir))?;

        let mut projects = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match ProjectDescriptor::load(&path) {
                Ok(Some(desc)) => {
                    debug!(project = %desc.id, schedule = %desc.schedule, "discovered project");
                    projects.insert(desc.id.clone(), desc);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(folder = %path.display(), %err, "skipping unloadable project folder");
                }
            }
        }

        *self.write() = projects;
        Ok(())
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    pub fn get(&self, id: &str) -> Option<ProjectDescriptor> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// All project IDs, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn descriptors(&self) -> Vec<ProjectDescriptor> {
        self.read().values().cloned().collect()
    }

    /// `(id, rule)` pairs for the scheduler tick, sorted by ID.
    pub fn schedules(&self) -> Vec<(String, ScheduleRule)> {
        self.read()
            .values()
            .map(|d| (d.id.clone(), d.schedule.clone()))
            .collect()
    }

    /// Replace a project's schedule rule, rewriting its descriptor file.
    pub fn set_schedule(&self, id: &str, rule: ScheduleRule) -> Result<()> {
        let mut guard = self.write();
        let desc = guard
            .get_mut(id)
            .with_context(|| format!("unknown project {id:?}"))?;
        let previous = std::mem::replace(&mut desc.schedule, rule);
        if let Err(err) = desc.rewrite() {
            desc.schedule = previous;
            return Err(err);
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, ProjectDescriptor>> {
        self.projects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ProjectDescriptor>> {
        self.projects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
