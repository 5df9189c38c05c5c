// src/config/descriptor.rs

//! Per-project descriptor: the `project.toml` file inside a project folder.
//!
//! A folder is a project if and only if it contains `project.toml`. The
//! folder name is the project's stable ID. Descriptors are immutable at
//! runtime except for wholesale replacement through [`ProjectDescriptor::rewrite`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::schedule::ScheduleRule;

pub const DESCRIPTOR_FILE: &str = "project.toml";
pub const MANIFEST_FILE: &str = "requirements.txt";

/// Raw `project.toml` contents.
///
/// ```toml
/// name = "Nightly ETL"
/// entry = "main.py"
/// interpreter = "/usr/bin/python3.12"
/// tags = ["etl", "prod"]
/// schedule = "daily|02:30"
/// ```
///
/// Everything is optional: `name` defaults to the folder name, `entry` to
/// the first `*.py` file in the folder, `schedule` to `off`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// A fully resolved project.
#[derive(Debug, Clone)]
pub struct ProjectDescriptor {
    /// Stable ID: the project folder's name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Absolute path of the project folder.
    pub folder: PathBuf,
    /// Absolute path of the entry script.
    pub entry: PathBuf,
    /// Interpreter declared in the descriptor, if any.
    pub interpreter: Option<PathBuf>,
    pub tags: BTreeSet<String>,
    pub schedule: ScheduleRule,
    /// `requirements.txt`, if the folder has one.
    pub manifest: Option<PathBuf>,
}

impl ProjectDescriptor {
    /// Load the descriptor from a project folder.
    ///
    /// Returns `Ok(None)` when the folder is not a project (no
    /// `project.toml`). A malformed schedule string degrades to `Off` with
    /// a warning; a missing entry that cannot be auto-detected is an error.
    pub fn load(folder: &Path) -> Result<Option<Self>> {
        let descriptor_path = folder.join(DESCRIPTOR_FILE);
        if !descriptor_path.is_file() {
            return Ok(None);
        }

        let id = folder
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("project folder has no usable name: {folder:?}"))?;

        let contents = fs::read_to_string(&descriptor_path)
            .with_context(|| format!("reading descriptor at {descriptor_path:?}"))?;
        let file: DescriptorFile = toml::from_str(&contents)
            .with_context(|| format!("parsing TOML descriptor at {descriptor_path:?}"))?;

        let entry = match &file.entry {
            Some(rel) => folder.join(rel),
            None => detect_entry(folder)
                .with_context(|| format!("project {id:?} has no entry and no *.py file"))?,
        };

        let schedule = match &file.schedule {
            None => ScheduleRule::Off,
            Some(raw) => match raw.parse() {
                Ok(rule) => rule,
                Err(err) => {
                    warn!(project = %id, rule = %raw, %err, "invalid schedule, treating as off");
                    ScheduleRule::Off
                }
            },
        };

        let manifest_path = folder.join(MANIFEST_FILE);
        let manifest = manifest_path.is_file().then_some(manifest_path);

        Ok(Some(Self {
            name: file.name.clone().unwrap_or_else(|| id.clone()),
            interpreter: file.interpreter.as_deref().map(PathBuf::from),
            tags: file.tags,
            id,
            folder: folder.to_path_buf(),
            entry,
            schedule,
            manifest,
        }))
    }

    /// Replace the on-disk descriptor wholesale with this descriptor's
    /// current fields. Paths are written relative to the folder.
    pub fn rewrite(&self) -> Result<()> {
        let entry = self
            .entry
            .strip_prefix(&self.folder)
            .unwrap_or(&self.entry)
            .to_string_lossy()
            .into_owned();

        let file = DescriptorFile {
            name: Some(self.name.clone()),
            entry: Some(entry),
            interpreter: self
                .interpreter
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            tags: self.tags.clone(),
            schedule: Some(self.schedule.to_string()),
        };

        let path = self.folder.join(DESCRIPTOR_FILE);
        let rendered = toml::to_string_pretty(&file)
            .with_context(|| format!("serializing descriptor for {:?}", self.id))?;
        fs::write(&path, rendered)
            .with_context(|| format!("writing descriptor at {path:?}"))?;
        Ok(())
    }
}

/// First `*.py` file in the folder, alphabetically, as the entry script.
fn detect_entry(folder: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(folder)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "py"))
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_dir(descriptor: &str, files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DESCRIPTOR_FILE), descriptor).unwrap();
        for f in files {
            fs::write(dir.path().join(f), "print('hi')\n").unwrap();
        }
        dir
    }

    #[test]
    fn folder_without_descriptor_is_not_a_project() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectDescriptor::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn full_descriptor_resolves_all_fields() {
        let dir = project_dir(
            "name = \"ETL\"\nentry = \"run.py\"\ntags = [\"prod\"]\nschedule = \"daily|02:30\"\n",
            &["run.py"],
        );
        let desc = ProjectDescriptor::load(dir.path()).unwrap().unwrap();

        assert_eq!(desc.name, "ETL");
        assert_eq!(desc.entry, dir.path().join("run.py"));
        assert!(desc.tags.contains("prod"));
        assert!(matches!(desc.schedule, ScheduleRule::Daily { .. }));
        assert!(desc.manifest.is_none());
    }

    #[test]
    fn entry_auto_detects_first_py_file() {
        let dir = project_dir("", &["b.py", "a.py"]);
        let desc = ProjectDescriptor::load(dir.path()).unwrap().unwrap();
        assert_eq!(desc.entry, dir.path().join("a.py"));
        // Name falls back to the folder name, which is the ID.
        assert_eq!(desc.name, desc.id);
    }

    #[test]
    fn malformed_schedule_degrades_to_off() {
        let dir = project_dir("entry = \"main.py\"\nschedule = \"hourly|09\"\n", &["main.py"]);
        let desc = ProjectDescriptor::load(dir.path()).unwrap().unwrap();
        assert!(matches!(desc.schedule, ScheduleRule::Off));
    }

    #[test]
    fn manifest_presence_is_detected() {
        let dir = project_dir("entry = \"main.py\"\n", &["main.py", MANIFEST_FILE]);
        let desc = ProjectDescriptor::load(dir.path()).unwrap().unwrap();
        assert_eq!(desc.manifest, Some(dir.path().join(MANIFEST_FILE)));
    }

    #[test]
    fn rewrite_round_trips_the_schedule() {
        let dir = project_dir("entry = \"main.py\"\n", &["main.py"]);
        let mut desc = ProjectDescriptor::load(dir.path()).unwrap().unwrap();

        desc.schedule = "interval|45m".parse().unwrap();
        desc.rewrite().unwrap();

        let reloaded = ProjectDescriptor::load(dir.path()).unwrap().unwrap();
        assert_eq!(reloaded.schedule.to_string(), "interval|45m");
        assert_eq!(reloaded.entry, desc.entry);
    }
}
