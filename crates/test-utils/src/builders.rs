#![allow(dead_code)]

use std::path::{Path, PathBuf};

use scriptdock::config::AppSettings;

/// Builder for a project folder on disk, to simplify test setup.
pub struct ProjectBuilder {
    id: String,
    name: Option<String>,
    entry: String,
    body: String,
    interpreter: Option<String>,
    schedule: Option<String>,
    tags: Vec<String>,
    manifest: bool,
}

impl ProjectBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            entry: "main.py".to_string(),
            body: "print('hello')\n".to_string(),
            interpreter: None,
            schedule: None,
            tags: Vec::new(),
            manifest: false,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn entry(mut self, entry: &str) -> Self {
        self.entry = entry.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn interpreter(mut self, interpreter: &str) -> Self {
        self.interpreter = Some(interpreter.to_string());
        self
    }

    pub fn schedule(mut self, rule: &str) -> Self {
        self.schedule = Some(rule.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn with_manifest(mut self) -> Self {
        self.manifest = true;
        self
    }

    /// Create the project folder under `root` and return its path.
    pub fn write_to(self, root: &Path) -> PathBuf {
        let folder = root.join(&self.id);
        std::fs::create_dir_all(&folder).expect("create project folder");

        let mut descriptor = String::new();
        if let Some(name) = &self.name {
            descriptor.push_str(&format!("name = \"{name}\"\n"));
        }
        descriptor.push_str(&format!("entry = \"{}\"\n", self.entry));
        if let Some(interpreter) = &self.interpreter {
            descriptor.push_str(&format!("interpreter = \"{interpreter}\"\n"));
        }
        if let Some(schedule) = &self.schedule {
            descriptor.push_str(&format!("schedule = \"{schedule}\"\n"));
        }
        if !self.tags.is_empty() {
            let quoted: Vec<String> = self.tags.iter().map(|t| format!("\"{t}\"")).collect();
            descriptor.push_str(&format!("tags = [{}]\n", quoted.join(", ")));
        }
        std::fs::write(folder.join("project.toml"), descriptor).expect("write project.toml");
        std::fs::write(folder.join(&self.entry), &self.body).expect("write entry script");

        if self.manifest {
            std::fs::write(folder.join("requirements.txt"), "requests\n")
                .expect("write requirements.txt");
        }
        folder
    }
}

/// Settings tuned for tests: short grace, small buffers.
pub fn test_settings(projects_dir: &Path) -> AppSettings {
    AppSettings {
        projects_dir: projects_dir.to_path_buf(),
        stop_grace_secs: 1,
        output_buffer_lines: 64,
        ..AppSettings::default()
    }
}
