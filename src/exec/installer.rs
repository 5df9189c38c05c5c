// src/exec/installer.rs

//! Dependency installation for a project: create its virtualenv if missing,
//! then `pip install -r requirements.txt` inside it. Both stages run as an
//! ordinary tracked run (`RunKind::Install`) so their output streams through
//! the broker and they can be stopped like any script.

use std::ffi::OsString;

use crate::config::{AppSettings, ProjectDescriptor, MANIFEST_FILE};
use crate::errors::LaunchError;
use crate::exec::runner::{check_interpreter, venv_python, CommandSpec, LaunchSpec};
use crate::supervisor::RunKind;

/// Build the install run for a project.
///
/// Fails up front when the project has no `requirements.txt`, or when a
/// virtualenv has to be created and the base interpreter does not exist.
pub fn install_spec(
    desc: &ProjectDescriptor,
    settings: &AppSettings,
) -> Result<LaunchSpec, LaunchError> {
    let manifest = desc
        .manifest
        .clone()
        .ok_or_else(|| LaunchError::EntryMissing(desc.folder.join(MANIFEST_FILE)))?;

    let venv = venv_python(&desc.folder);
    let mut stages = Vec::new();

    if !venv.is_file() {
        let base = desc
            .interpreter
            .clone()
            .unwrap_or_else(|| settings.interpreter.clone());
        check_interpreter(&base)?;
        stages.push(CommandSpec {
            program: base,
            args: vec![
                OsString::from("-m"),
                OsString::from("venv"),
                OsString::from("venv"),
            ],
            cwd: desc.folder.clone(),
        });
    }

    stages.push(CommandSpec {
        program: venv,
        args: vec![
            OsString::from("-m"),
            OsString::from("pip"),
            OsString::from("install"),
            OsString::from("-r"),
            manifest.into_os_string(),
        ],
        cwd: desc.folder.clone(),
    });

    Ok(LaunchSpec {
        id: desc.id.clone(),
        kind: RunKind::Install,
        stages,
    })
}
