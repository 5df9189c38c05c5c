// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::AppSettings;
use crate::errors::Result;

/// Load the settings file from a given path.
///
/// Fails on unreadable or malformed TOML; use [`load_or_default`] at the
/// application layer where a missing file should mean built-in defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<AppSettings> {
    let contents = fs::read_to_string(path.as_ref())?;
    let settings: AppSettings = toml::from_str(&contents)?;
    Ok(settings)
}

/// Load settings, treating a missing file as all-defaults.
///
/// A file that exists but does not parse is still an error: silently
/// ignoring a typo'd settings file is worse than failing.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<AppSettings> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    load_from_path(path)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::errors::ScriptdockError;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_or_default(dir.path().join("nope.toml")).unwrap();
        assert_eq!(settings.tick_interval_secs, 30);
        assert_eq!(settings.stop_grace_secs, 3);
        assert_eq!(settings.output_buffer_lines, 1000);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Scriptdock.toml");
        std::fs::write(&path, "tick_interval_secs = 5\ninterpreter = \"python3.12\"\n").unwrap();

        let settings = load_or_default(&path).unwrap();
        assert_eq!(settings.tick_interval_secs, 5);
        assert_eq!(settings.interpreter, PathBuf::from("python3.12"));
        assert_eq!(settings.stop_grace_secs, 3);
    }

    #[test]
    fn unreadable_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_path(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ScriptdockError::IoError(_)));
    }

    #[test]
    fn malformed_file_is_a_toml_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Scriptdock.toml");
        std::fs::write(&path, "tick_interval_secs = \"soon\"").unwrap();
        assert!(matches!(
            load_or_default(&path).unwrap_err(),
            ScriptdockError::TomlError(_)
        ));
    }
}
