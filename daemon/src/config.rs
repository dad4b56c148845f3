use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::paths;

/// Daemon settings.  Deserialized from /etc/acpid.toml when present; every
/// key is optional.  Command-line flags are applied on top.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Handler root.  Actions resolve to paths below it.
    pub conf_dir: PathBuf,
    /// Binary sources are `{input_prefix}0`, `{input_prefix}1`, …
    pub input_prefix: String,
    /// When set, read textual events from this file instead of probing
    /// input devices.
    pub event_file: Option<PathBuf>,
    pub action_file: PathBuf,
    pub map_file: PathBuf,
    /// Empty disables the pid file.
    pub pid_file: PathBuf,
    /// Batch runner used for handler directories.
    pub run_parts: String,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            conf_dir: PathBuf::from(paths::CONF_DIR),
            input_prefix: paths::INPUT_PREFIX.to_string(),
            event_file: None,
            action_file: PathBuf::from(paths::ACTION_FILE),
            map_file: PathBuf::from(paths::MAP_FILE),
            pid_file: PathBuf::from(paths::PID_FILE),
            run_parts: paths::RUN_PARTS.to_string(),
            debug: false,
        }
    }
}

/// Loads the settings file at `path`, returning `Settings::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}
