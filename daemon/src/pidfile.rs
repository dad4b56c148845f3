use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The pid marker written once the event sources are open and removed at
/// shutdown.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current process id to `path`.
    /// Creates the parent directory if it does not exist.
    /// Logs errors rather than failing; a missing pid file should never stop
    /// the daemon.  Returns `None` when `path` is empty or the write failed.
    pub fn create(path: &Path) -> Option<Self> {
        Self::create_with_pid(path, std::process::id())
    }

    fn create_with_pid(path: &Path, pid: u32) -> Option<Self> {
        if path.as_os_str().is_empty() {
            return None;
        }
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create directory {}: {e}", parent.display());
                return None;
            }
        }
        match std::fs::write(path, format!("{pid}\n")) {
            Ok(()) => {
                debug!(path = %path.display(), pid, "pid file written");
                Some(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                warn!("Failed to write pid file {}: {e}", path.display());
                None
            }
        }
    }

    pub fn remove(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove pid file {}: {e}", self.path.display());
        }
    }
}
