/// Handler dispatch.
///
/// A resolved action names a path below the handler root.  A directory is
/// handed to `run-parts`; anything else is executed directly.  Children are
/// never waited for: [`ignore_child_exits`] makes the kernel reap them.
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

/// How an action will be launched.
#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
    /// `run-parts ./<action>` inside the handler root.
    RunParts(String),
    /// `<root>/./<action>` executed directly.
    Direct(PathBuf),
    /// Nothing exists at the handler path.
    Missing,
}

pub struct Dispatcher {
    root: PathBuf,
    run_parts: String,
}

impl Dispatcher {
    /// `root` must exist; it is canonicalized so handler paths stay valid
    /// regardless of the daemon's working directory.
    pub fn new(root: &Path, run_parts: impl Into<String>) -> io::Result<Self> {
        Ok(Self {
            root: std::fs::canonicalize(root)?,
            run_parts: run_parts.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stats the handler path for `action` and decides how to run it.
    /// The action is always taken relative to the root, so a leading `/`
    /// does not escape it.
    pub fn plan(&self, action: &str) -> Invocation {
        let rel = format!("./{action}");
        let path = self.root.join(&rel);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Invocation::RunParts(rel),
            Ok(_) => Invocation::Direct(path),
            Err(e) => {
                warn!(action, "no handler: {e}");
                Invocation::Missing
            }
        }
    }

    /// Launches the handler for `action` without waiting for it.
    /// Returns whether a process was started.
    pub fn dispatch(&self, action: &str) -> bool {
        let mut cmd = match self.plan(action) {
            Invocation::RunParts(rel) => {
                let mut cmd = Command::new(&self.run_parts);
                cmd.arg(rel);
                cmd
            }
            Invocation::Direct(path) => Command::new(path),
            Invocation::Missing => return false,
        };
        cmd.current_dir(&self.root);
        // SIG_IGN survives exec; handlers get the default back.
        unsafe {
            cmd.pre_exec(|| {
                libc::signal(libc::SIGCHLD, libc::SIG_DFL);
                Ok(())
            });
        }

        match cmd.spawn() {
            Ok(child) => {
                debug!(action, pid = child.id(), "handler started");
                true
            }
            Err(e) => {
                warn!(action, "failed to start handler: {e}");
                false
            }
        }
    }
}

/// Sets `SIGCHLD` to `SIG_IGN` so exited handlers never linger as zombies.
pub fn ignore_child_exits() -> io::Result<()> {
    let previous = unsafe { libc::signal(libc::SIGCHLD, libc::SIG_IGN) };
    if previous == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
