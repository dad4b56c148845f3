/// Event sources: the numbered evdev device family or a single textual
/// event file, plus decoding of binary `input_event` records.
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Size of the kernel's `struct input_event`: a `timeval` followed by
/// `u16 type`, `u16 code` and `i32 value`.
pub const INPUT_EVENT_SIZE: usize = std::mem::size_of::<libc::timeval>() + 8;

/// A decoded binary event.  The timestamp is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    /// Decodes one native-endian record.  Returns `None` unless `buf` is
    /// exactly [`INPUT_EVENT_SIZE`] bytes long.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != INPUT_EVENT_SIZE {
            return None;
        }
        let tail = &buf[INPUT_EVENT_SIZE - 8..];
        Some(Self {
            kind: u16::from_ne_bytes([tail[0], tail[1]]),
            code: u16::from_ne_bytes([tail[2], tail[3]]),
            value: i32::from_ne_bytes([tail[4], tail[5], tail[6], tail[7]]),
        })
    }

    /// Inverse of [`decode`](Self::decode) with a zeroed timestamp.
    #[cfg(test)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; INPUT_EVENT_SIZE - 8];
        buf.extend_from_slice(&self.kind.to_ne_bytes());
        buf.extend_from_slice(&self.code.to_ne_bytes());
        buf.extend_from_slice(&self.value.to_ne_bytes());
        buf
    }
}

/// How records are framed on a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Fixed-size `input_event` records.
    Binary,
    /// Newline-terminated text lines.
    Text,
}

/// An opened, non-blocking descriptor together with the path it came from.
#[derive(Debug)]
pub struct OpenSource {
    pub path: PathBuf,
    pub file: File,
}

/// The fixed set of sources the listener polls.
#[derive(Debug)]
pub struct EventSources {
    pub kind: SourceKind,
    pub sources: Vec<OpenSource>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no input devices: cannot open {}", .path.display())]
    NoDevices {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot open event file {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EventSources {
    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

/// Opens `{prefix}0`, `{prefix}1`, … until the first one that fails.
/// Failing on index 0 is an error.
pub fn probe(prefix: &str) -> Result<EventSources, SourceError> {
    let mut sources = Vec::new();
    for index in 0usize.. {
        let path = PathBuf::from(format!("{prefix}{index}"));
        match open_nonblocking(&path) {
            Ok(file) => {
                debug!(path = %path.display(), "opened input device");
                sources.push(OpenSource { path, file });
            }
            Err(source) if index == 0 => return Err(SourceError::NoDevices { path, source }),
            Err(e) => {
                debug!(path = %path.display(), "probing stopped: {e}");
                break;
            }
        }
    }
    info!(count = sources.len(), prefix, "listening on input devices");
    Ok(EventSources {
        kind: SourceKind::Binary,
        sources,
    })
}

/// Opens exactly `path` as a textual event stream.
pub fn open_text(path: &Path) -> Result<EventSources, SourceError> {
    let file = open_nonblocking(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "listening on event file");
    Ok(EventSources {
        kind: SourceKind::Text,
        sources: vec![OpenSource {
            path: path.to_path_buf(),
            file,
        }],
    })
}

fn open_nonblocking(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}
