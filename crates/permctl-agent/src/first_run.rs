//! Durable first-run and restart markers.
//!
//! Markers are zero-semantics files in the application support directory:
//! presence means `true`. Writes go through a temp file in the same
//! directory and an atomic rename, so a crash mid-write leaves either the
//! old state or the new one.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use permctl_core::Error;

/// Set once the first acquisition pass has completed, whatever its outcome.
pub const FIRST_RUN_MARKER: &str = "permissions_first_run_completed.flag";
/// Present only between the pre-relaunch write and the relaunched instance
/// clearing it.
pub const RESTART_MARKER: &str = "restart_completed.flag";

/// Point-in-time view of both markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkerSnapshot {
    pub first_run_completed: bool,
    pub restart_completed: bool,
}

/// Handle on the marker directory.
#[derive(Debug, Clone)]
pub struct FirstRunState {
    dir: PathBuf,
}

impl FirstRunState {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn first_run_completed(&self) -> bool {
        self.read(FIRST_RUN_MARKER)
    }

    pub fn set_first_run_completed(&self, value: bool) -> io::Result<()> {
        self.write(FIRST_RUN_MARKER, value)
    }

    pub fn restart_completed(&self) -> bool {
        self.read(RESTART_MARKER)
    }

    pub fn set_restart_completed(&self, value: bool) -> io::Result<()> {
        self.write(RESTART_MARKER, value)
    }

    pub fn snapshot(&self) -> MarkerSnapshot {
        MarkerSnapshot {
            first_run_completed: self.first_run_completed(),
            restart_completed: self.restart_completed(),
        }
    }

    /// Unreadable markers read as `false`.
    fn read(&self, name: &str) -> bool {
        let path = self.dir.join(name);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => true,
            Ok(_) => {
                let e = Error::MarkerCorrupt {
                    path,
                    reason: "not a regular file".into(),
                };
                warn!(error = %e, "Ignoring marker");
                false
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                let e = Error::MarkerCorrupt {
                    path,
                    reason: e.to_string(),
                };
                warn!(error = %e, "Ignoring marker");
                false
            }
        }
    }

    fn write(&self, name: &str, value: bool) -> io::Result<()> {
        let path = self.dir.join(name);
        if value {
            std::fs::create_dir_all(&self.dir)?;
            let mut tmp = NamedTempFile::new_in(&self.dir)?;
            writeln!(tmp, "pid={}", std::process::id())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            debug!(marker = %path.display(), "Marker set");
            return Ok(());
        }

        let removed = match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&path),
            Ok(_) => std::fs::remove_file(&path),
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => {
                debug!(marker = %path.display(), "Marker cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
