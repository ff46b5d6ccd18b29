//! Temporary artifacts for messages too long to inline.
//!
//! An artifact is owned by the single `log` call that spilled it. Its file is
//! removed when the artifact is dropped, so every exit path (success, runtime
//! error, panic unwinding) cleans up. Files left behind by a crashed process
//! are picked up later by [`OverflowChannel::sweep_stale`].

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use super::command::LogCommand;
use super::error::RelayError;
use super::severity::Destination;

/// Default file name prefix for artifacts.
pub const DEFAULT_PREFIX: &str = "logrelay-";

/// Every artifact ends with this suffix.
pub const ARTIFACT_SUFFIX: &str = ".log";

/// Creates overflow artifacts in one directory with a fixed name prefix.
#[derive(Debug, Clone)]
pub struct OverflowChannel {
    dir: PathBuf,
    prefix: String,
}

impl OverflowChannel {
    /// Relative directories are made absolute so read-back commands never
    /// depend on the embedded runtime's working directory.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        let dir = dir.into();
        let dir = std::path::absolute(&dir).unwrap_or(dir);
        Self {
            dir,
            prefix: prefix.into(),
        }
    }

    /// Channel in the platform temp directory with the default prefix.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir(), DEFAULT_PREFIX)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Write `message` verbatim into a freshly created, uniquely named file.
    ///
    /// The artifact path is embedded in the read-back command, so a path
    /// that is not valid UTF-8 is rejected before anything is written.
    pub fn spill(&self, message: &str) -> Result<OverflowArtifact, RelayError> {
        let mut file = tempfile::Builder::new()
            .prefix(self.prefix.as_str())
            .suffix(ARTIFACT_SUFFIX)
            .tempfile_in(&self.dir)
            .map_err(|e| RelayError::overflow("create", e))?;

        let Some(path) = file.path().to_str().map(str::to_owned) else {
            let e = io::Error::new(
                io::ErrorKind::InvalidData,
                format!("artifact path {} is not valid UTF-8", file.path().display()),
            );
            return Err(RelayError::overflow("name", e));
        };

        file.write_all(message.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| RelayError::overflow("write", e))?;

        debug!(
            target: "logrelay::overflow",
            path = %path,
            bytes = message.len(),
            "Spilled long log message"
        );
        Ok(OverflowArtifact { file, path })
    }

    /// Command that reads `artifact` back inside the session and logs it.
    pub fn read_back_command(&self, artifact: &OverflowArtifact, dest: Destination) -> LogCommand {
        LogCommand::read_back(dest, artifact.path_str())
    }

    /// Remove artifacts older than `older_than` left in the directory by
    /// earlier processes. Returns the number of files removed.
    pub fn sweep_stale(&self, older_than: Duration) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    target: "logrelay::overflow",
                    dir = %self.dir.display(), error = %e,
                    "Cannot list overflow directory; skipping sweep"
                );
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&self.prefix) || !name.ends_with(ARTIFACT_SUFFIX) {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| now.duration_since(t).ok());
            if !age.is_some_and(|age| age >= older_than) {
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {
                    trace!(target: "logrelay::overflow", path = %path.display(), "Removed stale artifact");
                    removed += 1;
                }
                Err(e) => warn!(
                    target: "logrelay::overflow",
                    path = %path.display(), error = %e,
                    "Failed to remove stale artifact"
                ),
            }
        }

        if removed > 0 {
            debug!(target: "logrelay::overflow", removed, "Swept stale overflow artifacts");
        }
        removed
    }
}

/// A spilled message on disk. The file is deleted when this is dropped.
#[derive(Debug)]
pub struct OverflowArtifact {
    file: NamedTempFile,
    path: String,
}

impl OverflowArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The path as UTF-8, exactly as the read-back command spells it.
    pub fn path_str(&self) -> &str {
        &self.path
    }

    /// Close and delete the file now. Failures are logged, never returned.
    pub fn remove(self) {
        let Self { file, path } = self;
        match file.close() {
            Ok(()) => trace!(target: "logrelay::overflow", %path, "Removed artifact"),
            Err(e) => warn!(
                target: "logrelay::overflow",
                %path, error = %e,
                "Failed to remove overflow artifact"
            ),
        }
    }
}
