//! Filesystem helpers: directory ensuring and the scratch-file registry used for cleanup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::DirectoryError;

/// Make sure `dir` exists, creating it (and any parents) if needed.
pub fn ensure_dir(dir: &Path) -> Result<(), DirectoryError> {
    if dir.is_dir() {
        debug!(path = %dir.display(), "Directory already exists");
        return Ok(());
    }
    match std::fs::create_dir_all(dir) {
        Ok(()) => {
            info!(path = %dir.display(), "Created directory");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = ?e, path = %dir.display(), "Failed to create directory");
            Err(DirectoryError {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    }
}

/// Remove `path` if it exists. A missing file is not an error.
pub fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Builder for a staging file that is later persisted as a user-visible output.
///
/// The file is created with mode `0o666` minus the umask, the same as a plain create, rather
/// than the owner-only default of a temporary file.
pub fn staging_builder<'a>(prefix: &'a str, suffix: &'a str) -> tempfile::Builder<'a, 'a> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder
}

/// Temporary files owned by one pipeline run.
///
/// Paths are registered before the file is created so a partially written file is still
/// removed. Cleanup never fails: errors are logged and the next path is tried.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Delete every tracked file that still exists. Safe to call any number of times.
    pub fn cleanup(&self) {
        for path in &self.paths {
            match remove_if_present(path) {
                Ok(true) => info!(path = %path.display(), "Removed temporary file"),
                Ok(false) => debug!(path = %path.display(), "Temporary file already absent"),
                Err(e) => {
                    warn!(error = ?e, path = %path.display(), "Failed to remove temporary file")
                }
            }
        }
    }
}
