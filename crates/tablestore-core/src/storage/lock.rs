//! Exclusive OS-level lock on a table file.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Holds an exclusive advisory lock on an open table file for as long as
/// it lives.
///
/// Acquisition never waits: contention fails at once with
/// [`Error::Locked`], and any retry policy is left to the caller.
#[derive(Debug)]
pub(crate) struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Takes the lock on `file`, consuming it.
    pub(crate) fn acquire(file: File, path: &Path) -> Result<Self> {
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                file,
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                tracing::warn!(path = %path.display(), "Table file is locked by another handle");
                Err(Error::Locked(path.to_path_buf()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub(crate) fn file(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::debug!(path = %self.path.display(), error = %e, "Failed to release table lock");
        }
    }
}
