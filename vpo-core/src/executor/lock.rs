//! Per-file advisory locking.
//!
//! One logical writer per media file, enforced by an exclusive flock on a
//! sibling `<file>.vpo-lock`. Acquisition is non-blocking: a held lock is
//! an immediate `FileLockError`, never a wait.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::FileLockError;

/// Lock file suffix appended to the full file name.
pub const LOCK_SUFFIX: &str = ".vpo-lock";

pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// An acquired exclusive lock. Released (and the lock file removed) on
/// drop; the file is only removed by the owner that acquired it, so a
/// failed acquisition can never delete another process's lock.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
    handle: Option<File>,
}

impl FileLock {
    pub fn acquire(path: &Path) -> Result<Self, FileLockError> {
        let lock_path = lock_path_for(path);
        let handle = File::create(&lock_path).map_err(|_| FileLockError {
            path: path.to_path_buf(),
        })?;
        if handle.try_lock_exclusive().is_err() {
            return Err(FileLockError {
                path: path.to_path_buf(),
            });
        }
        debug!(lock = %lock_path.display(), "acquired file lock");
        Ok(Self {
            lock_path,
            handle: Some(handle),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = fs2::FileExt::unlock(&handle);
            drop(handle);
            let _ = std::fs::remove_file(&self.lock_path);
            debug!(lock = %self.lock_path.display(), "released file lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.mkv");
        std::fs::write(&file, b"data").unwrap();

        let lock = FileLock::acquire(&file).unwrap();
        assert!(lock_path_for(&file).exists());

        // Second acquisition in the same process fails immediately.
        assert!(FileLock::acquire(&file).is_err());

        drop(lock);
        assert!(!lock_path_for(&file).exists());

        // Re-acquirable after release.
        let again = FileLock::acquire(&file).unwrap();
        drop(again);
    }
}
