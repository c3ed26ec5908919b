//! Backup creation, restoration, and cleanup.
//!
//! Any operation that rewrites a media file in place first copies it to a
//! sibling `<file>.vpo-backup`, preserving mtime and permissions. On
//! failure the backup is moved back; on success it is removed unless the
//! user configured keeping it.

use std::path::{Path, PathBuf};

use filetime::FileTime;
use tracing::{debug, error, info};

use crate::error::BackupRestorationError;

/// Backup file suffix appended to the full file name.
pub const BACKUP_SUFFIX: &str = ".vpo-backup";

pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

pub fn has_backup(path: &Path) -> bool {
    backup_path_for(path).exists()
}

/// Copies `path` to its backup sibling, preserving mtime and mode.
/// An existing backup is replaced.
pub fn create_backup(path: &Path) -> std::io::Result<PathBuf> {
    let backup = backup_path_for(path);
    if backup.exists() {
        std::fs::remove_file(&backup)?;
        debug!(backup = %backup.display(), "removed existing backup");
    }

    let metadata = std::fs::metadata(path)?;
    debug!(
        source = %path.display(),
        backup = %backup.display(),
        size_bytes = metadata.len(),
        "creating backup"
    );
    std::fs::copy(path, &backup)?;
    std::fs::set_permissions(&backup, metadata.permissions())?;
    filetime::set_file_mtime(&backup, FileTime::from_last_modification_time(&metadata))?;
    Ok(backup)
}

/// Moves the backup back over the original and verifies the result.
pub fn restore_from_backup(
    backup: &Path,
    original: &Path,
) -> Result<(), BackupRestorationError> {
    if !backup.exists() {
        return Err(BackupRestorationError(format!(
            "backup file not found: {}",
            backup.display()
        )));
    }
    info!(
        backup = %backup.display(),
        target = %original.display(),
        "restoring from backup"
    );
    if original.exists() {
        std::fs::remove_file(original)
            .map_err(|e| BackupRestorationError(format!("cannot remove target: {e}")))?;
    }
    std::fs::rename(backup, original)
        .map_err(|e| BackupRestorationError(format!("rename failed: {e}")))?;

    match std::fs::metadata(original) {
        Ok(metadata) if metadata.len() > 0 => Ok(()),
        Ok(_) => Err(BackupRestorationError(format!(
            "{} is empty after restore",
            original.display()
        ))),
        Err(e) => Err(BackupRestorationError(format!(
            "{} missing after restore: {e}",
            original.display()
        ))),
    }
}

/// Restoration wrapper for error handlers: logs failures instead of
/// propagating so they never mask the original error.
pub fn safe_restore_from_backup(backup: &Path, original: &Path) -> bool {
    match restore_from_backup(backup, original) {
        Ok(()) => true,
        Err(e) => {
            error!(
                backup = %backup.display(),
                error = %e,
                "failed to restore backup; original file may be corrupted or missing"
            );
            false
        }
    }
}

/// Removes a backup after a successful operation. No-op when absent.
pub fn cleanup_backup(backup: &Path) {
    if backup.exists() {
        debug!(backup = %backup.display(), "cleaning up backup");
        let _ = std::fs::remove_file(backup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_round_trip_preserves_bytes_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.mkv");
        std::fs::write(&file, b"original-bytes").unwrap();
        let mtime = FileTime::from_last_modification_time(&std::fs::metadata(&file).unwrap());

        let backup = create_backup(&file).unwrap();
        assert!(backup.exists());
        assert_eq!(std::fs::read(&backup).unwrap(), b"original-bytes");
        let backup_mtime =
            FileTime::from_last_modification_time(&std::fs::metadata(&backup).unwrap());
        assert_eq!(mtime.unix_seconds(), backup_mtime.unix_seconds());

        // Simulate a failed rewrite, then restore.
        std::fs::write(&file, b"corrupted").unwrap();
        restore_from_backup(&backup, &file).unwrap();
        assert_eq!(std::fs::read(&file).unwrap(), b"original-bytes");
        assert!(!backup.exists());
    }

    #[test]
    fn restore_missing_backup_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.mkv");
        let backup = backup_path_for(&file);
        assert!(restore_from_backup(&backup, &file).is_err());
        assert!(!safe_restore_from_backup(&backup, &file));
    }

    #[test]
    fn cleanup_is_a_noop_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        cleanup_backup(&dir.path().join("nothing.vpo-backup"));
    }
}
