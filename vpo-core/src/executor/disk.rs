//! Pre-flight disk-space guards.
//!
//! Checked before any destructive work: the target filesystem must keep
//! `min_free_percent` free after the operation, and must have headroom for
//! the estimated output size of the operation type.

use std::path::Path;

use sysinfo::Disks;
use tracing::warn;

use crate::error::InsufficientDiskSpaceError;

/// Output-size multipliers by operation type: backup + temp output for a
/// remux costs ~2.5x the input, an HEVC transcode typically shrinks to
/// ~0.5x but still needs the backup alongside.
pub fn space_multiplier(operation_type: &str) -> f64 {
    match operation_type {
        "transcode_hevc" => 1.5,
        "transcode" => 2.0,
        "metadata_edit" => 0.1,
        _ => 2.5,
    }
}

fn format_size(mut size: f64) -> String {
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}

/// Free and total bytes for the filesystem containing `directory`.
/// Resolves the longest matching mount point.
fn filesystem_usage(directory: &Path) -> Option<(u64, u64)> {
    let disks = Disks::new_with_refreshed_list();
    let canonical = directory.canonicalize().unwrap_or_else(|_| directory.to_path_buf());
    disks
        .iter()
        .filter(|disk| canonical.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| (disk.available_space(), disk.total_space()))
}

/// Returns an error message when the operation would leave the filesystem
/// below the minimum free threshold; `None` means go ahead. A threshold of
/// zero disables the check.
pub fn check_min_free_percent(
    directory: &Path,
    required_bytes: u64,
    min_free_percent: f64,
) -> Option<String> {
    if min_free_percent <= 0.0 {
        return None;
    }
    let Some((free, total)) = filesystem_usage(directory) else {
        warn!(directory = %directory.display(), "cannot determine disk usage, skipping threshold check");
        return None;
    };
    if total == 0 {
        return None;
    }

    let post_free = free.saturating_sub(required_bytes);
    let post_free_percent = (post_free as f64 / total as f64) * 100.0;
    if post_free_percent < min_free_percent {
        let current_percent = (free as f64 / total as f64) * 100.0;
        return Some(format!(
            "operation would leave only {post_free_percent:.1}% free disk space \
             (threshold: {min_free_percent:.1}%); currently {current_percent:.1}% free \
             ({} of {})",
            format_size(free as f64),
            format_size(total as f64),
        ));
    }
    None
}

/// Strict headroom check before backup + rewrite operations.
pub fn check_disk_space(
    file_path: &Path,
    multiplier: f64,
) -> Result<(), InsufficientDiskSpaceError> {
    let Ok(metadata) = std::fs::metadata(file_path) else {
        return Err(InsufficientDiskSpaceError(format!(
            "file not found: {}",
            file_path.display()
        )));
    };
    let required = (metadata.len() as f64 * multiplier) as u64;
    let parent = file_path.parent().unwrap_or(Path::new("."));
    let Some((free, _)) = filesystem_usage(parent) else {
        // Unknown usage is not a reason to refuse; the write will fail
        // with a clear error if space truly runs out.
        return Ok(());
    };
    if free < required {
        return Err(InsufficientDiskSpaceError(format!(
            "insufficient disk space: required {}, available {}; free up space or \
             move the file to a filesystem with more room",
            format_size(required as f64),
            format_size(free as f64),
        )));
    }
    Ok(())
}
