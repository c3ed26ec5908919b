//! File timestamp phase: set mtime per the policy's timestamp config.

use std::path::Path;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::policy::types::{FileTimestampConfig, TimestampPolicyMode};

/// Applies the configured timestamp to the file. Returns the applied
/// date, or `None` when the mode resolved to preserving the current
/// mtime.
pub fn apply_timestamp(
    path: &Path,
    config: &FileTimestampConfig,
    metadata_date: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>> {
    let chosen = resolve_date(config.mode, config, metadata_date).or_else(|| {
        config
            .fallback
            .and_then(|mode| resolve_date(mode, config, metadata_date))
    });

    let Some(date) = chosen else {
        debug!(path = %path.display(), "timestamp preserved");
        return Ok(None);
    };

    let mtime = FileTime::from_unix_time(date.timestamp(), date.timestamp_subsec_nanos());
    filetime::set_file_mtime(path, mtime).map_err(CoreError::Io)?;
    debug!(path = %path.display(), mtime = %date, "applied file timestamp");
    Ok(Some(date))
}

fn resolve_date(
    mode: TimestampPolicyMode,
    config: &FileTimestampConfig,
    metadata_date: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match mode {
        TimestampPolicyMode::MetadataDate => metadata_date,
        TimestampPolicyMode::FixedDate => config.date,
        TimestampPolicyMode::Preserve => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_date_sets_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mkv");
        std::fs::write(&file, b"x").unwrap();

        let date = Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
        let config = FileTimestampConfig {
            mode: TimestampPolicyMode::FixedDate,
            date: Some(date),
            fallback: None,
        };
        let applied = apply_timestamp(&file, &config, None).unwrap();
        assert_eq!(applied, Some(date));

        let mtime =
            FileTime::from_last_modification_time(&std::fs::metadata(&file).unwrap());
        assert_eq!(mtime.unix_seconds(), date.timestamp());
    }

    #[test]
    fn metadata_mode_falls_back_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mkv");
        std::fs::write(&file, b"x").unwrap();
        let before =
            FileTime::from_last_modification_time(&std::fs::metadata(&file).unwrap());

        let config = FileTimestampConfig {
            mode: TimestampPolicyMode::MetadataDate,
            date: None,
            fallback: Some(TimestampPolicyMode::Preserve),
        };
        let applied = apply_timestamp(&file, &config, None).unwrap();
        assert_eq!(applied, None);

        let after =
            FileTime::from_last_modification_time(&std::fs::metadata(&file).unwrap());
        assert_eq!(before, after);
    }
}
