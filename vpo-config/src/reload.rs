//! Configuration reload classification.
//!
//! A SIGHUP re-reads the config file and diffs it against the running
//! snapshot. Changed fields split into hot-reloadable (applied by the
//! daemon without restart) and restart-required (socket, auth, database,
//! tool paths: things wired up at startup). Secrets are redacted in the
//! per-field change log.

use std::time::SystemTime;

use tracing::{info, warn};

use crate::models::VpoConfig;

/// Fields that only take effect after a restart.
pub const REQUIRES_RESTART_FIELDS: &[&str] = &[
    "server.bind",
    "server.port",
    "server.auth_token",
    "server.session_secret",
    "database_path",
    "tools.ffmpeg",
    "tools.ffprobe",
    "tools.mkvmerge",
    "tools.mkvpropedit",
    "plugins.plugin_dirs",
    "plugins.auto_load",
];

/// Tracks reload history for the daemon's lifetime.
#[derive(Debug, Default)]
pub struct ReloadState {
    pub last_reload: Option<SystemTime>,
    pub reload_count: u64,
    pub last_error: Option<String>,
    pub changes_detected: Vec<String>,
}

/// Result of one reload attempt.
#[derive(Debug, Clone, Default)]
pub struct ReloadResult {
    pub success: bool,
    pub changes: Vec<String>,
    pub requires_restart: Vec<String>,
    pub error: Option<String>,
}

fn is_secret(field: &str) -> bool {
    field.contains("auth_token") || field.contains("secret")
}

fn redact(field: &str, value: String) -> String {
    if is_secret(field) && value != "None" {
        "****".to_string()
    } else {
        value
    }
}

macro_rules! diff_field {
    ($changes:ident, $old:expr, $new:expr, $field:expr, $($path:tt)+) => {
        if $old.$($path)+ != $new.$($path)+ {
            $changes.push((
                $field.to_string(),
                format!("{:?}", $old.$($path)+),
                format!("{:?}", $new.$($path)+),
            ));
        }
    };
}

/// Diffs two configurations field by field. Returns `(changed_fields,
/// restart_required_fields)` and logs each change with secrets redacted.
pub fn diff_configs(old: &VpoConfig, new: &VpoConfig) -> (Vec<String>, Vec<String>) {
    let mut changes: Vec<(String, String, String)> = Vec::new();

    diff_field!(changes, old, new, "database_path", database_path);
    diff_field!(changes, old, new, "policies_dir", policies_dir);
    diff_field!(changes, old, new, "server.bind", server.bind);
    diff_field!(changes, old, new, "server.port", server.port);
    diff_field!(changes, old, new, "server.auth_token", server.auth_token);
    diff_field!(changes, old, new, "server.session_secret", server.session_secret);
    diff_field!(
        changes,
        old,
        new,
        "server.shutdown_timeout_seconds",
        server.shutdown_timeout_seconds
    );
    diff_field!(changes, old, new, "jobs.retention_days", jobs.retention_days);
    diff_field!(
        changes,
        old,
        new,
        "jobs.log_compression_days",
        jobs.log_compression_days
    );
    diff_field!(
        changes,
        old,
        new,
        "jobs.log_deletion_days",
        jobs.log_deletion_days
    );
    diff_field!(changes, old, new, "jobs.auto_purge", jobs.auto_purge);
    diff_field!(changes, old, new, "jobs.backup_original", jobs.backup_original);
    diff_field!(
        changes,
        old,
        new,
        "jobs.min_free_disk_percent",
        jobs.min_free_disk_percent
    );
    diff_field!(changes, old, new, "processing.workers", processing.workers);
    diff_field!(changes, old, new, "tools.ffmpeg", tools.ffmpeg);
    diff_field!(changes, old, new, "tools.ffprobe", tools.ffprobe);
    diff_field!(changes, old, new, "tools.mkvmerge", tools.mkvmerge);
    diff_field!(changes, old, new, "tools.mkvpropedit", tools.mkvpropedit);
    diff_field!(changes, old, new, "transcription.plugin", transcription.plugin);
    diff_field!(
        changes,
        old,
        new,
        "transcription.model_size",
        transcription.model_size
    );
    diff_field!(
        changes,
        old,
        new,
        "transcription.sample_duration",
        transcription.sample_duration
    );
    diff_field!(
        changes,
        old,
        new,
        "transcription.max_samples",
        transcription.max_samples
    );
    diff_field!(
        changes,
        old,
        new,
        "transcription.confidence_threshold",
        transcription.confidence_threshold
    );
    diff_field!(
        changes,
        old,
        new,
        "transcription.incumbent_bonus",
        transcription.incumbent_bonus
    );
    diff_field!(changes, old, new, "language.standard", language.standard);
    diff_field!(
        changes,
        old,
        new,
        "language.warn_on_conversion",
        language.warn_on_conversion
    );
    diff_field!(changes, old, new, "logging.level", logging.level);
    diff_field!(changes, old, new, "logging.file", logging.file);
    diff_field!(changes, old, new, "plugins.plugin_dirs", plugins.plugin_dirs);
    diff_field!(changes, old, new, "plugins.auto_load", plugins.auto_load);
    diff_field!(
        changes,
        old,
        new,
        "behavior.warn_on_missing_features",
        behavior.warn_on_missing_features
    );
    diff_field!(
        changes,
        old,
        new,
        "behavior.show_upgrade_suggestions",
        behavior.show_upgrade_suggestions
    );

    let mut changed = Vec::with_capacity(changes.len());
    let mut restart = Vec::new();
    for (field, old_value, new_value) in changes {
        let message = format!(
            "{field}: {} -> {}",
            redact(&field, old_value),
            redact(&field, new_value)
        );
        if REQUIRES_RESTART_FIELDS.contains(&field.as_str()) {
            warn!("configuration change requires restart: {message}");
            restart.push(field.clone());
        } else {
            info!("configuration changed: {message}");
        }
        changed.push(field);
    }
    (changed, restart)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_configs_produce_no_changes() {
        let config = VpoConfig::default();
        let (changed, restart) = diff_configs(&config, &config.clone());
        assert!(changed.is_empty());
        assert!(restart.is_empty());
    }

    #[test]
    fn hot_fields_do_not_require_restart() {
        let old = VpoConfig::default();
        let mut new = old.clone();
        new.jobs.retention_days = 7;
        new.processing.workers = 8;
        new.logging.level = "debug".to_string();

        let (changed, restart) = diff_configs(&old, &new);
        assert_eq!(changed.len(), 3);
        assert!(restart.is_empty());
    }

    #[test]
    fn restart_fields_are_flagged() {
        let old = VpoConfig::default();
        let mut new = old.clone();
        new.server.port = 9999;
        new.server.auth_token = Some("secret".to_string());
        new.jobs.auto_purge = false;

        let (changed, restart) = diff_configs(&old, &new);
        assert_eq!(changed.len(), 3);
        assert_eq!(restart, vec!["server.port", "server.auth_token"]);
    }

    #[test]
    fn secrets_are_redacted() {
        assert_eq!(
            redact("server.auth_token", "Some(\"hunter2\")".into()),
            "****"
        );
        assert_eq!(redact("server.port", "8321".into()), "8321");
    }
}
