//! Catalog schema and migrations.
//!
//! The schema version lives in the `metadata` table. Initialization applies
//! every migration past the stored version in order; re-running is
//! idempotent. A stored version newer than this build knows is a startup
//! failure, not something to silently ignore.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{CoreError, Result};

/// Ordered migration batches; index + 1 is the schema version they bring
/// the catalog up to.
const MIGRATIONS: &[&[&str]] = &[
    // v1: base schema.
    &[
        r#"
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            path             TEXT NOT NULL UNIQUE,
            filename         TEXT NOT NULL,
            directory        TEXT NOT NULL,
            extension        TEXT NOT NULL,
            size_bytes       INTEGER NOT NULL DEFAULT 0,
            modified_at      TEXT NOT NULL,
            content_hash     TEXT,
            container_format TEXT,
            scanned_at       TEXT,
            scan_status      TEXT NOT NULL DEFAULT 'pending',
            scan_error       TEXT,
            plugin_metadata  TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id          INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            track_index      INTEGER NOT NULL,
            track_type       TEXT NOT NULL,
            codec            TEXT,
            language         TEXT,
            title            TEXT,
            is_default       INTEGER NOT NULL DEFAULT 0,
            is_forced        INTEGER NOT NULL DEFAULT 0,
            channels         INTEGER,
            channel_layout   TEXT,
            width            INTEGER,
            height           INTEGER,
            frame_rate       TEXT,
            color_transfer   TEXT,
            color_primaries  TEXT,
            color_space      TEXT,
            color_range      TEXT,
            duration_seconds REAL,
            UNIQUE (file_id, track_index)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id               TEXT PRIMARY KEY,
            file_id          INTEGER REFERENCES files(id) ON DELETE SET NULL,
            file_path        TEXT NOT NULL,
            job_type         TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'queued',
            priority         INTEGER NOT NULL DEFAULT 100,
            policy_name      TEXT,
            policy_json      TEXT,
            progress_percent REAL NOT NULL DEFAULT 0,
            progress_json    TEXT,
            created_at       TEXT NOT NULL,
            started_at       TEXT,
            completed_at     TEXT,
            worker_id        TEXT,
            summary_json     TEXT,
            error_message    TEXT,
            output_path      TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS operations (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id        INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            job_id         TEXT,
            operation_type TEXT NOT NULL,
            status         TEXT NOT NULL DEFAULT 'PENDING',
            created_at     TEXT NOT NULL,
            completed_at   TEXT,
            backup_path    TEXT,
            details_json   TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS transcription_results (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id          INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            file_hash         TEXT NOT NULL,
            detected_language TEXT,
            confidence_score  REAL NOT NULL DEFAULT 0,
            track_type        TEXT NOT NULL DEFAULT 'main',
            plugin_name       TEXT NOT NULL,
            transcript_sample TEXT,
            segments_json     TEXT,
            created_at        TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS track_classifications (
            id                     INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id               INTEGER NOT NULL UNIQUE REFERENCES tracks(id) ON DELETE CASCADE,
            original_dubbed_status TEXT,
            commentary_status      TEXT,
            confidence_score       REAL NOT NULL DEFAULT 0,
            detection_method       TEXT NOT NULL,
            created_at             TEXT NOT NULL,
            updated_at             TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS language_analysis_results (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id           INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            file_hash          TEXT NOT NULL,
            classification     TEXT NOT NULL,
            primary_language   TEXT,
            primary_percentage REAL NOT NULL DEFAULT 0,
            segments_json      TEXT,
            metadata_json      TEXT,
            created_at         TEXT NOT NULL,
            UNIQUE (track_id, file_hash)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_tracks_file ON tracks(file_id, track_index)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_queue ON jobs(status, priority, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_file_path ON jobs(file_path)",
        "CREATE INDEX IF NOT EXISTS idx_transcriptions_cache ON transcription_results(track_id, file_hash)",
        "CREATE INDEX IF NOT EXISTS idx_operations_job ON operations(job_id)",
        "CREATE INDEX IF NOT EXISTS idx_language_analysis_track ON language_analysis_results(track_id)",
    ],
];

/// Schema version this build writes.
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

async fn stored_version(pool: &SqlitePool) -> Result<u32> {
    let table_exists: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
    )
    .fetch_optional(pool)
    .await?;
    if table_exists.is_none() {
        return Ok(0);
    }
    let row: Option<(String,)> =
        sqlx::query_as("SELECT value FROM metadata WHERE key = 'schema_version'")
            .fetch_optional(pool)
            .await?;
    Ok(row
        .and_then(|(value,)| value.parse().ok())
        .unwrap_or(0))
}

/// Applies any missing migrations. Fails on a catalog written by a newer
/// build.
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    let current = stored_version(pool).await?;
    if current > SCHEMA_VERSION {
        return Err(CoreError::Internal(format!(
            "catalog schema version {current} is newer than supported {SCHEMA_VERSION}; \
             upgrade the binary or use a different database"
        )));
    }
    if current == SCHEMA_VERSION {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for (i, batch) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as u32;
        if version <= current {
            continue;
        }
        for statement in *batch {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        info!(version, "applied catalog migration");
    }
    sqlx::query(
        "INSERT INTO metadata (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(SCHEMA_VERSION.to_string())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}
