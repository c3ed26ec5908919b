//! Paginated view queries backing the HTTP surface.
//!
//! These return pre-computed derived columns (resolution label, distinct
//! audio languages) alongside the raw rows, with a total count taken via a
//! window function so callers get pagination in a single query.

use sqlx::{QueryBuilder, Row, Sqlite};

use vpo_model::JobRecord;

use crate::error::Result;
use crate::language;

use super::files::row_to_file;
use super::jobs::row_to_job;
use super::Catalog;

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Filters for the library view.
#[derive(Debug, Clone, Default)]
pub struct FilesFilter {
    pub status: Option<String>,
    pub search: Option<String>,
    pub resolution: Option<String>,
    pub audio_lang: Option<String>,
    /// `Some(true)` = must have subtitles, `Some(false)` = must not.
    pub subtitles: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

/// A library row with derived columns.
#[derive(Debug, Clone)]
pub struct FileViewRow {
    pub file: vpo_model::FileRecord,
    pub resolution: Option<String>,
    pub audio_languages: Vec<String>,
    pub track_count: i64,
}

/// Filters for the jobs view.
#[derive(Debug, Clone, Default)]
pub struct JobsFilter {
    pub status: Option<String>,
    pub job_type: Option<String>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub search: Option<String>,
    /// `created_at` (default), `priority`, `status`, or `completed_at`.
    pub sort: Option<String>,
    pub descending: bool,
    pub limit: i64,
    pub offset: i64,
}

/// A transcription row joined with its track context.
#[derive(Debug, Clone)]
pub struct TranscriptionViewRow {
    pub transcription: vpo_model::TranscriptionRecord,
    pub file_id: i64,
    pub file_path: String,
    pub track_index: i64,
}

const RESOLUTION_CASE: &str = "\
    (SELECT CASE \
        WHEN t.height >= 2160 THEN '2160p' \
        WHEN t.height >= 1440 THEN '1440p' \
        WHEN t.height >= 1080 THEN '1080p' \
        WHEN t.height >= 720 THEN '720p' \
        WHEN t.height IS NULL THEN NULL \
        ELSE '480p' END \
     FROM tracks t \
     WHERE t.file_id = f.id AND t.track_type = 'video' \
     ORDER BY t.track_index LIMIT 1)";

impl Catalog {
    /// Paginated library listing with derived columns and a windowed total.
    pub async fn files_filtered(&self, filter: &FilesFilter) -> Result<Page<FileViewRow>> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            format!(
                "SELECT f.*, \
                 {RESOLUTION_CASE} AS resolution, \
                 (SELECT GROUP_CONCAT(DISTINCT t.language) FROM tracks t \
                  WHERE t.file_id = f.id AND t.track_type = 'audio') AS audio_languages, \
                 (SELECT COUNT(*) FROM tracks t WHERE t.file_id = f.id) AS track_count, \
                 COUNT(*) OVER () AS total \
                 FROM files f WHERE 1 = 1"
            ),
        );

        if let Some(status) = &filter.status {
            builder.push(" AND f.scan_status = ").push_bind(status.clone());
        }
        if let Some(search) = &filter.search {
            builder
                .push(" AND f.path LIKE ")
                .push_bind(format!("%{search}%"));
        }
        if let Some(resolution) = &filter.resolution {
            if let Some(height) = vpo_model::resolution_label_to_height(resolution) {
                let upper = match height {
                    480 => 720,
                    720 => 1080,
                    1080 => 1440,
                    1440 => 2160,
                    _ => i64::MAX,
                };
                builder
                    .push(
                        " AND EXISTS (SELECT 1 FROM tracks t WHERE t.file_id = f.id \
                         AND t.track_type = 'video' AND t.height >= ",
                    )
                    .push_bind(if height == 480 { 0 } else { height })
                    .push(" AND t.height < ")
                    .push_bind(upper)
                    .push(")");
            }
        }
        if let Some(lang) = &filter.audio_lang {
            let canonical = language::normalize(Some(lang));
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM tracks t WHERE t.file_id = f.id \
                     AND t.track_type = 'audio' AND t.language = ",
                )
                .push_bind(canonical)
                .push(")");
        }
        if let Some(subtitles) = filter.subtitles {
            if subtitles {
                builder.push(
                    " AND EXISTS (SELECT 1 FROM tracks t WHERE t.file_id = f.id \
                     AND t.track_type = 'subtitle')",
                );
            } else {
                builder.push(
                    " AND NOT EXISTS (SELECT 1 FROM tracks t WHERE t.file_id = f.id \
                     AND t.track_type = 'subtitle')",
                );
            }
        }

        builder.push(" ORDER BY f.path ASC LIMIT ");
        builder.push_bind(filter.limit.max(1));
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset.max(0));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let total = rows
            .first()
            .map(|row| row.try_get::<i64, _>("total"))
            .transpose()?
            .unwrap_or(0);
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let audio_languages: Option<String> = row.try_get("audio_languages")?;
            items.push(FileViewRow {
                file: row_to_file(row)?,
                resolution: row.try_get("resolution")?,
                audio_languages: audio_languages
                    .map(|s| s.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
                track_count: row.try_get("track_count")?,
            });
        }
        Ok(Page { items, total })
    }

    /// Paginated, filtered job listing.
    pub async fn jobs_filtered(&self, filter: &JobsFilter) -> Result<Page<JobRecord>> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT *, COUNT(*) OVER () AS total FROM jobs WHERE 1 = 1");

        if let Some(status) = &filter.status {
            builder.push(" AND status = ").push_bind(status.clone());
        }
        if let Some(job_type) = &filter.job_type {
            builder.push(" AND job_type = ").push_bind(job_type.clone());
        }
        if let Some(since) = filter.since {
            builder.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(search) = &filter.search {
            builder
                .push(" AND file_path LIKE ")
                .push_bind(format!("%{search}%"));
        }

        // Sort column is matched against a closed set, never interpolated
        // from user input.
        let sort = match filter.sort.as_deref() {
            Some("priority") => "priority",
            Some("status") => "status",
            Some("completed_at") => "completed_at",
            _ => "created_at",
        };
        builder.push(format!(
            " ORDER BY {sort} {} LIMIT ",
            if filter.descending { "DESC" } else { "ASC" }
        ));
        builder.push_bind(filter.limit.max(1));
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset.max(0));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let total = rows
            .first()
            .map(|row| row.try_get::<i64, _>("total"))
            .transpose()?
            .unwrap_or(0);
        let items = rows.iter().map(row_to_job).collect::<Result<Vec<_>>>()?;
        Ok(Page { items, total })
    }

    /// Paginated transcription listing joined with file context.
    pub async fn transcriptions_view(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Page<TranscriptionViewRow>> {
        let rows = sqlx::query(
            r#"
            SELECT tr.*, t.file_id AS file_id, t.track_index AS track_index,
                   f.path AS file_path, COUNT(*) OVER () AS total
            FROM transcription_results tr
            JOIN tracks t ON t.id = tr.track_id
            JOIN files f ON f.id = t.file_id
            ORDER BY tr.created_at DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit.max(1))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        let total = rows
            .first()
            .map(|row| row.try_get::<i64, _>("total"))
            .transpose()?
            .unwrap_or(0);
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row.try_get("track_type")?;
            let segments: Option<String> = row.try_get("segments_json")?;
            items.push(TranscriptionViewRow {
                transcription: vpo_model::TranscriptionRecord {
                    id: row.try_get("id")?,
                    track_id: row.try_get("track_id")?,
                    file_hash: row.try_get("file_hash")?,
                    detected_language: row.try_get("detected_language")?,
                    confidence_score: row.try_get("confidence_score")?,
                    track_type: kind.parse().map_err(|e: vpo_model::ModelError| {
                        crate::error::CoreError::Internal(e.to_string())
                    })?,
                    plugin_name: row.try_get("plugin_name")?,
                    transcript_sample: row.try_get("transcript_sample")?,
                    segments: segments
                        .as_deref()
                        .map(serde_json::from_str)
                        .transpose()?
                        .unwrap_or_default(),
                    created_at: row.try_get("created_at")?,
                },
                file_id: row.try_get("file_id")?,
                file_path: row.try_get("file_path")?,
                track_index: row.try_get("track_index")?,
            });
        }
        Ok(Page { items, total })
    }
}
