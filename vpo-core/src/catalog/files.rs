//! File and track persistence.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use vpo_model::{FileRecord, PluginMetadata, ScanStatus, TrackInfo, TrackRecord};

use crate::error::{CoreError, Result};
use crate::language;

use super::Catalog;

/// Fields the scanner supplies when upserting a file row.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub path: String,
    pub size_bytes: i64,
    pub modified_at: DateTime<Utc>,
    pub content_hash: Option<String>,
    pub container_format: Option<String>,
    pub scan_status: ScanStatus,
    pub scan_error: Option<String>,
}

pub(super) fn row_to_file(row: &SqliteRow) -> Result<FileRecord> {
    let status: String = row.try_get("scan_status")?;
    let plugin_metadata: Option<String> = row.try_get("plugin_metadata")?;
    let plugin_metadata: PluginMetadata = plugin_metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?
        .unwrap_or_default();
    Ok(FileRecord {
        id: row.try_get("id")?,
        path: std::path::PathBuf::from(row.try_get::<String, _>("path")?),
        filename: row.try_get("filename")?,
        directory: row.try_get("directory")?,
        extension: row.try_get("extension")?,
        size_bytes: row.try_get("size_bytes")?,
        modified_at: row.try_get("modified_at")?,
        content_hash: row.try_get("content_hash")?,
        container_format: row.try_get("container_format")?,
        scanned_at: row.try_get("scanned_at")?,
        scan_status: status
            .parse()
            .map_err(|e: vpo_model::ModelError| CoreError::Internal(e.to_string()))?,
        scan_error: row.try_get("scan_error")?,
        plugin_metadata,
    })
}

pub(super) fn row_to_track(row: &SqliteRow) -> Result<TrackRecord> {
    let kind: String = row.try_get("track_type")?;
    Ok(TrackRecord {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        track_index: row.try_get("track_index")?,
        track_type: kind
            .parse()
            .map_err(|e: vpo_model::ModelError| CoreError::Internal(e.to_string()))?,
        codec: row.try_get("codec")?,
        language: row.try_get("language")?,
        title: row.try_get("title")?,
        is_default: row.try_get::<i64, _>("is_default")? != 0,
        is_forced: row.try_get::<i64, _>("is_forced")? != 0,
        channels: row.try_get("channels")?,
        channel_layout: row.try_get("channel_layout")?,
        width: row.try_get("width")?,
        height: row.try_get("height")?,
        frame_rate: row.try_get("frame_rate")?,
        color_transfer: row.try_get("color_transfer")?,
        color_primaries: row.try_get("color_primaries")?,
        color_space: row.try_get("color_space")?,
        color_range: row.try_get("color_range")?,
        duration_seconds: row.try_get("duration_seconds")?,
    })
}

fn split_path(path: &str) -> (String, String, String) {
    let p = Path::new(path);
    let filename = p
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let directory = p
        .parent()
        .and_then(|d| d.to_str())
        .unwrap_or_default()
        .to_string();
    let extension = p
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    (filename, directory, extension)
}

impl Catalog {
    /// Inserts or updates a file row keyed by absolute path. Returns the
    /// row id.
    pub async fn upsert_file(&self, file: &NewFile) -> Result<i64> {
        let (filename, directory, extension) = split_path(&file.path);
        let _guard = self.writer().await;
        let row = sqlx::query(
            r#"
            INSERT INTO files
                (path, filename, directory, extension, size_bytes, modified_at,
                 content_hash, container_format, scanned_at, scan_status, scan_error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(path) DO UPDATE SET
                filename = excluded.filename,
                directory = excluded.directory,
                extension = excluded.extension,
                size_bytes = excluded.size_bytes,
                modified_at = excluded.modified_at,
                content_hash = excluded.content_hash,
                container_format = excluded.container_format,
                scanned_at = excluded.scanned_at,
                scan_status = excluded.scan_status,
                scan_error = excluded.scan_error
            RETURNING id
            "#,
        )
        .bind(&file.path)
        .bind(&filename)
        .bind(&directory)
        .bind(&extension)
        .bind(file.size_bytes)
        .bind(file.modified_at)
        .bind(&file.content_hash)
        .bind(&file.container_format)
        .bind(Utc::now())
        .bind(file.scan_status.as_str())
        .bind(&file.scan_error)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get(0)?)
    }

    pub async fn file_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE path = ?1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_file).transpose()
    }

    pub async fn file_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_file).transpose()
    }

    /// All `(id, path, size_bytes, modified_at)` tuples, used by the
    /// scanner's incremental and prune passes.
    pub async fn file_inventory(&self) -> Result<Vec<(i64, String, i64, DateTime<Utc>)>> {
        let rows = sqlx::query("SELECT id, path, size_bytes, modified_at FROM files")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get(0)?,
                    row.try_get(1)?,
                    row.try_get(2)?,
                    row.try_get(3)?,
                ))
            })
            .collect()
    }

    pub async fn set_scan_status(
        &self,
        file_id: i64,
        status: ScanStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let _guard = self.writer().await;
        sqlx::query(
            "UPDATE files SET scan_status = ?1, scan_error = ?2, scanned_at = ?3 WHERE id = ?4",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rewrites path-derived columns after a move executor relocates the
    /// file on disk.
    pub async fn update_file_path(&self, file_id: i64, new_path: &str) -> Result<()> {
        let (filename, directory, extension) = split_path(new_path);
        let _guard = self.writer().await;
        sqlx::query(
            "UPDATE files SET path = ?1, filename = ?2, directory = ?3, extension = ?4 WHERE id = ?5",
        )
        .bind(new_path)
        .bind(&filename)
        .bind(&directory)
        .bind(&extension)
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Merges one plugin's metadata blob into the file's plugin map.
    pub async fn merge_plugin_metadata(
        &self,
        file_id: i64,
        plugin: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let _guard = self.writer().await;
        let mut tx = self.pool.begin().await?;
        let current: Option<(Option<String>,)> =
            sqlx::query_as("SELECT plugin_metadata FROM files WHERE id = ?1")
                .bind(file_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((current,)) = current else {
            return Err(CoreError::NotInCatalog(format!("file id {file_id}")));
        };
        let mut metadata: PluginMetadata = current
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?
            .unwrap_or_default();
        metadata.insert(plugin.to_string(), value);
        sqlx::query("UPDATE files SET plugin_metadata = ?1 WHERE id = ?2")
            .bind(serde_json::to_string(&metadata)?)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_file(&self, file_id: i64) -> Result<()> {
        let _guard = self.writer().await;
        sqlx::query("DELETE FROM files WHERE id = ?1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replaces a file's track rows with the probe result, inside one
    /// transaction. Languages are canonicalized on the way in.
    pub async fn replace_tracks(&self, file_id: i64, tracks: &[TrackInfo]) -> Result<()> {
        let _guard = self.writer().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tracks WHERE file_id = ?1")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        for track in tracks {
            let canonical = language::normalize(track.language.as_deref());
            sqlx::query(
                r#"
                INSERT INTO tracks
                    (file_id, track_index, track_type, codec, language, title,
                     is_default, is_forced, channels, channel_layout, width, height,
                     frame_rate, color_transfer, color_primaries, color_space,
                     color_range, duration_seconds)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                "#,
            )
            .bind(file_id)
            .bind(track.index)
            .bind(track.track_type.as_str())
            .bind(&track.codec)
            .bind(&canonical)
            .bind(&track.title)
            .bind(track.is_default as i64)
            .bind(track.is_forced as i64)
            .bind(track.channels)
            .bind(&track.channel_layout)
            .bind(track.width)
            .bind(track.height)
            .bind(&track.frame_rate)
            .bind(&track.color_transfer)
            .bind(&track.color_primaries)
            .bind(&track.color_space)
            .bind(&track.color_range)
            .bind(track.duration_seconds)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn tracks_for_file(&self, file_id: i64) -> Result<Vec<TrackRecord>> {
        let rows =
            sqlx::query("SELECT * FROM tracks WHERE file_id = ?1 ORDER BY track_index ASC")
                .bind(file_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_track).collect()
    }
}
