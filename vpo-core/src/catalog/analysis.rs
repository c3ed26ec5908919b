//! Transcription, classification, and language-analysis persistence.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use vpo_model::{
    AudioTrackKind, DetectionMethod, LanguageAnalysisRecord, LanguageClassification,
    TrackClassificationRecord, TranscriptSegment, TranscriptionRecord,
};

use crate::error::{CoreError, Result};

use super::Catalog;

/// Fields supplied when persisting a new transcription result.
#[derive(Debug, Clone)]
pub struct NewTranscription {
    pub track_id: i64,
    pub file_hash: String,
    pub detected_language: Option<String>,
    pub confidence_score: f64,
    pub track_type: AudioTrackKind,
    pub plugin_name: String,
    pub transcript_sample: Option<String>,
    pub segments: Vec<TranscriptSegment>,
}

fn parse_segments(json: Option<String>) -> Result<Vec<TranscriptSegment>> {
    Ok(json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?
        .unwrap_or_default())
}

fn row_to_transcription(row: &SqliteRow) -> Result<TranscriptionRecord> {
    let kind: String = row.try_get("track_type")?;
    Ok(TranscriptionRecord {
        id: row.try_get("id")?,
        track_id: row.try_get("track_id")?,
        file_hash: row.try_get("file_hash")?,
        detected_language: row.try_get("detected_language")?,
        confidence_score: row.try_get("confidence_score")?,
        track_type: kind
            .parse()
            .map_err(|e: vpo_model::ModelError| CoreError::Internal(e.to_string()))?,
        plugin_name: row.try_get("plugin_name")?,
        transcript_sample: row.try_get("transcript_sample")?,
        segments: parse_segments(row.try_get("segments_json")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_analysis(row: &SqliteRow) -> Result<LanguageAnalysisRecord> {
    let classification: String = row.try_get("classification")?;
    let metadata: Option<String> = row.try_get("metadata_json")?;
    Ok(LanguageAnalysisRecord {
        id: row.try_get("id")?,
        track_id: row.try_get("track_id")?,
        file_hash: row.try_get("file_hash")?,
        classification: classification
            .parse()
            .map_err(|e: vpo_model::ModelError| CoreError::Internal(e.to_string()))?,
        primary_language: row.try_get("primary_language")?,
        primary_percentage: row.try_get("primary_percentage")?,
        segments: parse_segments(row.try_get("segments_json")?)?,
        metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
        created_at: row.try_get("created_at")?,
    })
}

impl Catalog {
    /// Persists a transcription result, replacing any previous row for the
    /// same track (the cache key is `(track_id, file_hash)`; stale hashes
    /// are superseded).
    pub async fn insert_transcription(&self, result: &NewTranscription) -> Result<i64> {
        let _guard = self.writer().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM transcription_results WHERE track_id = ?1")
            .bind(result.track_id)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query(
            r#"
            INSERT INTO transcription_results
                (track_id, file_hash, detected_language, confidence_score, track_type,
                 plugin_name, transcript_sample, segments_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING id
            "#,
        )
        .bind(result.track_id)
        .bind(&result.file_hash)
        .bind(&result.detected_language)
        .bind(result.confidence_score)
        .bind(result.track_type.as_str())
        .bind(&result.plugin_name)
        .bind(&result.transcript_sample)
        .bind(serde_json::to_string(&result.segments)?)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        let id = row.try_get(0)?;
        tx.commit().await?;
        Ok(id)
    }

    /// Cached transcription for a track; only a matching file hash counts.
    pub async fn transcription_for_track(
        &self,
        track_id: i64,
        file_hash: &str,
    ) -> Result<Option<TranscriptionRecord>> {
        let row = sqlx::query(
            "SELECT * FROM transcription_results WHERE track_id = ?1 AND file_hash = ?2",
        )
        .bind(track_id)
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_transcription).transpose()
    }

    /// Every transcription row for a file's tracks, keyed by track id.
    pub async fn transcriptions_for_file(
        &self,
        file_id: i64,
    ) -> Result<Vec<TranscriptionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT tr.* FROM transcription_results tr
            JOIN tracks t ON t.id = tr.track_id
            WHERE t.file_id = ?1
            ORDER BY t.track_index ASC
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_transcription).collect()
    }

    pub async fn upsert_classification(
        &self,
        track_id: i64,
        original_dubbed_status: Option<&str>,
        commentary_status: Option<&str>,
        confidence_score: f64,
        detection_method: DetectionMethod,
    ) -> Result<()> {
        let _guard = self.writer().await;
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO track_classifications
                (track_id, original_dubbed_status, commentary_status, confidence_score,
                 detection_method, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(track_id) DO UPDATE SET
                original_dubbed_status = excluded.original_dubbed_status,
                commentary_status = excluded.commentary_status,
                confidence_score = excluded.confidence_score,
                detection_method = excluded.detection_method,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(track_id)
        .bind(original_dubbed_status)
        .bind(commentary_status)
        .bind(confidence_score)
        .bind(detection_method.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn classification_for_track(
        &self,
        track_id: i64,
    ) -> Result<Option<TrackClassificationRecord>> {
        let row = sqlx::query("SELECT * FROM track_classifications WHERE track_id = ?1")
            .bind(track_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let method: String = row.try_get("detection_method")?;
            Ok(TrackClassificationRecord {
                id: row.try_get("id")?,
                track_id: row.try_get("track_id")?,
                original_dubbed_status: row.try_get("original_dubbed_status")?,
                commentary_status: row.try_get("commentary_status")?,
                confidence_score: row.try_get("confidence_score")?,
                detection_method: method
                    .parse()
                    .map_err(|e: vpo_model::ModelError| CoreError::Internal(e.to_string()))?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    /// Persists a language-analysis result keyed by `(track_id, file_hash)`.
    pub async fn persist_language_analysis(
        &self,
        track_id: i64,
        file_hash: &str,
        classification: LanguageClassification,
        primary_language: Option<&str>,
        primary_percentage: f64,
        segments: &[TranscriptSegment],
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        let _guard = self.writer().await;
        sqlx::query(
            r#"
            INSERT INTO language_analysis_results
                (track_id, file_hash, classification, primary_language,
                 primary_percentage, segments_json, metadata_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(track_id, file_hash) DO UPDATE SET
                classification = excluded.classification,
                primary_language = excluded.primary_language,
                primary_percentage = excluded.primary_percentage,
                segments_json = excluded.segments_json,
                metadata_json = excluded.metadata_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(track_id)
        .bind(file_hash)
        .bind(classification.as_str())
        .bind(primary_language)
        .bind(primary_percentage)
        .bind(serde_json::to_string(segments)?)
        .bind(metadata.map(serde_json::to_string).transpose()?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cached analysis for `(track_id, file_hash)`; a different hash means
    /// the file changed and the cache entry is stale.
    pub async fn cached_language_analysis(
        &self,
        track_id: i64,
        file_hash: &str,
    ) -> Result<Option<LanguageAnalysisRecord>> {
        let row = sqlx::query(
            "SELECT * FROM language_analysis_results WHERE track_id = ?1 AND file_hash = ?2",
        )
        .bind(track_id)
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_analysis).transpose()
    }
}
