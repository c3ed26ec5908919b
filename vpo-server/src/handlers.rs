//! HTTP handlers for the API surface.

use std::sync::atomic::Ordering;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use vpo_core::catalog::{FilesFilter, JobsFilter};
use vpo_core::CoreError;

use crate::state::{AppState, VERSION};

/// JSON error body with a stable shape.
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::JobNotFound(message) | CoreError::NotInCatalog(message) => {
                ApiError::not_found(message)
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": "failed",
            "error": {"code": self.code, "message": self.message},
        });
        (self.status, Json(body)).into_response()
    }
}

fn default_limit() -> i64 {
    50
}

/// `GET /health`: 200 healthy, 503 degraded. Never requires auth.
pub async fn health(State(state): State<AppState>) -> Response {
    let database_ok = state.catalog.ping().await.is_ok();
    let counts = state.catalog.job_counts().await.unwrap_or_default();
    let recent_errors = state
        .catalog
        .recent_failures(Utc::now() - chrono::Duration::hours(24))
        .await
        .unwrap_or(0);
    let shutting_down = state.shutting_down.load(Ordering::SeqCst);

    let status = if database_ok && !shutting_down {
        "healthy"
    } else {
        "degraded"
    };
    let body = json!({
        "status": status,
        "database": if database_ok { "ok" } else { "error" },
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "version": VERSION,
        "shutting_down": shutting_down,
        "jobs_queued": counts.queued,
        "jobs_running": counts.running,
        "active_workers": state.config.processing.workers,
        "recent_errors": recent_errors,
    });
    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

/// Unknown query parameters are rejected by `deny_unknown_fields` (strict
/// mode); the deserializer error surfaces as 400.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub resolution: Option<String>,
    pub audio_lang: Option<String>,
    pub subtitles: Option<bool>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
struct LibraryRow {
    id: i64,
    path: String,
    filename: String,
    size_bytes: i64,
    container_format: Option<String>,
    scan_status: String,
    resolution: Option<String>,
    audio_languages: Vec<String>,
    track_count: i64,
}

/// `GET /api/library`: paginated files with derived columns.
pub async fn library(
    State(state): State<AppState>,
    Query(query): Query<LibraryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let filter = FilesFilter {
        status: query.status,
        search: query.search,
        resolution: query.resolution,
        audio_lang: query.audio_lang,
        subtitles: query.subtitles,
        limit: query.limit.clamp(1, 500),
        offset: query.offset.max(0),
    };
    let page = state.catalog.files_filtered(&filter).await?;
    let items: Vec<LibraryRow> = page
        .items
        .into_iter()
        .map(|row| LibraryRow {
            id: row.file.id,
            path: row.file.path.display().to_string(),
            filename: row.file.filename,
            size_bytes: row.file.size_bytes,
            container_format: row.file.container_format,
            scan_status: row.file.scan_status.to_string(),
            resolution: row.resolution,
            audio_languages: row.audio_languages,
            track_count: row.track_count,
        })
        .collect();
    Ok(Json(json!({"items": items, "total": page.total})))
}

/// `GET /api/library/{id}`: file detail with tracks and transcriptions.
pub async fn library_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let file = state
        .catalog
        .file_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("file {id}")))?;
    let tracks = state.catalog.tracks_for_file(id).await?;
    let transcriptions = state.catalog.transcriptions_for_file(id).await?;
    Ok(Json(json!({
        "file": file,
        "tracks": tracks,
        "transcriptions": transcriptions,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranscriptionsQuery {
    #[serde(default)]
    pub show_all: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// `GET /api/transcriptions`
pub async fn transcriptions(
    State(state): State<AppState>,
    Query(query): Query<TranscriptionsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = state
        .catalog
        .transcriptions_view(query.limit.clamp(1, 500), query.offset.max(0))
        .await?;
    let items: Vec<serde_json::Value> = page
        .items
        .into_iter()
        .filter(|row| query.show_all || row.transcription.detected_language.is_some())
        .map(|row| {
            json!({
                "transcription": row.transcription,
                "file_id": row.file_id,
                "file_path": row.file_path,
                "track_index": row.track_index,
            })
        })
        .collect();
    Ok(Json(json!({"items": items, "total": page.total})))
}

/// `GET /api/transcriptions/{id}`: transcriptions for one file.
pub async fn transcriptions_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let records = state.catalog.transcriptions_for_file(id).await?;
    Ok(Json(json!({"items": records})))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// `GET /api/jobs`
pub async fn jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let filter = JobsFilter {
        status: query.status,
        job_type: query.job_type,
        since: query.since,
        search: query.search,
        sort: query.sort,
        descending: !matches!(query.order.as_deref(), Some("asc")),
        limit: query.limit.clamp(1, 500),
        offset: query.offset.max(0),
    };
    let page = state.catalog.jobs_filtered(&filter).await?;
    Ok(Json(json!({"items": page.items, "total": page.total})))
}

/// `GET /api/jobs/{id}`: accepts a full id or an 8-char prefix.
pub async fn job_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .catalog
        .job_by_prefix(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {id}")))?;
    let operations = state.catalog.operations_for_job(&job.id).await?;
    Ok(Json(json!({"job": job, "operations": operations})))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogsQuery {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// `GET /api/jobs/{id}/logs`: operation records as the job's log view.
pub async fn job_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .catalog
        .job_by_prefix(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {id}")))?;
    let operations = state.catalog.operations_for_job(&job.id).await?;
    let window: Vec<_> = operations
        .into_iter()
        .skip(query.offset.max(0) as usize)
        .take(query.limit.clamp(1, 500) as usize)
        .collect();
    Ok(Json(json!({"items": window})))
}
