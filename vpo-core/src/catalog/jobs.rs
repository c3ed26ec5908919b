//! Durable job queue persistence.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use vpo_model::{JobRecord, JobStatus};

use crate::error::{CoreError, Result};

use super::Catalog;

/// Queue depth snapshot for the health endpoint.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct JobCounts {
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

pub(super) fn row_to_job(row: &SqliteRow) -> Result<JobRecord> {
    let job_type: String = row.try_get("job_type")?;
    let status: String = row.try_get("status")?;
    Ok(JobRecord {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        file_path: row.try_get("file_path")?,
        job_type: job_type
            .parse()
            .map_err(|e: vpo_model::ModelError| CoreError::Internal(e.to_string()))?,
        status: status
            .parse()
            .map_err(|e: vpo_model::ModelError| CoreError::Internal(e.to_string()))?,
        priority: row.try_get("priority")?,
        policy_name: row.try_get("policy_name")?,
        policy_json: row.try_get("policy_json")?,
        progress_percent: row.try_get("progress_percent")?,
        progress_json: row.try_get("progress_json")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        worker_id: row.try_get("worker_id")?,
        summary_json: row.try_get("summary_json")?,
        error_message: row.try_get("error_message")?,
        output_path: row.try_get("output_path")?,
    })
}

impl Catalog {
    /// Inserts a job in its current state (normally `queued`).
    pub async fn enqueue_job(&self, job: &JobRecord) -> Result<()> {
        let _guard = self.writer().await;
        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, file_id, file_path, job_type, status, priority, policy_name,
                 policy_json, progress_percent, progress_json, created_at, started_at,
                 completed_at, worker_id, summary_json, error_message, output_path)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&job.id)
        .bind(job.file_id)
        .bind(&job.file_path)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(&job.policy_name)
        .bind(&job.policy_json)
        .bind(job.progress_percent)
        .bind(&job.progress_json)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.worker_id)
        .bind(&job.summary_json)
        .bind(&job.error_message)
        .bind(&job.output_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically claims the next queued job: highest priority (lowest
    /// number), oldest first. The single UPDATE..RETURNING runs under the
    /// writer lock, so no two workers can observe the same queued row.
    pub async fn claim_next_job(&self, worker_id: &str) -> Result<Option<JobRecord>> {
        let _guard = self.writer().await;
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = ?1, worker_id = ?2
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'queued'
                ORDER BY priority ASC, created_at ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    pub async fn job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    /// Looks a job up by its full id or an unambiguous prefix (first 8
    /// chars by convention).
    pub async fn job_by_prefix(&self, prefix: &str) -> Result<Option<JobRecord>> {
        if let Some(job) = self.job(prefix).await? {
            return Ok(Some(job));
        }
        let pattern = format!("{}%", prefix.replace('%', "").replace('_', ""));
        let rows = sqlx::query("SELECT * FROM jobs WHERE id LIKE ?1 LIMIT 2")
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;
        match rows.len() {
            1 => Ok(Some(row_to_job(&rows[0])?)),
            0 => Ok(None),
            _ => Err(CoreError::JobNotFound(format!(
                "ambiguous job id prefix '{prefix}'"
            ))),
        }
    }

    pub async fn report_job_progress(
        &self,
        job_id: &str,
        percent: f64,
        detail_json: Option<&str>,
    ) -> Result<()> {
        let _guard = self.writer().await;
        sqlx::query(
            "UPDATE jobs SET progress_percent = ?1, progress_json = ?2 WHERE id = ?3",
        )
        .bind(percent.clamp(0.0, 100.0))
        .bind(detail_json)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: Option<f64>,
        summary_json: Option<&str>,
        error_message: Option<&str>,
        output_path: Option<&str>,
    ) -> Result<()> {
        let _guard = self.writer().await;
        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?1,
                completed_at = ?2,
                progress_percent = COALESCE(?3, progress_percent),
                summary_json = COALESCE(?4, summary_json),
                error_message = COALESCE(?5, error_message),
                output_path = COALESCE(?6, output_path)
            WHERE id = ?7
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(progress)
        .bind(summary_json)
        .bind(error_message)
        .bind(output_path)
        .bind(job_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(CoreError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    pub async fn complete_job(
        &self,
        job_id: &str,
        summary_json: Option<&str>,
        output_path: Option<&str>,
    ) -> Result<()> {
        self.finish_job(
            job_id,
            JobStatus::Completed,
            Some(100.0),
            summary_json,
            None,
            output_path,
        )
        .await
    }

    pub async fn fail_job(&self, job_id: &str, error: &str) -> Result<()> {
        self.finish_job(job_id, JobStatus::Failed, None, None, Some(error), None)
            .await
    }

    /// Cancels a job. Queued jobs cancel directly; running jobs are marked
    /// cancelled and their worker notices at the next operation boundary.
    pub async fn cancel_job(&self, job_id: &str, reason: Option<&str>) -> Result<()> {
        let current = self
            .job(job_id)
            .await?
            .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))?;
        if !current.status.can_transition_to(JobStatus::Cancelled) {
            return Err(CoreError::InvalidJobTransition {
                from: current.status.to_string(),
                to: JobStatus::Cancelled.to_string(),
            });
        }
        self.finish_job(
            job_id,
            JobStatus::Cancelled,
            None,
            None,
            Some(reason.unwrap_or("Cancelled by user")),
            None,
        )
        .await
    }

    /// Whether a cancel request has landed for the job.
    pub async fn job_cancel_requested(&self, job_id: &str) -> Result<bool> {
        Ok(self
            .job(job_id)
            .await?
            .map(|j| j.status == JobStatus::Cancelled)
            .unwrap_or(false))
    }

    pub async fn job_counts(&self) -> Result<JobCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = JobCounts::default();
        for row in rows {
            let status: String = row.try_get(0)?;
            let count: i64 = row.try_get(1)?;
            match status.as_str() {
                "queued" => counts.queued = count,
                "running" => counts.running = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                "cancelled" => counts.cancelled = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Deletes terminated jobs older than the cutoff. Returns how many
    /// rows went away.
    pub async fn purge_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let _guard = self.writer().await;
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed', 'cancelled')
              AND completed_at IS NOT NULL
              AND completed_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Recent failed jobs, for the health snapshot's error count.
    pub async fn recent_failures(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM jobs WHERE status = 'failed' AND completed_at >= ?1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get(0)?)
    }
}
