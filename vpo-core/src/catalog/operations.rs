//! Operation records: one row per executor invocation.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use vpo_model::{OperationRecord, OperationStatus};

use crate::error::{CoreError, Result};

use super::Catalog;

fn row_to_operation(row: &SqliteRow) -> Result<OperationRecord> {
    let status: String = row.try_get("status")?;
    Ok(OperationRecord {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        job_id: row.try_get("job_id")?,
        operation_type: row.try_get("operation_type")?,
        status: status
            .parse()
            .map_err(|e: vpo_model::ModelError| CoreError::Internal(e.to_string()))?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        backup_path: row.try_get("backup_path")?,
        details_json: row.try_get("details_json")?,
    })
}

impl Catalog {
    /// Records the start of an executor invocation. Returns the row id.
    pub async fn begin_operation(
        &self,
        file_id: i64,
        job_id: Option<&str>,
        operation_type: &str,
        backup_path: Option<&str>,
    ) -> Result<i64> {
        let _guard = self.writer().await;
        let row = sqlx::query(
            r#"
            INSERT INTO operations (file_id, job_id, operation_type, status, created_at, backup_path)
            VALUES (?1, ?2, ?3, 'RUNNING', ?4, ?5)
            RETURNING id
            "#,
        )
        .bind(file_id)
        .bind(job_id)
        .bind(operation_type)
        .bind(Utc::now())
        .bind(backup_path)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get(0)?)
    }

    pub async fn finish_operation(
        &self,
        operation_id: i64,
        status: OperationStatus,
        details_json: Option<&str>,
    ) -> Result<()> {
        let _guard = self.writer().await;
        sqlx::query(
            "UPDATE operations SET status = ?1, completed_at = ?2, details_json = ?3 WHERE id = ?4",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(details_json)
        .bind(operation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn operations_for_job(&self, job_id: &str) -> Result<Vec<OperationRecord>> {
        let rows = sqlx::query("SELECT * FROM operations WHERE job_id = ?1 ORDER BY id ASC")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_operation).collect()
    }
}
