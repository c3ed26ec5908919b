use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Scan,
    Process,
    Transcode,
    Move,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Scan => "scan",
            JobType::Process => "process",
            JobType::Transcode => "transcode",
            JobType::Move => "move",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(JobType::Scan),
            "process" => Ok(JobType::Process),
            "transcode" => Ok(JobType::Transcode),
            "move" => Ok(JobType::Move),
            other => Err(ModelError::UnknownEnumValue {
                kind: "job_type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle state.
///
/// Legal transitions: queued → running, queued → cancelled,
/// running → {completed, failed, cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Queued, JobStatus::Cancelled) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(ModelError::UnknownEnumValue {
                kind: "job_status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default job priority. Lower numbers run first.
pub const DEFAULT_JOB_PRIORITY: i64 = 100;

/// A queued or running unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub file_id: Option<i64>,
    /// Always present; jobs may be enqueued before the file is cataloged.
    pub file_path: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i64,
    pub policy_name: Option<String>,
    /// Inline policy snapshot taken at enqueue time.
    pub policy_json: Option<String>,
    pub progress_percent: f64,
    pub progress_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub summary_json: Option<String>,
    pub error_message: Option<String>,
    pub output_path: Option<String>,
}

impl JobRecord {
    /// New queued job with defaults filled in.
    pub fn new(job_type: JobType, file_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id: None,
            file_path: file_path.into(),
            job_type,
            status: JobStatus::Queued,
            priority: DEFAULT_JOB_PRIORITY,
            policy_name: None,
            policy_json: None,
            progress_percent: 0.0,
            progress_json: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            worker_id: None,
            summary_json: None,
            error_message: None,
            output_path: None,
        }
    }

    /// Jobs are addressable by the first 8 characters of their id.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

/// State of one executor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Running => "RUNNING",
            OperationStatus::Completed => "COMPLETED",
            OperationStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OperationStatus::Pending),
            "RUNNING" => Ok(OperationStatus::Running),
            "COMPLETED" => Ok(OperationStatus::Completed),
            "FAILED" => Ok(OperationStatus::Failed),
            other => Err(ModelError::UnknownEnumValue {
                kind: "operation_status",
                value: other.to_string(),
            }),
        }
    }
}

/// Record of a single executor invocation within a job or CLI run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: i64,
    pub file_id: i64,
    pub job_id: Option<String>,
    pub operation_type: String,
    pub status: OperationStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub backup_path: Option<String>,
    pub details_json: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));

        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn job_short_id_is_prefix() {
        let job = JobRecord::new(JobType::Scan, "/videos");
        assert_eq!(job.short_id().len(), 8);
        assert!(job.id.starts_with(job.short_id()));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }
}
