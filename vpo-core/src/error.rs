use std::path::PathBuf;

use thiserror::Error;

/// Retry classification for failures, consumed by the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Wrong input or state; retrying cannot help.
    Permanent,
    /// Resource contention or exhaustion; retrying may succeed.
    Transient,
    /// Configuration or programming error; abort the run.
    Fatal,
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe tool not available: {0}")]
    ToolUnavailable(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("probe timed out after {timeout_secs}s: {path}")]
    Timeout { path: PathBuf, timeout_secs: u64 },

    #[error("probe failed for {path}: {stderr}")]
    ToolFailed { path: PathBuf, stderr: String },

    #[error("unparseable probe output for {path}: {source}")]
    InvalidOutput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
#[error("file is being modified by another operation: {path}")]
pub struct FileLockError {
    pub path: PathBuf,
}

#[derive(Error, Debug)]
#[error("{0}")]
pub struct InsufficientDiskSpaceError(pub String);

#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("plugin '{0}' is not available")]
    PluginUnavailable(String),

    #[error("track too short for analysis: {duration_seconds:.1}s")]
    ShortTrack { duration_seconds: f64 },

    #[error("insufficient speech content for analysis")]
    InsufficientSpeech,

    #[error("all {attempts} samples failed: {detail}")]
    AllSamplesFailed { attempts: usize, detail: String },

    #[error("audio extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("plugin error: {0}")]
    Plugin(String),
}

#[derive(Error, Debug)]
#[error("backup restoration failed: {0}")]
pub struct BackupRestorationError(pub String);

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("failed to read policy {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("policy validation failed: {0}")]
    Validation(String),

    #[error("unsupported policy schema_version {found} (minimum {minimum})")]
    SchemaVersion { found: u32, minimum: u32 },

    #[error("policy not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("phase '{phase}' failed: {message}")]
    Failed { phase: String, message: String },

    #[error("phase '{phase}' aborted by rule '{rule}': {message}")]
    RuleFail {
        phase: String,
        rule: String,
        message: String,
    },
}

/// Crate-wide error type; variants wrap the typed errors raised at each
/// seam so callers can classify and react.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    FileLock(#[from] FileLockError),

    #[error(transparent)]
    DiskSpace(#[from] InsufficientDiskSpaceError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    BackupRestoration(#[from] BackupRestorationError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("not in catalog: {0}")]
    NotInCatalog(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid job transition from {from} to {to}")]
    InvalidJobTransition { from: String, to: String },

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Maps an error onto its retry classification. Informational only;
    /// the job queue consults it for retry decisions.
    pub fn classify(&self) -> ErrorClass {
        match self {
            CoreError::Database(sqlx::Error::PoolTimedOut) => ErrorClass::Transient,
            CoreError::Database(sqlx::Error::Database(e))
                if e.message().contains("locked") || e.message().contains("busy") =>
            {
                ErrorClass::Transient
            }
            CoreError::Database(_) => ErrorClass::Permanent,
            CoreError::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorClass::Permanent,
                std::io::ErrorKind::PermissionDenied => ErrorClass::Transient,
                std::io::ErrorKind::StorageFull => ErrorClass::Transient,
                _ => ErrorClass::Transient,
            },
            CoreError::FileLock(_) | CoreError::DiskSpace(_) => ErrorClass::Transient,
            CoreError::Probe(ProbeError::Timeout { .. }) => ErrorClass::Transient,
            CoreError::Probe(_) => ErrorClass::Permanent,
            CoreError::Policy(_) => ErrorClass::Fatal,
            CoreError::Serialization(_) => ErrorClass::Fatal,
            CoreError::Internal(_) => ErrorClass::Fatal,
            _ => ErrorClass::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
