//! Persistent catalog of files, tracks, jobs, operations, and analyses.
//!
//! The catalog is a single SQLite file opened through one process-wide
//! pool. Readers run in parallel against WAL snapshots; every mutation
//! goes through [`Catalog::writer`], a tokio mutex that serializes writes
//! the same way the daemon's single writer connection does.

mod analysis;
mod files;
mod jobs;
mod operations;
mod schema;
mod views;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tokio::sync::Mutex;

use crate::error::Result;

pub use analysis::NewTranscription;
pub use files::NewFile;
pub use jobs::JobCounts;
pub use schema::SCHEMA_VERSION;
pub use views::{FileViewRow, FilesFilter, JobsFilter, Page, TranscriptionViewRow};

/// Handle to the catalog database. Cheap to clone; all clones share the
/// pool and the writer lock.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl Catalog {
    /// Opens (creating if missing) the catalog at `path` and brings the
    /// schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10))
            .pragma("temp_store", "MEMORY");

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let catalog = Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        };
        schema::initialize_schema(&catalog.pool).await?;
        Ok(catalog)
    }

    /// In-memory catalog for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);
        // A single connection keeps the in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let catalog = Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        };
        schema::initialize_schema(&catalog.pool).await?;
        Ok(catalog)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Acquires the global writer lock. Every mutating statement in this
    /// module runs under it; multi-statement updates additionally wrap a
    /// transaction so partial writes never land.
    pub(crate) async fn writer(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Lightweight connectivity check for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
