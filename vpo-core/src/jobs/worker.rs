//! Claim-based job workers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use vpo_model::{JobRecord, JobType};

use crate::catalog::Catalog;
use crate::error::{CoreError, Result};
use crate::executor::{CancelFlag, FfmpegProgress, ProgressSink};
use crate::policy::{load_named_policy, parse_policy, PolicyDocument};
use crate::scanner::{ScanOptions, Scanner};
use crate::workflow::WorkflowProcessor;

/// How often an idle worker polls the queue.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How often a running job checks for a cancel request.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Concurrent workers (default 2).
    pub workers: usize,
    /// Terminated jobs older than this are purged.
    pub retention_days: i64,
    /// Directory holding named policy documents.
    pub policies_dir: PathBuf,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            retention_days: 30,
            policies_dir: PathBuf::new(),
        }
    }
}

/// Pool of cooperative workers sharing one stop flag. Each worker pulls
/// one job at a time and runs it end to end.
pub struct WorkerPool {
    catalog: Catalog,
    processor: Arc<WorkflowProcessor>,
    scanner: Arc<Scanner>,
    config: WorkerPoolConfig,
    stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.config.workers)
            .finish()
    }
}

impl WorkerPool {
    pub fn new(
        catalog: Catalog,
        processor: Arc<WorkflowProcessor>,
        scanner: Arc<Scanner>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            catalog,
            processor,
            scanner,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Requests a graceful stop: workers finish (or cancel) their current
    /// job and exit.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Purges terminated jobs past retention. Run at worker start and
    /// periodically by the daemon's maintenance task.
    pub async fn purge_expired_jobs(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        let purged = self.catalog.purge_jobs_before(cutoff).await?;
        if purged > 0 {
            info!(purged, retention_days = self.config.retention_days, "purged old jobs");
        }
        Ok(purged)
    }

    /// Spawns the worker tasks. The returned handles complete after
    /// [`WorkerPool::shutdown`].
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        if let Err(e) = self.purge_expired_jobs().await {
            warn!(error = %e, "job retention purge failed");
        }

        let count = self.config.workers.max(1);
        (0..count)
            .map(|i| {
                let pool = Arc::clone(self);
                let worker_id = format!("worker-{i}");
                tokio::spawn(async move {
                    pool.worker_loop(&worker_id).await;
                })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: &str) {
        info!(worker_id, "worker started");
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            let claimed = match self.catalog.claim_next_job(worker_id).await {
                Ok(job) => job,
                Err(e) => {
                    error!(worker_id, error = %e, "claim failed");
                    tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                    continue;
                }
            };

            let Some(job) = claimed else {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                continue;
            };

            info!(
                worker_id,
                job_id = %job.short_id(),
                job_type = %job.job_type,
                path = %job.file_path,
                "claimed job"
            );
            self.run_job(worker_id, job).await;
        }
        info!(worker_id, "worker stopped");
    }

    async fn run_job(&self, worker_id: &str, job: JobRecord) {
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        let watcher = self.spawn_cancel_watcher(&job.id, Arc::clone(&cancel));

        let outcome = match job.job_type {
            JobType::Scan => self.run_scan_job(&job).await,
            JobType::Process | JobType::Transcode | JobType::Move => {
                self.run_process_job(&job, &cancel).await
            }
        };
        watcher.abort();

        // A cancel request that landed mid-run owns the terminal state.
        let cancelled = self
            .catalog
            .job_cancel_requested(&job.id)
            .await
            .unwrap_or(false);
        if cancelled {
            info!(worker_id, job_id = %job.short_id(), "job cancelled");
            return;
        }

        match outcome {
            Ok(summary) => {
                if let Err(e) = self
                    .catalog
                    .complete_job(&job.id, Some(&summary), None)
                    .await
                {
                    error!(job_id = %job.short_id(), error = %e, "failed to record completion");
                }
            }
            Err(e) => {
                let class = e.classify();
                error!(
                    worker_id,
                    job_id = %job.short_id(),
                    path = %job.file_path,
                    error = %e,
                    error_class = ?class,
                    "job failed"
                );
                if let Err(update_err) = self.catalog.fail_job(&job.id, &e.to_string()).await {
                    error!(job_id = %job.short_id(), error = %update_err, "failed to record failure");
                }
            }
        }
    }

    fn spawn_cancel_watcher(&self, job_id: &str, cancel: CancelFlag) -> JoinHandle<()> {
        let catalog = self.catalog.clone();
        let stop = Arc::clone(&self.stop);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
                if stop.load(Ordering::SeqCst) {
                    cancel.store(true, Ordering::SeqCst);
                    break;
                }
                match catalog.job_cancel_requested(&job_id).await {
                    Ok(true) => {
                        cancel.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        debug!(error = %e, "cancel poll failed");
                    }
                }
            }
        })
    }

    async fn run_scan_job(&self, job: &JobRecord) -> Result<String> {
        let options: ScanOptions = job
            .policy_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?
            .unwrap_or_default();
        let summary = self
            .scanner
            .scan_with_progress(
                std::path::Path::new(&job.file_path),
                &options,
                Some(&job.id),
            )
            .await?;
        Ok(serde_json::to_string(&summary)?)
    }

    async fn run_process_job(&self, job: &JobRecord, cancel: &CancelFlag) -> Result<String> {
        let policy = self.resolve_policy(job)?;
        let file = self
            .catalog
            .file_by_path(&job.file_path)
            .await?
            .ok_or_else(|| CoreError::NotInCatalog(job.file_path.clone()))?;

        let progress = self.spawn_progress_sink(&job.id);
        let result = self
            .processor
            .process_file(&file, &policy, Some(&job.id), Some(cancel), Some(progress))
            .await;

        let summary = serde_json::json!({
            "total_changes": result.total_changes,
            "phases_completed": result.phases_completed,
            "phases_failed": result.phases_failed,
            "phases_skipped": result.phases_skipped,
        });
        if !result.success {
            return Err(CoreError::Internal(
                result
                    .error_message
                    .unwrap_or_else(|| "workflow failed".to_string()),
            ));
        }
        Ok(summary.to_string())
    }

    /// Inline policy snapshot first; the named policy on disk is only a
    /// fallback for jobs enqueued without one.
    fn resolve_policy(&self, job: &JobRecord) -> Result<PolicyDocument> {
        if let Some(snapshot) = &job.policy_json {
            let origin = std::path::Path::new("<job policy snapshot>");
            return Ok(parse_policy(snapshot, origin).or_else(|_| {
                // Snapshots are stored as JSON; YAML is a superset, but a
                // failed parse with a named policy available falls back.
                match &job.policy_name {
                    Some(name) => load_named_policy(&self.config.policies_dir, name),
                    None => parse_policy(snapshot, origin),
                }
            })?);
        }
        let Some(name) = &job.policy_name else {
            return Err(CoreError::Internal(
                "job has neither policy snapshot nor policy name".to_string(),
            ));
        };
        Ok(load_named_policy(&self.config.policies_dir, name)?)
    }

    /// Bridges synchronous tool progress callbacks onto the async catalog
    /// writer through a channel.
    fn spawn_progress_sink(&self, job_id: &str) -> ProgressSink {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<FfmpegProgress>();
        let catalog = self.catalog.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                let detail = serde_json::json!({
                    "fps": update.fps,
                    "encoder_type": update.encoder_type,
                });
                if let Err(e) = catalog
                    .report_job_progress(&job_id, update.percent, Some(&detail.to_string()))
                    .await
                {
                    debug!(error = %e, "progress update failed");
                }
            }
        });
        Arc::new(move |update: FfmpegProgress| {
            let _ = tx.send(update);
        })
    }
}
