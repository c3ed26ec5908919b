//! Directory scanning and catalog upkeep.
//!
//! Walks library roots for media files, probes anything new or changed,
//! replaces track rows inside one transaction, and dispatches
//! `file.scanned` to the plugin bus. Incremental mode skips files whose
//! size and mtime are unchanged; prune mode removes catalog rows whose
//! files vanished from disk (otherwise they are marked `missing`).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vpo_model::ScanStatus;

use crate::catalog::{Catalog, NewFile};
use crate::error::Result;
use crate::plugins::{EventBus, PluginEvent};
use crate::probe::MediaProber;

/// Container extensions the scanner considers media files.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "m4v", "webm", "mpg", "mpeg", "ts", "m2ts", "wmv", "flv",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Skip probing files whose size and mtime are unchanged.
    pub incremental: bool,
    /// Delete catalog rows for vanished files instead of marking them
    /// `missing`.
    pub prune: bool,
    /// Recompute content hashes even for unchanged files.
    pub verify_hash: bool,
}

/// Summary persisted into the scan job's `summary_json`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_discovered: usize,
    pub scanned: usize,
    pub skipped: usize,
    pub added: usize,
    pub removed: usize,
    pub errors: usize,
}

/// Walks roots and keeps the catalog current.
pub struct Scanner {
    catalog: Catalog,
    prober: Arc<dyn MediaProber>,
    bus: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner").finish()
    }
}

/// Opaque change marker: not a content digest (payload hashing is out of
/// scope), but distinct whenever size or mtime moves, which is exactly
/// what the analysis cache needs to notice staleness.
fn change_marker(size: i64, modified_at: DateTime<Utc>) -> String {
    format!("{size}-{}", modified_at.timestamp())
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl Scanner {
    pub fn new(catalog: Catalog, prober: Arc<dyn MediaProber>, bus: Option<Arc<EventBus>>) -> Self {
        Self {
            catalog,
            prober,
            bus,
        }
    }

    /// Scans one root. With `job_id`, per-file progress lands on that job
    /// row as the walk advances.
    pub async fn scan_with_progress(
        &self,
        root: &Path,
        options: &ScanOptions,
        job_id: Option<&str>,
    ) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();

        info!(root = %root.display(), incremental = options.incremental, "scan started");

        // Known rows up front so the walk can do constant-time freshness
        // checks and the prune pass knows what vanished.
        let inventory: HashMap<String, (i64, i64, DateTime<Utc>)> = self
            .catalog
            .file_inventory()
            .await?
            .into_iter()
            .map(|(id, path, size, modified)| (path, (id, size, modified)))
            .collect();

        let mut discovered: Vec<std::path::PathBuf> = walkdir::WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_media_file(path))
            .collect();
        discovered.sort();
        summary.total_discovered = discovered.len();

        let mut seen: Vec<String> = Vec::with_capacity(discovered.len());
        for (i, path) in discovered.iter().enumerate() {
            let path_str = path.display().to_string();
            seen.push(path_str.clone());

            let metadata = match std::fs::metadata(path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "stat failed");
                    summary.errors += 1;
                    continue;
                }
            };
            let size = metadata.len() as i64;
            let modified_at = metadata
                .modified()
                .ok()
                .and_then(|t| {
                    let duration = t.duration_since(std::time::UNIX_EPOCH).ok()?;
                    Utc.timestamp_opt(duration.as_secs() as i64, 0).single()
                })
                .unwrap_or_else(Utc::now);

            let existing = inventory.get(&path_str);
            let unchanged = existing.is_some_and(|(_, known_size, known_modified)| {
                *known_size == size && known_modified.timestamp() == modified_at.timestamp()
            });
            if options.incremental && unchanged && !options.verify_hash {
                debug!(path = %path.display(), "unchanged, skipping probe");
                summary.skipped += 1;
                continue;
            }

            match self.scan_one(path, size, modified_at).await {
                Ok(()) => {
                    summary.scanned += 1;
                    if existing.is_none() {
                        summary.added += 1;
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "scan failed");
                    summary.errors += 1;
                }
            }

            if let Some(job_id) = job_id {
                let percent =
                    ((i + 1) as f64 / summary.total_discovered.max(1) as f64) * 100.0;
                let _ = self
                    .catalog
                    .report_job_progress(job_id, percent, None)
                    .await;
            }
        }

        // Rows under this root whose files are gone.
        let root_prefix = root.display().to_string();
        for (path, (id, _, _)) in &inventory {
            if !path.starts_with(&root_prefix) || seen.contains(path) {
                continue;
            }
            if Path::new(path).exists() {
                continue;
            }
            if options.prune {
                info!(path, "pruning removed file");
                self.catalog.delete_file(*id).await?;
            } else {
                info!(path, "marking file missing");
                self.catalog
                    .set_scan_status(*id, ScanStatus::Missing, None)
                    .await?;
            }
            summary.removed += 1;
        }

        info!(
            root = %root.display(),
            discovered = summary.total_discovered,
            scanned = summary.scanned,
            skipped = summary.skipped,
            added = summary.added,
            removed = summary.removed,
            errors = summary.errors,
            "scan finished"
        );
        Ok(summary)
    }

    /// Probes one file and upserts its row plus tracks.
    async fn scan_one(
        &self,
        path: &Path,
        size: i64,
        modified_at: DateTime<Utc>,
    ) -> Result<()> {
        let path_str = path.display().to_string();

        let (container_format, tracks, status, error) = match self.prober.probe(path).await {
            Ok(result) => {
                for warning in &result.warnings {
                    debug!(path = %path.display(), warning, "probe warning");
                }
                (
                    result.container_format.clone(),
                    result.tracks,
                    ScanStatus::Ok,
                    None,
                )
            }
            Err(e) => (None, Vec::new(), ScanStatus::Error, Some(e.to_string())),
        };

        let file_id = self
            .catalog
            .upsert_file(&NewFile {
                path: path_str,
                size_bytes: size,
                modified_at,
                content_hash: Some(change_marker(size, modified_at)),
                container_format,
                scan_status: status,
                scan_error: error,
            })
            .await?;

        if status == ScanStatus::Ok {
            self.catalog.replace_tracks(file_id, &tracks).await?;
        }

        if let Some(bus) = &self.bus
            && status == ScanStatus::Ok
            && let Some(file) = self.catalog.file_by_id(file_id).await?
        {
            let track_records = self.catalog.tracks_for_file(file_id).await?;
            bus.dispatch(&PluginEvent::FileScanned {
                file,
                tracks: track_records,
            })
            .await;
        }
        Ok(())
    }
}
