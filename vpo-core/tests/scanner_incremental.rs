//! Scanner behavior against a fake prober: incremental skips, change
//! detection, and removed-file handling.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use vpo_core::catalog::Catalog;
use vpo_core::error::ProbeError;
use vpo_core::probe::MediaProber;
use vpo_core::{ScanOptions, Scanner};
use vpo_model::{IntrospectionResult, ScanStatus, TrackInfo, TrackKind};

/// Deterministic prober that counts invocations.
struct FakeProber {
    calls: AtomicUsize,
}

impl FakeProber {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe(&self, path: &Path) -> Result<IntrospectionResult, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(IntrospectionResult {
            file_path: path.to_path_buf(),
            container_format: Some("matroska".to_string()),
            container_duration: Some(3600.0),
            container_tags: Default::default(),
            tracks: vec![
                TrackInfo {
                    index: 0,
                    track_type: TrackKind::Video,
                    codec: Some("h264".to_string()),
                    height: Some(1080),
                    width: Some(1920),
                    ..TrackInfo::default()
                },
                TrackInfo {
                    index: 1,
                    track_type: TrackKind::Audio,
                    codec: Some("aac".to_string()),
                    language: Some("eng".to_string()),
                    channels: Some(2),
                    ..TrackInfo::default()
                },
            ],
            warnings: Vec::new(),
        })
    }
}

async fn setup() -> (tempfile::TempDir, Catalog, Arc<FakeProber>, Scanner) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(&dir.path().join("vpo.db")).await.unwrap();
    let prober = FakeProber::new();
    let scanner = Scanner::new(catalog.clone(), prober.clone(), None);
    (dir, catalog, prober, scanner)
}

#[tokio::test]
async fn full_scan_catalogs_discovered_files() {
    let (dir, catalog, prober, scanner) = setup().await;
    let media = dir.path().join("media");
    std::fs::create_dir_all(&media).unwrap();
    std::fs::write(media.join("a.mkv"), vec![0u8; 1024]).unwrap();
    std::fs::write(media.join("b.mp4"), vec![0u8; 2048]).unwrap();
    std::fs::write(media.join("notes.txt"), b"not media").unwrap();

    let summary = scanner
        .scan_with_progress(&media, &ScanOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(summary.total_discovered, 2);
    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.added, 2);
    assert_eq!(summary.errors, 0);
    assert_eq!(prober.call_count(), 2);

    let record = catalog
        .file_by_path(&media.join("a.mkv").display().to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.scan_status, ScanStatus::Ok);
    assert_eq!(record.size_bytes, 1024);
    let tracks = catalog.tracks_for_file(record.id).await.unwrap();
    assert_eq!(tracks.len(), 2);
}

#[tokio::test]
async fn incremental_scan_skips_unchanged_files() {
    let (dir, _catalog, prober, scanner) = setup().await;
    let media = dir.path().join("media");
    std::fs::create_dir_all(&media).unwrap();
    std::fs::write(media.join("a.mkv"), vec![0u8; 1024]).unwrap();

    let options = ScanOptions {
        incremental: true,
        ..ScanOptions::default()
    };
    scanner
        .scan_with_progress(&media, &options, None)
        .await
        .unwrap();
    assert_eq!(prober.call_count(), 1);

    // Unchanged size and mtime: no probe, no track churn.
    let summary = scanner
        .scan_with_progress(&media, &options, None)
        .await
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.scanned, 0);
    assert_eq!(prober.call_count(), 1);

    // Growing the file invalidates the freshness check.
    std::fs::write(media.join("a.mkv"), vec![0u8; 4096]).unwrap();
    let summary = scanner
        .scan_with_progress(&media, &options, None)
        .await
        .unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(prober.call_count(), 2);
}

#[tokio::test]
async fn removed_files_are_marked_missing_or_pruned() {
    let (dir, catalog, _prober, scanner) = setup().await;
    let media = dir.path().join("media");
    std::fs::create_dir_all(&media).unwrap();
    let victim = media.join("gone.mkv");
    std::fs::write(&victim, vec![0u8; 512]).unwrap();

    scanner
        .scan_with_progress(&media, &ScanOptions::default(), None)
        .await
        .unwrap();
    std::fs::remove_file(&victim).unwrap();

    // Default mode marks the row missing.
    let summary = scanner
        .scan_with_progress(&media, &ScanOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(summary.removed, 1);
    let record = catalog
        .file_by_path(&victim.display().to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.scan_status, ScanStatus::Missing);

    // Prune mode deletes it (and its tracks via cascade).
    let summary = scanner
        .scan_with_progress(
            &media,
            &ScanOptions {
                prune: true,
                ..ScanOptions::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(summary.removed, 1);
    assert!(catalog
        .file_by_path(&victim.display().to_string())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn probe_failures_mark_the_file_errored() {
    struct FailingProber;

    #[async_trait]
    impl MediaProber for FailingProber {
        async fn probe(&self, path: &Path) -> Result<IntrospectionResult, ProbeError> {
            Err(ProbeError::ToolFailed {
                path: path.to_path_buf(),
                stderr: "corrupt header".to_string(),
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(&dir.path().join("vpo.db")).await.unwrap();
    let scanner = Scanner::new(catalog.clone(), Arc::new(FailingProber), None);

    let media = dir.path().join("media");
    std::fs::create_dir_all(&media).unwrap();
    std::fs::write(media.join("bad.mkv"), vec![0u8; 64]).unwrap();

    let summary = scanner
        .scan_with_progress(&media, &ScanOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(summary.scanned, 1);

    let record = catalog
        .file_by_path(&media.join("bad.mkv").display().to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.scan_status, ScanStatus::Error);
    assert!(record.scan_error.as_deref().unwrap().contains("corrupt"));
    assert!(catalog.tracks_for_file(record.id).await.unwrap().is_empty());
}
