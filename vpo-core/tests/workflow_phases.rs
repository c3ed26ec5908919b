//! Phased workflow behavior with fake transcription backends: the analyze
//! phase populates and then reuses the analysis cache, and skip_when gates
//! phases without running their bodies.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use vpo_core::catalog::{Catalog, NewFile};
use vpo_core::error::TranscriptionError;
use vpo_core::executor::{ContainerTool, ExecutorConfig, PlanExecutor, TranscodeTool};
use vpo_core::policy::types::{
    PhaseDefinition, PhaseName, PhaseSkipCondition, PolicyConfig, PolicyDocument,
    TranscriptionSettings, WorkflowConfig,
};
use vpo_core::transcription::{
    AudioSampleExtractor, DetectionResult, TranscriptionPlugin,
};
use vpo_core::workflow::{SkipReasonType, WorkflowProcessor};
use vpo_model::{ScanStatus, TrackInfo, TrackKind};

struct FakeExtractor;

#[async_trait]
impl AudioSampleExtractor for FakeExtractor {
    async fn extract(
        &self,
        _path: &Path,
        _track_index: i64,
        _start_offset: f64,
        _duration: u32,
    ) -> Result<Vec<u8>, TranscriptionError> {
        Ok(vec![0u8; 16])
    }
}

struct FakePlugin {
    calls: AtomicUsize,
}

#[async_trait]
impl TranscriptionPlugin for FakePlugin {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports_feature(&self, feature: &str) -> bool {
        matches!(feature, "detect_language" | "transcribe")
    }

    async fn detect_language(
        &self,
        audio: &[u8],
    ) -> Result<DetectionResult, TranscriptionError> {
        self.transcribe(audio).await
    }

    async fn transcribe(&self, _audio: &[u8]) -> Result<DetectionResult, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DetectionResult {
            language: Some("en".to_string()),
            confidence: 0.95,
            transcript_sample: Some("hello there".to_string()),
            segments: Vec::new(),
        })
    }
}

fn dummy_executor() -> PlanExecutor {
    PlanExecutor::new(
        ContainerTool::new(PathBuf::from("mkvpropedit"), PathBuf::from("mkvmerge")),
        TranscodeTool::new(PathBuf::from("ffmpeg")),
        ExecutorConfig::default(),
    )
}

fn phase(name: PhaseName) -> PhaseDefinition {
    PhaseDefinition {
        name,
        skip_when: Vec::new(),
        rules: None,
        on_error: None,
        transcode: None,
        synthesize: Vec::new(),
        move_config: None,
        file_timestamp: None,
    }
}

fn analyze_policy() -> PolicyDocument {
    PolicyDocument {
        schema_version: 13,
        config: PolicyConfig {
            audio_language_preference: vec!["eng".to_string()],
            transcription: Some(TranscriptionSettings {
                enabled: true,
                update_language_from_transcription: true,
                confidence_threshold: 0.8,
                ..TranscriptionSettings::default()
            }),
            ..PolicyConfig::default()
        },
        phases: vec![phase(PhaseName::Analyze)],
        workflow: WorkflowConfig {
            phases: vec![PhaseName::Analyze],
            on_error: Default::default(),
        },
    }
}

async fn catalog_with_file(dir: &tempfile::TempDir) -> (Catalog, vpo_model::FileRecord) {
    let catalog = Catalog::open(&dir.path().join("vpo.db")).await.unwrap();
    let media = dir.path().join("movie.mkv");
    std::fs::write(&media, vec![0u8; 256]).unwrap();

    let file_id = catalog
        .upsert_file(&NewFile {
            path: media.display().to_string(),
            size_bytes: 256,
            modified_at: chrono::Utc::now(),
            content_hash: Some("hash-1".to_string()),
            container_format: Some("matroska".to_string()),
            scan_status: ScanStatus::Ok,
            scan_error: None,
        })
        .await
        .unwrap();
    catalog
        .replace_tracks(
            file_id,
            &[
                TrackInfo {
                    index: 0,
                    track_type: TrackKind::Video,
                    codec: Some("hevc".to_string()),
                    height: Some(1080),
                    duration_seconds: Some(3600.0),
                    ..TrackInfo::default()
                },
                TrackInfo {
                    index: 1,
                    track_type: TrackKind::Audio,
                    codec: Some("aac".to_string()),
                    language: Some("und".to_string()),
                    duration_seconds: Some(3600.0),
                    ..TrackInfo::default()
                },
            ],
        )
        .await
        .unwrap();
    let file = catalog.file_by_id(file_id).await.unwrap().unwrap();
    (catalog, file)
}

#[tokio::test]
async fn analyze_phase_persists_and_then_caches() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, file) = catalog_with_file(&dir).await;
    let plugin = Arc::new(FakePlugin {
        calls: AtomicUsize::new(0),
    });
    let processor = WorkflowProcessor::new(
        catalog.clone(),
        dummy_executor(),
        Arc::new(FakeExtractor),
        Some(plugin.clone()),
        None,
    );

    let policy = analyze_policy();
    let result = processor
        .process_file(&file, &policy, None, None, None)
        .await;
    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.phases_completed, 1);
    let first_calls = plugin.calls.load(Ordering::SeqCst);
    assert!(first_calls >= 1);

    // Same content hash: the second run is served from the cache.
    let result = processor
        .process_file(&file, &policy, None, None, None)
        .await;
    assert!(result.success);
    assert_eq!(plugin.calls.load(Ordering::SeqCst), first_calls);

    // The analysis row exists for the audio track.
    let tracks = catalog.tracks_for_file(file.id).await.unwrap();
    let audio = tracks
        .iter()
        .find(|t| t.track_type == TrackKind::Audio)
        .unwrap();
    let cached = catalog
        .cached_language_analysis(audio.id, "hash-1")
        .await
        .unwrap()
        .expect("analysis should be persisted");
    assert_eq!(cached.primary_language.as_deref(), Some("eng"));

    // Classification landed too.
    let classification = catalog
        .classification_for_track(audio.id)
        .await
        .unwrap()
        .expect("classification should be persisted");
    assert_eq!(classification.commentary_status.as_deref(), Some("main"));
}

#[tokio::test]
async fn skip_when_gates_the_phase_with_zero_changes() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, file) = catalog_with_file(&dir).await;
    let processor = WorkflowProcessor::new(
        catalog,
        dummy_executor(),
        Arc::new(FakeExtractor),
        None,
        None,
    );

    let mut gated = phase(PhaseName::Analyze);
    gated.skip_when = vec![PhaseSkipCondition {
        video_codec: Some(vec!["hevc".to_string(), "h265".to_string()]),
        ..PhaseSkipCondition::default()
    }];
    let policy = PolicyDocument {
        schema_version: 13,
        config: PolicyConfig::default(),
        phases: vec![gated],
        workflow: WorkflowConfig {
            phases: vec![PhaseName::Analyze],
            on_error: Default::default(),
        },
    };

    let result = processor
        .process_file(&file, &policy, None, None, None)
        .await;
    assert!(result.success);
    assert_eq!(result.phases_skipped, 1);
    assert_eq!(result.total_changes, 0);
    let outcome = &result.phase_results[0];
    let reason = outcome.skip_reason.as_ref().expect("skip reason recorded");
    assert_eq!(reason.reason_type, SkipReasonType::Condition);
    assert_eq!(reason.condition_name.as_deref(), Some("video_codec"));
}

#[tokio::test]
async fn missing_transcriber_analyzes_metadata_only() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, file) = catalog_with_file(&dir).await;
    let processor = WorkflowProcessor::new(
        catalog,
        dummy_executor(),
        Arc::new(FakeExtractor),
        None,
        None,
    );

    let result = processor
        .process_file(&file, &analyze_policy(), None, None, None)
        .await;
    assert!(result.success);
    let outcome = &result.phase_results[0];
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.contains("transcription plugin unavailable")));
}
