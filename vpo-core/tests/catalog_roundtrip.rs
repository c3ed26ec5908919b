//! Catalog persistence round-trips against a real temp-file database.

use chrono::Utc;

use vpo_core::catalog::{Catalog, FilesFilter, NewFile};
use vpo_model::{ScanStatus, TrackInfo, TrackKind};

fn new_file(path: &str, size: i64) -> NewFile {
    NewFile {
        path: path.to_string(),
        size_bytes: size,
        modified_at: Utc::now(),
        content_hash: Some(format!("{size}-0")),
        container_format: Some("matroska,webm".to_string()),
        scan_status: ScanStatus::Ok,
        scan_error: None,
    }
}

fn track(index: i64, kind: TrackKind, language: Option<&str>) -> TrackInfo {
    TrackInfo {
        index,
        track_type: kind,
        codec: Some(match kind {
            TrackKind::Video => "h264".to_string(),
            TrackKind::Audio => "aac".to_string(),
            _ => "subrip".to_string(),
        }),
        language: language.map(String::from),
        height: (kind == TrackKind::Video).then_some(1080),
        ..TrackInfo::default()
    }
}

async fn open_catalog(dir: &tempfile::TempDir) -> Catalog {
    Catalog::open(&dir.path().join("vpo.db")).await.unwrap()
}

#[tokio::test]
async fn upsert_is_keyed_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open_catalog(&dir).await;

    let first = catalog.upsert_file(&new_file("/m/a.mkv", 100)).await.unwrap();
    let second = catalog.upsert_file(&new_file("/m/a.mkv", 200)).await.unwrap();
    assert_eq!(first, second);

    let record = catalog.file_by_path("/m/a.mkv").await.unwrap().unwrap();
    assert_eq!(record.size_bytes, 200);
    assert_eq!(record.filename, "a.mkv");
    assert_eq!(record.extension, "mkv");
}

#[tokio::test]
async fn tracks_replace_and_cascade_delete() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open_catalog(&dir).await;
    let file_id = catalog.upsert_file(&new_file("/m/b.mkv", 100)).await.unwrap();

    catalog
        .replace_tracks(
            file_id,
            &[
                track(0, TrackKind::Video, None),
                track(1, TrackKind::Audio, Some("deu")),
            ],
        )
        .await
        .unwrap();

    let tracks = catalog.tracks_for_file(file_id).await.unwrap();
    assert_eq!(tracks.len(), 2);
    // Languages are canonicalized at write time: 639-2/T in, 639-2/B out.
    assert_eq!(tracks[1].language.as_deref(), Some("ger"));

    // Replacement swaps the whole set in one transaction.
    catalog
        .replace_tracks(file_id, &[track(0, TrackKind::Video, None)])
        .await
        .unwrap();
    assert_eq!(catalog.tracks_for_file(file_id).await.unwrap().len(), 1);

    catalog.delete_file(file_id).await.unwrap();
    assert!(catalog.tracks_for_file(file_id).await.unwrap().is_empty());
    assert!(catalog.file_by_id(file_id).await.unwrap().is_none());
}

#[tokio::test]
async fn plugin_metadata_merges_per_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open_catalog(&dir).await;
    let file_id = catalog.upsert_file(&new_file("/m/c.mkv", 100)).await.unwrap();

    catalog
        .merge_plugin_metadata(file_id, "radarr", serde_json::json!({"quality": "bluray"}))
        .await
        .unwrap();
    catalog
        .merge_plugin_metadata(file_id, "sonarr", serde_json::json!({"season": 2}))
        .await
        .unwrap();
    catalog
        .merge_plugin_metadata(file_id, "radarr", serde_json::json!({"quality": "remux"}))
        .await
        .unwrap();

    let record = catalog.file_by_id(file_id).await.unwrap().unwrap();
    assert_eq!(record.plugin_metadata.len(), 2);
    assert_eq!(
        record.plugin_metadata["radarr"]["quality"],
        serde_json::json!("remux")
    );
    assert_eq!(record.plugin_metadata["sonarr"]["season"], serde_json::json!(2));
}

#[tokio::test]
async fn files_view_filters_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open_catalog(&dir).await;

    for (path, language) in [
        ("/m/movies/alpha.mkv", "eng"),
        ("/m/movies/beta.mkv", "fre"),
        ("/m/shows/gamma.mkv", "eng"),
    ] {
        let id = catalog.upsert_file(&new_file(path, 100)).await.unwrap();
        catalog
            .replace_tracks(
                id,
                &[
                    track(0, TrackKind::Video, None),
                    track(1, TrackKind::Audio, Some(language)),
                ],
            )
            .await
            .unwrap();
    }

    let all = catalog
        .files_filtered(&FilesFilter {
            limit: 10,
            ..FilesFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.items.len(), 3);
    assert_eq!(all.items[0].resolution.as_deref(), Some("1080p"));
    assert_eq!(all.items[0].track_count, 2);

    // Cross-standard language filter: "fr" finds the "fre"-tagged file.
    let french = catalog
        .files_filtered(&FilesFilter {
            audio_lang: Some("fr".to_string()),
            limit: 10,
            ..FilesFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(french.total, 1);
    assert!(french.items[0]
        .file
        .path
        .to_string_lossy()
        .contains("beta"));

    let paged = catalog
        .files_filtered(&FilesFilter {
            search: Some("movies".to_string()),
            limit: 1,
            offset: 1,
            ..FilesFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(paged.total, 2);
    assert_eq!(paged.items.len(), 1);
}

#[tokio::test]
async fn schema_initialization_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vpo.db");
    let first = Catalog::open(&path).await.unwrap();
    first.upsert_file(&new_file("/m/x.mkv", 1)).await.unwrap();
    first.close().await;

    // Reopening runs migrations again; existing data survives.
    let second = Catalog::open(&path).await.unwrap();
    assert!(second.file_by_path("/m/x.mkv").await.unwrap().is_some());
}

#[tokio::test]
async fn transcription_cache_is_keyed_by_file_hash() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open_catalog(&dir).await;
    let file_id = catalog.upsert_file(&new_file("/m/d.mkv", 100)).await.unwrap();
    catalog
        .replace_tracks(file_id, &[track(1, TrackKind::Audio, Some("eng"))])
        .await
        .unwrap();
    let track_id = catalog.tracks_for_file(file_id).await.unwrap()[0].id;

    catalog
        .insert_transcription(&vpo_core::catalog::NewTranscription {
            track_id,
            file_hash: "hash-1".to_string(),
            detected_language: Some("eng".to_string()),
            confidence_score: 0.9,
            track_type: vpo_model::AudioTrackKind::Main,
            plugin_name: "whisper".to_string(),
            transcript_sample: Some("hello".to_string()),
            segments: Vec::new(),
        })
        .await
        .unwrap();

    // Matching hash hits; a different hash is stale and misses.
    assert!(catalog
        .transcription_for_track(track_id, "hash-1")
        .await
        .unwrap()
        .is_some());
    assert!(catalog
        .transcription_for_track(track_id, "hash-2")
        .await
        .unwrap()
        .is_none());
}
