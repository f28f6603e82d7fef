//! Integration tests for the JSON project store under a live session.

use clipreel_core::EngineConfig;
use clipreel_media::CompositionBuilder;
use clipreel_playback::{ClockPlayer, PlaybackPhase, PlaybackSession};
use clipreel_project::{CameraFacing, JsonProjectStore, ProjectStore};
use std::path::PathBuf;
use std::sync::Arc;

use crate::fixtures::FakeMedia;

#[tokio::test]
async fn deletion_persists_across_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonProjectStore::open(dir.path()).await.unwrap());
    let project = store.create("Weekend").await.unwrap();
    for clip in ["a.mp4", "b.mp4", "c.mp4"] {
        store
            .append_segment(project.id, PathBuf::from(clip), CameraFacing::Front)
            .await
            .unwrap();
    }

    let media = FakeMedia::with_clips(&[("a.mp4", 1000), ("b.mp4", 1000), ("c.mp4", 1000)]);
    let config = EngineConfig::default();
    let handle = PlaybackSession::open(
        store.clone(),
        project.id,
        Arc::new(ClockPlayer::new(media.clone())),
        Arc::new(CompositionBuilder::new(media, &config)),
        &config,
    )
    .await
    .unwrap();
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    let loaded = store.load(project.id).await.unwrap();
    let first = loaded.segments[0].id;
    handle.delete_segment(first).await.unwrap();
    handle.shutdown().await;

    let reopened = JsonProjectStore::open(dir.path()).await.unwrap();
    let project = reopened.load(project.id).await.unwrap();
    assert_eq!(project.segment_count(), 2);
    assert!(project.segment(first).is_none());
    assert!(project.segments.iter().all(|s| s.facing == CameraFacing::Front));
}

#[tokio::test]
async fn rename_and_list_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonProjectStore::open(dir.path()).await.unwrap();
    let first = store.create("One").await.unwrap();
    let second = store.create("Two").await.unwrap();

    store.rename(first.id, "Uno").await.unwrap();
    let names: Vec<_> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    assert_eq!(names, vec![(first.id, "Uno".to_string()), (second.id, "Two".to_string())]);
}

#[tokio::test]
async fn opening_missing_project_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonProjectStore::open(dir.path()).await.unwrap());
    let media = FakeMedia::with_clips(&[]);
    let config = EngineConfig::default();

    let result = PlaybackSession::open(
        store,
        42,
        Arc::new(ClockPlayer::new(media.clone())),
        Arc::new(CompositionBuilder::new(media, &config)),
        &config,
    )
    .await;
    assert!(result.is_err());
}
