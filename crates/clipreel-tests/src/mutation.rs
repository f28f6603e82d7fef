//! Integration tests for deleting segments under live playback.

use clipreel_core::RationalTime;
use clipreel_playback::{MutationError, PlaybackMode, PlaybackPhase};
use clipreel_project::ProjectStore;

use std::time::Duration;

use crate::fixtures::{Fixture, LosingStore};

const THREE: [(&str, i64); 3] = [("a.mp4", 1000), ("b.mp4", 1000), ("c.mp4", 1000)];

#[tokio::test(start_paused = true)]
async fn deleting_middle_segment_restores_integrated_playback() {
    let fixture = Fixture::new(&THREE);
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();
    handle.seek(RationalTime::from_millis(1500)).await.unwrap();

    let middle = fixture.project.segments[1].id;
    let outcome = handle.delete_segment(middle).await.unwrap();
    assert_eq!(outcome.remaining, 2);
    assert!(outcome.current_segment <= 1);
    assert!(outcome.rebuilding);

    let interim = handle.snapshot();
    assert_eq!(interim.segment_count, 2);

    let restored = handle.wait_for(|s| s.is_integrated()).await.unwrap();
    assert_eq!(restored.segment_count, 2);
    assert!(restored.current_segment <= 1);
    assert_eq!(restored.duration, RationalTime::from_secs(2));

    let stored = fixture.store.load(fixture.project.id).await.unwrap();
    assert_eq!(stored.segment_count(), 2);
    assert!(stored.segment(middle).is_none());

    let timeline = handle.timeline().await.unwrap().unwrap();
    assert!(timeline.is_valid_for(&stored.segments));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deleting_last_clip_in_list_clamps_index() {
    let fixture = Fixture::new(&THREE);
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();
    handle.seek(RationalTime::from_millis(2500)).await.unwrap();

    let last = fixture.project.segments[2].id;
    let outcome = handle.delete_segment(last).await.unwrap();
    assert_eq!(outcome.current_segment, 1);

    let restored = handle.wait_for(|s| s.is_integrated()).await.unwrap();
    assert_eq!(restored.current_segment, 1);
    assert_eq!(restored.position, RationalTime::from_secs(1));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deleting_down_to_one_segment_stays_per_segment() {
    let fixture = Fixture::new(&[("a.mp4", 1000), ("b.mp4", 1000)]);
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    let outcome = handle
        .delete_segment(fixture.project.segments[0].id)
        .await
        .unwrap();
    assert_eq!(outcome.remaining, 1);
    assert_eq!(outcome.current_segment, 0);
    assert!(!outcome.rebuilding);

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.mode, PlaybackMode::PerSegment);
    assert_eq!(snapshot.phase, PlaybackPhase::Paused);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn last_segment_deletion_is_rejected_without_side_effects() {
    let fixture = Fixture::new(&[("a.mp4", 1000)]);
    let handle = fixture.session().await;
    let before = handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    let err = handle
        .delete_segment(fixture.project.segments[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::LastSegmentDeletionRejected));

    assert_eq!(handle.snapshot(), before);
    let stored = fixture.store.load(fixture.project.id).await.unwrap();
    assert_eq!(stored.segment_count(), 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_segment_is_rejected() {
    let fixture = Fixture::new(&THREE);
    let handle = fixture.session().await;
    let before = handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    let err = handle.delete_segment(999).await.unwrap_err();
    assert!(matches!(err, MutationError::UnknownSegment(999)));
    assert_eq!(handle.snapshot(), before);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn lost_deletion_reports_race_and_stops() {
    let fixture = Fixture::new(&THREE);
    let store = LosingStore::new(fixture.project.clone());
    let fixture = fixture.with_store(store);
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    let err = handle
        .delete_segment(fixture.project.segments[1].id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MutationError::DeletionRaceFailure { before: 3, after: 3 }
    ));

    // No repair: the session stays paused in per-segment mode and no
    // rebuild is started.
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.mode, PlaybackMode::PerSegment);
    assert_eq!(snapshot.segment_count, 3);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deletion_while_playing_pauses() {
    let fixture = Fixture::new(&THREE);
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();
    handle.play().await.unwrap();

    handle
        .delete_segment(fixture.project.segments[2].id)
        .await
        .unwrap();
    let snapshot = handle.snapshot();
    assert!(!snapshot.is_playing());

    let restored = handle.wait_for(|s| s.is_integrated()).await.unwrap();
    assert_eq!(restored.phase, PlaybackPhase::Paused);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn restore_keeps_segment_chosen_during_rebuild() {
    let clips = [("a.mp4", 5000), ("b.mp4", 5000), ("c.mp4", 5000), ("d.mp4", 5000)];
    let fixture = Fixture::new(&clips).with_slow_builds(Duration::from_secs(2));
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    let outcome = handle
        .delete_segment(fixture.project.segments[0].id)
        .await
        .unwrap();
    assert!(outcome.rebuilding);
    assert_eq!(outcome.current_segment, 0);

    handle.next().await.unwrap();
    let moved = handle.next().await.unwrap();
    assert_eq!(moved.mode, PlaybackMode::PerSegment);
    assert_eq!(moved.current_segment, 2);

    let restored = handle.wait_for(|s| s.is_integrated()).await.unwrap();
    assert_eq!(restored.current_segment, 2);
    assert_eq!(restored.position, RationalTime::from_secs(10));
    assert_eq!(restored.duration, RationalTime::from_secs(15));
    handle.shutdown().await;
}
