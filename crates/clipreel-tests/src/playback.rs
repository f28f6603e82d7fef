//! Integration tests for building timelines and playing them back.

use clipreel_core::{EngineConfig, RationalTime, SegmentFailurePolicy};
use clipreel_playback::{PlaybackMode, PlaybackPhase};

use crate::fixtures::Fixture;

// ── Integrated playback ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn three_one_second_clips_make_a_three_second_timeline() {
    let fixture = Fixture::new(&[("a.mp4", 1000), ("b.mp4", 1000), ("c.mp4", 1000)]);
    let handle = fixture.session().await;

    let ready = handle
        .wait_for(|s| s.phase == PlaybackPhase::Ready)
        .await
        .unwrap();
    assert_eq!(ready.mode, PlaybackMode::Integrated);
    assert_eq!(ready.duration, RationalTime::from_secs(3));

    let timeline = handle.timeline().await.unwrap().unwrap();
    let starts: Vec<_> = timeline.ranges().iter().map(|r| r.start()).collect();
    assert_eq!(
        starts,
        vec![RationalTime::ZERO, RationalTime::from_secs(1), RationalTime::from_secs(2)]
    );
    assert_eq!(timeline.ranges()[2].end(), timeline.duration());

    let after_seek = handle.seek(RationalTime::from_millis(1500)).await.unwrap();
    assert_eq!(after_seek.current_segment, 1);
    assert_eq!(after_seek.position, RationalTime::from_secs(1));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn seek_past_end_lands_on_last_segment() {
    let fixture = Fixture::new(&[("a.mp4", 1000), ("b.mp4", 2000)]);
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    let snapshot = handle.seek(RationalTime::from_secs(10)).await.unwrap();
    assert_eq!(snapshot.current_segment, 1);
    assert_eq!(snapshot.position, RationalTime::from_secs(1));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn next_and_previous_jump_between_segment_starts() {
    let fixture = Fixture::new(&[("a.mp4", 1000), ("b.mp4", 1000), ("c.mp4", 1000)]);
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    assert_eq!(handle.next().await.unwrap().current_segment, 1);
    assert_eq!(handle.next().await.unwrap().current_segment, 2);
    // No segment after the last.
    assert_eq!(handle.next().await.unwrap().current_segment, 2);

    let back = handle.previous().await.unwrap();
    assert_eq!(back.current_segment, 1);
    assert_eq!(back.position, RationalTime::from_secs(1));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn playing_through_tracks_segments_and_rewinds() {
    let fixture = Fixture::new(&[("a.mp4", 1000), ("b.mp4", 1000)]);
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    handle.play().await.unwrap();
    let second = handle
        .wait_for(|s| s.current_segment == 1)
        .await
        .unwrap();
    assert!(second.is_playing());

    let done = handle
        .wait_for(|s| s.phase == PlaybackPhase::Paused)
        .await
        .unwrap();
    assert_eq!(done.current_segment, 0);
    assert_eq!(done.position, RationalTime::ZERO);
    assert_eq!(done.mode, PlaybackMode::Integrated);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn loading_progress_never_goes_backwards() {
    let config = EngineConfig {
        progress_batch: 1,
        ..EngineConfig::default()
    };
    let fixture = Fixture::with_config(&[("a.mp4", 1000), ("b.mp4", 1000), ("c.mp4", 1000)], config);
    let handle = fixture.session().await;
    let mut state = handle.subscribe();

    let mut seen = Vec::new();
    loop {
        let snapshot = state.borrow_and_update().clone();
        if let Some(progress) = snapshot.loading_progress() {
            seen.push(progress);
        }
        if snapshot.phase == PlaybackPhase::Ready {
            break;
        }
        state.changed().await.unwrap();
    }
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
    handle.shutdown().await;
}

// ── Unavailable media ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn corrupted_segment_is_skipped() {
    let fixture = Fixture::new(&[("a.mp4", 1000), ("b.mp4", 1000), ("c.mp4", 1000)]);
    fixture.media.corrupt("b.mp4");
    let handle = fixture.session().await;

    let ready = handle
        .wait_for(|s| s.phase == PlaybackPhase::Ready)
        .await
        .unwrap();
    assert_eq!(ready.mode, PlaybackMode::Integrated);
    assert_eq!(ready.duration, RationalTime::from_secs(2));

    let timeline = handle.timeline().await.unwrap().unwrap();
    assert_eq!(timeline.ranges().len(), 2);
    assert_eq!(timeline.skipped(), &[fixture.project.segments[1].id]);
    // Ranges keep their original segment indices.
    let indices: Vec<_> = timeline.ranges().iter().map(|r| r.segment_index).collect();
    assert_eq!(indices, vec![0, 2]);
    assert_eq!(timeline.ranges()[1].start(), RationalTime::from_secs(1));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fail_fast_build_falls_back_to_per_segment() {
    let config = EngineConfig {
        failure_policy: SegmentFailurePolicy::FailFast,
        ..EngineConfig::default()
    };
    let fixture = Fixture::with_config(&[("a.mp4", 1000), ("b.mp4", 1000), ("c.mp4", 1000)], config);
    fixture.media.corrupt("b.mp4");
    let handle = fixture.session().await;

    let ready = handle
        .wait_for(|s| s.phase == PlaybackPhase::Ready)
        .await
        .unwrap();
    assert_eq!(ready.mode, PlaybackMode::PerSegment);
    assert_eq!(ready.current_segment, 0);
    assert_eq!(ready.duration, RationalTime::from_secs(1));
    assert!(handle.timeline().await.unwrap().is_none());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn per_segment_playback_advances_and_wraps() {
    let config = EngineConfig {
        failure_policy: SegmentFailurePolicy::FailFast,
        ..EngineConfig::default()
    };
    let fixture = Fixture::with_config(&[("a.mp4", 500), ("b.mp4", 500), ("c.mp4", 500)], config);
    fixture.media.corrupt("c.mp4");
    let handle = fixture.session().await;
    handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();

    handle.play().await.unwrap();
    let second = handle
        .wait_for(|s| s.current_segment == 1)
        .await
        .unwrap();
    assert!(second.is_playing());
    assert_eq!(second.mode, PlaybackMode::PerSegment);

    // The third clip is unavailable, so playback ends after the second.
    let done = handle
        .wait_for(|s| s.phase == PlaybackPhase::Paused)
        .await
        .unwrap();
    assert_eq!(done.current_segment, 0);
    assert_eq!(done.position, RationalTime::ZERO);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn per_segment_playback_skips_missing_middle_clip() {
    let config = EngineConfig {
        failure_policy: SegmentFailurePolicy::FailFast,
        ..EngineConfig::default()
    };
    let fixture = Fixture::with_config(&[("a.mp4", 1000), ("b.mp4", 1000), ("c.mp4", 1000)], config);
    fixture.media.corrupt("b.mp4");
    let handle = fixture.session().await;
    let ready = handle.wait_for(|s| s.phase == PlaybackPhase::Ready).await.unwrap();
    assert_eq!(ready.mode, PlaybackMode::PerSegment);

    handle.play().await.unwrap();
    let third = handle
        .wait_for(|s| s.current_segment == 2)
        .await
        .unwrap();
    assert!(third.is_playing());
    assert_eq!(third.duration, RationalTime::from_secs(1));

    let done = handle
        .wait_for(|s| s.phase == PlaybackPhase::Paused)
        .await
        .unwrap();
    assert_eq!(done.current_segment, 0);
    assert_eq!(done.position, RationalTime::ZERO);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn nothing_playable_leaves_session_idle() {
    let fixture = Fixture::new(&[("a.mp4", 1000)]);
    fixture.media.corrupt("a.mp4");
    let handle = fixture.session().await;

    let settled = handle
        .wait_for(|s| !matches!(s.phase, PlaybackPhase::Loading { .. }))
        .await
        .unwrap();
    assert_eq!(settled.phase, PlaybackPhase::Idle);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reloading_supersedes_previous_build() {
    let fixture = Fixture::new(&[("a.mp4", 1000), ("b.mp4", 1000)]);
    let handle = fixture.session().await;

    let mut shorter = fixture.project.segments.clone();
    shorter.truncate(1);
    handle.load(shorter).await.unwrap();

    let ready = handle
        .wait_for(|s| s.phase == PlaybackPhase::Ready)
        .await
        .unwrap();
    assert_eq!(ready.segment_count, 1);
    assert_eq!(ready.duration, RationalTime::from_secs(1));
    handle.shutdown().await;
}
