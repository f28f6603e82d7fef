//! Integration tests for the export pipeline.

use chrono::{Local, TimeZone};
use clipreel_core::{EngineConfig, RationalTime};
use clipreel_media::{
    ExportError, ExportPipeline, PermissionGate, PermissionStatus, Renderer, StaticPermissionGate,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::fixtures::{project, FakeMedia, RecordingSink, ScriptedRenderer};

const CLIPS: [(&str, i64); 3] = [("a.mp4", 1000), ("b.mp4", 1000), ("c.mp4", 1000)];

struct Harness {
    media: Arc<FakeMedia>,
    config: EngineConfig,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            render_dir: dir.path().join("renders"),
            render_poll_interval_ms: 5,
            ..EngineConfig::default()
        };
        Self {
            media: FakeMedia::with_clips(&CLIPS),
            config,
            _dir: dir,
        }
    }

    fn pipeline(
        &self,
        renderer: Arc<dyn Renderer>,
        gate: Arc<dyn PermissionGate>,
        sink: Arc<RecordingSink>,
    ) -> ExportPipeline {
        ExportPipeline::new(
            Arc::new(clipreel_media::CompositionBuilder::new(self.media.clone(), &self.config)),
            renderer,
            gate,
            sink,
            &self.config,
        )
    }
}

fn stepping_renderer() -> Arc<ScriptedRenderer> {
    Arc::new(ScriptedRenderer::new(&[0.2, 0.5, 0.8], Duration::from_millis(20)))
}

fn july_fourth() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2024, 7, 4, 9, 5, 3).unwrap()
}

#[tokio::test]
async fn export_delivers_named_file_and_completes_progress_once() {
    let harness = Harness::new();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = harness.pipeline(
        stepping_renderer(),
        Arc::new(StaticPermissionGate::authorized()),
        sink.clone(),
    );
    let project = project(7, "My Trip?!", &["a.mp4", "b.mp4", "c.mp4"]);

    let progress = Mutex::new(Vec::new());
    let report = pipeline
        .export_at(&project, None, july_fourth(), |f| progress.lock().push(f))
        .await
        .unwrap();

    assert_eq!(report.file_name, "My_Trip_!_20240704_090503.mp4");
    assert_eq!(report.duration, RationalTime::from_secs(3));
    assert!(!report.reused_timeline);

    let progress = progress.into_inner();
    assert_eq!(progress.last(), Some(&1.0));
    assert_eq!(progress.iter().filter(|f| **f == 1.0).count(), 1);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));

    let delivered = sink.delivered.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].1, b"mp4");
    assert!(!delivered[0].0.exists(), "delivered render is cleaned up");
}

#[tokio::test]
async fn permission_denied_after_clearing_stale_output() {
    let harness = Harness::new();
    let renderer = stepping_renderer();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = harness.pipeline(
        renderer.clone(),
        Arc::new(StaticPermissionGate::new(PermissionStatus::Denied)),
        sink.clone(),
    );
    let project = project(1, "Beach Day", &["a.mp4"]);

    let stale = harness.config.render_dir.join("Beach_Day_20240704_090503.mp4");
    std::fs::create_dir_all(&harness.config.render_dir).unwrap();
    std::fs::write(&stale, b"old").unwrap();

    let err = pipeline
        .export_at(&project, None, july_fourth(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::PermissionDenied));
    assert!(!stale.exists());
    assert_eq!(renderer.renders(), 0);
    assert!(sink.delivered.lock().is_empty());
}

#[tokio::test]
async fn undetermined_permission_is_requested() {
    let harness = Harness::new();
    let sink = Arc::new(RecordingSink::default());
    let gate = Arc::new(StaticPermissionGate::prompting(PermissionStatus::Limited));
    let pipeline = harness.pipeline(stepping_renderer(), gate.clone(), sink.clone());
    let project = project(1, "Reel", &["a.mp4", "b.mp4"]);

    pipeline.export(&project, None, |_| {}).await.unwrap();
    assert_eq!(gate.status(), PermissionStatus::Limited);
    assert_eq!(sink.delivered.lock().len(), 1);
}

#[tokio::test]
async fn sink_failure_keeps_rendered_file() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(
        stepping_renderer(),
        Arc::new(StaticPermissionGate::authorized()),
        Arc::new(RecordingSink::rejecting("library full")),
    );
    let project = project(1, "Reel", &["a.mp4", "b.mp4"]);

    let err = pipeline
        .export_at(&project, None, july_fourth(), |_| {})
        .await
        .unwrap_err();
    match err {
        ExportError::SinkFailed { path, reason } => {
            assert_eq!(reason, "library full");
            assert_eq!(path, harness.config.render_dir.join("Reel_20240704_090503.mp4"));
            assert_eq!(std::fs::read(&path).unwrap(), b"mp4");
        }
        other => panic!("expected SinkFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn render_failure_discards_partial_file() {
    let harness = Harness::new();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = harness.pipeline(
        Arc::new(ScriptedRenderer::failing("encoder exited with 1")),
        Arc::new(StaticPermissionGate::authorized()),
        sink.clone(),
    );
    let project = project(1, "Reel", &["a.mp4"]);

    let progress = Mutex::new(Vec::new());
    let err = pipeline
        .export_at(&project, None, july_fourth(), |f| progress.lock().push(f))
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::RenderFailed(ref r) if r.contains("exited")));
    assert!(!harness.config.render_dir.join("Reel_20240704_090503.mp4").exists());
    assert!(!progress.lock().contains(&1.0));
    assert!(sink.delivered.lock().is_empty());
}

#[tokio::test]
async fn valid_timeline_is_reused() {
    let harness = Harness::new();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = harness.pipeline(
        stepping_renderer(),
        Arc::new(StaticPermissionGate::authorized()),
        sink,
    );
    let project = project(1, "Reel", &["a.mp4", "b.mp4", "c.mp4"]);
    let builder = clipreel_media::CompositionBuilder::new(harness.media.clone(), &harness.config);
    let timeline = Arc::new(builder.build_now(&project.segments, |_| {}).await.unwrap());
    let resolves = harness.media.resolves();

    let report = pipeline.export(&project, Some(timeline), |_| {}).await.unwrap();
    assert!(report.reused_timeline);
    assert_eq!(harness.media.resolves(), resolves);
}

#[tokio::test]
async fn stale_timeline_is_rebuilt() {
    let harness = Harness::new();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = harness.pipeline(
        stepping_renderer(),
        Arc::new(StaticPermissionGate::authorized()),
        sink,
    );
    let mut project = project(1, "Reel", &["a.mp4", "b.mp4", "c.mp4"]);
    let builder = clipreel_media::CompositionBuilder::new(harness.media.clone(), &harness.config);
    let timeline = Arc::new(builder.build_now(&project.segments, |_| {}).await.unwrap());

    let removed = project.segments[1].id;
    project.remove_segment(removed);
    let report = pipeline.export(&project, Some(timeline), |_| {}).await.unwrap();
    assert!(!report.reused_timeline);
    assert_eq!(report.duration, RationalTime::from_secs(2));
}

#[tokio::test]
async fn cancelled_export_removes_partial_file() {
    let harness = Harness::new();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Arc::new(harness.pipeline(
        Arc::new(ScriptedRenderer::new(&[0.1, 0.2, 0.3], Duration::from_secs(5))),
        Arc::new(StaticPermissionGate::authorized()),
        sink.clone(),
    ));
    let project = project(1, "Reel", &["a.mp4"]);

    let canceller = Arc::clone(&pipeline);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = pipeline
        .export_at(&project, None, july_fourth(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Cancelled));
    assert!(!harness.config.render_dir.join("Reel_20240704_090503.mp4").exists());
    assert!(sink.delivered.lock().is_empty());
}

#[tokio::test]
async fn project_without_playable_media_fails_to_build() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(
        stepping_renderer(),
        Arc::new(StaticPermissionGate::authorized()),
        Arc::new(RecordingSink::default()),
    );
    let project = project(1, "Reel", &["gone.mp4"]);

    let err = pipeline.export(&project, None, |_| {}).await.unwrap_err();
    assert!(matches!(err, ExportError::Build(_)));
}
