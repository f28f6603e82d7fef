//! Export pipeline for rendering a project's timeline to one MP4 file.
//!
//! Reuses the caller's timeline when it still matches the project, otherwise
//! builds a fresh one; renders it with progress polling; then hands the file
//! to the export sink. Supports cancellation.

use chrono::{DateTime, Local};
use clipreel_core::{EngineConfig, QualityPreset, RationalTime};
use clipreel_project::Project;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collaborators::{ExportSink, PermissionGate, PermissionStatus};
use crate::composition::{CompositionBuilder, Timeline};
use crate::error::ExportError;
use crate::render::{RenderJob, RenderProgress, Renderer};

// ── Output naming ───────────────────────────────────────────────

/// Characters replaced by `_` in exported file names.
pub const UNSAFE_NAME_CHARS: [char; 10] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '];

/// Timestamp layout appended to exported file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Replace every path-hostile character (and space) with `_`.
///
/// [`UNSAFE_NAME_CHARS`] is the whole rule: each listed character maps to
/// one `_`, and anything else, punctuation such as `!` included, is kept.
/// `"My Trip?!"` becomes `"My_Trip_!"`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if UNSAFE_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// `<sanitized name>_<YYYYMMDD_HHmmss>.mp4`
pub fn output_file_name(project_name: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}.mp4",
        sanitize_name(project_name),
        at.format(TIMESTAMP_FORMAT)
    )
}

// ── Pipeline ────────────────────────────────────────────────────

/// Result of a delivered export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    /// Name of the delivered file.
    pub file_name: String,
    /// Duration of the rendered timeline.
    pub duration: RationalTime,
    /// Whether the caller's timeline was reused instead of rebuilt.
    pub reused_timeline: bool,
}

/// Renders projects and delivers them to the sink. One export at a time:
/// starting an export cancels the previous one.
pub struct ExportPipeline {
    builder: Arc<CompositionBuilder>,
    renderer: Arc<dyn Renderer>,
    gate: Arc<dyn PermissionGate>,
    sink: Arc<dyn ExportSink>,
    render_dir: PathBuf,
    poll_interval: Duration,
    quality: QualityPreset,
    generation: AtomicU64,
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
}

impl ExportPipeline {
    pub fn new(
        builder: Arc<CompositionBuilder>,
        renderer: Arc<dyn Renderer>,
        gate: Arc<dyn PermissionGate>,
        sink: Arc<dyn ExportSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            builder,
            renderer,
            gate,
            sink,
            render_dir: config.render_dir.clone(),
            poll_interval: config.render_poll_interval(),
            quality: config.quality,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    /// Directory the temporary render is written to.
    pub fn render_dir(&self) -> &Path {
        &self.render_dir
    }

    /// Cancel the export in flight, if any.
    pub fn cancel(&self) {
        if let Some((_, token)) = self.in_flight.lock().take() {
            token.cancel();
        }
    }

    /// Export `project`, stamping the file name with the current local time.
    ///
    /// `on_progress` receives non-decreasing fractions in `[0, 1]` and sees
    /// `1.0` exactly once, when the render completes.
    pub async fn export(
        &self,
        project: &Project,
        reuse: Option<Arc<Timeline>>,
        on_progress: impl FnMut(f64) + Send,
    ) -> Result<ExportReport, ExportError> {
        self.export_at(project, reuse, Local::now(), on_progress).await
    }

    /// Export with an explicit timestamp for the output name.
    pub async fn export_at(
        &self,
        project: &Project,
        reuse: Option<Arc<Timeline>>,
        at: DateTime<Local>,
        on_progress: impl FnMut(f64) + Send,
    ) -> Result<ExportReport, ExportError> {
        let (generation, cancel) = self.begin();
        let result = self.run(project, reuse, at, &cancel, on_progress).await;
        self.finish(generation);

        match &result {
            Ok(report) => info!(project_id = project.id, file = %report.file_name, "Export delivered"),
            Err(e) => warn!(project_id = project.id, error = %e, "Export failed"),
        }
        result
    }

    async fn run(
        &self,
        project: &Project,
        reuse: Option<Arc<Timeline>>,
        at: DateTime<Local>,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(f64) + Send,
    ) -> Result<ExportReport, ExportError> {
        // 1. Timeline
        let (timeline, reused_timeline) = match reuse {
            Some(timeline) if timeline.is_valid_for(&project.segments) => {
                debug!(generation = timeline.generation(), "Reusing playback timeline");
                (timeline, true)
            }
            _ => {
                let timeline = tokio::select! {
                    _ = cancel.cancelled() => return Err(ExportError::Cancelled),
                    built = self.builder.build_now(&project.segments, |_| {}) => built?,
                };
                (Arc::new(timeline), false)
            }
        };

        // 2-3. Output path, clearing any previous file
        let file_name = output_file_name(&project.name, at);
        tokio::fs::create_dir_all(&self.render_dir).await?;
        let output_path = self.render_dir.join(&file_name);
        match tokio::fs::remove_file(&output_path).await {
            Ok(()) => debug!(path = %output_path.display(), "Removed stale export"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // 4. Permission
        let status = match self.gate.status() {
            PermissionStatus::NotDetermined => tokio::select! {
                _ = cancel.cancelled() => return Err(ExportError::Cancelled),
                status = self.gate.request() => status,
            },
            status => status,
        };
        if !status.allows_export() {
            return Err(ExportError::PermissionDenied);
        }

        // 5. Render with progress polling
        let job = RenderJob::from_timeline(&timeline, &output_path, self.quality);
        let progress = Arc::new(RenderProgress::new());
        let render = self.renderer.render(&job, Arc::clone(&progress), cancel.clone());
        tokio::pin!(render);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reported = 0.0_f64;

        let rendered = loop {
            tokio::select! {
                result = &mut render => break result,
                _ = ticker.tick() => {
                    let fraction = progress.get();
                    // 1.0 is reserved for the completion report below.
                    if fraction > reported && fraction < 1.0 {
                        reported = fraction;
                        on_progress(fraction);
                    }
                }
            }
        };

        if let Err(e) = rendered {
            discard_partial(&output_path).await;
            return Err(e.into());
        }
        on_progress(1.0);

        // 6. Deliver
        if let Err(e) = self.sink.save(&output_path).await {
            warn!(path = %output_path.display(), error = %e, "Sink rejected export, keeping rendered file");
            return Err(ExportError::SinkFailed {
                path: output_path,
                reason: e.reason,
            });
        }
        if let Err(e) = tokio::fs::remove_file(&output_path).await {
            warn!(path = %output_path.display(), error = %e, "Could not remove delivered render");
        }

        Ok(ExportReport {
            file_name,
            duration: timeline.duration(),
            reused_timeline,
        })
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut in_flight = self.in_flight.lock();
        if let Some((previous, token)) = in_flight.take() {
            debug!(generation = previous, "Superseding in-flight export");
            token.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        *in_flight = Some((generation, token.clone()));
        (generation, token)
    }

    fn finish(&self, generation: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.as_ref().is_some_and(|(g, _)| *g == generation) {
            *in_flight = None;
        }
    }
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial render"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove partial render"),
    }
}
