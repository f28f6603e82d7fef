//! ClipReel Media - composition, rendering and export
//!
//! This crate handles:
//! - Media probing through the ffprobe sidecar
//! - Building gapless timelines from segment lists
//! - Rendering timelines to MP4 through the ffmpeg sidecar
//! - The export pipeline and its permission/sink collaborators

pub mod collaborators;
pub mod composition;
pub mod error;
pub mod export;
pub mod probe;
pub mod render;

pub use collaborators::{
    ExportSink, LibraryDirectorySink, PermissionGate, PermissionStatus, StaticPermissionGate,
};
pub use composition::{
    BuildProgress, BuildTicket, CompositionBuilder, SegmentRange, Timeline, TimelineEntry,
};
pub use error::{BuildError, ExportError, MediaError, RenderError, SinkError};
pub use export::{output_file_name, sanitize_name, ExportPipeline, ExportReport};
pub use probe::{FfprobeSource, MediaInfo, MediaSource};
pub use render::{FfmpegRenderer, RenderJob, RenderProgress, Renderer};

/// Log where the ffmpeg sidecar binaries are expected (call once at startup).
pub fn init() {
    tracing::info!(
        ffmpeg = %ffmpeg_sidecar::paths::ffmpeg_path().display(),
        ffprobe = %probe::ffprobe_path().display(),
        "ClipReel media initialized"
    );
}
