//! Error types for the media subsystem.

use clipreel_project::SegmentId;
use std::path::PathBuf;
use thiserror::Error;

/// A single clip could not be resolved to decodable media.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The source file does not exist.
    #[error("Media file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The prober ran but its answer was unusable.
    #[error("Could not probe {}: {reason}", .path.display())]
    Probe { path: PathBuf, reason: String },

    /// The file has no video stream.
    #[error("No video stream in {}", .0.display())]
    NoVideoStream(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a composition build did not produce a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// There were no segments to compose.
    #[error("No segments to compose")]
    Empty,

    /// A segment's media is missing or undecodable.
    #[error("Segment {0} media is unavailable")]
    SourceUnavailable(SegmentId),

    /// A newer build superseded this one, or the owner cancelled it.
    #[error("Build cancelled")]
    Cancelled,
}

/// Failure reported by the render pass.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Render cancelled")]
    Cancelled,

    #[error("Render failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by the export sink collaborator.
#[derive(Debug, Error)]
#[error("Sink rejected {}: {reason}", .path.display())]
pub struct SinkError {
    pub path: PathBuf,
    pub reason: String,
}

/// Why an export did not deliver a file.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The user refused access to the destination library.
    #[error("Permission to save the export was denied")]
    PermissionDenied,

    /// The encoder failed.
    #[error("Render failed: {0}")]
    RenderFailed(String),

    /// The export was cancelled before it finished.
    #[error("Export cancelled")]
    Cancelled,

    /// The file was rendered but the sink refused it. The rendered file is
    /// kept at `path` so the delivery can be retried.
    #[error("Saving {} failed: {reason}", .path.display())]
    SinkFailed { path: PathBuf, reason: String },

    /// No timeline could be built for the project.
    #[error("Could not build timeline: {0}")]
    Build(BuildError),

    /// IO error while preparing the output path.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BuildError> for ExportError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Cancelled => Self::Cancelled,
            other => Self::Build(other),
        }
    }
}

impl From<RenderError> for ExportError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Cancelled => Self::Cancelled,
            RenderError::Failed(reason) => Self::RenderFailed(reason),
            RenderError::Io(e) => Self::RenderFailed(e.to_string()),
        }
    }
}

impl From<SinkError> for ExportError {
    fn from(err: SinkError) -> Self {
        Self::SinkFailed {
            path: err.path,
            reason: err.reason,
        }
    }
}
