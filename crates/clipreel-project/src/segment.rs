//! Segment types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Segment identifier, unique within a project.
pub type SegmentId = i64;

/// Which camera recorded the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    Front,
    #[default]
    Back,
}

/// One short, independently recorded clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Unique segment ID
    pub id: SegmentId,
    /// Path to the clip's media file
    pub source: PathBuf,
    /// Capture timestamp
    pub recorded_at: DateTime<Utc>,
    /// Camera used for capture
    pub facing: CameraFacing,
    /// Capture-time ordinal. Informational: the project's array order is
    /// what playback and export follow.
    pub order: u32,
}

impl Segment {
    /// Create a segment recorded now.
    pub fn new(id: SegmentId, source: impl Into<PathBuf>, facing: CameraFacing, order: u32) -> Self {
        Self {
            id,
            source: source.into(),
            recorded_at: Utc::now(),
            facing,
            order,
        }
    }

    /// Override the capture timestamp.
    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    /// Path to the clip's media file.
    pub fn source(&self) -> &Path {
        &self.source
    }
}
