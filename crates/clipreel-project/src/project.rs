//! Project type.

use chrono::{DateTime, Utc};
use clipreel_core::{ClipReelError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::segment::{CameraFacing, Segment, SegmentId};

/// Project identifier.
pub type ProjectId = i64;

/// A project: an ordered collection of segments plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project ID
    pub id: ProjectId,
    /// Project name (also the stem of exported file names)
    pub name: String,
    /// Segments in playback order
    pub segments: Vec<Segment>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Bumped on every structural mutation
    pub last_modified: DateTime<Utc>,
}

impl Project {
    /// Create a new empty project.
    pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            segments: Vec::new(),
            created_at: now,
            last_modified: now,
        }
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Position of a segment in playback order.
    pub fn segment_index(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }

    /// Get a segment by ID.
    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// IDs in playback order.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.segments.iter().map(|s| s.id).collect()
    }

    /// Append a segment at the end. Duplicate IDs are rejected.
    pub fn append_segment(&mut self, segment: Segment) -> Result<()> {
        if self.segment_index(segment.id).is_some() {
            return Err(ClipReelError::Project(format!(
                "segment {} already exists in project {}",
                segment.id, self.id
            )));
        }
        self.segments.push(segment);
        self.touch();
        Ok(())
    }

    /// Record a new clip: assigns the next free ID and the next order value.
    pub fn record_segment(&mut self, source: impl Into<PathBuf>, facing: CameraFacing) -> SegmentId {
        let id = self.segments.iter().map(|s| s.id).max().map_or(1, |max| max + 1);
        let order = self.segments.iter().map(|s| s.order + 1).max().unwrap_or(0);
        self.segments.push(Segment::new(id, source, facing, order));
        self.touch();
        id
    }

    /// Remove a segment by ID. Returns the removed segment.
    pub fn remove_segment(&mut self, id: SegmentId) -> Option<Segment> {
        let index = self.segment_index(id)?;
        let removed = self.segments.remove(index);
        self.touch();
        Some(removed)
    }

    /// Deleting is allowed only while more than one segment remains.
    pub fn can_delete_segment(&self) -> bool {
        self.segments.len() > 1
    }

    /// Rename the project.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    /// Mark the project as modified now.
    pub fn touch(&mut self) {
        let now = Utc::now();
        // Keep last_modified monotonic even if the wall clock steps back.
        if now > self.last_modified {
            self.last_modified = now;
        }
    }
}
