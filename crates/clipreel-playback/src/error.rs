//! Error types for playback and segment mutation.

use clipreel_core::ClipReelError;
use clipreel_project::SegmentId;
use thiserror::Error;

/// Errors surfaced by the playback session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// A segment's clip could not be loaded for per-segment playback.
    #[error("Clip for segment {segment_id} is unavailable: {reason}")]
    ClipUnavailable { segment_id: SegmentId, reason: String },

    /// No segment at this index of the session's list.
    #[error("No segment at index {0}")]
    NoSegment(usize),

    /// The session task has shut down.
    #[error("Playback session is closed")]
    SessionClosed,
}

/// Errors surfaced by segment deletion.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The only remaining segment cannot be deleted.
    #[error("Deleting the last remaining segment is not allowed")]
    LastSegmentDeletionRejected,

    /// The store acknowledged the deletion but the segment count did not drop.
    #[error("Segment count did not drop after deletion ({before} -> {after})")]
    DeletionRaceFailure { before: usize, after: usize },

    /// The segment is not part of the session's project.
    #[error("Segment {0} is not part of the project")]
    UnknownSegment(SegmentId),

    /// The project store failed.
    #[error("Project store error: {0}")]
    Store(#[from] ClipReelError),

    /// The session task has shut down.
    #[error("Playback session is closed")]
    SessionClosed,
}
