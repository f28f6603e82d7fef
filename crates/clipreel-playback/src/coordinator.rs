//! Segment deletion against a live playback session.
//!
//! Deletion never touches the timeline the player is using: the session
//! first drops to per-segment playback, the store is asked to remove the
//! segment, and the resulting count is re-read from the store before the
//! session adopts the new list. Integrated playback is restored by a fresh
//! build once the list has more than one segment.

use clipreel_project::{ProjectId, ProjectStore, SegmentId};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::controller::PlaybackController;
use crate::error::MutationError;

/// What a completed deletion left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Segments remaining in the project.
    pub remaining: usize,
    /// Index the session now points at.
    pub current_segment: usize,
    /// Whether a rebuild back to integrated playback was started.
    pub rebuilding: bool,
}

/// Serializes segment mutations for one project.
pub struct MutationCoordinator {
    store: Arc<dyn ProjectStore>,
    project_id: ProjectId,
}

impl MutationCoordinator {
    pub fn new(store: Arc<dyn ProjectStore>, project_id: ProjectId) -> Self {
        Self { store, project_id }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    /// Delete `segment_id` while `controller` keeps a consistent state.
    pub async fn delete_segment(
        &self,
        controller: &mut PlaybackController,
        segment_id: SegmentId,
    ) -> Result<DeletionOutcome, MutationError> {
        let before = controller.segments().len();
        if before <= 1 {
            warn!(segment_id, "Refusing to delete the last segment");
            return Err(MutationError::LastSegmentDeletionRejected);
        }
        if !controller.segments().iter().any(|s| s.id == segment_id) {
            return Err(MutationError::UnknownSegment(segment_id));
        }

        let restore = controller.suspend_for_mutation().await;

        if let Err(e) = self.store.remove_segment(self.project_id, segment_id).await {
            error!(project_id = self.project_id, segment_id, error = %e, "Store rejected segment deletion");
            return Err(e.into());
        }
        let project = self.store.load(self.project_id).await?;
        let after = project.segment_count();
        if after >= before {
            error!(
                project_id = self.project_id,
                segment_id, before, after, "Segment count did not drop after deletion"
            );
            return Err(MutationError::DeletionRaceFailure { before, after });
        }

        let current_segment = controller.adopt_segments(project.segments, restore).await;
        let rebuilding = restore && after > 1;
        info!(
            project_id = self.project_id,
            segment_id, remaining = after, current_segment, rebuilding, "Segment deleted"
        );

        Ok(DeletionOutcome {
            remaining: after,
            current_segment,
            rebuilding,
        })
    }
}
