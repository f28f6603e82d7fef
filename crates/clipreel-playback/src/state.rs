//! Observable playback state.

use clipreel_core::RationalTime;

/// Lifecycle of a playback session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackPhase {
    /// Nothing loaded.
    Idle,
    /// Building the timeline; `progress` in `[0, 1]`.
    Loading { progress: f64 },
    /// Loaded, not yet started.
    Ready,
    Playing,
    Paused,
    /// Reached the end. Transient: the session rewinds to `Paused` at zero.
    Ended,
}

/// What the player is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// The concatenated timeline.
    Integrated,
    /// One clip file at a time.
    PerSegment,
}

/// Snapshot published to observers after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub phase: PlaybackPhase,
    pub mode: PlaybackMode,
    /// Index into the session's segment list.
    pub current_segment: usize,
    /// Timeline time in integrated mode, clip time in per-segment mode.
    pub position: RationalTime,
    /// Duration of what is loaded.
    pub duration: RationalTime,
    pub segment_count: usize,
    /// Generation of the timeline in use, when integrated.
    pub timeline_generation: Option<u64>,
}

impl PlaybackSnapshot {
    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }

    pub fn is_integrated(&self) -> bool {
        self.mode == PlaybackMode::Integrated
    }

    /// Loading progress, if loading.
    pub fn loading_progress(&self) -> Option<f64> {
        match self.phase {
            PlaybackPhase::Loading { progress } => Some(progress),
            _ => None,
        }
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            mode: PlaybackMode::PerSegment,
            current_segment: 0,
            position: RationalTime::ZERO,
            duration: RationalTime::ZERO,
            segment_count: 0,
            timeline_generation: None,
        }
    }
}
