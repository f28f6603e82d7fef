//! ClipReel Playback - sequential playback of a project's segments
//!
//! This crate handles:
//! - The player boundary and a headless clock-driven player
//! - The playback state machine (integrated and per-segment modes)
//! - The session actor that serializes commands, ticks and build results
//! - Segment deletion coordinated with live playback

pub mod controller;
pub mod coordinator;
pub mod error;
pub mod player;
pub mod session;
pub mod state;

pub use controller::PlaybackController;
pub use coordinator::{DeletionOutcome, MutationCoordinator};
pub use error::{MutationError, PlaybackError};
pub use player::{ClockPlayer, LoadedItem, Player, PlayerEvent, PlayerItem};
pub use session::{Control, PlaybackHandle, PlaybackSession};
pub use state::{PlaybackMode, PlaybackPhase, PlaybackSnapshot};
