//! ClipReel Project - Project model
//!
//! A project is an ordered list of independently recorded segments:
//! - Segments are immutable once captured; they can only be deleted
//! - Array order of `Project::segments` is the playback order
//! - Persistence goes through the `ProjectStore` collaborator

pub mod project;
pub mod segment;
pub mod document;
pub mod store;

pub use project::{Project, ProjectId};
pub use segment::{CameraFacing, Segment, SegmentId};
pub use store::{JsonProjectStore, MemoryProjectStore, ProjectStore};
