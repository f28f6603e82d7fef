//! ClipReel Core - Foundation types for segmented video projects
//!
//! This crate provides the fundamental types used throughout ClipReel:
//! - Time representation (RationalTime, TimeRange)
//! - The shared error type
//! - Engine configuration

pub mod config;
pub mod error;
pub mod time;

pub use config::{EngineConfig, QualityPreset, SegmentFailurePolicy};
pub use error::{ClipReelError, Result};
pub use time::{RationalTime, TimeRange};
