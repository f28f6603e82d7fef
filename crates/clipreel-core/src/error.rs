//! Error types for ClipReel.

use thiserror::Error;

/// Main error type for ClipReel operations that are not covered by a
/// component-specific error (build, export, playback, mutation).
#[derive(Error, Debug)]
pub enum ClipReelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Project error: {0}")]
    Project(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ClipReelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for ClipReel operations.
pub type Result<T> = std::result::Result<T, ClipReelError>;
