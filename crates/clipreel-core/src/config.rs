//! Engine configuration
//!
//! Handles loading/saving settings and default values. Missing fields fall
//! back to their defaults so older config files keep loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClipReelError, Result};

/// Environment variable that overrides the default config file location.
pub const CONFIG_ENV: &str = "CLIPREEL_CONFIG";

/// What the composition builder does when one segment cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentFailurePolicy {
    /// Log, leave the segment out of the timeline, keep going.
    #[default]
    SkipAndContinue,
    /// Abort the whole build with `SourceUnavailable`.
    FailFast,
}

/// Render quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Draft,
    Normal,
    High,
    #[default]
    Highest,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Playback
    pub sample_interval_ms: u64,
    pub settle_delay_ms: u64,

    // Composition
    pub progress_batch: usize,
    pub failure_policy: SegmentFailurePolicy,

    // Export
    pub render_poll_interval_ms: u64,
    pub quality: QualityPreset,

    // Storage
    pub projects_dir: PathBuf,
    pub render_dir: PathBuf,
    pub library_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_root = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        let library_root = dirs::video_dir().unwrap_or_else(|| data_root.clone());
        Self {
            sample_interval_ms: 100,
            settle_delay_ms: 250,
            progress_batch: 1,
            failure_policy: SegmentFailurePolicy::SkipAndContinue,
            render_poll_interval_ms: 100,
            quality: QualityPreset::Highest,
            projects_dir: data_root.join("clipreel").join("projects"),
            render_dir: std::env::temp_dir().join("clipreel"),
            library_dir: library_root.join("ClipReel"),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// `$CLIPREEL_CONFIG`, else `<config dir>/clipreel/config.json`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clipreel")
            .join("config.json")
    }

    /// Load from the default location or fall back to defaults.
    pub fn load_or_default() -> Result<Self> {
        Self::load(&Self::default_path())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(ClipReelError::Config(
                "sample_interval_ms must be greater than zero".into(),
            ));
        }
        if self.render_poll_interval_ms == 0 {
            return Err(ClipReelError::Config(
                "render_poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.progress_batch == 0 {
            return Err(ClipReelError::Config(
                "progress_batch must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Create the storage directories.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.projects_dir)?;
        std::fs::create_dir_all(&self.render_dir)?;
        std::fs::create_dir_all(&self.library_dir)?;
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn render_poll_interval(&self) -> Duration {
        Duration::from_millis(self.render_poll_interval_ms)
    }
}
