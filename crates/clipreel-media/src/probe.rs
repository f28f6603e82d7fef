//! Media file probing to get duration and stream layout without decoding.

use async_trait::async_trait;
use clipreel_core::RationalTime;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::MediaError;

/// What the composition and render passes need to know about one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// File path
    pub path: PathBuf,
    /// Container duration
    pub duration: RationalTime,
    /// Frame size of the primary video stream
    pub width: u32,
    pub height: u32,
    /// Whether the clip carries an audio stream
    pub has_audio: bool,
}

/// Read-only resolution of a segment's source to decodable media.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Resolve a clip's duration and stream layout. Failures are reported,
    /// never raised as panics.
    async fn resolve(&self, path: &Path) -> Result<MediaInfo, MediaError>;
}

/// Path to the ffprobe binary that ships next to ffmpeg.
pub fn ffprobe_path() -> PathBuf {
    let name = if cfg!(windows) { "ffprobe.exe" } else { "ffprobe" };
    ffmpeg_sidecar::paths::ffmpeg_path().with_file_name(name)
}

/// `MediaSource` backed by the ffprobe sidecar.
#[derive(Debug, Clone)]
pub struct FfprobeSource {
    ffprobe: PathBuf,
}

impl FfprobeSource {
    pub fn new() -> Self {
        Self {
            ffprobe: ffprobe_path(),
        }
    }

    /// Use a specific ffprobe binary.
    pub fn with_binary(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl Default for FfprobeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for FfprobeSource {
    async fn resolve(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(MediaError::NotFound(path.to_path_buf()));
        }

        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::Probe {
                path: path.to_path_buf(),
                reason: stderr.lines().last().unwrap_or("ffprobe failed").to_string(),
            });
        }

        let info = parse_probe_output(path, &output.stdout)?;
        debug!(path = %path.display(), duration = %info.duration, "Probed clip");
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Interpret `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(path: &Path, json: &[u8]) -> Result<MediaInfo, MediaError> {
    let probe_err = |reason: String| MediaError::Probe {
        path: path.to_path_buf(),
        reason,
    };

    let output: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| probe_err(format!("invalid ffprobe JSON: {e}")))?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::NoVideoStream(path.to_path_buf()))?;
    let has_audio = output
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    // Container duration first, the video stream's own duration as fallback.
    let seconds = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .ok_or_else(|| probe_err("no duration reported".into()))?
        .trim()
        .parse::<f64>()
        .map_err(|e| probe_err(format!("unparsable duration: {e}")))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(probe_err(format!("non-positive duration {seconds}")));
    }

    Ok(MediaInfo {
        path: path.to_path_buf(),
        duration: RationalTime::from_seconds_f64(seconds),
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        has_audio,
    })
}
