//! Render pass: encodes a timeline into one MP4 file.
//!
//! Uses FFmpeg via the sidecar binary. The encoder writes `-progress`
//! key/value lines to stdout; the renderer turns them into a completion
//! fraction published through `RenderProgress`, which the export pipeline
//! polls on its own schedule.

use async_trait::async_trait;
use clipreel_core::{QualityPreset, RationalTime};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::composition::Timeline;
use crate::error::RenderError;

// ── Quality presets ─────────────────────────────────────────────

/// x264/AAC parameters for a quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    /// x264 speed preset.
    pub x264_preset: &'static str,
    /// CRF value (0-51, lower = better).
    pub crf: u32,
    /// Audio bitrate in kbps.
    pub audio_bitrate: u32,
}

impl EncoderSettings {
    pub fn for_preset(preset: QualityPreset) -> Self {
        match preset {
            QualityPreset::Draft => Self {
                x264_preset: "ultrafast",
                crf: 30,
                audio_bitrate: 96,
            },
            QualityPreset::Normal => Self {
                x264_preset: "medium",
                crf: 23,
                audio_bitrate: 128,
            },
            QualityPreset::High => Self {
                x264_preset: "slow",
                crf: 20,
                audio_bitrate: 192,
            },
            QualityPreset::Highest => Self {
                x264_preset: "slower",
                crf: 17,
                audio_bitrate: 256,
            },
        }
    }
}

// ── Progress cell ───────────────────────────────────────────────

/// Latest render completion fraction, shared between the renderer and
/// whoever polls it.
#[derive(Debug, Default)]
pub struct RenderProgress(AtomicU64);

impl RenderProgress {
    pub fn new() -> Self {
        Self(AtomicU64::new(0f64.to_bits()))
    }

    /// Store a fraction, clamped to `[0, 1]`.
    pub fn set(&self, fraction: f64) {
        let clamped = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.0.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

// ── Render job ──────────────────────────────────────────────────

/// Everything the encoder needs to render a timeline.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub output_path: PathBuf,
    pub inputs: Vec<RenderInput>,
    pub duration: RationalTime,
    pub width: u32,
    pub height: u32,
    pub quality: QualityPreset,
}

/// One clip fed into the concat graph.
#[derive(Debug, Clone)]
pub struct RenderInput {
    pub path: PathBuf,
    pub duration: RationalTime,
    pub has_audio: bool,
}

impl RenderJob {
    /// Plan a render of `timeline` into `output_path`.
    pub fn from_timeline(timeline: &Timeline, output_path: impl Into<PathBuf>, quality: QualityPreset) -> Self {
        let entries = timeline.entries();
        // Canvas is the largest clip, rounded down to even dimensions for yuv420p.
        let width = entries.iter().map(|e| e.width).max().unwrap_or(0).max(2) / 2 * 2;
        let height = entries.iter().map(|e| e.height).max().unwrap_or(0).max(2) / 2 * 2;
        Self {
            output_path: output_path.into(),
            inputs: entries
                .iter()
                .map(|e| RenderInput {
                    path: e.source.clone(),
                    duration: e.range.length(),
                    has_audio: e.has_audio,
                })
                .collect(),
            duration: timeline.duration(),
            width,
            height,
            quality,
        }
    }

    /// Concat filter graph: every input is scaled and padded onto the
    /// canvas; clips without audio contribute generated silence.
    pub fn filter_graph(&self) -> String {
        let (w, h) = (self.width, self.height);
        let mut graph = String::new();
        for (i, input) in self.inputs.iter().enumerate() {
            let _ = write!(
                graph,
                "[{i}:v:0]scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,format=yuv420p[v{i}];"
            );
            if input.has_audio {
                let _ = write!(graph, "[{i}:a:0]aresample=48000,aformat=channel_layouts=stereo[a{i}];");
            } else {
                let _ = write!(
                    graph,
                    "anullsrc=channel_layout=stereo:sample_rate=48000,atrim=duration={:.6}[a{i}];",
                    input.duration.to_seconds_f64()
                );
            }
        }
        for i in 0..self.inputs.len() {
            let _ = write!(graph, "[v{i}][a{i}]");
        }
        let _ = write!(graph, "concat=n={}:v=1:a=1[outv][outa]", self.inputs.len());
        graph
    }

    /// Build the FFmpeg command arguments.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let settings = EncoderSettings::for_preset(self.quality);
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];

        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.path.to_string_lossy().into_owned());
        }

        args.extend_from_slice(&[
            "-filter_complex".into(),
            self.filter_graph(),
            "-map".into(),
            "[outv]".into(),
            "-map".into(),
            "[outa]".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            settings.x264_preset.into(),
            "-crf".into(),
            settings.crf.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{}k", settings.audio_bitrate),
            "-movflags".into(),
            "+faststart".into(),
            "-f".into(),
            "mp4".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
        ]);

        args.push(self.output_path.to_string_lossy().into_owned());
        args
    }

    /// Completion fraction for an encoder-reported output time.
    pub fn fraction_at(&self, out_time: RationalTime) -> f64 {
        if self.duration.is_zero() {
            return 0.0;
        }
        (out_time.to_seconds_f64() / self.duration.to_seconds_f64()).clamp(0.0, 1.0)
    }
}

/// Parse one `-progress` line. Returns the reported output time, if any.
pub fn parse_progress_line(line: &str) -> Option<RationalTime> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // Both keys carry microseconds despite the name.
        "out_time_us" | "out_time_ms" => {
            let micros: i64 = value.trim().parse().ok()?;
            (micros >= 0).then(|| RationalTime::new(micros, 1_000_000))
        }
        _ => None,
    }
}

// ── Renderer ────────────────────────────────────────────────────

/// Encodes a render job to a file.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `job`, publishing completion into `progress`. Must stop promptly
    /// and return `RenderError::Cancelled` once `cancel` fires.
    async fn render(
        &self,
        job: &RenderJob,
        progress: Arc<RenderProgress>,
        cancel: CancellationToken,
    ) -> Result<(), RenderError>;
}

/// `Renderer` that drives the ffmpeg sidecar binary.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    ffmpeg: PathBuf,
}

impl FfmpegRenderer {
    pub fn new() -> Self {
        Self {
            ffmpeg: ffmpeg_sidecar::paths::ffmpeg_path(),
        }
    }

    /// Use a specific ffmpeg binary.
    pub fn with_binary(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.ffmpeg
    }
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(
        &self,
        job: &RenderJob,
        progress: Arc<RenderProgress>,
        cancel: CancellationToken,
    ) -> Result<(), RenderError> {
        if job.inputs.is_empty() {
            return Err(RenderError::Failed("nothing to render".into()));
        }

        let args = job.ffmpeg_args();
        info!(output = %job.output_path.display(), inputs = job.inputs.len(), "Starting render");
        debug!(?args, "ffmpeg arguments");

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Failed(format!("Failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RenderError::Failed("Failed to open ffmpeg stdout".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderError::Failed("Failed to open ffmpeg stderr".into()))?;

        // Drain stderr concurrently so a chatty encoder never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut log = String::new();
            let _ = stderr.read_to_string(&mut log).await;
            log
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(output = %job.output_path.display(), "Render cancelled, stopping encoder");
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(RenderError::Cancelled);
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Some(out_time) = parse_progress_line(&line) {
                            progress.set(job.fraction_at(out_time));
                        }
                    }
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(RenderError::Cancelled);
            }
            status = child.wait() => status?,
        };
        let log = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let tail: Vec<&str> = log.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(RenderError::Failed(format!(
                "ffmpeg exited with status {}: {}",
                status,
                tail.join(" | ")
            )));
        }

        info!(output = %job.output_path.display(), "Render finished");
        Ok(())
    }
}
