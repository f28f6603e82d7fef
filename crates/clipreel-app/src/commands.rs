//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use clipreel_core::{EngineConfig, RationalTime};
use clipreel_media::{
    CompositionBuilder, ExportPipeline, FfmpegRenderer, FfprobeSource, LibraryDirectorySink,
    MediaSource, StaticPermissionGate,
};
use clipreel_playback::{ClockPlayer, PlaybackHandle, PlaybackPhase, PlaybackSession};
use clipreel_project::{CameraFacing, JsonProjectStore, ProjectStore};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long `delete-segment` waits for integrated playback to come back.
const RESTORE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct App {
    config: EngineConfig,
    store: Arc<JsonProjectStore>,
    source: Arc<dyn MediaSource>,
}

impl App {
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let store = JsonProjectStore::open(&config.projects_dir)
            .await
            .with_context(|| format!("opening project store at {}", config.projects_dir.display()))?;
        Ok(Self {
            config,
            store: Arc::new(store),
            source: Arc::new(FfprobeSource::new()),
        })
    }

    fn builder(&self) -> Arc<CompositionBuilder> {
        Arc::new(CompositionBuilder::new(Arc::clone(&self.source), &self.config))
    }

    async fn session(&self, id: i64) -> Result<PlaybackHandle> {
        let player = Arc::new(ClockPlayer::new(Arc::clone(&self.source)));
        let handle =
            PlaybackSession::open(self.store.clone(), id, player, self.builder(), &self.config).await?;
        let settled = handle
            .wait_for(|s| !matches!(s.phase, PlaybackPhase::Loading { .. }))
            .await?;
        if settled.phase == PlaybackPhase::Idle {
            handle.shutdown().await;
            bail!("project {} has no playable segments", id);
        }
        Ok(handle)
    }

    pub async fn new_project(&self, name: &str, clips: Vec<PathBuf>, front: bool) -> Result<()> {
        let facing = if front {
            CameraFacing::Front
        } else {
            CameraFacing::Back
        };
        let project = self.store.create(name).await?;
        for clip in clips {
            let resolved = tokio::fs::canonicalize(&clip).await;
            let clip = resolved.unwrap_or(clip);
            let segment = self.store.append_segment(project.id, clip, facing).await?;
            info!(project_id = project.id, segment_id = segment.id, "Recorded segment");
        }
        println!("Created project {} ({})", project.id, name);
        Ok(())
    }

    pub async fn list(&self) -> Result<()> {
        let projects = self.store.list().await?;
        if projects.is_empty() {
            println!("No projects");
        }
        for project in projects {
            println!(
                "{:>4}  {:<32} {:>3} clips  {}",
                project.id,
                project.name,
                project.segment_count(),
                project.last_modified.format("%Y-%m-%d %H:%M")
            );
        }
        Ok(())
    }

    pub async fn info(&self, id: i64) -> Result<()> {
        let project = self.store.load(id).await?;
        println!("{} (id {})", project.name, project.id);
        println!("created {}", project.created_at.format("%Y-%m-%d %H:%M:%S"));
        for (index, segment) in project.segments.iter().enumerate() {
            println!(
                "  [{}] segment {} {:?} {}",
                index,
                segment.id,
                segment.facing,
                segment.source.display()
            );
        }

        match self.builder().build_now(&project.segments, |_| {}).await {
            Ok(timeline) => {
                println!("timeline {}", timeline.duration());
                for range in timeline.ranges() {
                    println!(
                        "  segment {} at {} for {}",
                        range.segment_id,
                        range.start(),
                        range.length()
                    );
                }
                for skipped in timeline.skipped() {
                    println!("  segment {} skipped (media unavailable)", skipped);
                }
            }
            Err(e) => println!("timeline unavailable: {}", e),
        }
        Ok(())
    }

    pub async fn play(&self, id: i64, from: Option<f64>) -> Result<()> {
        let handle = self.session(id).await?;
        if let Some(seconds) = from {
            handle.seek(RationalTime::from_seconds_f64(seconds)).await?;
        }
        let started = handle.play().await?;
        println!(
            "Playing {} clips ({:?}), {}",
            started.segment_count, started.mode, started.duration
        );

        let mut state = handle.subscribe();
        let mut shown = started.current_segment;
        println!("  clip {}", shown);
        let interrupted = loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break true,
                changed = state.changed() => {
                    if changed.is_err() {
                        break false;
                    }
                    let snapshot = state.borrow_and_update().clone();
                    if snapshot.current_segment != shown && snapshot.is_playing() {
                        shown = snapshot.current_segment;
                        println!("  clip {}", shown);
                    }
                    if matches!(snapshot.phase, PlaybackPhase::Ended | PlaybackPhase::Paused) {
                        break false;
                    }
                }
            }
        };

        if interrupted {
            handle.pause().await?;
            println!("Stopped");
        } else {
            println!("Finished");
        }
        handle.shutdown().await;
        Ok(())
    }

    pub async fn delete_segment(&self, id: i64, segment_id: i64) -> Result<()> {
        let handle = self.session(id).await?;
        let outcome = handle.delete_segment(segment_id).await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                handle.shutdown().await;
                return Err(e.into());
            }
        };
        println!(
            "Deleted segment {}; {} remaining, now at clip {}",
            segment_id, outcome.remaining, outcome.current_segment
        );

        if outcome.rebuilding {
            match tokio::time::timeout(RESTORE_TIMEOUT, handle.wait_for(|s| s.is_integrated())).await {
                Ok(Ok(snapshot)) => println!("Timeline rebuilt, {}", snapshot.duration),
                Ok(Err(e)) => warn!(error = %e, "Session closed before the rebuild finished"),
                Err(_) => warn!("Timeline rebuild still running, continuing per clip"),
            }
        }
        handle.shutdown().await;
        Ok(())
    }

    pub async fn export(&self, id: i64) -> Result<()> {
        let project = self.store.load(id).await?;
        let pipeline = ExportPipeline::new(
            self.builder(),
            Arc::new(FfmpegRenderer::new()),
            Arc::new(StaticPermissionGate::authorized()),
            Arc::new(LibraryDirectorySink::new(&self.config.library_dir)),
            &self.config,
        );

        let export = pipeline.export(&project, None, |fraction| {
            eprint!("\rExporting {:>5.1}%", fraction * 100.0);
            let _ = std::io::stderr().flush();
        });
        tokio::pin!(export);
        let result = tokio::select! {
            result = &mut export => result,
            _ = tokio::signal::ctrl_c() => {
                pipeline.cancel();
                export.await
            }
        };
        eprintln!();

        let report = result?;
        println!(
            "Exported {} ({}) to {}",
            report.file_name,
            report.duration,
            self.config.library_dir.display()
        );
        Ok(())
    }

    pub async fn rename(&self, id: i64, name: &str) -> Result<()> {
        let project = self.store.rename(id, name).await?;
        println!("Project {} is now {}", project.id, project.name);
        Ok(())
    }
}
