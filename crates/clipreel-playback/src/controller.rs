//! Playback state machine.
//!
//! The controller is owned by the session task, so every transition runs on
//! one serialized context. Background work (timeline builds, settle-delay
//! resumes) reports back through [`SessionEvent`]s tagged with the
//! generation or token that was current when it started; anything stale is
//! dropped on arrival.

use clipreel_core::{EngineConfig, RationalTime};
use clipreel_media::{BuildError, BuildProgress, CompositionBuilder, Timeline};
use clipreel_project::Segment;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::PlaybackError;
use crate::player::{Player, PlayerEvent, PlayerItem};
use crate::state::{PlaybackMode, PlaybackPhase, PlaybackSnapshot};

/// Results of background work, delivered to the session loop.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    BuildProgress(BuildProgress),
    BuildFinished {
        generation: u64,
        result: Result<Timeline, BuildError>,
    },
    Resume {
        token: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildPurpose {
    /// First build after a load; drives the loading phase.
    Initial,
    /// Return to integrated playback after a mutation, at whatever
    /// segment is current when the build lands.
    Restore,
}

#[derive(Debug)]
struct PendingBuild {
    generation: u64,
    purpose: BuildPurpose,
}

pub struct PlaybackController {
    player: Arc<dyn Player>,
    builder: Arc<CompositionBuilder>,
    settle_delay: Duration,
    segments: Vec<Segment>,
    timeline: Option<Arc<Timeline>>,
    pending_build: Option<PendingBuild>,
    pub(crate) player_events: Option<mpsc::Receiver<PlayerEvent>>,
    internal: mpsc::UnboundedSender<SessionEvent>,
    resume_token: u64,
    pending_resume: Option<u64>,
    snapshot: PlaybackSnapshot,
    publisher: watch::Sender<PlaybackSnapshot>,
}

impl PlaybackController {
    pub(crate) fn new(
        player: Arc<dyn Player>,
        builder: Arc<CompositionBuilder>,
        config: &EngineConfig,
        internal: mpsc::UnboundedSender<SessionEvent>,
        publisher: watch::Sender<PlaybackSnapshot>,
    ) -> Self {
        Self {
            player,
            builder,
            settle_delay: config.settle_delay(),
            segments: Vec::new(),
            timeline: None,
            pending_build: None,
            player_events: None,
            internal,
            resume_token: 0,
            pending_resume: None,
            snapshot: PlaybackSnapshot::default(),
            publisher,
        }
    }

    pub fn snapshot(&self) -> &PlaybackSnapshot {
        &self.snapshot
    }

    pub fn mode(&self) -> PlaybackMode {
        self.snapshot.mode
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.snapshot.phase
    }

    pub fn current_segment(&self) -> usize {
        self.snapshot.current_segment
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The timeline in use, if integrated.
    pub fn timeline(&self) -> Option<Arc<Timeline>> {
        self.timeline.clone()
    }

    /// Whether a timeline build is in flight.
    pub fn is_building(&self) -> bool {
        self.pending_build.is_some()
    }

    // ── Loading ────────────────────────────────────────────────

    /// Replace the segment list and start building its timeline.
    pub fn start(&mut self, segments: Vec<Segment>) {
        self.release();
        self.segments = segments;
        self.snapshot = PlaybackSnapshot {
            phase: PlaybackPhase::Loading { progress: 0.0 },
            mode: PlaybackMode::Integrated,
            segment_count: self.segments.len(),
            ..PlaybackSnapshot::default()
        };
        info!(segments = self.segments.len(), "Loading playback session");
        self.spawn_build(BuildPurpose::Initial);
        self.publish();
    }

    fn spawn_build(&mut self, purpose: BuildPurpose) {
        let ticket = self.builder.begin();
        let generation = ticket.generation();
        self.pending_build = Some(PendingBuild {
            generation,
            purpose,
        });

        let builder = Arc::clone(&self.builder);
        let segments = self.segments.clone();
        let progress_tx = self.internal.clone();
        let done_tx = self.internal.clone();
        debug!(generation, ?purpose, "Starting timeline build");

        tokio::spawn(async move {
            let result = builder
                .build(&ticket, &segments, move |progress| {
                    let _ = progress_tx.send(SessionEvent::BuildProgress(progress));
                })
                .await;
            let _ = done_tx.send(SessionEvent::BuildFinished { generation, result });
        });
    }

    fn is_pending(&self, generation: u64) -> bool {
        self.pending_build
            .as_ref()
            .is_some_and(|p| p.generation == generation)
    }

    pub(crate) async fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::BuildProgress(progress) => {
                if !self.is_pending(progress.generation) {
                    debug!(generation = progress.generation, "Dropping stale build progress");
                    return;
                }
                if let PlaybackPhase::Loading { .. } = self.snapshot.phase {
                    self.snapshot.phase = PlaybackPhase::Loading {
                        progress: progress.fraction(),
                    };
                    self.publish();
                }
            }
            SessionEvent::BuildFinished { generation, result } => {
                if !self.is_pending(generation) {
                    debug!(generation, "Dropping stale build result");
                    return;
                }
                let Some(pending) = self.pending_build.take() else {
                    return;
                };
                self.on_build_finished(pending.purpose, result).await;
            }
            SessionEvent::Resume { token } => {
                if self.pending_resume != Some(token) {
                    return;
                }
                self.pending_resume = None;
                if self.snapshot.phase == PlaybackPhase::Paused {
                    self.player.play();
                    self.snapshot.phase = PlaybackPhase::Playing;
                    self.publish();
                }
            }
        }
    }

    async fn on_build_finished(&mut self, purpose: BuildPurpose, result: Result<Timeline, BuildError>) {
        match (purpose, result) {
            (BuildPurpose::Initial, Ok(timeline)) => {
                if !timeline.skipped().is_empty() {
                    warn!(skipped = ?timeline.skipped(), "Timeline built without some segments");
                }
                if let Err(e) = self.enter_integrated(Arc::new(timeline), 0, false).await {
                    warn!(error = %e, "Could not load timeline, falling back to per-segment playback");
                    self.fallback_to_per_segment().await;
                    return;
                }
                self.snapshot.phase = PlaybackPhase::Ready;
                self.publish();
            }
            (BuildPurpose::Initial, Err(e)) => {
                warn!(error = %e, "Timeline build failed, falling back to per-segment playback");
                self.fallback_to_per_segment().await;
            }
            (BuildPurpose::Restore, Ok(timeline)) => {
                if self.snapshot.mode != PlaybackMode::PerSegment {
                    return;
                }
                let resume = self.snapshot.phase == PlaybackPhase::Playing;
                if resume {
                    self.player.pause();
                }
                let index = self.snapshot.current_segment;
                match self
                    .enter_integrated(Arc::new(timeline), index, resume)
                    .await
                {
                    Ok(()) => {
                        info!(segment = self.snapshot.current_segment, "Restored integrated playback");
                        self.publish();
                    }
                    Err(e) => {
                        warn!(error = %e, "Could not restore integrated playback");
                        if resume {
                            self.player.play();
                        }
                    }
                }
            }
            (BuildPurpose::Restore, Err(e)) => {
                warn!(error = %e, "Rebuild after mutation failed, staying in per-segment playback");
            }
        }
    }

    /// Put `timeline` in front of the player, positioned at the start of
    /// `preferred_index`'s range (or the first range when it has none).
    async fn enter_integrated(
        &mut self,
        timeline: Arc<Timeline>,
        preferred_index: usize,
        resume: bool,
    ) -> Result<(), PlaybackError> {
        let loaded = self
            .player
            .load(PlayerItem::Timeline(Arc::clone(&timeline)))
            .await?;

        let (index, start) = timeline
            .range_for_segment(preferred_index)
            .or_else(|| timeline.ranges().first())
            .map(|r| (r.segment_index, r.start()))
            .unwrap_or((0, RationalTime::ZERO));
        if !start.is_zero() {
            self.player.seek(start);
        }

        self.player_events = Some(loaded.events);
        self.snapshot.mode = PlaybackMode::Integrated;
        self.snapshot.current_segment = index;
        self.snapshot.position = start;
        self.snapshot.duration = timeline.duration();
        self.snapshot.timeline_generation = Some(timeline.generation());
        self.timeline = Some(timeline);

        if resume {
            self.player.play();
            self.snapshot.phase = PlaybackPhase::Playing;
        }
        Ok(())
    }

    /// Load the clip at `index` for per-segment playback. On error the
    /// previous item and state are left untouched.
    pub(crate) async fn load_clip(&mut self, index: usize) -> Result<(), PlaybackError> {
        let Some(segment) = self.segments.get(index) else {
            return Err(PlaybackError::NoSegment(index));
        };
        let loaded = self
            .player
            .load(PlayerItem::Clip {
                segment_id: segment.id,
                source: segment.source.clone(),
            })
            .await?;

        debug!(index, segment_id = segment.id, "Loaded clip");
        self.player_events = Some(loaded.events);
        self.timeline = None;
        self.snapshot.mode = PlaybackMode::PerSegment;
        self.snapshot.current_segment = index;
        self.snapshot.position = RationalTime::ZERO;
        self.snapshot.duration = loaded.duration;
        self.snapshot.timeline_generation = None;
        Ok(())
    }

    /// Per-segment playback from the first loadable clip.
    async fn fallback_to_per_segment(&mut self) {
        self.timeline = None;
        self.snapshot.mode = PlaybackMode::PerSegment;
        self.snapshot.timeline_generation = None;

        let all = (0..self.segments.len()).collect();
        if self.load_first_available(all).await.is_some() {
            self.snapshot.phase = PlaybackPhase::Ready;
            self.publish();
            return;
        }

        error!("No playable segments");
        self.release();
        self.snapshot.phase = PlaybackPhase::Idle;
        self.publish();
    }

    /// Load the first clip among `candidates` that resolves, in order.
    async fn load_first_available(&mut self, candidates: Vec<usize>) -> Option<usize> {
        for index in candidates {
            match self.load_clip(index).await {
                Ok(()) => return Some(index),
                Err(e) => warn!(index, error = %e, "Skipping unavailable clip"),
            }
        }
        None
    }

    // ── Transport ──────────────────────────────────────────────

    pub fn play(&mut self) {
        match self.snapshot.phase {
            PlaybackPhase::Ready | PlaybackPhase::Paused => {
                self.pending_resume = None;
                self.player.play();
                self.snapshot.phase = PlaybackPhase::Playing;
                self.publish();
            }
            phase => debug!(?phase, "Ignoring play"),
        }
    }

    pub fn pause(&mut self) {
        self.pending_resume = None;
        if self.snapshot.phase != PlaybackPhase::Playing {
            return;
        }
        self.player.pause();
        self.snapshot.phase = PlaybackPhase::Paused;
        self.sample();
        self.publish();
    }

    /// Seek to the start of the segment containing `time`. Integrated
    /// playback only.
    pub fn seek(&mut self, time: RationalTime) {
        let Some(timeline) = self.timeline.as_ref() else {
            debug!("Ignoring seek outside integrated playback");
            return;
        };
        let Some(range) = timeline.range_at(time.max(RationalTime::ZERO)) else {
            return;
        };
        let (index, start) = (range.segment_index, range.start());
        self.player.seek(start);
        self.snapshot.current_segment = index;
        self.snapshot.position = start;
        self.publish();
    }

    pub async fn next(&mut self) {
        self.step(true).await;
    }

    pub async fn previous(&mut self) {
        self.step(false).await;
    }

    async fn step(&mut self, forward: bool) {
        let delta: isize = if forward { 1 } else { -1 };
        if let Some(timeline) = self.timeline.clone() {
            let Some(position) = timeline.position_of_segment(self.snapshot.current_segment) else {
                return;
            };
            let Some(target) = position
                .checked_add_signed(delta)
                .and_then(|p| timeline.ranges().get(p))
            else {
                debug!(delta, "No neighboring segment");
                return;
            };
            self.seek(target.start());
            return;
        }

        if self.snapshot.mode != PlaybackMode::PerSegment {
            return;
        }
        let current = self.snapshot.current_segment;
        let candidates: Vec<usize> = if forward {
            (current + 1..self.segments.len()).collect()
        } else {
            (0..current).rev().collect()
        };
        if candidates.is_empty() {
            debug!(delta, "No neighboring segment");
            return;
        }

        let was_playing = self.snapshot.phase == PlaybackPhase::Playing;
        if was_playing {
            self.player.pause();
        }
        match self.load_first_available(candidates).await {
            Some(_) => {
                if was_playing {
                    self.snapshot.phase = PlaybackPhase::Paused;
                    self.schedule_resume();
                }
            }
            None => {
                debug!(delta, "No playable neighboring segment");
                if was_playing {
                    self.player.play();
                }
            }
        }
        self.publish();
    }

    /// Resume after the settle delay, unless something else happens first.
    fn schedule_resume(&mut self) {
        self.resume_token += 1;
        let token = self.resume_token;
        self.pending_resume = Some(token);

        let delay = self.settle_delay;
        let tx = self.internal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::Resume { token });
        });
    }

    // ── Clock and player events ────────────────────────────────

    /// Pull the playhead from the player and refresh the current segment.
    pub fn sample(&mut self) {
        if !matches!(
            self.snapshot.phase,
            PlaybackPhase::Playing | PlaybackPhase::Paused | PlaybackPhase::Ready
        ) {
            return;
        }
        let position = self.player.position();
        self.snapshot.position = position;
        if let Some(range) = self.timeline.as_ref().and_then(|t| t.range_at(position)) {
            self.snapshot.current_segment = range.segment_index;
        }
        self.publish();
    }

    pub(crate) async fn on_player_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::ReachedEnd => {
                if self.snapshot.phase != PlaybackPhase::Playing {
                    return;
                }
                match self.snapshot.mode {
                    PlaybackMode::Integrated => self.rewind_after_end(),
                    PlaybackMode::PerSegment => self.advance_after_clip_end().await,
                }
            }
        }
    }

    fn rewind_after_end(&mut self) {
        info!("Playback ended");
        self.snapshot.phase = PlaybackPhase::Ended;
        self.snapshot.position = self.snapshot.duration;
        self.publish();

        self.player.seek(RationalTime::ZERO);
        self.snapshot.current_segment = self
            .timeline
            .as_ref()
            .and_then(|t| t.ranges().first())
            .map_or(0, |r| r.segment_index);
        self.snapshot.position = RationalTime::ZERO;
        self.snapshot.phase = PlaybackPhase::Paused;
        self.publish();
    }

    async fn advance_after_clip_end(&mut self) {
        let later = (self.snapshot.current_segment + 1..self.segments.len()).collect();
        if self.load_first_available(later).await.is_some() {
            self.player.play();
            self.publish();
            return;
        }

        info!("Playback ended");
        self.snapshot.phase = PlaybackPhase::Ended;
        self.publish();

        let all = (0..self.segments.len()).collect();
        if self.load_first_available(all).await.is_none() {
            warn!("Could not rewind to first clip");
            self.player.seek(RationalTime::ZERO);
            self.snapshot.position = RationalTime::ZERO;
        }
        self.snapshot.phase = PlaybackPhase::Paused;
        self.publish();
    }

    // ── Mutation support ───────────────────────────────────────

    /// Pause and leave integrated playback ahead of a segment mutation.
    /// Returns whether integrated playback should be restored afterwards.
    pub(crate) async fn suspend_for_mutation(&mut self) -> bool {
        let restore = self.snapshot.mode == PlaybackMode::Integrated || self.pending_build.is_some();
        self.builder.cancel();
        self.pending_build = None;
        self.pending_resume = None;

        if self.snapshot.phase == PlaybackPhase::Playing {
            self.player.pause();
        }
        if matches!(
            self.snapshot.phase,
            PlaybackPhase::Playing | PlaybackPhase::Ready | PlaybackPhase::Loading { .. }
        ) {
            self.snapshot.phase = PlaybackPhase::Paused;
        }

        if self.snapshot.mode == PlaybackMode::Integrated {
            let index = self.snapshot.current_segment;
            if let Err(e) = self.load_clip(index).await {
                warn!(index, error = %e, "Could not load clip while suspending");
                self.player.unload();
                self.player_events = None;
                self.timeline = None;
                self.snapshot.mode = PlaybackMode::PerSegment;
                self.snapshot.timeline_generation = None;
            }
        }
        self.publish();
        restore
    }

    /// Adopt the segment list as it stands after a deletion. Returns the
    /// clamped current index.
    pub(crate) async fn adopt_segments(&mut self, segments: Vec<Segment>, restore: bool) -> usize {
        let count = segments.len();
        let index = self.snapshot.current_segment.min(count.saturating_sub(1));
        self.segments = segments;
        self.snapshot.segment_count = count;

        if let Err(e) = self.load_clip(index).await {
            warn!(index, error = %e, "Clip unavailable after deletion");
            self.fallback_to_per_segment().await;
        }
        if self.snapshot.phase != PlaybackPhase::Idle {
            self.snapshot.phase = PlaybackPhase::Paused;
        }

        if restore && count > 1 {
            self.spawn_build(BuildPurpose::Restore);
        }
        self.publish();
        self.snapshot.current_segment
    }

    // ── Teardown ───────────────────────────────────────────────

    fn release(&mut self) {
        self.builder.cancel();
        self.pending_build = None;
        self.pending_resume = None;
        self.player.pause();
        self.player.unload();
        self.player_events = None;
        self.timeline = None;
    }

    /// Stop everything and release the player item.
    pub fn teardown(&mut self) {
        self.release();
        self.snapshot.phase = PlaybackPhase::Idle;
        self.snapshot.timeline_generation = None;
        self.publish();
        debug!("Playback session torn down");
    }

    fn publish(&self) {
        self.publisher.send_if_modified(|current| {
            if *current == self.snapshot {
                return false;
            }
            if current.phase != self.snapshot.phase || current.mode != self.snapshot.mode {
                debug!(
                    phase = ?self.snapshot.phase,
                    mode = ?self.snapshot.mode,
                    segment = self.snapshot.current_segment,
                    "Playback state"
                );
            }
            *current = self.snapshot.clone();
            true
        });
    }
}
