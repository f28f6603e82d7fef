//! Player boundary and a headless clock-driven implementation.
//!
//! The session drives a [`Player`] through a small transport surface and
//! learns about end-of-item through the event receiver handed back by
//! [`Player::load`]. Loading a new item invalidates the previous receiver.

use async_trait::async_trait;
use clipreel_core::RationalTime;
use clipreel_media::{MediaSource, Timeline};
use clipreel_project::SegmentId;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::PlaybackError;

/// What to put in front of the player.
#[derive(Debug, Clone)]
pub enum PlayerItem {
    /// The concatenated timeline.
    Timeline(Arc<Timeline>),
    /// One segment's clip file.
    Clip {
        segment_id: SegmentId,
        source: PathBuf,
    },
}

/// Notifications from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Playback reached the end of the loaded item.
    ReachedEnd,
}

/// A loaded item.
#[derive(Debug)]
pub struct LoadedItem {
    pub duration: RationalTime,
    /// Events for this item only.
    pub events: mpsc::Receiver<PlayerEvent>,
}

/// Transport surface the playback session drives.
#[async_trait]
pub trait Player: Send + Sync {
    /// Replace the current item. On error the previous item stays loaded.
    async fn load(&self, item: PlayerItem) -> Result<LoadedItem, PlaybackError>;

    fn play(&self);

    fn pause(&self);

    /// Move the playhead; keeps the playing/paused state.
    fn seek(&self, to: RationalTime);

    fn position(&self) -> RationalTime;

    /// Drop the current item and release its resources.
    fn unload(&self);
}

// ── Clock player ───────────────────────────────────────────────

#[derive(Debug, Default)]
struct ClockState {
    /// Bumped on every load/unload so stale end timers stay silent.
    item: u64,
    duration: RationalTime,
    /// Playhead at the last transport change.
    anchor: RationalTime,
    /// Set while playing.
    started: Option<Instant>,
    end_timer: Option<JoinHandle<()>>,
    events: Option<mpsc::Sender<PlayerEvent>>,
}

impl ClockState {
    fn position(&self) -> RationalTime {
        match self.started {
            Some(started) => {
                let elapsed = RationalTime::from_duration(started.elapsed());
                (self.anchor + elapsed).clamp_to(RationalTime::ZERO, self.duration)
            }
            None => self.anchor,
        }
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.end_timer.take() {
            timer.abort();
        }
    }
}

/// A player that plays nothing: it advances a clock over the item's
/// resolved duration and reports the end on time. Runs on the tokio clock,
/// so paused-time tests drive it deterministically.
#[derive(Clone)]
pub struct ClockPlayer {
    source: Arc<dyn MediaSource>,
    state: Arc<Mutex<ClockState>>,
}

impl ClockPlayer {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(ClockState::default())),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().started.is_some()
    }

    fn arm_end_timer(&self, state: &mut ClockState) {
        state.stop_timer();
        let remaining = (state.duration - state.anchor).clamp_to(RationalTime::ZERO, state.duration);
        let item = state.item;
        let shared = Arc::clone(&self.state);

        state.end_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining.to_duration()).await;
            let mut state = shared.lock();
            if state.item != item || state.started.is_none() {
                return;
            }
            state.anchor = state.duration;
            state.started = None;
            state.end_timer = None;
            if let Some(events) = &state.events {
                let _ = events.try_send(PlayerEvent::ReachedEnd);
            }
        }));
    }
}

#[async_trait]
impl Player for ClockPlayer {
    async fn load(&self, item: PlayerItem) -> Result<LoadedItem, PlaybackError> {
        let duration = match &item {
            PlayerItem::Timeline(timeline) => timeline.duration(),
            PlayerItem::Clip { segment_id, source } => {
                self.source
                    .resolve(source)
                    .await
                    .map_err(|e| PlaybackError::ClipUnavailable {
                        segment_id: *segment_id,
                        reason: e.to_string(),
                    })?
                    .duration
            }
        };

        let (tx, rx) = mpsc::channel(4);
        let mut state = self.state.lock();
        state.stop_timer();
        state.item += 1;
        state.duration = duration;
        state.anchor = RationalTime::ZERO;
        state.started = None;
        state.events = Some(tx);
        debug!(item = state.item, duration = %duration, "Player item loaded");

        Ok(LoadedItem { duration, events: rx })
    }

    fn play(&self) {
        let mut state = self.state.lock();
        if state.started.is_some() || state.events.is_none() {
            return;
        }
        state.started = Some(Instant::now());
        self.arm_end_timer(&mut state);
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if state.started.is_none() {
            return;
        }
        state.anchor = state.position();
        state.started = None;
        state.stop_timer();
    }

    fn seek(&self, to: RationalTime) {
        let mut state = self.state.lock();
        state.anchor = to.clamp_to(RationalTime::ZERO, state.duration);
        if state.started.is_some() {
            state.started = Some(Instant::now());
            self.arm_end_timer(&mut state);
        }
    }

    fn position(&self) -> RationalTime {
        self.state.lock().position()
    }

    fn unload(&self) {
        let mut state = self.state.lock();
        state.stop_timer();
        state.item += 1;
        state.duration = RationalTime::ZERO;
        state.anchor = RationalTime::ZERO;
        state.started = None;
        state.events = None;
    }
}
