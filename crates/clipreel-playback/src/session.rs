//! Playback session: an actor task that owns the controller and serializes
//! every command, clock tick and background result onto one context.

use clipreel_core::{ClipReelError, EngineConfig, RationalTime};
use clipreel_media::{CompositionBuilder, Timeline};
use clipreel_project::{ProjectId, ProjectStore, Segment, SegmentId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::{PlaybackController, SessionEvent};
use crate::coordinator::{DeletionOutcome, MutationCoordinator};
use crate::error::{MutationError, PlaybackError};
use crate::player::{Player, PlayerEvent};
use crate::state::PlaybackSnapshot;

/// Transport requests. Each is acknowledged with the snapshot taken right
/// after it was applied.
#[derive(Debug, Clone)]
pub enum Control {
    Load(Vec<Segment>),
    Play,
    Pause,
    Seek(RationalTime),
    Next,
    Previous,
}

enum Command {
    Control {
        op: Control,
        reply: oneshot::Sender<PlaybackSnapshot>,
    },
    DeleteSegment {
        segment_id: SegmentId,
        reply: oneshot::Sender<Result<DeletionOutcome, MutationError>>,
    },
    Timeline {
        reply: oneshot::Sender<Option<Arc<Timeline>>>,
    },
}

enum Step {
    Command(Command),
    Internal(SessionEvent),
    Player(PlayerEvent),
    Tick,
    Shutdown,
}

/// Spawns playback sessions.
pub struct PlaybackSession;

impl PlaybackSession {
    /// Spawn an empty session. Send [`Control::Load`] to give it segments.
    pub fn spawn(
        player: Arc<dyn Player>,
        builder: Arc<CompositionBuilder>,
        coordinator: MutationCoordinator,
        config: &EngineConfig,
    ) -> PlaybackHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PlaybackSnapshot::default());
        let cancel = CancellationToken::new();

        let controller = PlaybackController::new(player, builder, config, internal_tx, state_tx);
        let task = tokio::spawn(run(
            controller,
            coordinator,
            command_rx,
            internal_rx,
            cancel.clone(),
            config.sample_interval(),
        ));

        PlaybackHandle {
            commands: command_tx,
            state: state_rx,
            cancel,
            task: Some(task),
        }
    }

    /// Load `project_id` from the store and start a session over it.
    pub async fn open(
        store: Arc<dyn ProjectStore>,
        project_id: ProjectId,
        player: Arc<dyn Player>,
        builder: Arc<CompositionBuilder>,
        config: &EngineConfig,
    ) -> Result<PlaybackHandle, ClipReelError> {
        let project = store.load(project_id).await?;
        let coordinator = MutationCoordinator::new(store, project_id);
        let handle = Self::spawn(player, builder, coordinator, config);
        handle
            .control(Control::Load(project.segments))
            .await
            .map_err(|e| ClipReelError::Internal(e.to_string()))?;
        Ok(handle)
    }
}

async fn run(
    mut controller: PlaybackController,
    coordinator: MutationCoordinator,
    mut commands: mpsc::Receiver<Command>,
    mut internal: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: CancellationToken,
    sample_interval: Duration,
) {
    let mut ticker = tokio::time::interval(sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(project_id = coordinator.project_id(), "Playback session started");

    loop {
        let step = tokio::select! {
            _ = cancel.cancelled() => Step::Shutdown,
            command = commands.recv() => match command {
                Some(command) => Step::Command(command),
                None => Step::Shutdown,
            },
            Some(event) = internal.recv() => Step::Internal(event),
            event = next_player_event(&mut controller.player_events) => Step::Player(event),
            _ = ticker.tick() => Step::Tick,
        };

        match step {
            Step::Command(Command::Control { op, reply }) => {
                apply(&mut controller, op).await;
                let _ = reply.send(controller.snapshot().clone());
            }
            Step::Command(Command::DeleteSegment { segment_id, reply }) => {
                let outcome = coordinator.delete_segment(&mut controller, segment_id).await;
                let _ = reply.send(outcome);
            }
            Step::Command(Command::Timeline { reply }) => {
                let _ = reply.send(controller.timeline());
            }
            Step::Internal(event) => controller.on_session_event(event).await,
            Step::Player(event) => controller.on_player_event(event).await,
            Step::Tick => controller.sample(),
            Step::Shutdown => break,
        }
    }

    controller.teardown();
    info!(project_id = coordinator.project_id(), "Playback session stopped");
}

async fn apply(controller: &mut PlaybackController, op: Control) {
    debug!(?op, "Playback control");
    match op {
        Control::Load(segments) => controller.start(segments),
        Control::Play => controller.play(),
        Control::Pause => controller.pause(),
        Control::Seek(time) => controller.seek(time),
        Control::Next => controller.next().await,
        Control::Previous => controller.previous().await,
    }
}

/// Next event from the current item, or never if nothing is loaded.
async fn next_player_event(events: &mut Option<mpsc::Receiver<PlayerEvent>>) -> PlayerEvent {
    let Some(rx) = events.as_mut() else {
        return std::future::pending().await;
    };
    if let Some(event) = rx.recv().await {
        return event;
    }
    *events = None;
    std::future::pending().await
}

/// Client side of a playback session. Dropping it stops the session.
pub struct PlaybackHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<PlaybackSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    /// Apply a transport request and return the resulting snapshot.
    pub async fn control(&self, op: Control) -> Result<PlaybackSnapshot, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Control { op, reply })
            .await
            .map_err(|_| PlaybackError::SessionClosed)?;
        rx.await.map_err(|_| PlaybackError::SessionClosed)
    }

    pub async fn load(&self, segments: Vec<Segment>) -> Result<PlaybackSnapshot, PlaybackError> {
        self.control(Control::Load(segments)).await
    }

    pub async fn play(&self) -> Result<PlaybackSnapshot, PlaybackError> {
        self.control(Control::Play).await
    }

    pub async fn pause(&self) -> Result<PlaybackSnapshot, PlaybackError> {
        self.control(Control::Pause).await
    }

    pub async fn seek(&self, time: RationalTime) -> Result<PlaybackSnapshot, PlaybackError> {
        self.control(Control::Seek(time)).await
    }

    pub async fn next(&self) -> Result<PlaybackSnapshot, PlaybackError> {
        self.control(Control::Next).await
    }

    pub async fn previous(&self) -> Result<PlaybackSnapshot, PlaybackError> {
        self.control(Control::Previous).await
    }

    /// Delete a segment from the session's project.
    pub async fn delete_segment(&self, segment_id: SegmentId) -> Result<DeletionOutcome, MutationError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::DeleteSegment { segment_id, reply })
            .await
            .map_err(|_| MutationError::SessionClosed)?;
        rx.await.map_err(|_| MutationError::SessionClosed)?
    }

    /// The timeline in use, if integrated. Export can reuse it.
    pub async fn timeline(&self) -> Result<Option<Arc<Timeline>>, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Timeline { reply })
            .await
            .map_err(|_| PlaybackError::SessionClosed)?;
        rx.await.map_err(|_| PlaybackError::SessionClosed)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.state.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&PlaybackSnapshot) -> bool,
    ) -> Result<PlaybackSnapshot, PlaybackError> {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| PlaybackError::SessionClosed)?;
        Ok(snapshot.clone())
    }

    /// Stop the session and wait for it to release the player.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
