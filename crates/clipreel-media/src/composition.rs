//! Composition builder: turns an ordered segment list into one gapless
//! timeline plus a time-range index mapping timeline time to segments.
//!
//! Every build is tagged with a generation. Starting a build cancels the
//! one in flight, and progress for a generation that is no longer current
//! is dropped, so a slow superseded build can never report over a fresh one.

use clipreel_core::{EngineConfig, RationalTime, SegmentFailurePolicy, TimeRange};
use clipreel_project::{Segment, SegmentId};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BuildError;
use crate::probe::MediaSource;

// ── Timeline ───────────────────────────────────────────────────

/// The span of timeline time occupied by one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRange {
    /// Index of the segment in the list the timeline was built from.
    pub segment_index: usize,
    pub segment_id: SegmentId,
    /// Position on the timeline.
    pub range: TimeRange,
}

impl SegmentRange {
    pub fn start(&self) -> RationalTime {
        self.range.start
    }

    pub fn length(&self) -> RationalTime {
        self.range.duration
    }

    pub fn end(&self) -> RationalTime {
        self.range.end()
    }
}

/// Media placed on the timeline for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub range: SegmentRange,
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

/// A built composition. Read-only once built; playback and export share it
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Timeline {
    generation: u64,
    /// Segment IDs of the input list, in order, including skipped ones.
    built_from: Vec<SegmentId>,
    entries: Vec<TimelineEntry>,
    ranges: Vec<SegmentRange>,
    skipped: Vec<SegmentId>,
    duration: RationalTime,
}

impl Timeline {
    /// Generation of the build that produced this timeline.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total duration; equals the end of the last range.
    pub fn duration(&self) -> RationalTime {
        self.duration
    }

    /// The time-range index, contiguous from zero.
    pub fn ranges(&self) -> &[SegmentRange] {
        &self.ranges
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Segments that were left out because their media was unavailable.
    pub fn skipped(&self) -> &[SegmentId] {
        &self.skipped
    }

    /// Range containing `time`. Times past the end clamp to the last range,
    /// negative times to the first.
    pub fn range_at(&self, time: RationalTime) -> Option<&SegmentRange> {
        let last = self.ranges.last()?;
        if time >= last.end() {
            return Some(last);
        }
        self.ranges
            .iter()
            .find(|r| r.range.contains(time))
            .or_else(|| self.ranges.first())
    }

    /// Range occupied by the segment at `segment_index` of the input list.
    pub fn range_for_segment(&self, segment_index: usize) -> Option<&SegmentRange> {
        self.ranges.iter().find(|r| r.segment_index == segment_index)
    }

    /// Position of `segment_index`'s range within `ranges()`.
    pub fn position_of_segment(&self, segment_index: usize) -> Option<usize> {
        self.ranges.iter().position(|r| r.segment_index == segment_index)
    }

    /// True when this timeline was built from exactly this segment list.
    pub fn is_valid_for(&self, segments: &[Segment]) -> bool {
        self.built_from.len() == segments.len()
            && self.built_from.iter().zip(segments).all(|(id, s)| *id == s.id)
    }
}

// ── Builder ────────────────────────────────────────────────────

/// Progress of one build: `processed` of `total` segments appended.
/// `total` shrinks when segments are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildProgress {
    pub generation: u64,
    pub processed: usize,
    pub total: usize,
}

impl BuildProgress {
    /// Completion fraction (0.0 to 1.0).
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.processed as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// Claim on a build generation. Obtained from `CompositionBuilder::begin`.
#[derive(Debug, Clone)]
pub struct BuildTicket {
    generation: u64,
    cancel: CancellationToken,
}

impl BuildTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Builds timelines. At most one build per builder is live at a time.
pub struct CompositionBuilder {
    source: Arc<dyn MediaSource>,
    policy: SegmentFailurePolicy,
    progress_batch: usize,
    generation: AtomicU64,
    in_flight: Mutex<Option<BuildTicket>>,
}

impl CompositionBuilder {
    pub fn new(source: Arc<dyn MediaSource>, config: &EngineConfig) -> Self {
        Self {
            source,
            policy: config.failure_policy,
            progress_batch: config.progress_batch.max(1),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> SegmentFailurePolicy {
        self.policy
    }

    /// Start a new generation, cancelling the build in flight (if any).
    pub fn begin(&self) -> BuildTicket {
        let mut in_flight = self.in_flight.lock();
        if let Some(previous) = in_flight.take() {
            debug!(generation = previous.generation, "Superseding in-flight build");
            previous.cancel.cancel();
        }
        let ticket = BuildTicket {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            cancel: CancellationToken::new(),
        };
        *in_flight = Some(ticket.clone());
        ticket
    }

    /// Cancel whatever build is in flight.
    pub fn cancel(&self) {
        if let Some(ticket) = self.in_flight.lock().take() {
            ticket.cancel.cancel();
        }
    }

    /// Latest generation handed out.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    /// `begin` followed by `build`.
    pub async fn build_now(
        &self,
        segments: &[Segment],
        on_progress: impl FnMut(BuildProgress) + Send,
    ) -> Result<Timeline, BuildError> {
        let ticket = self.begin();
        self.build(&ticket, segments, on_progress).await
    }

    /// Build a timeline from `segments` under `ticket`'s generation.
    ///
    /// Progress is reported every `progress_batch` segments and reaches
    /// `(total, total)` exactly once, on success.
    pub async fn build(
        &self,
        ticket: &BuildTicket,
        segments: &[Segment],
        mut on_progress: impl FnMut(BuildProgress) + Send,
    ) -> Result<Timeline, BuildError> {
        let generation = ticket.generation;
        let result = self.compose(ticket, segments, &mut on_progress).await;
        self.finish(generation);

        match &result {
            Ok(timeline) => info!(
                generation,
                ranges = timeline.ranges.len(),
                skipped = timeline.skipped.len(),
                duration = %timeline.duration,
                "Timeline built"
            ),
            Err(e) => warn!(generation, error = %e, "Timeline build failed"),
        }
        result
    }

    async fn compose(
        &self,
        ticket: &BuildTicket,
        segments: &[Segment],
        on_progress: &mut (impl FnMut(BuildProgress) + Send),
    ) -> Result<Timeline, BuildError> {
        if segments.is_empty() {
            return Err(BuildError::Empty);
        }
        let generation = ticket.generation;
        let nominal = segments.len();
        debug!(generation, segments = nominal, "Building timeline");

        let mut cursor = RationalTime::ZERO;
        let mut entries = Vec::with_capacity(nominal);
        let mut skipped = Vec::new();

        for (index, segment) in segments.iter().enumerate() {
            if ticket.is_cancelled() {
                return Err(BuildError::Cancelled);
            }

            let resolved = tokio::select! {
                _ = ticket.cancel.cancelled() => return Err(BuildError::Cancelled),
                resolved = self.source.resolve(&segment.source) => resolved,
            };

            match resolved {
                Ok(info) => {
                    let range = SegmentRange {
                        segment_index: index,
                        segment_id: segment.id,
                        range: TimeRange::new(cursor, info.duration),
                    };
                    cursor += info.duration;
                    entries.push(TimelineEntry {
                        range,
                        source: info.path,
                        width: info.width,
                        height: info.height,
                        has_audio: info.has_audio,
                    });
                }
                Err(e) => match self.policy {
                    SegmentFailurePolicy::SkipAndContinue => {
                        warn!(generation, segment_id = segment.id, error = %e, "Skipping unavailable segment");
                        skipped.push(segment.id);
                    }
                    SegmentFailurePolicy::FailFast => {
                        warn!(generation, segment_id = segment.id, error = %e, "Segment unavailable, aborting build");
                        return Err(BuildError::SourceUnavailable(segment.id));
                    }
                },
            }

            let is_last = index + 1 == nominal;
            let processed = entries.len();
            if !is_last && processed > 0 && processed % self.progress_batch == 0 {
                self.report(
                    on_progress,
                    BuildProgress {
                        generation,
                        processed,
                        total: nominal - skipped.len(),
                    },
                );
            }
        }

        if entries.is_empty() {
            // Everything was skipped; nothing playable remains.
            return Err(BuildError::SourceUnavailable(skipped[0]));
        }
        if ticket.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let processed = entries.len();
        self.report(
            on_progress,
            BuildProgress {
                generation,
                processed,
                total: processed,
            },
        );

        let ranges = entries.iter().map(|e| e.range).collect();
        Ok(Timeline {
            generation,
            built_from: segments.iter().map(|s| s.id).collect(),
            entries,
            ranges,
            skipped,
            duration: cursor,
        })
    }

    fn report(&self, on_progress: &mut impl FnMut(BuildProgress), progress: BuildProgress) {
        if self.is_current(progress.generation) {
            on_progress(progress);
        } else {
            debug!(generation = progress.generation, "Dropping stale build progress");
        }
    }

    fn finish(&self, generation: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.as_ref().is_some_and(|t| t.generation == generation) {
            *in_flight = None;
        }
    }
}
