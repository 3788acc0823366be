//! # Client-Side Prediction
//!
//! Bounds and reconciles the divergence between locally predicted and
//! server-confirmed state.
//!
//! ## How It Works
//!
//! ```text
//! Ticks:       [t1] [t2] [t3] [t4] [t5]        ring of PredictionFrames
//!                      │
//! Server:      S(t2) ──┘                       confirmed-state map
//!                      │
//! Compare:     S(t2).position vs P(t2).position
//!              error > threshold  =>  rebuild [t3, t4, t5] on top of S(t2)
//!                                     and hide the jump behind a decaying
//!                                     visual offset
//! ```
//!
//! ## Phases
//!
//! `Idle -> Predicting` once local input exists, `Predicting -> Reconciling`
//! when a correction is applied, back to `Predicting` once the visual offset
//! has settled. Reconciling never blocks new frames.

mod smoothing;

pub use smoothing::{ErrorSmoother, SETTLE_EPSILON};

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use riftline_shared::{InputCmd, Snapshot, Tick};

use crate::config::NetcodeConfig;
use crate::metrics::MetricsSink;
use crate::motion::InputApplier;

/// One predicted step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PredictionFrame {
    /// Tick this frame predicts.
    pub tick: Tick,
    /// Input the prediction used.
    pub input: InputCmd,
    /// Predicted state at the end of `tick`.
    pub predicted_state: Snapshot,
    /// Simulation time of the frame in seconds.
    pub timestamp: f64,
}

/// Client prediction state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PredictionPhase {
    /// No local input yet.
    #[default]
    Idle,
    /// Predicting ahead of confirmation.
    Predicting,
    /// A correction is still being smoothed out.
    Reconciling,
}

/// What a server snapshot did to the prediction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SnapshotOutcome {
    /// No frame exists for the snapshot's tick.
    Unmatched,
    /// Prediction was within the correction threshold.
    Accepted {
        /// Position error magnitude.
        error: f32,
    },
    /// Prediction diverged and was rebuilt.
    Corrected {
        /// Position error magnitude.
        error: f32,
        /// Frames replayed on top of the snapshot.
        replayed: usize,
    },
}

/// Prediction statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct PredictionStats {
    /// Frames created.
    pub frames_created: u64,
    /// Frames evicted by the ring capacity.
    pub frames_evicted: u64,
    /// Snapshots with no matching frame.
    pub unmatched_snapshots: u64,
    /// Corrections applied.
    pub corrections: u64,
    /// Largest position error seen.
    pub max_error: f32,
}

/// Client-only prediction engine.
pub struct PredictionEngine {
    applier: Arc<dyn InputApplier>,
    metrics: Arc<dyn MetricsSink>,
    tick_interval: f32,
    max_frames: usize,
    correction_threshold: f32,
    smoothing_speed: f32,
    /// Ring of predicted frames, ascending by tick.
    frames: VecDeque<PredictionFrame>,
    /// Authoritative states by tick.
    confirmed: BTreeMap<Tick, Snapshot>,
    current_input: InputCmd,
    current_tick: Tick,
    smoother: ErrorSmoother,
    phase: PredictionPhase,
    stats: PredictionStats,
}

impl PredictionEngine {
    /// Creates an idle engine.
    #[must_use]
    pub fn new(
        config: &NetcodeConfig,
        applier: Arc<dyn InputApplier>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            applier,
            metrics,
            tick_interval: config.tick_interval(),
            max_frames: config.max_prediction_frames,
            correction_threshold: config.correction_threshold,
            smoothing_speed: config.smoothing_speed,
            frames: VecDeque::with_capacity(config.max_prediction_frames + 1),
            confirmed: BTreeMap::new(),
            current_input: InputCmd::default(),
            current_tick: 0,
            smoother: ErrorSmoother::default(),
            phase: PredictionPhase::Idle,
            stats: PredictionStats::default(),
        }
    }

    /// Sets the input used by the next prediction frame.
    pub fn set_current_input(&mut self, input: InputCmd) {
        self.current_input = input;
        if self.phase == PredictionPhase::Idle {
            self.phase = PredictionPhase::Predicting;
        }
    }

    /// Predicts `tick` from the latest known state and the current input.
    pub fn create_prediction_frame(&mut self, tick: Tick) -> PredictionFrame {
        let base = self.base_state_for(tick);
        let mut predicted_state = self.applier.apply(&base, &self.current_input, self.tick_interval);
        predicted_state.tick = tick;
        predicted_state.last_processed_seq = self.current_input.sequence;

        let frame = PredictionFrame {
            tick,
            input: self.current_input,
            predicted_state,
            timestamp: f64::from(tick) * f64::from(self.tick_interval),
        };

        self.frames.push_back(frame);
        while self.frames.len() > self.max_frames {
            self.frames.pop_front();
            self.stats.frames_evicted += 1;
        }
        self.stats.frames_created += 1;

        self.current_tick = self.current_tick.max(tick);
        self.prune();

        frame
    }

    /// Newest of (previous frame, confirmed state at or before `tick`).
    fn base_state_for(&self, tick: Tick) -> Snapshot {
        let previous = self.frames.iter().rev().find(|f| f.tick < tick);
        let confirmed = self.confirmed.range(..=tick).next_back().map(|(_, s)| s);

        match (previous, confirmed) {
            (Some(frame), Some(snapshot)) if frame.tick > snapshot.tick => frame.predicted_state,
            (_, Some(snapshot)) => *snapshot,
            (Some(frame), None) => frame.predicted_state,
            (None, None) => Snapshot::empty(0),
        }
    }

    /// Records an authoritative state and corrects the ring if the matching
    /// frame diverged by more than the correction threshold.
    pub fn on_server_snapshot(&mut self, snapshot: &Snapshot) -> SnapshotOutcome {
        self.confirmed.insert(snapshot.tick, *snapshot);

        let Some(index) = self.frames.iter().position(|f| f.tick == snapshot.tick) else {
            self.stats.unmatched_snapshots += 1;
            tracing::trace!(tick = snapshot.tick, "no prediction frame for snapshot");
            self.prune();
            return SnapshotOutcome::Unmatched;
        };

        let predicted = self.frames[index].predicted_state;
        let position_error = snapshot.position - predicted.position;
        let error = position_error.length();
        self.stats.max_error = self.stats.max_error.max(error);

        self.metrics.emit(
            "prediction.error",
            &[("tick", f64::from(snapshot.tick)), ("error", f64::from(error))],
        );

        if error <= self.correction_threshold {
            self.prune();
            return SnapshotOutcome::Accepted { error };
        }

        let replayed = self.rebuild_from(index, snapshot);
        self.stats.corrections += 1;
        self.phase = PredictionPhase::Reconciling;

        tracing::info!(
            tick = snapshot.tick,
            error,
            replayed,
            "prediction diverged, replaying on top of server state"
        );
        self.metrics.emit(
            "prediction.reconcile",
            &[
                ("tick", f64::from(snapshot.tick)),
                ("error", f64::from(error)),
                ("replayed", replayed as f64),
            ],
        );

        self.prune();
        SnapshotOutcome::Corrected { error, replayed }
    }

    /// Replaces frame `index` with `snapshot` and re-predicts every later
    /// frame. The visible jump goes into the smoother.
    fn rebuild_from(&mut self, index: usize, snapshot: &Snapshot) -> usize {
        let before = self.latest_predicted();

        self.frames[index].predicted_state = *snapshot;
        let mut base = *snapshot;
        let mut replayed = 0;
        for frame in self.frames.iter_mut().skip(index + 1) {
            let mut state = self.applier.apply(&base, &frame.input, self.tick_interval);
            state.tick = frame.tick;
            state.last_processed_seq = frame.input.sequence;
            frame.predicted_state = state;
            base = state;
            replayed += 1;
        }

        let after = self.latest_predicted();
        self.smoother.absorb(
            before.position - after.position,
            before.velocity - after.velocity,
        );

        replayed
    }

    /// Decays the visual offset by `smoothing_speed * delta_time`.
    pub fn update_smoothing(&mut self, delta_time: f32) {
        if self.phase != PredictionPhase::Reconciling {
            return;
        }

        if self.smoother.decay(self.smoothing_speed * delta_time) {
            self.phase = PredictionPhase::Predicting;
            tracing::debug!(tick = self.current_tick, "correction smoothed out");
            self.metrics.emit(
                "prediction.smoothing_complete",
                &[("tick", f64::from(self.current_tick))],
            );
        }
    }

    /// Drops frames and confirmed states older than the prediction window.
    ///
    /// The newest confirmed state is always kept as a base.
    pub fn prune(&mut self) {
        let cutoff = self.current_tick.saturating_sub(self.window());

        while self.frames.front().is_some_and(|f| f.tick < cutoff) {
            self.frames.pop_front();
        }

        let newest = self.confirmed.last_key_value().map(|(tick, _)| *tick);
        let kept = self.confirmed.split_off(&cutoff);
        if kept.is_empty() {
            if let Some(tick) = newest {
                if let Some(snapshot) = self.confirmed.remove(&tick) {
                    self.confirmed.clear();
                    self.confirmed.insert(tick, snapshot);
                    return;
                }
            }
        }
        self.confirmed = kept;
    }

    fn window(&self) -> Tick {
        Tick::try_from(self.max_frames).unwrap_or(Tick::MAX)
    }

    /// Latest predicted state without the visual offset.
    #[must_use]
    pub fn latest_predicted(&self) -> Snapshot {
        self.frames.back().map_or_else(
            || {
                self.confirmed
                    .last_key_value()
                    .map_or(Snapshot::empty(0), |(_, s)| *s)
            },
            |f| f.predicted_state,
        )
    }

    /// Latest predicted state with the decaying visual offset applied.
    #[must_use]
    pub fn rendered_state(&self) -> Snapshot {
        let mut state = self.latest_predicted();
        state.position += self.smoother.position();
        state.velocity += self.smoother.velocity();
        state
    }

    /// Frame predicted for `tick`, if still buffered.
    #[must_use]
    pub fn frame(&self, tick: Tick) -> Option<&PredictionFrame> {
        self.frames.iter().find(|f| f.tick == tick)
    }

    /// Buffered frames, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = &PredictionFrame> {
        self.frames.iter()
    }

    /// Number of buffered frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Number of confirmed states held.
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.confirmed.len()
    }

    /// Input used by the next frame.
    #[must_use]
    pub const fn current_input(&self) -> &InputCmd {
        &self.current_input
    }

    /// Outstanding visual error.
    #[must_use]
    pub const fn smoother(&self) -> &ErrorSmoother {
        &self.smoother
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> PredictionPhase {
        self.phase
    }

    /// Statistics.
    #[must_use]
    pub const fn stats(&self) -> &PredictionStats {
        &self.stats
    }
}
