//! # Tick Clock
//!
//! Converts variable frame delta-time into fixed simulation steps.
//!
//! ## Design
//!
//! Each consumed interval runs, in order:
//!
//! ```text
//! tick += 1
//!   (a) drain queued inputs   -> ClockEvent::InputApplied { tick, cmd }
//!   (b) tick advanced         -> ClockEvent::TickAdvanced(tick)
//!   (c) fixed update          -> ClockEvent::FixedUpdate(interval)
//! ```
//!
//! At most `max_ticks_per_frame` steps run per [`TickClock::advance`] call.
//! Anything left in the accumulator is deferred to the next call, never
//! dropped or fast-forwarded.
//!
//! `advance` takes `&mut self`; it cannot be re-entered.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use riftline_shared::{InputCmd, SequenceNumber, Snapshot, Tick};

use crate::config::NetcodeConfig;
use crate::error::{NetcodeError, NetcodeResult};
use crate::metrics::MetricsSink;
use crate::notify::{Notifier, Subscription, SubscriptionId};

/// Notification emitted by the clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClockEvent {
    /// A queued input was drained for this tick.
    InputApplied {
        /// Tick the input is applied on.
        tick: Tick,
        /// The input.
        cmd: InputCmd,
    },
    /// The tick counter moved forward.
    TickAdvanced(Tick),
    /// One fixed step of the given length (seconds) elapsed.
    FixedUpdate(f32),
    /// A snapshot was stamped by [`TickClock::broadcast_snapshot`].
    Snapshot(Snapshot),
}

/// Clock statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickStats {
    /// Ticks executed since creation.
    pub total_ticks: u64,
    /// `advance` calls cut short by the max-steps guard.
    pub capped_frames: u64,
    /// Most steps taken by a single `advance` call.
    pub max_steps_in_frame: u32,
    /// Successful rollbacks.
    pub rollbacks: u64,
    /// Rejected rollbacks.
    pub rejected_rollbacks: u64,
    /// Queued inputs dropped on overflow.
    pub dropped_inputs: u64,
    /// Notifications evicted from full subscriber channels.
    pub evicted_notifications: u64,
}

/// Fixed-step simulation clock.
///
/// Owns the authoritative tick counter.
pub struct TickClock {
    /// Length of one step in seconds.
    tick_interval: f32,
    /// Spiral-of-death guard.
    max_ticks_per_frame: u32,
    /// Time not yet consumed by a step.
    accumulator: f32,
    /// Authoritative tick counter.
    current_tick: Tick,
    /// Whether `advance` accumulates.
    running: bool,
    /// Inputs waiting for the next step.
    input_queue: VecDeque<InputCmd>,
    /// Last input per sequence number, for rollback lookups.
    input_history: BTreeMap<SequenceNumber, InputCmd>,
    /// Capacity of both input buffers.
    input_capacity: usize,
    /// Sequence of the most recently drained input.
    last_drained_seq: SequenceNumber,
    notifier: Notifier<ClockEvent>,
    metrics: Arc<dyn MetricsSink>,
    stats: TickStats,
}

impl TickClock {
    /// Creates a stopped clock at tick 0.
    #[must_use]
    pub fn new(config: &NetcodeConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            max_ticks_per_frame: config.max_ticks_per_frame,
            accumulator: 0.0,
            current_tick: 0,
            running: false,
            input_queue: VecDeque::with_capacity(config.max_buffered_inputs),
            input_history: BTreeMap::new(),
            input_capacity: config.max_buffered_inputs,
            last_drained_seq: 0,
            notifier: Notifier::new(config.notification_capacity),
            metrics,
            stats: TickStats::default(),
        }
    }

    /// Starts accumulating. Resets the accumulator, keeps the tick counter.
    pub fn start(&mut self) {
        self.running = true;
        self.accumulator = 0.0;
        tracing::debug!(tick = self.current_tick, "tick clock started");
    }

    /// Stops accumulating.
    pub fn stop(&mut self) {
        self.running = false;
        tracing::debug!(tick = self.current_tick, "tick clock stopped");
    }

    /// Adds a subscriber for clock notifications.
    pub fn subscribe(&mut self) -> Subscription<ClockEvent> {
        self.notifier.subscribe()
    }

    /// Removes a subscriber.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Feeds `delta_time` seconds into the clock and runs due steps.
    ///
    /// Returns the number of steps executed (0 to `max_ticks_per_frame`).
    pub fn advance(&mut self, delta_time: f32) -> u32 {
        if !self.running {
            return 0;
        }
        if delta_time.is_nan() || delta_time < 0.0 {
            tracing::warn!(delta_time, "ignoring negative frame delta");
            return 0;
        }

        self.accumulator += delta_time;

        let mut steps = 0;
        while self.accumulator >= self.tick_interval && steps < self.max_ticks_per_frame {
            self.accumulator -= self.tick_interval;
            steps += 1;
            self.step();
        }

        self.stats.max_steps_in_frame = self.stats.max_steps_in_frame.max(steps);

        if self.accumulator >= self.tick_interval {
            // Cut short: the rest waits for the next call
            let deferred_ticks = (self.accumulator / self.tick_interval).floor();
            self.stats.capped_frames += 1;
            tracing::warn!(
                tick = self.current_tick,
                steps,
                deferred_ticks,
                "tick clock hit max steps per frame, deferring remainder"
            );
            self.metrics.emit(
                "tick.overrun",
                &[
                    ("tick", f64::from(self.current_tick)),
                    ("steps", f64::from(steps)),
                    ("deferred_ticks", f64::from(deferred_ticks)),
                ],
            );
        }

        steps
    }

    /// One fixed step.
    fn step(&mut self) {
        self.current_tick = self.current_tick.saturating_add(1);
        self.stats.total_ticks += 1;
        let tick = self.current_tick;

        // (a) drain-and-apply queued inputs
        while let Some(cmd) = self.input_queue.pop_front() {
            self.last_drained_seq = cmd.sequence;
            self.dispatch(ClockEvent::InputApplied { tick, cmd });
        }

        // (b) tick advanced
        self.dispatch(ClockEvent::TickAdvanced(tick));

        // (c) fixed update
        self.dispatch(ClockEvent::FixedUpdate(self.tick_interval));
    }

    fn dispatch(&mut self, event: ClockEvent) {
        let report = self.notifier.emit(&event);
        if report.evicted > 0 {
            self.stats.evicted_notifications += report.evicted as u64;
            tracing::warn!(
                tick = self.current_tick,
                evicted = report.evicted,
                "clock subscriber not draining, evicted oldest notifications"
            );
            self.metrics.emit(
                "notify.overflow",
                &[("evicted", report.evicted as f64)],
            );
        }
    }

    /// Queues an input for the next step.
    ///
    /// Both the queue and the by-sequence history are bounded; the oldest
    /// entry is dropped on overflow.
    pub fn queue_input(&mut self, cmd: InputCmd) {
        if self.input_queue.len() >= self.input_capacity {
            if let Some(dropped) = self.input_queue.pop_front() {
                self.stats.dropped_inputs += 1;
                tracing::warn!(
                    dropped_seq = dropped.sequence,
                    capacity = self.input_capacity,
                    "clock input queue full, dropping oldest"
                );
                self.metrics.emit(
                    "tick.input_overflow",
                    &[("dropped_seq", f64::from(dropped.sequence))],
                );
            }
        }
        self.input_queue.push_back(cmd);

        self.input_history.insert(cmd.sequence, cmd);
        while self.input_history.len() > self.input_capacity {
            self.input_history.pop_first();
        }
    }

    /// Stamps `state` with the current tick and the oldest still-queued input
    /// sequence, then notifies subscribers.
    ///
    /// With an empty queue the most recently drained sequence is used.
    pub fn broadcast_snapshot(&mut self, state: &Snapshot) -> Snapshot {
        let mut snapshot = *state;
        snapshot.tick = self.current_tick;
        snapshot.last_processed_seq = self
            .input_queue
            .front()
            .map_or(self.last_drained_seq, |cmd| cmd.sequence);

        self.dispatch(ClockEvent::Snapshot(snapshot));
        snapshot
    }

    /// Rewinds the clock for deterministic replay tooling.
    ///
    /// Never used during live play.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::InvalidRollback`] if `tick` is in the future;
    /// the clock is left unchanged.
    pub fn reset_to_tick(&mut self, tick: Tick) -> NetcodeResult<()> {
        if tick > self.current_tick {
            self.stats.rejected_rollbacks += 1;
            tracing::warn!(
                requested = tick,
                current = self.current_tick,
                "rejected rollback to a future tick"
            );
            self.metrics.emit(
                "tick.rollback_rejected",
                &[
                    ("requested", f64::from(tick)),
                    ("current", f64::from(self.current_tick)),
                ],
            );
            return Err(NetcodeError::InvalidRollback {
                requested: tick,
                current: self.current_tick,
            });
        }

        tracing::info!(from = self.current_tick, to = tick, "rolling back tick clock");
        self.metrics.emit(
            "tick.rollback",
            &[
                ("from", f64::from(self.current_tick)),
                ("to", f64::from(tick)),
            ],
        );
        self.current_tick = tick;
        self.accumulator = 0.0;
        self.stats.rollbacks += 1;
        Ok(())
    }

    /// Jumps forward to `tick` without running any steps.
    ///
    /// Lets a client joining a running session count ticks in step with the
    /// server. Never moves backwards.
    pub fn sync_to(&mut self, tick: Tick) {
        if tick > self.current_tick {
            tracing::debug!(from = self.current_tick, to = tick, "tick clock synced forward");
            self.current_tick = tick;
        }
    }

    /// Looks up a recently queued input by sequence number.
    #[must_use]
    pub fn input_for_sequence(&self, sequence: SequenceNumber) -> Option<&InputCmd> {
        self.input_history.get(&sequence)
    }

    /// Current tick.
    #[must_use]
    pub const fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Unconsumed time in seconds.
    #[must_use]
    pub const fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Step length in seconds.
    #[must_use]
    pub const fn tick_interval(&self) -> f32 {
        self.tick_interval
    }

    /// Whether the clock accumulates.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Inputs waiting for the next step.
    #[must_use]
    pub fn queued_inputs(&self) -> usize {
        self.input_queue.len()
    }

    /// Statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }
}
