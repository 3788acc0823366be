//! # Client Replication
//!
//! Sends local input, predicts it immediately and reconciles against server
//! snapshots.
//!
//! ```text
//! send_input ──► unacked FIFO ──► predicted_state = apply(predicted_state, cmd)
//!                                 └──► transport
//!
//! snapshot (last_processed_seq advanced)
//!      └──► reconcile pending ──(next update)──► drop acked inputs
//!                                                predicted_state = snapshot
//!                                                replay the rest in order
//! ```
//!
//! Reconciliation is deferred to [`ClientReplication::update`] so it never
//! runs while a notification is being delivered.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use riftline_shared::{Buttons, GameEvent, InputCmd, PlayerId, SequenceNumber, Snapshot, Tick, Vec2};

use crate::config::NetcodeConfig;
use crate::input::InputSample;
use crate::metrics::MetricsSink;
use crate::motion::{InputApplier, MotionModel};
use crate::notify::Subscription;
use crate::prediction::PredictionEngine;
use crate::tick::{ClockEvent, TickClock};
use crate::transport::{NetMessage, Peer, Transport};

/// Client statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClientStats {
    /// Inputs sent.
    pub inputs_sent: u64,
    /// Unacknowledged inputs dropped on overflow.
    pub input_overflows: u64,
    /// Snapshots received.
    pub snapshots_received: u64,
    /// Reconciliations performed.
    pub reconciliations: u64,
    /// Inputs replayed across all reconciliations.
    pub inputs_replayed: u64,
    /// Longest single replay.
    pub max_replay: usize,
    /// Events received.
    pub events_received: u64,
    /// Events dropped from a full inbox.
    pub events_dropped: u64,
}

/// Result of one reconciliation pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reconciliation {
    /// Inputs the server confirmed.
    pub acknowledged: usize,
    /// Inputs replayed on top of the snapshot.
    pub replayed: usize,
    /// Distance between the old and rebuilt predicted positions.
    pub correction: f32,
}

/// Client role of the replication manager.
pub struct ClientReplication<T: Transport> {
    player_id: PlayerId,
    transport: T,
    clock_events: Subscription<ClockEvent>,
    applier: Arc<dyn InputApplier>,
    metrics: Arc<dyn MetricsSink>,
    engine: PredictionEngine,
    tick_interval: f32,
    max_buffered_inputs: usize,
    next_sequence: SequenceNumber,
    /// Sent, not yet confirmed. Ascending by sequence.
    unacked: VecDeque<InputCmd>,
    /// Sent, not yet bound to a prediction frame.
    frame_inputs: VecDeque<InputCmd>,
    predicted_state: Snapshot,
    authoritative: Option<Snapshot>,
    snapshot_history: BTreeMap<Tick, Snapshot>,
    history_ticks: Tick,
    last_processed_seq: SequenceNumber,
    reconcile_pending: bool,
    inbox: VecDeque<GameEvent>,
    inbox_capacity: usize,
    stats: ClientStats,
}

impl<T: Transport> ClientReplication<T> {
    /// Creates a client for `player_id` subscribed to `clock`.
    #[must_use]
    pub fn new(
        player_id: PlayerId,
        config: &NetcodeConfig,
        clock: &mut TickClock,
        transport: T,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let applier: Arc<dyn InputApplier> = Arc::new(MotionModel::new(config.motion));
        tracing::info!(player_id, "client replication ready");

        Self {
            player_id,
            transport,
            clock_events: clock.subscribe(),
            engine: PredictionEngine::new(config, Arc::clone(&applier), Arc::clone(&metrics)),
            applier,
            metrics,
            tick_interval: config.tick_interval(),
            max_buffered_inputs: config.max_buffered_inputs,
            next_sequence: 1,
            unacked: VecDeque::with_capacity(config.max_buffered_inputs),
            frame_inputs: VecDeque::new(),
            predicted_state: Snapshot::empty(clock.current_tick()),
            authoritative: None,
            snapshot_history: BTreeMap::new(),
            history_ticks: config.snapshot_history_ticks(),
            last_processed_seq: 0,
            reconcile_pending: false,
            inbox: VecDeque::new(),
            inbox_capacity: config.event_journal_capacity,
            stats: ClientStats::default(),
        }
    }

    /// Replaces the input application used for prediction and replay.
    #[must_use]
    pub fn with_applier(mut self, config: &NetcodeConfig, applier: Arc<dyn InputApplier>) -> Self {
        self.engine = PredictionEngine::new(config, Arc::clone(&applier), Arc::clone(&self.metrics));
        self.applier = applier;
        self
    }

    /// Sends one input: sequences it, predicts it locally and hands it to the
    /// transport.
    pub fn send_input(&mut self, move_input: Vec2, buttons: Buttons) -> InputCmd {
        let cmd = InputCmd::new(self.next_sequence, move_input, buttons);
        self.next_sequence = self.next_sequence.wrapping_add(1);

        if self.unacked.len() >= self.max_buffered_inputs {
            if let Some(dropped) = self.unacked.pop_front() {
                self.stats.input_overflows += 1;
                tracing::warn!(
                    player_id = self.player_id,
                    dropped_seq = dropped.sequence,
                    capacity = self.max_buffered_inputs,
                    "unacknowledged input buffer full, dropping oldest"
                );
                self.metrics.emit(
                    "replication.input_overflow",
                    &[
                        ("player", f64::from(self.player_id)),
                        ("dropped_seq", f64::from(dropped.sequence)),
                    ],
                );
            }
        }
        self.unacked.push_back(cmd);

        if self.frame_inputs.len() >= self.max_buffered_inputs {
            self.frame_inputs.pop_front();
        }
        self.frame_inputs.push_back(cmd);

        self.predicted_state = self.applier.apply(&self.predicted_state, &cmd, self.tick_interval);
        self.predicted_state.last_processed_seq = cmd.sequence;

        self.transport.send(Peer::Server, NetMessage::Input(cmd));
        self.stats.inputs_sent += 1;
        cmd
    }

    /// Sends a sampled input.
    pub fn send_sample(&mut self, sample: InputSample) -> InputCmd {
        self.send_input(sample.move_input, sample.buttons)
    }

    /// Stores a snapshot and schedules reconciliation if it confirms new
    /// inputs.
    pub fn on_snapshot_received(&mut self, snapshot: Snapshot) {
        self.stats.snapshots_received += 1;

        self.snapshot_history.insert(snapshot.tick, snapshot);
        if let Some((&newest, _)) = self.snapshot_history.last_key_value() {
            let oldest_kept = newest.saturating_sub(self.history_ticks);
            self.snapshot_history = self.snapshot_history.split_off(&oldest_kept);
        }

        if snapshot.last_processed_seq > self.last_processed_seq {
            self.last_processed_seq = snapshot.last_processed_seq;
            self.authoritative = Some(snapshot);
            self.reconcile_pending = true;
        }

        self.engine.on_server_snapshot(&snapshot);
    }

    /// Rebuilds predicted state from the newest authoritative snapshot plus
    /// every input it does not cover.
    ///
    /// Returns `None` if nothing was pending.
    pub fn perform_reconciliation(&mut self) -> Option<Reconciliation> {
        if !self.reconcile_pending {
            return None;
        }
        self.reconcile_pending = false;
        let authoritative = self.authoritative?;

        let before = self.unacked.len();
        self.unacked.retain(|cmd| cmd.sequence > authoritative.last_processed_seq);
        let acknowledged = before - self.unacked.len();

        let previous = self.predicted_state;
        let mut state = authoritative;
        for cmd in &self.unacked {
            state = self.applier.apply(&state, cmd, self.tick_interval);
            state.last_processed_seq = cmd.sequence;
        }
        self.predicted_state = state;

        let replayed = self.unacked.len();
        let correction = previous.position.distance(state.position);

        self.stats.reconciliations += 1;
        self.stats.inputs_replayed += replayed as u64;
        self.stats.max_replay = self.stats.max_replay.max(replayed);

        tracing::debug!(
            player_id = self.player_id,
            last_processed_seq = authoritative.last_processed_seq,
            acknowledged,
            replayed,
            correction,
            "reconciled with server state"
        );
        self.metrics.emit(
            "replication.reconciliation",
            &[
                ("player", f64::from(self.player_id)),
                ("acknowledged", acknowledged as f64),
                ("replayed", replayed as f64),
                ("correction", f64::from(correction)),
            ],
        );

        Some(Reconciliation {
            acknowledged,
            replayed,
            correction,
        })
    }

    /// Runs one client frame: clock, transport, reconciliation, smoothing.
    pub fn update(&mut self, delta_time: f32) {
        while let Some(event) = self.clock_events.try_recv() {
            if let ClockEvent::TickAdvanced(tick) = event {
                if let Some(cmd) = self.frame_inputs.pop_front() {
                    self.engine.set_current_input(cmd);
                }
                self.engine.create_prediction_frame(tick);
            }
        }

        while let Some((from, message)) = self.transport.poll() {
            match message {
                NetMessage::Snapshot(snapshot) => self.on_snapshot_received(snapshot),
                NetMessage::Event(event) => self.receive_event(event),
                NetMessage::Input(_) => {
                    tracing::debug!(?from, "client ignoring input message");
                }
            }
        }

        self.perform_reconciliation();
        self.engine.update_smoothing(delta_time);
    }

    fn receive_event(&mut self, event: GameEvent) {
        self.stats.events_received += 1;
        if self.inbox.len() >= self.inbox_capacity {
            self.inbox.pop_front();
            self.stats.events_dropped += 1;
            tracing::warn!(player_id = self.player_id, "event inbox full, dropping oldest");
        }
        self.inbox.push_back(event);
    }

    /// Takes every received event in arrival order.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        self.inbox.drain(..).collect()
    }

    /// Player this client speaks for.
    #[must_use]
    pub const fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Authoritative state plus every unconfirmed input.
    #[must_use]
    pub const fn predicted_state(&self) -> &Snapshot {
        &self.predicted_state
    }

    /// What should be drawn: the latest prediction frame plus any correction
    /// still being smoothed out.
    #[must_use]
    pub fn rendered_state(&self) -> Snapshot {
        self.engine.rendered_state()
    }

    /// Newest snapshot that advanced the confirmed sequence.
    #[must_use]
    pub const fn authoritative(&self) -> Option<&Snapshot> {
        self.authoritative.as_ref()
    }

    /// Unconfirmed inputs, oldest first.
    pub fn unacked(&self) -> impl Iterator<Item = &InputCmd> {
        self.unacked.iter()
    }

    /// Number of unconfirmed inputs.
    #[must_use]
    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    /// Newest input sequence the server confirmed.
    #[must_use]
    pub const fn last_processed_seq(&self) -> SequenceNumber {
        self.last_processed_seq
    }

    /// True if a snapshot is waiting to be reconciled.
    #[must_use]
    pub const fn reconcile_pending(&self) -> bool {
        self.reconcile_pending
    }

    /// Snapshot stored for `tick`, if still in history.
    #[must_use]
    pub fn snapshot_at(&self, tick: Tick) -> Option<&Snapshot> {
        self.snapshot_history.get(&tick)
    }

    /// Snapshots held in history.
    #[must_use]
    pub fn snapshot_history_len(&self) -> usize {
        self.snapshot_history.len()
    }

    /// The prediction engine.
    #[must_use]
    pub const fn engine(&self) -> &PredictionEngine {
        &self.engine
    }

    /// Statistics.
    #[must_use]
    pub const fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;
    use crate::transport::{LoopbackClient, LoopbackHub};
    use riftline_shared::Vec3;

    fn client(config: &NetcodeConfig) -> (ClientReplication<LoopbackClient>, LoopbackHub, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let hub = LoopbackHub::new();
        let mut clock = TickClock::new(config, sink.clone());
        let client = ClientReplication::new(1, config, &mut clock, hub.connect(1), sink.clone());
        (client, hub, sink)
    }

    fn right() -> Vec2 {
        Vec2::new(1.0, 0.0)
    }

    #[test]
    fn test_sequences_start_at_one_and_increase() {
        let (mut client, hub, _) = client(&NetcodeConfig::default());
        let mut server = hub.server();

        let a = client.send_input(right(), Buttons::NONE);
        let b = client.send_input(right(), Buttons::NONE);

        assert_eq!((a.sequence, b.sequence), (1, 2));
        assert_eq!(server.drain().len(), 2);
        assert_eq!(client.unacked_count(), 2);
    }

    #[test]
    fn test_prediction_is_immediate() {
        let (mut client, _hub, _) = client(&NetcodeConfig::default());
        for _ in 0..5 {
            client.send_input(right(), Buttons::NONE);
        }
        assert!((client.predicted_state().position.x - 5.0 * 5.0 * 0.02).abs() < 1e-5);
        assert_eq!(client.predicted_state().last_processed_seq, 5);
    }

    #[test]
    fn test_reconciliation_is_deferred() {
        let (mut client, _hub, _) = client(&NetcodeConfig::default());
        client.send_input(right(), Buttons::NONE);

        let mut snapshot = Snapshot::empty(1);
        snapshot.last_processed_seq = 1;
        client.on_snapshot_received(snapshot);

        assert!(client.reconcile_pending());
        assert_eq!(client.unacked_count(), 1);

        client.update(0.0);
        assert!(!client.reconcile_pending());
        assert_eq!(client.unacked_count(), 0);
    }

    #[test]
    fn test_stale_snapshot_does_not_reconcile() {
        let (mut client, _hub, _) = client(&NetcodeConfig::default());
        for _ in 0..3 {
            client.send_input(right(), Buttons::NONE);
        }
        let mut newer = Snapshot::empty(5);
        newer.last_processed_seq = 2;
        client.on_snapshot_received(newer);
        client.perform_reconciliation();

        let mut older = Snapshot::empty(4);
        older.last_processed_seq = 1;
        client.on_snapshot_received(older);

        assert!(!client.reconcile_pending());
        assert!(client.perform_reconciliation().is_none());
        assert_eq!(client.last_processed_seq(), 2);
    }

    #[test]
    fn test_misprediction_is_corrected() {
        let (mut client, _hub, sink) = client(&NetcodeConfig::default());
        for _ in 0..4 {
            client.send_input(right(), Buttons::NONE);
        }

        // Server says we were blocked after two inputs
        let mut snapshot = Snapshot::empty(2);
        snapshot.last_processed_seq = 2;
        snapshot.position = Vec3::new(0.05, 0.0, 0.0);
        client.on_snapshot_received(snapshot);
        let report = client.perform_reconciliation().unwrap();

        assert_eq!(report.acknowledged, 2);
        assert_eq!(report.replayed, 2);
        assert!((client.predicted_state().position.x - 0.25).abs() < 1e-5);
        assert!((report.correction - 0.15).abs() < 1e-5);
        assert_eq!(sink.count("replication.reconciliation"), 1);
    }

    #[test]
    fn test_snapshot_history_is_pruned() {
        let config = NetcodeConfig::default();
        let (mut client, _hub, _) = client(&config);

        for tick in 0..200 {
            client.on_snapshot_received(Snapshot::empty(tick));
        }

        // 2 x 20 Hz = 40 ticks kept behind the newest
        assert_eq!(client.snapshot_history_len(), 41);
        assert!(client.snapshot_at(158).is_none());
        assert!(client.snapshot_at(159).is_some());
    }

    #[test]
    fn test_event_inbox() {
        let (mut client, hub, _) = client(&NetcodeConfig::default());
        let mut server = hub.server();
        let event = GameEvent::new(riftline_shared::GameEventType::UltimateUsed, 3, 1);
        server.send(Peer::Player(1), NetMessage::Event(event));

        client.update(0.0);

        assert_eq!(client.drain_events(), vec![event]);
        assert!(client.drain_events().is_empty());
    }
}
