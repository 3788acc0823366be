//! # Server Replication
//!
//! Buffers per-player inputs, consumes exactly one per player per tick and
//! sends each player a snapshot on a fixed timer.
//!
//! ```text
//! transport ──Input──► PlayerNetworkState.queue ──(1 per tick)──► authoritative state
//!                                                                      │
//! snapshot timer (snapshot_rate Hz) ◄──────────────────────────────────┘
//!      └──► Snapshot { tick, last_processed_seq = last_processed_input } ──► transport
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use riftline_shared::{GameEvent, GameEventType, InputCmd, PlayerId, SequenceNumber, Snapshot, Tick};

use crate::config::NetcodeConfig;
use crate::metrics::MetricsSink;
use crate::motion::{AcceptAll, InputApplier, InputValidator, MotionModel};
use crate::notify::Subscription;
use crate::tick::{ClockEvent, TickClock};
use crate::transport::{NetMessage, Peer, Transport};

use super::journal::EventJournal;

/// Server-side record of one connected player.
#[derive(Clone, Debug)]
pub struct PlayerNetworkState {
    player_id: PlayerId,
    input_queue: VecDeque<InputCmd>,
    last_processed_input: SequenceNumber,
    state: Snapshot,
    dropped_inputs: u64,
}

impl PlayerNetworkState {
    fn new(player_id: PlayerId, capacity: usize) -> Self {
        Self {
            player_id,
            input_queue: VecDeque::with_capacity(capacity),
            last_processed_input: 0,
            state: Snapshot::empty(0),
            dropped_inputs: 0,
        }
    }

    /// Player id.
    #[must_use]
    pub const fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Inputs waiting for a tick.
    #[must_use]
    pub fn queued_inputs(&self) -> usize {
        self.input_queue.len()
    }

    /// Newest input sequence applied to the authoritative state.
    #[must_use]
    pub const fn last_processed_input(&self) -> SequenceNumber {
        self.last_processed_input
    }

    /// Authoritative state.
    #[must_use]
    pub const fn state(&self) -> &Snapshot {
        &self.state
    }

    /// Inputs lost to the queue limit.
    #[must_use]
    pub const fn dropped_inputs(&self) -> u64 {
        self.dropped_inputs
    }
}

/// Server statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerStats {
    /// Inputs received.
    pub inputs_received: u64,
    /// Inputs applied.
    pub inputs_processed: u64,
    /// Inputs refused by the validator.
    pub inputs_rejected: u64,
    /// Inputs dropped on queue overflow.
    pub inputs_dropped: u64,
    /// Player-ticks with no queued input.
    pub starved_ticks: u64,
    /// Snapshots handed to the transport.
    pub snapshots_sent: u64,
    /// Events broadcast.
    pub events_broadcast: u64,
    /// Players created.
    pub players_joined: u64,
    /// Players removed.
    pub players_left: u64,
}

/// Server role of the replication manager.
pub struct ServerReplication<T: Transport> {
    transport: T,
    clock_events: Subscription<ClockEvent>,
    players: BTreeMap<PlayerId, PlayerNetworkState>,
    applier: Arc<dyn InputApplier>,
    validator: Box<dyn InputValidator>,
    metrics: Arc<dyn MetricsSink>,
    journal: EventJournal,
    tick_interval: f32,
    snapshot_interval: f32,
    snapshot_timer: f32,
    max_buffered_inputs: usize,
    current_tick: Tick,
    stats: ServerStats,
}

impl<T: Transport> ServerReplication<T> {
    /// Creates a server subscribed to `clock`.
    #[must_use]
    pub fn new(
        config: &NetcodeConfig,
        clock: &mut TickClock,
        transport: T,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        tracing::info!(
            tick_rate = config.tick_rate,
            snapshot_rate = config.snapshot_rate,
            "server replication ready"
        );

        Self {
            transport,
            clock_events: clock.subscribe(),
            players: BTreeMap::new(),
            applier: Arc::new(MotionModel::new(config.motion)),
            validator: Box::new(AcceptAll),
            metrics,
            journal: EventJournal::new(config.event_journal_capacity),
            tick_interval: config.tick_interval(),
            snapshot_interval: config.snapshot_interval(),
            snapshot_timer: 0.0,
            max_buffered_inputs: config.max_buffered_inputs,
            current_tick: clock.current_tick(),
            stats: ServerStats::default(),
        }
    }

    /// Replaces the authoritative input application.
    #[must_use]
    pub fn with_applier(mut self, applier: Arc<dyn InputApplier>) -> Self {
        self.applier = applier;
        self
    }

    /// Installs an input validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Box<dyn InputValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Queues an input from `player_id`, creating its state on first contact.
    ///
    /// Never blocks. A full queue drops its oldest input.
    pub fn receive_input(&mut self, player_id: PlayerId, cmd: InputCmd) {
        self.stats.inputs_received += 1;

        if !self.validator.validate(player_id, &cmd) {
            self.stats.inputs_rejected += 1;
            tracing::debug!(player_id, seq = cmd.sequence, "input rejected by validator");
            return;
        }

        if !self.players.contains_key(&player_id) {
            self.add_player(player_id);
        }
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };

        if player.input_queue.len() >= self.max_buffered_inputs {
            if let Some(dropped) = player.input_queue.pop_front() {
                player.dropped_inputs += 1;
                self.stats.inputs_dropped += 1;
                tracing::warn!(
                    player_id,
                    dropped_seq = dropped.sequence,
                    capacity = self.max_buffered_inputs,
                    "player input queue full, dropping oldest"
                );
                self.metrics.emit(
                    "replication.server_input_overflow",
                    &[
                        ("player", f64::from(player_id)),
                        ("dropped_seq", f64::from(dropped.sequence)),
                    ],
                );
            }
        }
        player.input_queue.push_back(cmd);
    }

    fn add_player(&mut self, player_id: PlayerId) {
        self.players.insert(
            player_id,
            PlayerNetworkState::new(player_id, self.max_buffered_inputs),
        );
        self.stats.players_joined += 1;

        tracing::info!(player_id, tick = self.current_tick, "player joined");
        self.metrics.emit(
            "replication.player_joined",
            &[("player", f64::from(player_id))],
        );
        self.broadcast_event(GameEvent::new(
            GameEventType::PlayerSpawned,
            self.current_tick,
            player_id,
        ));
    }

    /// Removes a player without disturbing the others.
    ///
    /// Returns false if the player was unknown.
    pub fn disconnect_player(&mut self, player_id: PlayerId) -> bool {
        let Some(player) = self.players.remove(&player_id) else {
            return false;
        };
        self.stats.players_left += 1;

        tracing::info!(
            player_id,
            pending_inputs = player.input_queue.len(),
            "player disconnected"
        );
        self.metrics.emit(
            "replication.player_left",
            &[("player", f64::from(player_id))],
        );
        self.broadcast_event(
            GameEvent::new(GameEventType::PlayerDisconnected, self.current_tick, player_id)
                .at(player.state.position),
        );
        true
    }

    /// Overwrites a player's authoritative state, for server-only rules such
    /// as respawns or knockback. Keeps the input receipt.
    ///
    /// Returns false if the player is unknown.
    pub fn set_state(&mut self, player_id: PlayerId, state: Snapshot) -> bool {
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        player.state = state;
        player.state.last_processed_seq = player.last_processed_input;
        tracing::debug!(player_id, "authoritative state overridden");
        true
    }

    /// Records `event` in the journal and sends it to every client.
    pub fn broadcast_event(&mut self, event: GameEvent) {
        self.journal.record(event);
        self.stats.events_broadcast += 1;
        self.transport.send(Peer::All, NetMessage::Event(event));
    }

    /// Consumes one queued input per player.
    fn on_tick(&mut self, tick: Tick) {
        self.current_tick = tick;

        for player in self.players.values_mut() {
            let Some(cmd) = player.input_queue.pop_front() else {
                self.stats.starved_ticks += 1;
                continue;
            };

            let mut next = self.applier.apply(&player.state, &cmd, self.tick_interval);
            player.last_processed_input = player.last_processed_input.max(cmd.sequence);
            next.tick = tick;
            next.last_processed_seq = player.last_processed_input;
            player.state = next;
            self.stats.inputs_processed += 1;
        }
    }

    /// Sends every player its own state.
    fn send_snapshots(&mut self) {
        for player in self.players.values() {
            let mut snapshot = player.state;
            snapshot.tick = self.current_tick;
            snapshot.last_processed_seq = player.last_processed_input;

            self.transport
                .send(Peer::Player(player.player_id), NetMessage::Snapshot(snapshot));
            self.stats.snapshots_sent += 1;
        }
        tracing::trace!(
            tick = self.current_tick,
            players = self.players.len(),
            "snapshots sent"
        );
    }

    /// Drains the transport, then the clock, then runs the snapshot timer.
    pub fn update(&mut self, delta_time: f32) {
        while let Some((from, message)) = self.transport.poll() {
            match (from, message) {
                (Peer::Player(player_id), NetMessage::Input(cmd)) => {
                    self.receive_input(player_id, cmd);
                }
                (from, message) => {
                    tracing::debug!(?from, ?message, "server ignoring unexpected message");
                }
            }
        }

        while let Some(event) = self.clock_events.try_recv() {
            if let ClockEvent::TickAdvanced(tick) = event {
                self.on_tick(tick);
            }
        }

        self.snapshot_timer += delta_time.max(0.0);
        if self.snapshot_timer >= self.snapshot_interval {
            // One send per update; extra elapsed intervals would repeat the same state
            self.snapshot_timer = (self.snapshot_timer - self.snapshot_interval) % self.snapshot_interval;
            self.send_snapshots();
        }
    }

    /// State of one player.
    #[must_use]
    pub fn player(&self, player_id: PlayerId) -> Option<&PlayerNetworkState> {
        self.players.get(&player_id)
    }

    /// Connected players in id order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerNetworkState> {
        self.players.values()
    }

    /// Number of connected players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Broadcast events retained for replay.
    #[must_use]
    pub const fn journal(&self) -> &EventJournal {
        &self.journal
    }

    /// Last tick seen from the clock.
    #[must_use]
    pub const fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Statistics.
    #[must_use]
    pub const fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;
    use crate::transport::LoopbackHub;
    use riftline_shared::{Buttons, Vec2};

    struct Fixture {
        clock: TickClock,
        server: ServerReplication<crate::transport::LoopbackServer>,
        hub: LoopbackHub,
        sink: Arc<RecordingSink>,
    }

    fn fixture(config: &NetcodeConfig) -> Fixture {
        let sink = Arc::new(RecordingSink::new());
        let hub = LoopbackHub::new();
        let mut clock = TickClock::new(config, sink.clone());
        clock.start();
        let server = ServerReplication::new(config, &mut clock, hub.server(), sink.clone());
        Fixture { clock, server, hub, sink }
    }

    fn right(seq: u32) -> InputCmd {
        InputCmd::new(seq, Vec2::new(1.0, 0.0), Buttons::NONE)
    }

    fn tick(f: &mut Fixture) {
        let dt = f.clock.tick_interval();
        f.clock.advance(dt);
        f.server.update(dt);
    }

    #[test]
    fn test_one_input_per_player_per_tick() {
        let mut f = fixture(&NetcodeConfig::default());
        for seq in 1..=3 {
            f.server.receive_input(1, right(seq));
        }
        f.server.receive_input(2, right(1));

        tick(&mut f);
        assert_eq!(f.server.player(1).map(|p| p.last_processed_input()), Some(1));
        assert_eq!(f.server.player(1).map(|p| p.queued_inputs()), Some(2));
        assert_eq!(f.server.player(2).map(|p| p.queued_inputs()), Some(0));

        // Player 2 starves, player 1 keeps draining
        tick(&mut f);
        assert_eq!(f.server.player(1).map(|p| p.last_processed_input()), Some(2));
        assert_eq!(f.server.player(2).map(|p| p.last_processed_input()), Some(1));
        assert_eq!(f.server.stats().starved_ticks, 1);
    }

    #[test]
    fn test_snapshot_timer_and_receipt() {
        let mut f = fixture(&NetcodeConfig::default());
        let mut client = f.hub.connect(1);
        for seq in 1..=5 {
            f.server.receive_input(1, right(seq));
        }

        // 20 Hz snapshots at 50 Hz ticks: sends on tick 3, then tick 5 or 6
        let mut snapshots = Vec::new();
        for _ in 0..7 {
            tick(&mut f);
            for (_, message) in client.drain() {
                if let NetMessage::Snapshot(s) = message {
                    snapshots.push(s);
                }
            }
        }

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].tick, 3);
        assert_eq!(snapshots[0].last_processed_seq, 3);
        assert!((snapshots[0].position.x - 3.0 * 5.0 * 0.02).abs() < 1e-5);
        assert!(snapshots[1].last_processed_seq >= snapshots[0].last_processed_seq);
    }

    #[test]
    fn test_last_processed_never_decreases() {
        let mut f = fixture(&NetcodeConfig::default());
        f.server.receive_input(1, right(5));
        f.server.receive_input(1, right(2));

        tick(&mut f);
        tick(&mut f);

        assert_eq!(f.server.player(1).map(|p| p.last_processed_input()), Some(5));
    }

    #[test]
    fn test_queue_overflow_drops_oldest() {
        let config = NetcodeConfig {
            max_buffered_inputs: 3,
            ..NetcodeConfig::default()
        };
        let mut f = fixture(&config);
        for seq in 1..=4 {
            f.server.receive_input(9, right(seq));
        }

        assert_eq!(f.server.player(9).map(|p| p.queued_inputs()), Some(3));
        assert_eq!(f.sink.count("replication.server_input_overflow"), 1);

        tick(&mut f);
        assert_eq!(f.server.player(9).map(|p| p.last_processed_input()), Some(2));
    }

    #[test]
    fn test_lifecycle_events_are_journaled() {
        let mut f = fixture(&NetcodeConfig::default());
        let mut client = f.hub.connect(2);
        f.server.receive_input(1, right(1));
        f.server.receive_input(2, right(1));

        assert!(f.server.disconnect_player(1));
        assert!(!f.server.disconnect_player(1));
        assert_eq!(f.server.player_count(), 1);

        let kinds: Vec<_> = f.server.journal().replay().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                GameEventType::PlayerSpawned,
                GameEventType::PlayerSpawned,
                GameEventType::PlayerDisconnected
            ]
        );
        assert_eq!(client.drain().len(), 3);
        assert_eq!(f.sink.count("replication.player_joined"), 2);
        assert_eq!(f.sink.count("replication.player_left"), 1);
    }

    #[test]
    fn test_validator_extension_point() {
        struct PositiveOnly;
        impl InputValidator for PositiveOnly {
            fn validate(&self, _player: PlayerId, cmd: &InputCmd) -> bool {
                cmd.sequence > 0
            }
        }

        let config = NetcodeConfig::default();
        let sink = Arc::new(RecordingSink::new());
        let hub = LoopbackHub::new();
        let mut clock = TickClock::new(&config, sink.clone());
        let mut server = ServerReplication::new(&config, &mut clock, hub.server(), sink)
            .with_validator(Box::new(PositiveOnly));

        server.receive_input(1, right(0));
        assert_eq!(server.player_count(), 0);
        assert_eq!(server.stats().inputs_rejected, 1);
    }
}
