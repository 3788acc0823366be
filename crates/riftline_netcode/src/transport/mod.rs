//! # Transport Layer
//!
//! Abstract message channel between roles.
//!
//! ## Design
//!
//! - Replication and prediction only see [`Transport`]; a real network
//!   implementation swaps in without touching them.
//! - Ordering is not assumed (sequence numbers carry it). Loss is not handled
//!   here; a lossy transport layers its own reliability underneath.
//! - [`LoopbackHub`] connects a server role and client roles in-process.

mod loopback;

pub use loopback::{LoopbackClient, LoopbackHub, LoopbackServer};

use riftline_shared::{GameEvent, InputCmd, PlayerId, Snapshot};

/// Message addressing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Peer {
    /// The server role.
    Server,
    /// One client role.
    Player(PlayerId),
    /// Every connected client role.
    All,
}

/// The three message kinds exchanged between roles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NetMessage {
    /// Client -> Server.
    Input(InputCmd),
    /// Server -> Client.
    Snapshot(Snapshot),
    /// Server -> Client.
    Event(GameEvent),
}

/// Message channel used by the replication layer.
pub trait Transport {
    /// Hands `message` to the channel for delivery to `to`. Never blocks.
    fn send(&mut self, to: Peer, message: NetMessage);

    /// Takes the next received message and its sender, if any. Never blocks.
    fn poll(&mut self) -> Option<(Peer, NetMessage)>;

    /// Takes every received message.
    fn drain(&mut self) -> Vec<(Peer, NetMessage)> {
        let mut messages = Vec::new();
        while let Some(message) = self.poll() {
            messages.push(message);
        }
        messages
    }
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportStats {
    /// Inputs sent.
    pub inputs_sent: u64,
    /// Snapshots sent.
    pub snapshots_sent: u64,
    /// Events sent.
    pub events_sent: u64,
    /// Messages received.
    pub messages_received: u64,
    /// Messages with no reachable recipient.
    pub undeliverable: u64,
}

impl TransportStats {
    fn record_sent(&mut self, message: &NetMessage) {
        match message {
            NetMessage::Input(_) => self.inputs_sent += 1,
            NetMessage::Snapshot(_) => self.snapshots_sent += 1,
            NetMessage::Event(_) => self.events_sent += 1,
        }
    }
}
