//! In-process transport standing in for a real network.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use riftline_shared::PlayerId;

use super::{NetMessage, Peer, Transport, TransportStats};

/// Routes from the server to each connected client.
type RouteTable = Arc<RwLock<BTreeMap<PlayerId, Sender<NetMessage>>>>;

/// Wires one server endpoint to any number of client endpoints.
pub struct LoopbackHub {
    to_server: Sender<(PlayerId, NetMessage)>,
    server_inbox: Receiver<(PlayerId, NetMessage)>,
    routes: RouteTable,
}

impl LoopbackHub {
    /// Creates a hub with no clients.
    #[must_use]
    pub fn new() -> Self {
        let (to_server, server_inbox) = unbounded();
        Self {
            to_server,
            server_inbox,
            routes: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Creates the server endpoint.
    #[must_use]
    pub fn server(&self) -> LoopbackServer {
        LoopbackServer {
            inbox: self.server_inbox.clone(),
            routes: Arc::clone(&self.routes),
            stats: TransportStats::default(),
        }
    }

    /// Connects a client endpoint for `player`. Replaces any previous route.
    #[must_use]
    pub fn connect(&self, player: PlayerId) -> LoopbackClient {
        let (sender, inbox) = unbounded();
        self.routes.write().insert(player, sender);
        tracing::debug!(player, "loopback client connected");

        LoopbackClient {
            player,
            to_server: self.to_server.clone(),
            inbox,
            stats: TransportStats::default(),
        }
    }

    /// Removes the route to `player`. Returns false if it was not connected.
    pub fn disconnect(&self, player: PlayerId) -> bool {
        let removed = self.routes.write().remove(&player).is_some();
        if removed {
            tracing::debug!(player, "loopback client disconnected");
        }
        removed
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.routes.read().len()
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Server side of the loopback.
pub struct LoopbackServer {
    inbox: Receiver<(PlayerId, NetMessage)>,
    routes: RouteTable,
    stats: TransportStats,
}

impl LoopbackServer {
    /// Statistics.
    #[must_use]
    pub const fn stats(&self) -> &TransportStats {
        &self.stats
    }

    fn deliver(&mut self, player: PlayerId, sender: &Sender<NetMessage>, message: NetMessage) {
        if sender.send(message).is_ok() {
            self.stats.record_sent(&message);
        } else {
            self.stats.undeliverable += 1;
            tracing::debug!(player, "client endpoint dropped, message discarded");
        }
    }
}

impl Transport for LoopbackServer {
    fn send(&mut self, to: Peer, message: NetMessage) {
        match to {
            Peer::Player(player) => {
                let route = self.routes.read().get(&player).cloned();
                match route {
                    Some(sender) => self.deliver(player, &sender, message),
                    None => {
                        self.stats.undeliverable += 1;
                        tracing::debug!(player, "no route to player, message discarded");
                    }
                }
            }
            Peer::All => {
                let routes: Vec<_> = self
                    .routes
                    .read()
                    .iter()
                    .map(|(player, sender)| (*player, sender.clone()))
                    .collect();
                for (player, sender) in &routes {
                    self.deliver(*player, sender, message);
                }
            }
            Peer::Server => {
                self.stats.undeliverable += 1;
                tracing::warn!("server endpoint cannot send to itself");
            }
        }
    }

    fn poll(&mut self) -> Option<(Peer, NetMessage)> {
        let (player, message) = self.inbox.try_recv().ok()?;
        self.stats.messages_received += 1;
        Some((Peer::Player(player), message))
    }
}

/// Client side of the loopback.
pub struct LoopbackClient {
    player: PlayerId,
    to_server: Sender<(PlayerId, NetMessage)>,
    inbox: Receiver<NetMessage>,
    stats: TransportStats,
}

impl LoopbackClient {
    /// Player this endpoint belongs to.
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        self.player
    }

    /// Statistics.
    #[must_use]
    pub const fn stats(&self) -> &TransportStats {
        &self.stats
    }
}

impl Transport for LoopbackClient {
    fn send(&mut self, to: Peer, message: NetMessage) {
        if to != Peer::Server {
            self.stats.undeliverable += 1;
            tracing::warn!(player = self.player, ?to, "clients only talk to the server");
            return;
        }
        if self.to_server.send((self.player, message)).is_ok() {
            self.stats.record_sent(&message);
        } else {
            self.stats.undeliverable += 1;
        }
    }

    fn poll(&mut self) -> Option<(Peer, NetMessage)> {
        let message = self.inbox.try_recv().ok()?;
        self.stats.messages_received += 1;
        Some((Peer::Server, message))
    }
}
