//! # Session
//!
//! Composition root: one server process and any number of client processes,
//! each with its own [`TickClock`], wired over the in-process loopback.
//!
//! ```text
//! advance(dt)
//!   ├─ per client: clock.advance(dt) -> N steps
//!   │                └─ N x (poll InputSource, send_input)
//!   │              replication.update(dt)
//!   └─ server:     clock.advance(dt), replication.update(dt)
//! ```
//!
//! Nothing is reached through globals; every component gets what it needs
//! at construction.

use std::sync::Arc;

use riftline_shared::PlayerId;

use crate::config::NetcodeConfig;
use crate::error::NetcodeResult;
use crate::input::{InputSample, InputSource};
use crate::metrics::MetricsSink;
use crate::replication::{ClientReplication, ServerReplication};
use crate::tick::TickClock;
use crate::transport::{LoopbackClient, LoopbackHub, LoopbackServer};

/// One client process.
pub struct ClientNode {
    clock: TickClock,
    replication: ClientReplication<LoopbackClient>,
    input: Box<dyn InputSource>,
}

impl ClientNode {
    /// The client's own clock.
    #[must_use]
    pub const fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// The client's replication manager.
    #[must_use]
    pub const fn replication(&self) -> &ClientReplication<LoopbackClient> {
        &self.replication
    }

    fn advance(&mut self, delta_time: f32) {
        let steps = self.clock.advance(delta_time);
        for _ in 0..steps {
            let sample = InputSample::poll(self.input.as_ref());
            self.input.end_frame();
            self.replication.send_sample(sample);
        }
        self.replication.update(delta_time);
    }
}

/// Server and clients stepped together.
pub struct Session {
    config: NetcodeConfig,
    metrics: Arc<dyn MetricsSink>,
    hub: LoopbackHub,
    server_clock: TickClock,
    server: ServerReplication<LoopbackServer>,
    clients: Vec<ClientNode>,
    elapsed: f64,
}

impl Session {
    /// Creates a running server with no clients.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NetcodeError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn new(config: NetcodeConfig, metrics: Arc<dyn MetricsSink>) -> NetcodeResult<Self> {
        config.validate()?;

        let hub = LoopbackHub::new();
        let mut server_clock = TickClock::new(&config, Arc::clone(&metrics));
        let server = ServerReplication::new(&config, &mut server_clock, hub.server(), Arc::clone(&metrics));
        server_clock.start();

        Ok(Self {
            config,
            metrics,
            hub,
            server_clock,
            server,
            clients: Vec::new(),
            elapsed: 0.0,
        })
    }

    /// Connects a client for `player_id` driven by `input`.
    ///
    /// Returns false if the player is already connected.
    pub fn add_client(&mut self, player_id: PlayerId, input: Box<dyn InputSource>) -> bool {
        if self.client(player_id).is_some() {
            tracing::warn!(player_id, "player already connected");
            return false;
        }

        let mut clock = TickClock::new(&self.config, Arc::clone(&self.metrics));
        clock.sync_to(self.server_clock.current_tick());
        let replication = ClientReplication::new(
            player_id,
            &self.config,
            &mut clock,
            self.hub.connect(player_id),
            Arc::clone(&self.metrics),
        );
        clock.start();

        self.clients.push(ClientNode {
            clock,
            replication,
            input,
        });
        true
    }

    /// Disconnects a client. Returns false if it was not connected.
    pub fn remove_client(&mut self, player_id: PlayerId) -> bool {
        let Some(index) = self
            .clients
            .iter()
            .position(|node| node.replication.player_id() == player_id)
        else {
            return false;
        };

        self.clients.remove(index);
        self.hub.disconnect(player_id);
        self.server.disconnect_player(player_id);
        true
    }

    /// Steps every client, then the server.
    pub fn advance(&mut self, delta_time: f32) {
        for node in &mut self.clients {
            node.advance(delta_time);
        }

        self.server_clock.advance(delta_time);
        self.server.update(delta_time);
        self.elapsed += f64::from(delta_time.max(0.0));
    }

    /// The server's replication manager.
    #[must_use]
    pub const fn server(&self) -> &ServerReplication<LoopbackServer> {
        &self.server
    }

    /// The server's replication manager, mutably.
    pub fn server_mut(&mut self) -> &mut ServerReplication<LoopbackServer> {
        &mut self.server
    }

    /// The server's clock.
    #[must_use]
    pub const fn server_clock(&self) -> &TickClock {
        &self.server_clock
    }

    /// One client's replication manager.
    #[must_use]
    pub fn client(&self, player_id: PlayerId) -> Option<&ClientReplication<LoopbackClient>> {
        self.clients
            .iter()
            .map(|node| &node.replication)
            .find(|client| client.player_id() == player_id)
    }

    /// One client's replication manager, mutably.
    pub fn client_mut(&mut self, player_id: PlayerId) -> Option<&mut ClientReplication<LoopbackClient>> {
        self.clients
            .iter_mut()
            .map(|node| &mut node.replication)
            .find(|client| client.player_id() == player_id)
    }

    /// Every client process.
    pub fn clients(&self) -> impl Iterator<Item = &ClientNode> {
        self.clients.iter()
    }

    /// Simulated seconds since creation.
    #[must_use]
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &NetcodeConfig {
        &self.config
    }
}
