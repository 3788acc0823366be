//! # Replication Manager
//!
//! Role-aware input/state exchange. A process is either the server or one
//! client, never both.
//!
//! | Role   | Consumes                  | Produces                      |
//! |--------|---------------------------|-------------------------------|
//! | Server | `InputCmd` per player     | `Snapshot` per player, events |
//! | Client | `Snapshot`, `GameEvent`   | `InputCmd`                    |
//!
//! Both roles are driven by a [`TickClock`] they subscribe to at
//! construction. [`ReplicationManager::try_new`] refuses to build without one.

mod client;
mod journal;
mod server;

pub use client::{ClientReplication, ClientStats, Reconciliation};
pub use journal::EventJournal;
pub use server::{PlayerNetworkState, ServerReplication, ServerStats};

use std::sync::Arc;

use riftline_shared::PlayerId;

use crate::config::NetcodeConfig;
use crate::error::{NetcodeError, NetcodeResult};
use crate::metrics::MetricsSink;
use crate::tick::TickClock;
use crate::transport::Transport;

/// Which side of the connection this process plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Authoritative simulation.
    Server,
    /// Predicting client for one player.
    Client(PlayerId),
}

/// Replication manager for either role.
pub enum ReplicationManager<T: Transport> {
    /// Server role.
    Server(ServerReplication<T>),
    /// Client role.
    Client(ClientReplication<T>),
}

impl<T: Transport> ReplicationManager<T> {
    /// Creates a manager for `role` driven by `clock`.
    #[must_use]
    pub fn new(
        role: Role,
        config: &NetcodeConfig,
        clock: &mut TickClock,
        transport: T,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        match role {
            Role::Server => Self::Server(ServerReplication::new(config, clock, transport, metrics)),
            Role::Client(player_id) => Self::Client(ClientReplication::new(
                player_id, config, clock, transport, metrics,
            )),
        }
    }

    /// Creates a manager if a clock is available.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::MissingDependency`] if `clock` is `None`.
    pub fn try_new(
        role: Role,
        config: &NetcodeConfig,
        clock: Option<&mut TickClock>,
        transport: T,
        metrics: Arc<dyn MetricsSink>,
    ) -> NetcodeResult<Self> {
        let Some(clock) = clock else {
            tracing::error!(?role, "no tick clock, replication manager cannot advance");
            metrics.emit("tick.missing_dependency", &[]);
            return Err(NetcodeError::MissingDependency("tick clock"));
        };
        Ok(Self::new(role, config, clock, transport, metrics))
    }

    /// Role of this manager.
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Self::Server(_) => Role::Server,
            Self::Client(client) => Role::Client(client.player_id()),
        }
    }

    /// Runs one frame for whichever role this is.
    pub fn update(&mut self, delta_time: f32) {
        match self {
            Self::Server(server) => server.update(delta_time),
            Self::Client(client) => client.update(delta_time),
        }
    }

    /// Server side, if this is the server.
    #[must_use]
    pub fn as_server(&self) -> Option<&ServerReplication<T>> {
        match self {
            Self::Server(server) => Some(server),
            Self::Client(_) => None,
        }
    }

    /// Server side, mutably.
    pub fn as_server_mut(&mut self) -> Option<&mut ServerReplication<T>> {
        match self {
            Self::Server(server) => Some(server),
            Self::Client(_) => None,
        }
    }

    /// Client side, if this is a client.
    #[must_use]
    pub fn as_client(&self) -> Option<&ClientReplication<T>> {
        match self {
            Self::Client(client) => Some(client),
            Self::Server(_) => None,
        }
    }

    /// Client side, mutably.
    pub fn as_client_mut(&mut self) -> Option<&mut ClientReplication<T>> {
        match self {
            Self::Client(client) => Some(client),
            Self::Server(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;
    use crate::transport::LoopbackHub;

    #[test]
    fn test_missing_clock_fails_fast() {
        let sink = Arc::new(RecordingSink::new());
        let hub = LoopbackHub::new();

        let result = ReplicationManager::try_new(
            Role::Server,
            &NetcodeConfig::default(),
            None,
            hub.server(),
            sink.clone(),
        );

        assert!(matches!(result, Err(NetcodeError::MissingDependency("tick clock"))));
        assert_eq!(sink.count("tick.missing_dependency"), 1);
    }

    #[test]
    fn test_role_dispatch() {
        let config = NetcodeConfig::default();
        let sink = Arc::new(RecordingSink::new());
        let hub = LoopbackHub::new();
        let mut clock = TickClock::new(&config, sink.clone());

        let manager =
            ReplicationManager::try_new(Role::Client(3), &config, Some(&mut clock), hub.connect(3), sink)
                .unwrap();

        assert_eq!(manager.role(), Role::Client(3));
        assert!(manager.as_server().is_none());
        assert_eq!(manager.as_client().map(ClientReplication::player_id), Some(3));
    }
}
