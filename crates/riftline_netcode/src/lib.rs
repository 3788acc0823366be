//! # Riftline Netcode
//!
//! Fixed-tick authoritative simulation, server-to-client replication and
//! client-side prediction with smooth reconciliation.
//!
//! ## Architecture
//!
//! ```text
//! InputSource ─► ClientReplication ─► Transport ─► ServerReplication
//!                  │      ▲                            │
//!                  │      │                            ▼
//!                  │      │                     authoritative state
//!                  ▼      │                            │
//!          PredictionEngine ◄── Snapshot ◄─ Transport ◄┘
//!                  ▲
//!                  └──── TickClock (one per role process)
//! ```
//!
//! - **Tick Clock**: variable frame time in, fixed simulation steps out,
//!   capped per call.
//! - **Replication**: the server consumes one input per player per tick and
//!   sends snapshots on a timer; the client predicts its own inputs and
//!   reconciles when a snapshot confirms some of them.
//! - **Prediction**: a bounded ring of predicted frames, rebuilt on top of
//!   server truth when it diverges, with the jump hidden by error decay.
//!
//! ## Concurrency
//!
//! Single-threaded and cooperative. No call blocks or awaits; waiting for a
//! confirmation is state held in bounded buffers. Every buffer drops its
//! oldest entry on overflow.
//!
//! ## Example
//!
//! ```rust,ignore
//! use riftline_netcode::{metrics, NetcodeConfig, ScriptedInput, Session};
//!
//! let mut session = Session::new(NetcodeConfig::default(), metrics::noop())?;
//! session.add_client(1, Box::new(ScriptedInput::default()));
//! session.advance(1.0 / 60.0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod input;
pub mod metrics;
pub mod motion;
pub mod notify;
pub mod prediction;
pub mod replication;
pub mod session;
pub mod tick;
pub mod transport;

pub use config::{MotionParams, NetcodeConfig};
pub use error::{NetcodeError, NetcodeResult};
pub use input::{InputSample, InputSource, ScriptedInput};
pub use metrics::{MetricsSink, NoopSink, RecordingSink, TracingSink};
pub use motion::{AcceptAll, InputApplier, InputValidator, MotionModel};
pub use notify::{Notifier, Subscription, SubscriptionId};
pub use prediction::{PredictionEngine, PredictionFrame, PredictionPhase, SnapshotOutcome};
pub use replication::{
    ClientReplication, EventJournal, PlayerNetworkState, ReplicationManager, Role,
    ServerReplication,
};
pub use session::Session;
pub use tick::{ClockEvent, TickClock, TickStats};
pub use transport::{LoopbackHub, NetMessage, Peer, Transport};

pub use riftline_shared::{
    Buttons, GameEvent, GameEventType, InputCmd, PlayerId, SequenceNumber, Snapshot, Tick, Vec2,
    Vec3,
};
