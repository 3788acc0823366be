//! # Riftline Shared
//!
//! Immutable value records exchanged between the server role and client roles.
//!
//! ```text
//! CLIENT                              SERVER
//!   |                                    |
//!   |--- InputCmd (seq N) -------------->|  queued, one consumed per tick
//!   |                                    |
//!   |<-- Snapshot (last_processed_seq) --|  every snapshot period
//!   |<-- GameEvent ----------------------|  at most once
//! ```
//!
//! The sequence number on [`InputCmd`] is the correlation key between a
//! client's predicted frame and the server's confirmation of it.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod math;
pub mod messages;

pub use math::{Vec2, Vec3};
pub use messages::{
    Buttons, GameEvent, GameEventType, InputCmd, PlayerId, SequenceNumber, Snapshot, Tick,
};
