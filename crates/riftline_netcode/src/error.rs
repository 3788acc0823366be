//! # Netcode Error Types
//!
//! Every failure here is recoverable. Callers log and keep simulating.

use riftline_shared::Tick;
use thiserror::Error;

/// Errors that can occur in the netcode layer.
#[derive(Error, Debug)]
pub enum NetcodeError {
    /// Rollback requested to a tick that has not happened yet.
    #[error("invalid rollback target: requested tick {requested}, current tick {current}")]
    InvalidRollback {
        /// Requested target tick.
        requested: Tick,
        /// Tick counter at the time of the request.
        current: Tick,
    },

    /// A required collaborator was not supplied at construction.
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file is not valid TOML.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for netcode operations.
pub type NetcodeResult<T> = Result<T, NetcodeError>;
