//! Daemon error types.
//!
//! Client-visible failures are [`target_protocol::ProtocolError`] values and
//! never leave the session that produced them. `TdError` covers everything
//! else: startup failures, transport errors and internal channel failures.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::actuator::ActuatorError;
use crate::config::ConfigError;

/// Daemon error type.
#[derive(Debug, Error)]
pub enum TdError {
    /// Configuration was invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A listening socket could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Socket or process I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The actuator backend failed.
    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    /// The audio play command could not be prepared.
    #[error("Audio error: {0}")]
    Audio(String),

    /// Internal failure (actor channel closed, task join failed).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TdError {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            TdError::Config(_) => "config",
            TdError::Bind { .. } => "bind",
            TdError::Io(_) => "io",
            TdError::Actuator(_) => "actuator",
            TdError::Audio(_) => "audio",
            TdError::Internal(_) => "internal",
        }
    }
}
