//! Messages and shared types for the server and session actors.

use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::errors::TdError;

/// Identifies one TCP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection.
    PeerClosed,
    /// The client sent `X`.
    ClientExit,
    /// No data arrived within the inactivity timeout.
    IdleTimeout,
    /// The daemon is shutting down or the session was disconnected.
    Cancelled,
    /// Reading or writing the socket failed.
    TransportError,
}

impl CloseReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::ClientExit => "client_exit",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::Cancelled => "cancelled",
            CloseReason::TransportError => "transport_error",
        }
    }
}

/// Messages handled by the server actor.
#[derive(Debug)]
pub enum ServerMessage {
    /// Report current status.
    GetStatus {
        respond_to: oneshot::Sender<ServerStatus>,
    },

    /// Close one session.
    Disconnect {
        session_id: SessionId,
        respond_to: oneshot::Sender<Result<(), TdError>>,
    },

    /// Stop accepting, close every session and wait up to `deadline` for
    /// them to finish.
    Shutdown {
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), TdError>>,
    },
}

/// Snapshot of the server's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// Open sessions, including ones waiting for control.
    pub session_count: usize,
    /// Session currently in control.
    pub active_session: Option<SessionId>,
    /// Whether new connections are accepted.
    pub accepting: bool,
}
