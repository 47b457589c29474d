//! Client-visible error kinds.

use thiserror::Error;

/// Errors reported to the client as `ERROR=<Kind>\r\n`.
///
/// Every variant is session-local and recoverable: the connection stays open
/// and the client may send the next chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ProtocolError {
    /// Malformed or missing command argument.
    #[error("malformed or missing argument")]
    Syntax,

    /// Operation not allowed while a program is running.
    #[error("a program is executing")]
    Executing,

    /// Attempt to run a program with no steps.
    #[error("program is empty")]
    Empty,

    /// No target actuator is available.
    #[error("no target actuator available")]
    Target,

    /// Another session currently controls the installation.
    #[error("installation is controlled by another session")]
    Busy,

    /// Command letter not recognised.
    #[error("unknown command")]
    UnknownCommand,
}

impl ProtocolError {
    /// Returns the kind as it appears on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProtocolError::Syntax => "Syntax",
            ProtocolError::Executing => "Executing",
            ProtocolError::Empty => "Empty",
            ProtocolError::Target => "Target",
            ProtocolError::Busy => "Busy",
            ProtocolError::UnknownCommand => "UnknownCommand",
        }
    }

    /// Renders the full error reply line.
    #[must_use]
    pub fn to_reply(&self) -> String {
        format!("ERROR={}\r\n", self.as_str())
    }
}
