//! Reply encoding.

use std::fmt;
use std::time::Duration;

use crate::command::Position;

/// Reply sent when a chunk produced no other output.
pub const OK_REPLY: &str = "OK\r\n";

/// Accumulates reply fragments for one chunk.
///
/// A chunk aborted by an error is answered with
/// [`crate::ProtocolError::to_reply`] alone; its `Reply` is dropped unsent.
#[derive(Debug, Default, Clone)]
pub struct Reply {
    fragments: String,
}

impl Reply {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one command's reply fragment.
    pub fn push(&mut self, fragment: &str) {
        self.fragments.push_str(fragment);
    }

    /// Final reply text: the fragments, or `OK\r\n` when there were none.
    #[must_use]
    pub fn finish(self) -> String {
        if self.fragments.is_empty() {
            OK_REPLY.to_string()
        } else {
            self.fragments
        }
    }
}

/// Answer to the `Q` command.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    /// Time since the program started, if one is running.
    pub elapsed: Option<Duration>,
    /// Total program duration, if the program has steps.
    pub total: Option<Duration>,
    /// Commanded target position, if an actuator is present.
    pub position: Option<Position>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EXEC=")?;
        if let Some(elapsed) = self.elapsed {
            f.write_str(&format_seconds(elapsed))?;
        }
        write!(f, "\r\nPROG=")?;
        if let Some(total) = self.total {
            f.write_str(&format_seconds(total))?;
        }
        write!(f, "\r\nPOS=")?;
        if let Some(position) = self.position {
            write!(f, "{}", position.as_digit())?;
        }
        f.write_str("\r\n")
    }
}

/// Formats a duration as seconds at millisecond resolution, without
/// trailing zeros (`1.5`, `0.025`, `3`).
#[must_use]
pub fn format_seconds(duration: Duration) -> String {
    let millis = duration.as_millis();
    let whole = millis / 1000;
    let frac = millis % 1000;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:03}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
