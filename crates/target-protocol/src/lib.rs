//! Text command protocol for the target daemon.
//!
//! Clients send chunks of single-letter commands separated by `;` or
//! newlines (for example `C;T1.5;A intro.wav;M1;R`). This crate turns those
//! chunks into typed [`Command`] values and renders the `\r\n`-terminated
//! replies. It performs no I/O.

#![warn(clippy::pedantic)]

pub mod command;
pub mod error;
pub mod reply;

pub use command::{parse_command, split_commands, Command, Position};
pub use error::ProtocolError;
pub use reply::{format_seconds, Reply, StatusReport};

/// Largest chunk read from a connection in one go.
pub const MAX_CHUNK_SIZE: usize = 1024;
