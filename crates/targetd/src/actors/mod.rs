//! Actor model for the control protocol.
//!
//! # Actor Hierarchy
//!
//! ```text
//! ServerActor (singleton)
//! ├── owns the TCP listener and the server-ready light
//! └── supervises N SessionActors
//!     └── SessionActor (per connection)
//!         ├── owns its program and program runner
//!         └── program run task (while running)
//! ```
//!
//! # Cancellation
//!
//! Tokens form a tree: daemon shutdown token → server → session → program
//! run. Cancelling a parent cancels every descendant.

pub mod messages;
pub mod server;
pub mod session;

pub use messages::{CloseReason, ServerMessage, ServerStatus, SessionId};
pub use server::{ServerHandle, DEFAULT_SHUTDOWN_DEADLINE};
pub use session::{SessionActor, SessionExit, SessionHandle, SessionSettings};
