//! # targetd Test Utilities
//!
//! Shared test utilities for the target range daemon.
//!
//! ## Modules
//!
//! - `mock_gpio` - In-memory GPIO backend that records every line change
//! - `recording_audio` - Audio player that records what it was asked to play
//! - `client` - Protocol client for driving a daemon over TCP
//! - `harness` - `TestDaemon`, a real server on 127.0.0.1:0 wired to the doubles
//!
//! ## Usage
//!
//! ```rust,ignore
//! use targetd_test_utils::TestDaemon;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let daemon = TestDaemon::spawn().await.unwrap();
//!     let mut client = daemon.connect().await.unwrap();
//!
//!     assert_eq!(client.command("T1.5").await.unwrap(), "OK\r\n");
//!     let status = client.query().await.unwrap();
//!     assert_eq!(status.prog.as_deref(), Some("1.5"));
//! }
//! ```

pub mod client;
pub mod harness;
pub mod mock_gpio;
pub mod recording_audio;

pub use client::{Status, TestClient};
pub use harness::{TestDaemon, TestDaemonBuilder};
pub use mock_gpio::{LineEvent, MockGpio};
pub use recording_audio::{AudioPlay, RecordingAudioPlayer};
