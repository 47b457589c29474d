//! Target range daemon library.
//!
//! A small daemon that lets one networked client drive a shooting range
//! installation: a turning target (moved by pulsing GPIO lines) and an audio
//! player. Clients speak a line-oriented text protocol over TCP, build a
//! timed program of delays, audio cues and target moves, and run it; the
//! daemon executes the program on its own clock and can stop it at any time.
//!
//! # Architecture
//!
//! - [`actors::ServerHandle`] fronts the server actor, which accepts
//!   connections and supervises sessions
//! - [`actors::SessionActor`] handles one connection: parsing, dispatch,
//!   inactivity watchdog
//! - [`program::ProgramRunner`] executes a program snapshot on its own task
//! - [`installation::Installation`] holds the hardware and records which
//!   session has control
//! - [`discovery::DiscoveryResponder`] answers UDP broadcast probes
//! - [`button`] toggles the target by hand while nobody has control

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actors;
pub mod actuator;
pub mod audio;
pub mod button;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod installation;
pub mod lights;
pub mod observability;
pub mod program;
