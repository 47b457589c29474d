//! Observability for the target daemon.
//!
//! Logging uses `tracing` with per-component targets (`td.session`,
//! `td.server`, `td.program`, `td.actuator`, `td.gpio`, `td.audio`,
//! `td.discovery`, `td.button`). Session ids and peer addresses are logged;
//! the discovery token never is.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `td_sessions_open` | Gauge | none | Open TCP sessions |
//! | `td_session_active` | Gauge | none | 1 while a session holds control |
//! | `td_sessions_closed_total` | Counter | `reason` | Session closes by cause |
//! | `td_session_duration_seconds` | Histogram | none | Session lifetime |
//! | `td_watchdog_timeouts_total` | Counter | none | Sessions dropped for inactivity |
//! | `td_commands_total` | Counter | `command` | Executed commands |
//! | `td_command_errors_total` | Counter | `kind` | Error replies |
//! | `td_programs_total` | Counter | `outcome` | Finished program runs |
//! | `td_program_duration_seconds` | Histogram | none | Program run time |
//! | `td_program_running` | Gauge | none | 1 while a program runs |
//! | `td_target_moves_total` | Counter | `position` | Target pulses |
//! | `td_audio_plays_total` | Counter | `result` | Audio play attempts |
//! | `td_button_toggles_total` | Counter | none | Manual button toggles |
//! | `td_discovery_replies_total` | Counter | none | Discovery probes answered |

pub mod metrics;

pub use metrics::init_metrics_recorder;
