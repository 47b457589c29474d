//! Metric definitions for the target daemon.
//!
//! All metrics follow Prometheus naming conventions:
//! - `td_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Every label is bounded by an enum in code:
//! - `command`: 10 protocol commands
//! - `kind`: 6 protocol error kinds
//! - `outcome`: completed, stopped
//! - `position`: front, away
//! - `result`: spawned, failed
//! - `reason`: session close reasons (5 values)

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

/// Installs the Prometheus recorder and starts its HTTP listener on
/// `address`.
///
/// Must be called from inside the Tokio runtime, before any metric is
/// recorded.
///
/// # Errors
///
/// Returns error if the recorder is already installed or the listener
/// cannot be started.
pub fn init_metrics_recorder(address: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        // Programs run from a fraction of a second up to a few minutes
        .set_buckets_for_metric(
            Matcher::Full("td_program_duration_seconds".to_string()),
            &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0],
        )
        .map_err(|e| format!("Failed to set program duration buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("td_session_duration_seconds".to_string()),
            &[1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0],
        )
        .map_err(|e| format!("Failed to set session duration buckets: {e}"))?
        .with_http_listener(address)
        .install()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Set the number of open TCP sessions.
///
/// Metric: `td_sessions_open`
pub fn set_sessions_open(count: usize) {
    // usize to f64 conversion is safe for realistic session counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("td_sessions_open").set(count as f64);
}

/// Set whether a session currently holds control (0 or 1).
///
/// Metric: `td_session_active`
pub fn set_session_active(active: bool) {
    gauge!("td_session_active").set(if active { 1.0 } else { 0.0 });
}

/// Record a closed session and how long it lasted.
///
/// Metrics: `td_sessions_closed_total`, `td_session_duration_seconds`
/// Labels: `reason`
pub fn record_session_closed(reason: &'static str, duration: Duration) {
    counter!("td_sessions_closed_total", "reason" => reason).increment(1);
    histogram!("td_session_duration_seconds").record(duration.as_secs_f64());
}

/// Record a session dropped by the inactivity watchdog.
///
/// Metric: `td_watchdog_timeouts_total`
pub fn record_watchdog_timeout() {
    counter!("td_watchdog_timeouts_total").increment(1);
}

// ============================================================================
// Command Metrics
// ============================================================================

/// Record an executed protocol command.
///
/// Metric: `td_commands_total`
/// Labels: `command`
pub fn record_command(command: &'static str) {
    counter!("td_commands_total", "command" => command).increment(1);
}

/// Record a chunk that ended in an error reply.
///
/// Metric: `td_command_errors_total`
/// Labels: `kind`
pub fn record_command_error(kind: &'static str) {
    counter!("td_command_errors_total", "kind" => kind).increment(1);
}

// ============================================================================
// Program & Actuator Metrics
// ============================================================================

/// Record a finished program run.
///
/// Metrics: `td_programs_total`, `td_program_duration_seconds`
/// Labels: `outcome` (completed, stopped)
pub fn record_program_finished(outcome: &'static str, duration: Duration) {
    counter!("td_programs_total", "outcome" => outcome).increment(1);
    histogram!("td_program_duration_seconds").record(duration.as_secs_f64());
}

/// Set whether a program is running (0 or 1).
///
/// Metric: `td_program_running`
pub fn set_program_running(running: bool) {
    gauge!("td_program_running").set(if running { 1.0 } else { 0.0 });
}

/// Record a target move.
///
/// Metric: `td_target_moves_total`
/// Labels: `position`
pub fn record_target_move(position: &'static str) {
    counter!("td_target_moves_total", "position" => position).increment(1);
}

/// Record an audio play attempt.
///
/// Metric: `td_audio_plays_total`
/// Labels: `result` (spawned, failed)
pub fn record_audio_play(result: &'static str) {
    counter!("td_audio_plays_total", "result" => result).increment(1);
}

/// Record a manual button toggle.
///
/// Metric: `td_button_toggles_total`
pub fn record_button_toggle() {
    counter!("td_button_toggles_total").increment(1);
}

// ============================================================================
// Discovery Metrics
// ============================================================================

/// Record a discovery probe answered.
///
/// Metric: `td_discovery_replies_total`
pub fn record_discovery_reply() {
    counter!("td_discovery_replies_total").increment(1);
}
