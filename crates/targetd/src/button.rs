//! Manual toggle button.
//!
//! A push button next to the target lets range staff turn it by hand. The
//! button is polled; a press counts once it has been held for
//! [`DEBOUNCE`], and fires once per press. Presses are ignored while a
//! session holds control.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::actuator::{ActuatorError, GpioDriver};
use crate::installation::Installation;
use crate::observability::metrics;

/// Button sampling interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long the button must be held before a press counts.
pub const DEBOUNCE: Duration = Duration::from_millis(20);

/// Debounces raw samples into presses.
#[derive(Debug, Default)]
pub struct Debouncer {
    held_since: Option<Instant>,
    fired: bool,
}

impl Debouncer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample taken at `now`. Returns `true` exactly once per
    /// press, when it has been held for [`DEBOUNCE`].
    pub fn sample(&mut self, pressed: bool, now: Instant) -> bool {
        if !pressed {
            self.held_since = None;
            self.fired = false;
            return false;
        }

        let since = *self.held_since.get_or_insert(now);
        if !self.fired && now.saturating_duration_since(since) >= DEBOUNCE {
            self.fired = true;
            return true;
        }
        false
    }
}

/// Spawns the button watcher. It exits when `cancel_token` is cancelled,
/// when the backend has no button, or when there is no target to toggle.
pub fn spawn_button_watcher(
    installation: Arc<Installation>,
    driver: Arc<dyn GpioDriver>,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(watch(installation, driver, cancel_token))
}

#[instrument(skip_all, name = "td.button")]
async fn watch(
    installation: Arc<Installation>,
    driver: Arc<dyn GpioDriver>,
    cancel_token: CancellationToken,
) {
    let Some(target) = installation.target().cloned() else {
        debug!(target: "td.button", "No target actuator, button watcher not started");
        return;
    };

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut debouncer = Debouncer::new();

    info!(target: "td.button", backend = driver.name(), "Button watcher started");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let pressed = match driver.button_pressed() {
            Ok(pressed) => pressed,
            Err(ActuatorError::InputUnsupported) => {
                info!(
                    target: "td.button",
                    backend = driver.name(),
                    "Backend has no button input, button watcher stopped"
                );
                return;
            }
            Err(e) => {
                warn!(target: "td.button", error = %e, "Failed to sample button");
                continue;
            }
        };

        if !debouncer.sample(pressed, Instant::now()) {
            continue;
        }

        if let Some(session_id) = installation.active_session() {
            debug!(
                target: "td.button",
                session_id = %session_id,
                "Button press ignored, a session has control"
            );
            continue;
        }

        let position = target.position().toggled();
        info!(target: "td.button", position = %position, "Button toggles target");
        metrics::record_button_toggle();
        if let Err(e) = target.move_to(position).await {
            warn!(target: "td.button", error = %e, "Button move failed");
        }
    }

    info!(target: "td.button", "Button watcher stopped");
}
