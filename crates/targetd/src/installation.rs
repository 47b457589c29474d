//! Installation-wide shared state.
//!
//! One [`Installation`] exists per daemon. It owns the target actuator, the
//! audio player and the status lights, and records which session (if any)
//! currently controls them. Every session holds an `Arc` to it.

use std::sync::{Arc, Mutex, PoisonError};

use target_protocol::Position;
use tracing::info;

use crate::actors::SessionId;
use crate::actuator::{ActuatorError, TargetActuator};
use crate::audio::AudioPlayer;
use crate::lights::StatusLights;
use crate::observability::metrics;
use crate::program::Action;

/// Hardware and control state shared by all sessions.
#[derive(Debug)]
pub struct Installation {
    target: Option<Arc<TargetActuator>>,
    audio: Arc<dyn AudioPlayer>,
    lights: StatusLights,
    active_session: Mutex<Option<SessionId>>,
}

impl Installation {
    #[must_use]
    pub fn new(
        target: Option<Arc<TargetActuator>>,
        audio: Arc<dyn AudioPlayer>,
        lights: StatusLights,
    ) -> Self {
        Self {
            target,
            audio,
            lights,
            active_session: Mutex::new(None),
        }
    }

    /// The target actuator, if one is configured.
    #[must_use]
    pub fn target(&self) -> Option<&Arc<TargetActuator>> {
        self.target.as_ref()
    }

    /// Commanded target position, or `None` without an actuator.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.target.as_ref().map(|target| target.position())
    }

    #[must_use]
    pub fn audio(&self) -> &dyn AudioPlayer {
        &*self.audio
    }

    #[must_use]
    pub fn lights(&self) -> &StatusLights {
        &self.lights
    }

    /// Session currently in control.
    #[must_use]
    pub fn active_session(&self) -> Option<SessionId> {
        *self
            .active_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Gives control to `session_id` if nobody holds it. Returns whether
    /// `session_id` holds control after the call.
    pub fn claim(&self, session_id: SessionId) -> bool {
        let mut active = self
            .active_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *active {
            Some(holder) => holder == session_id,
            None => {
                *active = Some(session_id);
                drop(active);
                self.lights.session_active(true);
                metrics::set_session_active(true);
                info!(
                    target: "td.session",
                    session_id = %session_id,
                    "Session took control"
                );
                true
            }
        }
    }

    /// Releases control if `session_id` holds it. Returns whether it did.
    pub fn release(&self, session_id: SessionId) -> bool {
        let mut active = self
            .active_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *active != Some(session_id) {
            return false;
        }
        *active = None;
        drop(active);
        self.lights.session_active(false);
        metrics::set_session_active(false);
        info!(
            target: "td.session",
            session_id = %session_id,
            "Session released control"
        );
        true
    }

    /// Carries out a program action. Audio is fire-and-forget; a target move
    /// completes when the pulse and settle time are over.
    ///
    /// # Errors
    ///
    /// Returns `ActuatorError::Unavailable` for a move without an actuator,
    /// or the actuator's own error.
    pub async fn perform(&self, action: &Action) -> Result<(), ActuatorError> {
        match action {
            Action::PlayAudio(file) => {
                self.audio.play(file);
                Ok(())
            }
            Action::MoveTarget(position) => match &self.target {
                Some(target) => target.move_to(*position).await,
                None => Err(ActuatorError::Unavailable),
            },
        }
    }

    /// Lowers every line on shutdown.
    pub fn shutdown(&self) {
        self.lights.program_active(false);
        self.lights.session_active(false);
        self.lights.server_ready(false);
        if let Some(target) = &self.target {
            target.release();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Mute;

    impl AudioPlayer for Mute {
        fn play(&self, _file: &str) {}
    }

    fn installation() -> Installation {
        Installation::new(None, Arc::new(Mute), StatusLights::disconnected())
    }

    #[test]
    fn test_first_claim_wins() {
        let installation = installation();
        let first = SessionId::new();
        let second = SessionId::new();

        assert!(installation.claim(first));
        assert!(!installation.claim(second));
        // Claiming again is idempotent for the holder
        assert!(installation.claim(first));
        assert_eq!(installation.active_session(), Some(first));
    }

    #[test]
    fn test_release_only_by_holder() {
        let installation = installation();
        let first = SessionId::new();
        let second = SessionId::new();
        installation.claim(first);

        assert!(!installation.release(second));
        assert_eq!(installation.active_session(), Some(first));

        assert!(installation.release(first));
        assert_eq!(installation.active_session(), None);

        assert!(installation.claim(second));
    }

    #[tokio::test]
    async fn test_move_without_actuator() {
        let installation = installation();
        assert_eq!(installation.position(), None);
        let result = installation
            .perform(&Action::MoveTarget(Position::Front))
            .await;
        assert!(matches!(result, Err(ActuatorError::Unavailable)));
    }
}
