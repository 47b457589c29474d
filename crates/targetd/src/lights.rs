//! Status lights: server ready, session active, program active.

use std::sync::Arc;

use tracing::warn;

use crate::actuator::{GpioDriver, OutputLine};

/// Drives the three status lights. Without a GPIO backend every call is a
/// no-op. Write failures are logged and otherwise ignored.
#[derive(Debug, Clone, Default)]
pub struct StatusLights {
    driver: Option<Arc<dyn GpioDriver>>,
}

impl StatusLights {
    #[must_use]
    pub fn new(driver: Option<Arc<dyn GpioDriver>>) -> Self {
        Self { driver }
    }

    /// Lights that are never wired to anything.
    #[must_use]
    pub fn disconnected() -> Self {
        Self { driver: None }
    }

    pub fn server_ready(&self, on: bool) {
        self.set(OutputLine::ServerReady, on);
    }

    pub fn session_active(&self, on: bool) {
        self.set(OutputLine::SessionActive, on);
    }

    pub fn program_active(&self, on: bool) {
        self.set(OutputLine::ProgramActive, on);
    }

    fn set(&self, line: OutputLine, on: bool) {
        let Some(driver) = &self.driver else {
            return;
        };
        if let Err(e) = driver.write(line, on) {
            warn!(
                target: "td.gpio",
                line = %line,
                on,
                error = %e,
                "Failed to set status light"
            );
        }
    }
}
