//! In-memory GPIO backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use targetd::actuator::{ActuatorError, GpioDriver, OutputLine};
use tokio::time::Instant;

/// One recorded line write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEvent {
    pub line: OutputLine,
    pub high: bool,
    pub at: Instant,
}

/// GPIO backend that records writes and exposes a settable button.
#[derive(Debug, Default)]
pub struct MockGpio {
    events: Mutex<Vec<LineEvent>>,
    button_down: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write so far, in order.
    pub fn events(&self) -> Vec<LineEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Writes to one line, in order.
    pub fn events_for(&self, line: OutputLine) -> Vec<LineEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.line == line)
            .collect()
    }

    /// Current level of a line (low if never written).
    pub fn level(&self, line: OutputLine) -> bool {
        self.events_for(line).last().is_some_and(|event| event.high)
    }

    /// Number of rising edges on a line.
    pub fn rising_edges(&self, line: OutputLine) -> usize {
        self.events_for(line).iter().filter(|event| event.high).count()
    }

    /// Forgets recorded writes.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn press_button(&self) {
        self.button_down.store(true, Ordering::SeqCst);
    }

    pub fn release_button(&self) {
        self.button_down.store(false, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl GpioDriver for MockGpio {
    fn write(&self, line: OutputLine, high: bool) -> Result<(), ActuatorError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ActuatorError::Io {
                gpio: line.sysfs_offset(),
                attribute: "value",
                source: std::io::Error::other("mock write failure"),
            });
        }
        self.events.lock().unwrap().push(LineEvent {
            line,
            high,
            at: Instant::now(),
        });
        Ok(())
    }

    fn button_pressed(&self) -> Result<bool, ActuatorError> {
        Ok(self.button_down.load(Ordering::SeqCst))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
