//! Target actuator.
//!
//! The target is turned by pulsing one of two direction lines: the line for
//! the requested position is held high for [`PULSE_DURATION`], then low,
//! followed by a [`SETTLE_DURATION`] pause. Moves are serialized; a move
//! requested while another is in flight waits for it to finish.
//!
//! The reported position is the last *commanded* position. It is updated as
//! soon as the pulse starts, or when a move is queued on a [`MoveQueue`];
//! there is no feedback from the mechanism.

pub mod gpio;

pub use gpio::{GpioDriver, OutputLine, SimulatedGpio, SysfsGpio, BUTTON_SYSFS_OFFSET};

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use target_protocol::Position;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::observability::metrics;

/// How long a direction line is held high.
pub const PULSE_DURATION: Duration = Duration::from_millis(500);

/// Pause after a pulse before the next move may start.
pub const SETTLE_DURATION: Duration = Duration::from_millis(50);

/// Immediate moves a session may have waiting before `push` blocks.
const MOVE_QUEUE_DEPTH: usize = 16;

/// Actuator and GPIO errors.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// A sysfs attribute could not be read or written.
    #[error("GPIO {gpio} {attribute} failed: {source}")]
    Io {
        gpio: u32,
        attribute: &'static str,
        #[source]
        source: io::Error,
    },

    /// The backend has no input lines.
    #[error("input lines are not supported by this backend")]
    InputUnsupported,

    /// No actuator is configured.
    #[error("no target actuator available")]
    Unavailable,

    /// The task draining a [`MoveQueue`] is gone.
    #[error("move queue closed")]
    QueueClosed,
}

/// Drives the target mechanism through a [`GpioDriver`].
#[derive(Debug)]
pub struct TargetActuator {
    driver: Arc<dyn GpioDriver>,
    front: AtomicBool,
    moving: AtomicBool,
    move_lock: tokio::sync::Mutex<()>,
}

impl TargetActuator {
    /// Powers the mechanism up: both direction lines low, enable high. The
    /// commanded position starts as [`Position::Away`].
    ///
    /// # Errors
    ///
    /// Returns `ActuatorError` when a line cannot be written.
    pub fn new(driver: Arc<dyn GpioDriver>) -> Result<Self, ActuatorError> {
        driver.write(OutputLine::TurnFront, false)?;
        driver.write(OutputLine::TurnAway, false)?;
        driver.write(OutputLine::Enable, true)?;

        info!(
            target: "td.actuator",
            backend = driver.name(),
            "Target actuator enabled"
        );

        Ok(Self {
            driver,
            front: AtomicBool::new(false),
            moving: AtomicBool::new(false),
            move_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Last commanded position.
    #[must_use]
    pub fn position(&self) -> Position {
        Position::from_front(self.front.load(Ordering::Acquire))
    }

    /// Whether a pulse is in progress.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.moving.load(Ordering::Acquire)
    }

    /// Moves the target and waits for the pulse and settle time to elapse.
    ///
    /// # Errors
    ///
    /// Returns `ActuatorError` when a direction line cannot be written.
    pub async fn move_to(&self, position: Position) -> Result<(), ActuatorError> {
        let _serialized = self.move_lock.lock().await;
        self.front.store(position.is_front(), Ordering::Release);
        self.pulse(position).await
    }

    /// Pulses the line for `position`. The caller holds `move_lock`.
    async fn pulse(&self, position: Position) -> Result<(), ActuatorError> {
        let line = if position.is_front() {
            OutputLine::TurnFront
        } else {
            OutputLine::TurnAway
        };

        debug!(
            target: "td.actuator",
            position = %position,
            "Moving target"
        );

        self.driver.write(line, true)?;
        self.moving.store(true, Ordering::Release);
        metrics::record_target_move(position.as_str());

        // Lowers the line even if this future is dropped mid-pulse.
        let pulse = PulseGuard {
            driver: &*self.driver,
            line,
            moving: &self.moving,
        };
        tokio::time::sleep(PULSE_DURATION).await;
        pulse.finish()?;

        tokio::time::sleep(SETTLE_DURATION).await;
        Ok(())
    }

    /// Lowers every output line. Used on shutdown.
    pub fn release(&self) {
        for line in OutputLine::ALL {
            if let Err(e) = self.driver.write(line, false) {
                warn!(
                    target: "td.actuator",
                    line = %line,
                    error = %e,
                    "Failed to lower line during release"
                );
            }
        }
        info!(target: "td.actuator", "Target actuator released");
    }
}

/// Runs immediate moves one at a time, in the order they were pushed.
///
/// The commanded position changes when a move is pushed, so a status query
/// right after `D1;D0` reports the final position even while the pulses are
/// still queued. The draining task exits once every handle is dropped.
#[derive(Debug, Clone)]
pub struct MoveQueue {
    target: Arc<TargetActuator>,
    sender: mpsc::Sender<Position>,
}

impl MoveQueue {
    /// Starts the task that drains the queue into `target`.
    #[must_use]
    pub fn spawn(target: Arc<TargetActuator>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(MOVE_QUEUE_DEPTH);
        let task = tokio::spawn(drain_moves(Arc::clone(&target), receiver));
        (Self { target, sender }, task)
    }

    /// Queues a move behind any moves already pushed.
    ///
    /// # Errors
    ///
    /// Returns `ActuatorError::QueueClosed` if the draining task has exited.
    pub async fn push(&self, position: Position) -> Result<(), ActuatorError> {
        self.target
            .front
            .store(position.is_front(), Ordering::Release);
        self.sender
            .send(position)
            .await
            .map_err(|_| ActuatorError::QueueClosed)
    }
}

async fn drain_moves(target: Arc<TargetActuator>, mut receiver: mpsc::Receiver<Position>) {
    while let Some(position) = receiver.recv().await {
        let result = {
            let _serialized = target.move_lock.lock().await;
            target.pulse(position).await
        };
        if let Err(e) = result {
            warn!(
                target: "td.actuator",
                position = %position,
                error = %e,
                "Queued target move failed"
            );
        }
    }
}

struct PulseGuard<'a> {
    driver: &'a dyn GpioDriver,
    line: OutputLine,
    moving: &'a AtomicBool,
}

impl PulseGuard<'_> {
    fn finish(self) -> Result<(), ActuatorError> {
        let result = self.driver.write(self.line, false);
        self.moving.store(false, Ordering::Release);
        std::mem::forget(self);
        result
    }
}

impl Drop for PulseGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.driver.write(self.line, false) {
            warn!(
                target: "td.actuator",
                line = %self.line,
                error = %e,
                "Failed to lower line after interrupted pulse"
            );
        }
        self.moving.store(false, Ordering::Release);
    }
}
