//! GPIO backends.
//!
//! A [`GpioDriver`] owns the installation's digital lines: the two target
//! direction lines, the enable line, three status lights and the manual
//! toggle button. Writes are synchronous; the sysfs backend touches small
//! files only.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::ActuatorError;

/// Output lines driven by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputLine {
    /// Powers the target mechanism.
    Enable,
    /// Pulsed to turn the target to the front.
    TurnFront,
    /// Pulsed to turn the target away.
    TurnAway,
    /// Lit while the control listener accepts connections.
    ServerReady,
    /// Lit while a session holds control.
    SessionActive,
    /// Lit while a program runs.
    ProgramActive,
}

impl OutputLine {
    /// Every output line, in export order.
    pub const ALL: [OutputLine; 6] = [
        OutputLine::Enable,
        OutputLine::ServerReady,
        OutputLine::TurnFront,
        OutputLine::TurnAway,
        OutputLine::SessionActive,
        OutputLine::ProgramActive,
    ];

    /// Sysfs GPIO number before the base offset is applied.
    #[must_use]
    pub const fn sysfs_offset(self) -> u32 {
        match self {
            OutputLine::Enable => 17,
            OutputLine::ServerReady => 18,
            OutputLine::TurnFront => 27,
            OutputLine::TurnAway => 22,
            OutputLine::SessionActive => 23,
            OutputLine::ProgramActive => 24,
        }
    }

    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OutputLine::Enable => "enable",
            OutputLine::TurnFront => "turn_front",
            OutputLine::TurnAway => "turn_away",
            OutputLine::ServerReady => "server_ready",
            OutputLine::SessionActive => "session_active",
            OutputLine::ProgramActive => "program_active",
        }
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sysfs GPIO number of the manual toggle button before the base offset.
pub const BUTTON_SYSFS_OFFSET: u32 = 25;

/// Access to the installation's digital lines.
pub trait GpioDriver: Send + Sync + fmt::Debug {
    /// Drives an output line high or low.
    ///
    /// # Errors
    ///
    /// Returns `ActuatorError` when the line cannot be written.
    fn write(&self, line: OutputLine, high: bool) -> Result<(), ActuatorError>;

    /// Samples the manual toggle button. The button is active low; `true`
    /// means it is held down.
    ///
    /// # Errors
    ///
    /// Returns `ActuatorError::InputUnsupported` when the backend has no
    /// button, or an I/O error when sampling fails.
    fn button_pressed(&self) -> Result<bool, ActuatorError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Backend that logs line changes instead of driving hardware.
#[derive(Debug, Default)]
pub struct SimulatedGpio;

impl SimulatedGpio {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GpioDriver for SimulatedGpio {
    fn write(&self, line: OutputLine, high: bool) -> Result<(), ActuatorError> {
        debug!(
            target: "td.gpio",
            line = %line,
            high,
            "Simulated GPIO write"
        );
        Ok(())
    }

    fn button_pressed(&self) -> Result<bool, ActuatorError> {
        Err(ActuatorError::InputUnsupported)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Linux sysfs GPIO backend (`/sys/class/gpio`).
///
/// Lines are exported and configured when the backend is opened; outputs
/// start low.
#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    base: u32,
}

impl SysfsGpio {
    /// Exports and configures every line under `root`, numbering them from
    /// `base`.
    ///
    /// # Errors
    ///
    /// Returns `ActuatorError::Io` when a line cannot be exported or
    /// configured.
    pub fn open(root: impl Into<PathBuf>, base: u32) -> Result<Self, ActuatorError> {
        let gpio = Self {
            root: root.into(),
            base,
        };

        for line in OutputLine::ALL {
            let number = gpio.number(line.sysfs_offset());
            gpio.export(number)?;
            // "low" configures an output that starts low
            gpio.write_attribute(number, "direction", "low")?;
        }

        let button = gpio.number(BUTTON_SYSFS_OFFSET);
        gpio.export(button)?;
        gpio.write_attribute(button, "direction", "in")?;

        info!(
            target: "td.gpio",
            root = %gpio.root.display(),
            base,
            "Sysfs GPIO lines exported"
        );

        Ok(gpio)
    }

    /// Sysfs root this backend writes to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn number(&self, offset: u32) -> u32 {
        self.base.saturating_add(offset)
    }

    fn line_dir(&self, number: u32) -> PathBuf {
        self.root.join(format!("gpio{number}"))
    }

    fn export(&self, number: u32) -> Result<(), ActuatorError> {
        if self.line_dir(number).exists() {
            return Ok(());
        }
        fs::write(self.root.join("export"), number.to_string()).map_err(|source| {
            ActuatorError::Io {
                gpio: number,
                attribute: "export",
                source,
            }
        })
    }

    fn write_attribute(
        &self,
        number: u32,
        attribute: &'static str,
        value: &str,
    ) -> Result<(), ActuatorError> {
        fs::write(self.line_dir(number).join(attribute), value).map_err(|source| {
            ActuatorError::Io {
                gpio: number,
                attribute,
                source,
            }
        })
    }

    fn read_value(&self, number: u32) -> Result<String, ActuatorError> {
        fs::read_to_string(self.line_dir(number).join("value")).map_err(|source| {
            ActuatorError::Io {
                gpio: number,
                attribute: "value",
                source,
            }
        })
    }
}

impl GpioDriver for SysfsGpio {
    fn write(&self, line: OutputLine, high: bool) -> Result<(), ActuatorError> {
        let number = self.number(line.sysfs_offset());
        self.write_attribute(number, "value", if high { "1" } else { "0" })
    }

    fn button_pressed(&self) -> Result<bool, ActuatorError> {
        let number = self.number(BUTTON_SYSFS_OFFSET);
        let value = self.read_value(number)?;
        match value.trim() {
            "0" => Ok(true),
            "1" => Ok(false),
            other => Err(ActuatorError::Io {
                gpio: number,
                attribute: "value",
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected level {other:?}"),
                ),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "sysfs"
    }
}
