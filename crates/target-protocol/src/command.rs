//! Command splitting and parsing.

use std::fmt;
use std::time::Duration;

use crate::error::ProtocolError;

/// Characters separating commands inside one chunk.
pub const DELIMITERS: [char; 2] = [';', '\n'];

/// Position of the target mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    /// Turned away from the shooter (`0`).
    #[default]
    Away,
    /// Facing the shooter (`1`).
    Front,
}

impl Position {
    /// Builds a position from the "is front" flag used on the wire.
    #[must_use]
    pub const fn from_front(front: bool) -> Self {
        if front {
            Position::Front
        } else {
            Position::Away
        }
    }

    /// Whether this is the front position.
    #[must_use]
    pub const fn is_front(self) -> bool {
        matches!(self, Position::Front)
    }

    /// The opposite position.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Position::Away => Position::Front,
            Position::Front => Position::Away,
        }
    }

    /// Wire digit, as reported by `POS=`.
    #[must_use]
    pub const fn as_digit(self) -> char {
        match self {
            Position::Away => '0',
            Position::Front => '1',
        }
    }

    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Position::Away => "away",
            Position::Front => "front",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parsed client command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `C`: stop any running program and clear the step list.
    Clear,
    /// `T<seconds>`: append a pure delay step.
    Delay(Duration),
    /// `A<file>`: append a step that plays an audio file.
    QueueAudio(String),
    /// `M<0|1>`: append a step that moves the target.
    QueueMove(Position),
    /// `P<file>`: play an audio file right away.
    PlayAudio(String),
    /// `D<0|1>`: move the target right away.
    MoveTarget(Position),
    /// `R`: run the program.
    Run,
    /// `S`: stop the running program.
    Stop,
    /// `Q`: report execution status.
    Query,
    /// `X`: end the session.
    Exit,
}

impl Command {
    /// Short name used for logging and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Command::Clear => "clear",
            Command::Delay(_) => "delay",
            Command::QueueAudio(_) => "queue_audio",
            Command::QueueMove(_) => "queue_move",
            Command::PlayAudio(_) => "play_audio",
            Command::MoveTarget(_) => "move_target",
            Command::Run => "run",
            Command::Stop => "stop",
            Command::Query => "query",
            Command::Exit => "exit",
        }
    }
}

/// Splits a raw chunk into trimmed, non-empty command strings.
///
/// Order is preserved. A chunk made only of delimiters and whitespace yields
/// an empty list.
#[must_use]
pub fn split_commands(chunk: &str) -> Vec<&str> {
    chunk
        .split(DELIMITERS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses one command string (as produced by [`split_commands`]).
///
/// The first character selects the command (case-sensitive); the rest,
/// trimmed, is its argument. Commands without an argument ignore trailing
/// text.
///
/// # Errors
///
/// - [`ProtocolError::Syntax`] when an argument is missing or malformed
/// - [`ProtocolError::UnknownCommand`] for an unrecognised letter
pub fn parse_command(input: &str) -> Result<Command, ProtocolError> {
    let mut chars = input.chars();
    let Some(code) = chars.next() else {
        return Err(ProtocolError::UnknownCommand);
    };
    let arg = chars.as_str().trim();

    match code {
        'C' => Ok(Command::Clear),
        'T' => parse_seconds(arg).map(Command::Delay),
        'A' => parse_filename(arg).map(Command::QueueAudio),
        'M' => parse_position(arg).map(Command::QueueMove),
        'P' => parse_filename(arg).map(Command::PlayAudio),
        'D' => parse_position(arg).map(Command::MoveTarget),
        'R' => Ok(Command::Run),
        'S' => Ok(Command::Stop),
        'Q' => Ok(Command::Query),
        'X' => Ok(Command::Exit),
        _ => Err(ProtocolError::UnknownCommand),
    }
}

fn parse_seconds(arg: &str) -> Result<Duration, ProtocolError> {
    let secs: f64 = arg.parse().map_err(|_| ProtocolError::Syntax)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ProtocolError::Syntax);
    }
    // Also catches -0.0
    if secs <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ProtocolError::Syntax)
}

fn parse_filename(arg: &str) -> Result<String, ProtocolError> {
    if arg.is_empty() {
        return Err(ProtocolError::Syntax);
    }
    Ok(arg.to_string())
}

fn parse_position(arg: &str) -> Result<Position, ProtocolError> {
    let value: i64 = arg.parse().map_err(|_| ProtocolError::Syntax)?;
    Ok(Position::from_front(value != 0))
}
