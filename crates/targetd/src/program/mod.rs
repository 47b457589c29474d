//! Timed programs.
//!
//! A program is an ordered list of steps. Each step waits for its delay,
//! measured from the previous step's scheduled time, then optionally fires
//! an action. `T` appends a pure delay; `A` and `M` append an action with no
//! delay of its own.

pub mod runner;

pub use runner::{ProgramRunner, RunOutcome, RunState};

use std::time::Duration;

use target_protocol::Position;

/// Something a program step does when its time comes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Start playing an audio file.
    PlayAudio(String),
    /// Turn the target.
    MoveTarget(Position),
}

impl Action {
    /// Label for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Action::PlayAudio(_) => "play_audio",
            Action::MoveTarget(_) => "move_target",
        }
    }
}

/// One program step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Wait before this step fires, relative to the previous step.
    pub delay: Duration,
    /// What fires, if anything.
    pub action: Option<Action>,
}

/// A session's step list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    steps: Vec<Step>,
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pure delay step.
    pub fn push_delay(&mut self, delay: Duration) {
        self.steps.push(Step {
            delay,
            action: None,
        });
    }

    /// Appends an action that fires right after the previous step.
    pub fn push_action(&mut self, action: Action) {
        self.steps.push(Step {
            delay: Duration::ZERO,
            action: Some(action),
        });
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Sum of all step delays.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.steps
            .iter()
            .fold(Duration::ZERO, |total, step| total.saturating_add(step.delay))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_total_duration_sums_delays() {
        let mut program = Program::new();
        program.push_delay(Duration::from_secs(1));
        program.push_action(Action::PlayAudio("shot.wav".to_string()));
        program.push_delay(Duration::from_millis(500));
        program.push_action(Action::MoveTarget(Position::Front));

        assert_eq!(program.len(), 4);
        assert_eq!(program.total_duration(), Duration::from_millis(1500));
    }

    #[test]
    fn test_actions_have_no_delay() {
        let mut program = Program::new();
        program.push_action(Action::MoveTarget(Position::Away));

        assert_eq!(
            program.steps(),
            &[Step {
                delay: Duration::ZERO,
                action: Some(Action::MoveTarget(Position::Away)),
            }]
        );
        assert_eq!(program.total_duration(), Duration::ZERO);
    }

    #[test]
    fn test_clear() {
        let mut program = Program::new();
        program.push_delay(Duration::from_secs(2));
        assert!(!program.is_empty());

        program.clear();
        assert!(program.is_empty());
        assert_eq!(program.total_duration(), Duration::ZERO);
    }

    #[test]
    fn test_total_duration_saturates() {
        let mut program = Program::new();
        program.push_delay(Duration::MAX);
        program.push_delay(Duration::from_secs(1));
        assert_eq!(program.total_duration(), Duration::MAX);
    }
}
