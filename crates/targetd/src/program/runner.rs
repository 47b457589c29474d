//! Program execution.
//!
//! A run executes a snapshot of the session's program on its own task.
//! Step times are absolute from the run start: a step scheduled at 1.5s
//! fires at 1.5s even if an earlier action (a target move) took a while.
//!
//! Stopping cancels the run's token and waits for the task to exit. Once
//! [`ProgramRunner::stop`] returns no further action of that run fires.

use std::sync::Arc;
use std::time::Duration;

use target_protocol::{format_seconds, ProtocolError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::Program;
use crate::actors::SessionId;
use crate::installation::Installation;
use crate::observability::metrics;

/// Run state as seen by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No program is running.
    Idle,
    /// A program is running.
    Running,
    /// A stop was requested and the run has not exited yet.
    Stopping,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step fired.
    Completed,
    /// The run was cancelled.
    Stopped,
}

impl RunOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Stopped => "stopped",
        }
    }
}

struct ActiveRun {
    started_at: Instant,
    cancel_token: CancellationToken,
    task: JoinHandle<RunOutcome>,
}

/// Starts, stops and reports on a session's program runs. At most one run
/// is active at a time.
pub struct ProgramRunner {
    session_id: SessionId,
    installation: Arc<Installation>,
    /// Parent of every run's token (the session's token).
    parent_token: CancellationToken,
    active: Option<ActiveRun>,
}

impl ProgramRunner {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        installation: Arc<Installation>,
        parent_token: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            installation,
            parent_token,
            active: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        match &self.active {
            None => RunState::Idle,
            Some(run) if run.task.is_finished() => RunState::Idle,
            Some(run) if run.cancel_token.is_cancelled() => RunState::Stopping,
            Some(_) => RunState::Running,
        }
    }

    /// Whether a run is in progress (running or stopping).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() != RunState::Idle
    }

    /// Time since the current run started, or `None` when idle.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        match &self.active {
            Some(run) if !run.task.is_finished() => Some(run.started_at.elapsed()),
            _ => None,
        }
    }

    /// Starts running a snapshot of `program`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Executing`] when a run is already in progress
    /// - [`ProtocolError::Empty`] when the program has no steps
    pub fn start(&mut self, program: &Program) -> Result<(), ProtocolError> {
        if self.is_running() {
            return Err(ProtocolError::Executing);
        }
        if program.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let started_at = Instant::now();
        let cancel_token = self.parent_token.child_token();
        let task = tokio::spawn(execute(
            self.session_id,
            program.clone(),
            Arc::clone(&self.installation),
            started_at,
            cancel_token.clone(),
        ));

        info!(
            target: "td.program",
            session_id = %self.session_id,
            steps = program.len(),
            total_seconds = %format_seconds(program.total_duration()),
            "Program started"
        );

        self.active = Some(ActiveRun {
            started_at,
            cancel_token,
            task,
        });
        Ok(())
    }

    /// Stops the current run and waits for it to exit. Returns how the run
    /// ended, or `None` when nothing was running.
    pub async fn stop(&mut self) -> Option<RunOutcome> {
        let run = self.active.take()?;
        run.cancel_token.cancel();

        match run.task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(
                    target: "td.program",
                    session_id = %self.session_id,
                    error = %e,
                    "Program task failed"
                );
                None
            }
        }
    }
}

impl Drop for ProgramRunner {
    fn drop(&mut self) {
        if let Some(run) = &self.active {
            run.cancel_token.cancel();
        }
    }
}

#[instrument(
    skip_all,
    name = "td.program.run",
    fields(session_id = %session_id, steps = program.len())
)]
async fn execute(
    session_id: SessionId,
    program: Program,
    installation: Arc<Installation>,
    started_at: Instant,
    cancel_token: CancellationToken,
) -> RunOutcome {
    installation.lights().program_active(true);
    metrics::set_program_running(true);

    let outcome = fire_steps(&program, &installation, started_at, &cancel_token).await;

    installation.lights().program_active(false);
    metrics::set_program_running(false);
    metrics::record_program_finished(outcome.as_str(), started_at.elapsed());

    info!(
        target: "td.program",
        session_id = %session_id,
        outcome = outcome.as_str(),
        elapsed_seconds = %format_seconds(started_at.elapsed()),
        "Program ended"
    );
    outcome
}

async fn fire_steps(
    program: &Program,
    installation: &Installation,
    started_at: Instant,
    cancel_token: &CancellationToken,
) -> RunOutcome {
    let mut fire_at = started_at;

    for (index, step) in program.steps().iter().enumerate() {
        let Some(next) = fire_at.checked_add(step.delay) else {
            // Unreachable deadline: nothing else can fire
            cancel_token.cancelled().await;
            return RunOutcome::Stopped;
        };
        fire_at = next;

        tokio::select! {
            biased;
            () = cancel_token.cancelled() => return RunOutcome::Stopped,
            () = tokio::time::sleep_until(fire_at) => {}
        }

        let Some(action) = &step.action else {
            continue;
        };

        debug!(
            target: "td.program",
            step = index,
            action = action.name(),
            at_seconds = %format_seconds(fire_at.saturating_duration_since(started_at)),
            "Firing step"
        );

        if let Err(e) = installation.perform(action).await {
            warn!(
                target: "td.program",
                step = index,
                action = action.name(),
                error = %e,
                "Program action failed"
            );
        }
    }

    RunOutcome::Completed
}
