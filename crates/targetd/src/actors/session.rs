//! `SessionActor` - one per accepted TCP connection.
//!
//! Each `SessionActor`:
//! - Reads chunks of up to 1024 bytes and answers each chunk with one reply
//! - Owns its own program and program runner
//! - Competes for control of the installation; only the controlling session
//!   may execute commands, every other one is answered `ERROR=Busy`
//!
//! # Lifecycle
//!
//! 1. Spawned by the server actor when a connection is accepted
//! 2. Runs until the peer closes, the client sends `X`, the inactivity
//!    watchdog fires, or its token is cancelled
//! 3. On the way out it stops its program, releases control and closes the
//!    socket

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use target_protocol::{
    parse_command, split_commands, Command, ProtocolError, Reply, StatusReport, MAX_CHUNK_SIZE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, warn};

use super::messages::{CloseReason, SessionId};
use crate::actuator::MoveQueue;
use crate::config::{Config, ExitMode};
use crate::installation::Installation;
use crate::observability::metrics;
use crate::program::{Action, Program, ProgramRunner};

/// Per-session behaviour shared by every session of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSettings {
    /// Inactivity timeout; `None` disables the watchdog.
    pub idle_timeout: Option<Duration>,
    /// What `X` does.
    pub exit_mode: ExitMode,
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_timeout: config.session_timeout(),
            exit_mode: config.exit_mode,
        }
    }
}

/// Result of a finished session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionExit {
    pub session_id: SessionId,
    pub reason: CloseReason,
}

/// Handle to a `SessionActor`.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    session_id: SessionId,
    cancel_token: CancellationToken,
}

impl SessionHandle {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Close the session.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// What a chunk produced.
#[derive(Debug, PartialEq, Eq)]
enum ChunkOutcome {
    /// Send this reply.
    Reply(String),
    /// Nothing to send (the chunk held no commands).
    Silent,
    /// Close the session without replying.
    Exit,
}

/// What a single command produced.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    /// Keep going, optionally contributing a reply fragment.
    Continue(Option<String>),
    /// End the session.
    Exit,
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    session_id: SessionId,
    peer: SocketAddr,
    stream: TcpStream,
    installation: Arc<Installation>,
    settings: SessionSettings,
    program: Program,
    runner: ProgramRunner,
    /// Immediate `D` moves, in arrival order. `None` without an actuator.
    moves: Option<MoveQueue>,
    /// Cancellation token (child of the server's token).
    cancel_token: CancellationToken,
    /// Daemon-wide token, cancelled by `X` in shutdown mode.
    shutdown_token: CancellationToken,
    opened_at: Instant,
    /// Cancels the session's token if the task dies, so the server can
    /// tell dead sessions apart.
    _liveness: DropGuard,
}

impl SessionActor {
    /// Spawn a session actor for an accepted connection onto `tasks`.
    pub fn spawn(
        tasks: &mut JoinSet<SessionExit>,
        stream: TcpStream,
        peer: SocketAddr,
        installation: Arc<Installation>,
        settings: SessionSettings,
        cancel_token: CancellationToken,
        shutdown_token: CancellationToken,
    ) -> SessionHandle {
        let session_id = SessionId::new();
        let runner = ProgramRunner::new(
            session_id,
            Arc::clone(&installation),
            cancel_token.clone(),
        );
        // The draining task ends with the session, once the queue is dropped
        let moves = installation
            .target()
            .map(|target| MoveQueue::spawn(Arc::clone(target)).0);

        let actor = Self {
            session_id,
            peer,
            stream,
            installation,
            settings,
            program: Program::new(),
            runner,
            moves,
            cancel_token: cancel_token.clone(),
            shutdown_token,
            opened_at: Instant::now(),
            _liveness: cancel_token.clone().drop_guard(),
        };

        tasks.spawn(actor.run());

        SessionHandle {
            session_id,
            cancel_token,
        }
    }

    /// Run the session read loop.
    #[instrument(
        skip_all,
        name = "td.actor.session",
        fields(session_id = %self.session_id, peer = %self.peer)
    )]
    async fn run(mut self) -> SessionExit {
        info!(
            target: "td.session",
            session_id = %self.session_id,
            peer = %self.peer,
            "Session opened"
        );

        // The first session to connect takes control right away
        self.installation.claim(self.session_id);

        let mut buf = [0u8; MAX_CHUNK_SIZE];
        let reason = loop {
            let watchdog = idle_deadline(self.settings.idle_timeout);

            let read = tokio::select! {
                () = self.cancel_token.cancelled() => break CloseReason::Cancelled,

                () = wait_until(watchdog) => {
                    info!(
                        target: "td.session",
                        session_id = %self.session_id,
                        "Session idle timeout"
                    );
                    break CloseReason::IdleTimeout;
                }

                read = self.stream.read(&mut buf) => read,
            };

            let len = match read {
                Ok(0) => break CloseReason::PeerClosed,
                Ok(len) => len,
                Err(e) => {
                    warn!(
                        target: "td.session",
                        session_id = %self.session_id,
                        error = %e,
                        "Session read failed"
                    );
                    break CloseReason::TransportError;
                }
            };
            let Some(bytes) = buf.get(..len) else {
                break CloseReason::TransportError;
            };
            let chunk = String::from_utf8_lossy(bytes).into_owned();

            match self.handle_chunk(&chunk).await {
                ChunkOutcome::Silent => {}
                ChunkOutcome::Exit => break CloseReason::ClientExit,
                ChunkOutcome::Reply(reply) => {
                    if let Err(e) = self.stream.write_all(reply.as_bytes()).await {
                        warn!(
                            target: "td.session",
                            session_id = %self.session_id,
                            error = %e,
                            "Session write failed"
                        );
                        break CloseReason::TransportError;
                    }
                }
            }
        };

        self.teardown(reason).await;

        SessionExit {
            session_id: self.session_id,
            reason,
        }
    }

    /// Processes one received chunk. Commands run in order; the first error
    /// aborts the rest of the chunk and replaces the whole reply.
    async fn handle_chunk(&mut self, chunk: &str) -> ChunkOutcome {
        let commands = split_commands(chunk);
        if commands.is_empty() {
            return ChunkOutcome::Silent;
        }

        if !self.installation.claim(self.session_id) {
            debug!(
                target: "td.session",
                session_id = %self.session_id,
                commands = commands.len(),
                "Chunk refused, another session has control"
            );
            metrics::record_command_error(ProtocolError::Busy.as_str());
            return ChunkOutcome::Reply(ProtocolError::Busy.to_reply());
        }

        let mut reply = Reply::new();
        for raw in commands {
            let result = match self.precheck(raw).and_then(|()| parse_command(raw)) {
                Ok(command) => self.execute(command).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(Flow::Continue(Some(fragment))) => reply.push(&fragment),
                Ok(Flow::Continue(None)) => {}
                Ok(Flow::Exit) => return ChunkOutcome::Exit,
                Err(e) => {
                    debug!(
                        target: "td.session",
                        session_id = %self.session_id,
                        command = %raw,
                        error = %e,
                        "Command failed"
                    );
                    metrics::record_command_error(e.as_str());
                    return ChunkOutcome::Reply(e.to_reply());
                }
            }
        }

        ChunkOutcome::Reply(reply.finish())
    }

    async fn execute(&mut self, command: Command) -> Result<Flow, ProtocolError> {
        metrics::record_command(command.name());

        match command {
            Command::Clear => {
                self.runner.stop().await;
                self.program.clear();
            }
            Command::Delay(delay) => self.program.push_delay(delay),
            Command::QueueAudio(file) => self.program.push_action(Action::PlayAudio(file)),
            Command::QueueMove(position) => {
                self.program.push_action(Action::MoveTarget(position));
            }
            Command::PlayAudio(file) => self.installation.audio().play(&file),
            Command::MoveTarget(position) => {
                let moves = self.moves.as_ref().ok_or(ProtocolError::Target)?;
                // Queued, so the reply doesn't wait for the pulse
                if let Err(e) = moves.push(position).await {
                    warn!(
                        target: "td.session",
                        session_id = %self.session_id,
                        position = %position,
                        error = %e,
                        "Immediate target move not queued"
                    );
                    return Err(ProtocolError::Target);
                }
            }
            Command::Run => self.runner.start(&self.program)?,
            Command::Stop => {
                self.runner.stop().await;
            }
            Command::Query => return Ok(Flow::Continue(Some(self.status().to_string()))),
            Command::Exit => {
                if self.settings.exit_mode == ExitMode::Shutdown {
                    info!(
                        target: "td.session",
                        session_id = %self.session_id,
                        "Client requested daemon shutdown"
                    );
                    self.shutdown_token.cancel();
                }
                return Ok(Flow::Exit);
            }
        }

        Ok(Flow::Continue(None))
    }

    /// State checks that take precedence over argument errors: a running
    /// program answers `Executing` and a missing actuator answers `Target`
    /// whatever the argument looks like.
    fn precheck(&self, raw: &str) -> Result<(), ProtocolError> {
        match raw.chars().next() {
            Some('T' | 'A' | 'M' | 'P') => self.ensure_idle(),
            Some('D') => {
                self.ensure_idle()?;
                if self.moves.is_none() {
                    return Err(ProtocolError::Target);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn ensure_idle(&self) -> Result<(), ProtocolError> {
        if self.runner.is_running() {
            Err(ProtocolError::Executing)
        } else {
            Ok(())
        }
    }

    fn status(&self) -> StatusReport {
        StatusReport {
            elapsed: self.runner.elapsed(),
            total: (!self.program.is_empty()).then(|| self.program.total_duration()),
            position: self.installation.position(),
        }
    }

    async fn teardown(&mut self, reason: CloseReason) {
        if let Some(outcome) = self.runner.stop().await {
            debug!(
                target: "td.session",
                session_id = %self.session_id,
                outcome = outcome.as_str(),
                "Program stopped at session close"
            );
        }

        self.installation.release(self.session_id);

        if let Err(e) = self.stream.shutdown().await {
            debug!(
                target: "td.session",
                session_id = %self.session_id,
                error = %e,
                "Socket shutdown failed"
            );
        }

        if reason == CloseReason::IdleTimeout {
            metrics::record_watchdog_timeout();
        }
        metrics::record_session_closed(reason.as_str(), self.opened_at.elapsed());

        info!(
            target: "td.session",
            session_id = %self.session_id,
            reason = reason.as_str(),
            "Session closed"
        );
    }
}

fn idle_deadline(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|timeout| Instant::now().checked_add(timeout))
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
