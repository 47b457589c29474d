//! `ServerActor` - accepts control connections and supervises sessions.
//!
//! The `ServerActor` is the top of the actor hierarchy:
//!
//! - Singleton per daemon
//! - Owns the TCP listener and spawns one `SessionActor` per connection
//! - Reaps finished sessions (panic detection via `JoinSet`)
//! - Lights the server-ready light while it accepts connections
//!
//! # Graceful Shutdown
//!
//! On shutdown (message or cancellation) the server:
//! 1. Stops accepting connections
//! 2. Cancels every session (each stops its program and releases control)
//! 3. Waits for sessions to finish, aborting stragglers after the deadline

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::messages::{ServerMessage, ServerStatus, SessionId};
use super::session::{SessionActor, SessionExit, SessionHandle, SessionSettings};
use crate::errors::TdError;
use crate::installation::Installation;
use crate::observability::metrics;

/// Default channel buffer size for the server mailbox.
const SERVER_CHANNEL_BUFFER: usize = 64;

/// How long sessions get to finish when the server is cancelled.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Pause after a failed accept, so a persistent error doesn't spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Handle to the `ServerActor`.
#[derive(Clone, Debug)]
pub struct ServerHandle {
    sender: mpsc::Sender<ServerMessage>,
    cancel_token: CancellationToken,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// Bind the control listener and start the server actor.
    ///
    /// The server's token is a child of `shutdown_token`; a session whose
    /// client sends `X` in shutdown mode cancels `shutdown_token` itself.
    ///
    /// # Errors
    ///
    /// Returns `TdError::Bind` when the listener cannot be bound.
    pub async fn bind(
        address: SocketAddr,
        installation: Arc<Installation>,
        settings: SessionSettings,
        shutdown_token: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), TdError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| TdError::Bind { address, source })?;
        let local_addr = listener.local_addr()?;

        let (sender, receiver) = mpsc::channel(SERVER_CHANNEL_BUFFER);
        let cancel_token = shutdown_token.child_token();

        let actor = ServerActor {
            listener,
            local_addr,
            receiver,
            cancel_token: cancel_token.clone(),
            shutdown_token,
            installation,
            settings,
            sessions: HashMap::new(),
            tasks: JoinSet::new(),
            accepting: true,
        };

        let task_handle = tokio::spawn(actor.run());

        Ok((
            Self {
                sender,
                cancel_token,
                local_addr,
            },
            task_handle,
        ))
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the current server status.
    pub async fn get_status(&self) -> Result<ServerStatus, TdError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ServerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| TdError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TdError::Internal(format!("response receive failed: {e}")))
    }

    /// Close one session.
    pub async fn disconnect(&self, session_id: SessionId) -> Result<(), TdError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ServerMessage::Disconnect {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| TdError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TdError::Internal(format!("response receive failed: {e}")))?
    }

    /// Close every session and stop the server, waiting up to `deadline`
    /// for sessions to finish.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), TdError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ServerMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| TdError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TdError::Internal(format!("response receive failed: {e}")))?
    }

    /// Check if the server is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `ServerActor` implementation.
struct ServerActor {
    listener: TcpListener,
    local_addr: SocketAddr,
    receiver: mpsc::Receiver<ServerMessage>,
    /// Cancellation token (child of the daemon's shutdown token).
    cancel_token: CancellationToken,
    /// Handed to sessions for `X` in shutdown mode.
    shutdown_token: CancellationToken,
    installation: Arc<Installation>,
    settings: SessionSettings,
    /// Open sessions by ID.
    sessions: HashMap<SessionId, SessionHandle>,
    tasks: JoinSet<SessionExit>,
    accepting: bool,
}

impl ServerActor {
    #[instrument(skip_all, name = "td.actor.server", fields(local_addr = %self.local_addr))]
    async fn run(mut self) {
        info!(
            target: "td.server",
            local_addr = %self.local_addr,
            "Server accepting connections"
        );
        self.installation.lights().server_ready(true);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "td.server",
                        "Server received cancellation signal"
                    );
                    self.graceful_shutdown(DEFAULT_SHUTDOWN_DEADLINE).await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            if self.handle_message(message).await.is_break() {
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "td.server",
                                "Server channel closed, exiting"
                            );
                            self.graceful_shutdown(DEFAULT_SHUTDOWN_DEADLINE).await;
                            break;
                        }
                    }
                }

                accepted = self.listener.accept(), if self.accepting => {
                    match accepted {
                        Ok((stream, peer)) => self.open_session(stream, peer),
                        Err(e) => {
                            warn!(
                                target: "td.server",
                                error = %e,
                                "Accept failed"
                            );
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.reap(joined);
                }
            }
        }

        self.installation.lights().server_ready(false);
        info!(
            target: "td.server",
            local_addr = %self.local_addr,
            "Server stopped"
        );
    }

    /// Handle a single message. Breaks once the server has shut down.
    async fn handle_message(&mut self, message: ServerMessage) -> ControlFlow<()> {
        match message {
            ServerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(ServerStatus {
                    session_count: self.sessions.len(),
                    active_session: self.installation.active_session(),
                    accepting: self.accepting,
                });
            }

            ServerMessage::Disconnect {
                session_id,
                respond_to,
            } => {
                let result = match self.sessions.get(&session_id) {
                    Some(handle) => {
                        handle.cancel();
                        Ok(())
                    }
                    None => Err(TdError::Internal(format!(
                        "session {session_id} not found"
                    ))),
                };
                let _ = respond_to.send(result);
            }

            ServerMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                self.graceful_shutdown(deadline).await;
                let _ = respond_to.send(Ok(()));
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn open_session(&mut self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(
                target: "td.server",
                peer = %peer,
                error = %e,
                "Failed to set TCP_NODELAY"
            );
        }

        let handle = SessionActor::spawn(
            &mut self.tasks,
            stream,
            peer,
            Arc::clone(&self.installation),
            self.settings,
            self.cancel_token.child_token(),
            self.shutdown_token.clone(),
        );

        debug!(
            target: "td.server",
            session_id = %handle.session_id(),
            peer = %peer,
            "Connection accepted"
        );

        self.sessions.insert(handle.session_id(), handle);
        metrics::set_sessions_open(self.sessions.len());
    }

    fn reap(&mut self, joined: Result<SessionExit, JoinError>) {
        match joined {
            Ok(exit) => {
                self.sessions.remove(&exit.session_id);
                debug!(
                    target: "td.server",
                    session_id = %exit.session_id,
                    reason = exit.reason.as_str(),
                    open_sessions = self.sessions.len(),
                    "Session finished"
                );
            }
            Err(e) => {
                error!(
                    target: "td.server",
                    error = %e,
                    "Session task failed"
                );
                // The session id is lost with the task, but a panicked
                // session's drop guard has cancelled its token
                self.sessions.retain(|_, handle| !handle.is_cancelled());
                if let Some(holder) = self.installation.active_session() {
                    if !self.sessions.contains_key(&holder) {
                        self.installation.release(holder);
                    }
                }
            }
        }
        metrics::set_sessions_open(self.sessions.len());
    }

    async fn graceful_shutdown(&mut self, deadline: Duration) {
        info!(
            target: "td.server",
            session_count = self.sessions.len(),
            "Performing graceful shutdown"
        );

        self.accepting = false;

        for handle in self.sessions.values() {
            handle.cancel();
        }

        let drained = tokio::time::timeout(deadline, async {
            while let Some(joined) = self.tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(
                        target: "td.server",
                        error = %e,
                        "Session task failed during shutdown"
                    );
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                target: "td.server",
                remaining = self.tasks.len(),
                "Sessions did not finish before the deadline, aborting"
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        self.sessions.clear();
        metrics::set_sessions_open(0);
    }
}
