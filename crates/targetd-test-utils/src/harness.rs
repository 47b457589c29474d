//! Test daemon harness.
//!
//! Provides `TestDaemon` for running a real control server in tests, wired
//! to a [`MockGpio`] backend and a [`RecordingAudioPlayer`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use targetd::actors::{ServerHandle, SessionSettings};
use targetd::actuator::TargetActuator;
use targetd::config::ExitMode;
use targetd::installation::Installation;
use targetd::lights::StatusLights;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::TestClient;
use crate::mock_gpio::MockGpio;
use crate::recording_audio::RecordingAudioPlayer;

/// Builder for [`TestDaemon`].
#[derive(Debug, Clone)]
pub struct TestDaemonBuilder {
    idle_timeout: Option<Duration>,
    with_target: bool,
    exit_mode: ExitMode,
}

impl Default for TestDaemonBuilder {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            with_target: true,
            exit_mode: ExitMode::CloseSession,
        }
    }
}

impl TestDaemonBuilder {
    /// Drop sessions after `timeout` without data.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Run without a target actuator.
    pub fn without_target(mut self) -> Self {
        self.with_target = false;
        self
    }

    /// Make `X` shut the daemon down.
    pub fn exit_shuts_down(mut self) -> Self {
        self.exit_mode = ExitMode::Shutdown;
        self
    }

    /// Bind to 127.0.0.1:0 and start the server.
    pub async fn spawn(self) -> anyhow::Result<TestDaemon> {
        let gpio = Arc::new(MockGpio::new());
        let audio = Arc::new(RecordingAudioPlayer::new());

        let target = if self.with_target {
            Some(Arc::new(TargetActuator::new(gpio.clone())?))
        } else {
            None
        };
        let installation = Arc::new(Installation::new(
            target,
            audio.clone(),
            StatusLights::new(Some(gpio.clone())),
        ));

        let shutdown_token = CancellationToken::new();
        let (server, task) = ServerHandle::bind(
            "127.0.0.1:0".parse()?,
            Arc::clone(&installation),
            SessionSettings {
                idle_timeout: self.idle_timeout,
                exit_mode: self.exit_mode,
            },
            shutdown_token.clone(),
        )
        .await?;

        Ok(TestDaemon {
            addr: server.local_addr(),
            gpio,
            audio,
            installation,
            server,
            shutdown_token,
            task: Some(task),
        })
    }
}

/// A running control server backed by test doubles.
///
/// # Example
/// ```rust,ignore
/// let daemon = TestDaemon::builder()
///     .idle_timeout(Duration::from_millis(200))
///     .spawn()
///     .await?;
/// let mut client = daemon.connect().await?;
/// assert!(client.closed_within(Duration::from_secs(1)).await);
/// ```
pub struct TestDaemon {
    addr: SocketAddr,
    gpio: Arc<MockGpio>,
    audio: Arc<RecordingAudioPlayer>,
    installation: Arc<Installation>,
    server: ServerHandle,
    shutdown_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TestDaemon {
    pub fn builder() -> TestDaemonBuilder {
        TestDaemonBuilder::default()
    }

    /// Daemon with a target actuator and no inactivity timeout.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::builder().spawn().await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn gpio(&self) -> &Arc<MockGpio> {
        &self.gpio
    }

    pub fn audio(&self) -> &Arc<RecordingAudioPlayer> {
        &self.audio
    }

    pub fn installation(&self) -> &Arc<Installation> {
        &self.installation
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    /// The daemon-wide shutdown token.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    pub async fn connect(&self) -> anyhow::Result<TestClient> {
        TestClient::connect(self.addr).await
    }

    /// Waits for the server task to exit. Returns false on timeout.
    pub async fn stopped_within(&mut self, within: Duration) -> bool {
        match self.task.take() {
            Some(task) => tokio::time::timeout(within, task).await.is_ok(),
            None => true,
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
