//! Target range daemon
//!
//! # Servers
//!
//! - TCP control protocol (default: 0.0.0.0:7777)
//! - UDP discovery responder on the same port number
//! - Prometheus metrics listener (optional)
//!
//! # Startup Flow
//!
//! 1. Parse and validate configuration
//! 2. Initialize tracing and (optionally) the Prometheus recorder
//! 3. Open the actuator backend, enable the target
//! 4. Start the control server (a bind failure is fatal)
//! 5. Start discovery and the button watcher
//! 6. Wait for SIGINT/SIGTERM or a client-requested shutdown

#![warn(clippy::pedantic)]

use std::sync::Arc;

use anyhow::Context;
use targetd::actors::{ServerHandle, SessionSettings, DEFAULT_SHUTDOWN_DEADLINE};
use targetd::actuator::{GpioDriver, SimulatedGpio, SysfsGpio, TargetActuator};
use targetd::audio::CommandAudioPlayer;
use targetd::button::spawn_button_watcher;
use targetd::config::{ActuatorBackend, Config};
use targetd::discovery::DiscoveryResponder;
use targetd::installation::Installation;
use targetd::lights::StatusLights;
use targetd::observability::init_metrics_recorder;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("invalid configuration")?;

    init_tracing(config.json_logs);

    info!(
        listen_address = %config.listen_address(),
        actuator = config.actuator.as_str(),
        gpio_base = config.gpio_base,
        session_timeout_seconds = config.session_timeout_seconds,
        discovery_enabled = config.discovery_enabled,
        exit_mode = ?config.exit_mode,
        "Configuration loaded"
    );

    if let Some(address) = config.metrics_address {
        init_metrics_recorder(address).map_err(|e| {
            error!(error = %e, "Failed to start metrics exporter");
            anyhow::anyhow!(e)
        })?;
        info!(metrics_address = %address, "Prometheus metrics listener started");
    }

    let driver = open_gpio(&config)?;
    let target = match &driver {
        Some(driver) => Some(Arc::new(
            TargetActuator::new(Arc::clone(driver)).context("failed to enable target")?,
        )),
        None => None,
    };
    let audio = Arc::new(CommandAudioPlayer::new(&config.play_command)?);
    let installation = Arc::new(Installation::new(
        target,
        audio,
        StatusLights::new(driver.clone()),
    ));

    let shutdown_token = CancellationToken::new();

    let (server, server_task) = ServerHandle::bind(
        config.listen_address(),
        Arc::clone(&installation),
        SessionSettings::from_config(&config),
        shutdown_token.clone(),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to start control server");
        e
    })?;

    let discovery_task = if config.discovery_enabled {
        let responder = DiscoveryResponder::bind(
            config.listen_address(),
            config.discovery_token.clone(),
            server.local_addr().port(),
        )
        .await
        .context("failed to start discovery responder")?;
        Some(tokio::spawn(responder.run(shutdown_token.child_token())))
    } else {
        info!("Discovery disabled");
        None
    };

    let button_task = driver.map(|driver| {
        spawn_button_watcher(
            Arc::clone(&installation),
            driver,
            shutdown_token.child_token(),
        )
    });

    info!(local_addr = %server.local_addr(), "Target daemon ready");

    tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        () = shutdown_token.cancelled() => {
            info!("Shutdown requested by client");
        }
    }

    if let Err(e) = server.shutdown(DEFAULT_SHUTDOWN_DEADLINE).await {
        // The server may already be gone when a client requested shutdown
        warn!(error = %e, "Server shutdown request failed");
    }
    shutdown_token.cancel();

    if let Err(e) = server_task.await {
        error!(error = %e, "Server task failed");
    }
    for task in [discovery_task, button_task].into_iter().flatten() {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task failed");
        }
    }

    installation.shutdown();

    info!("Target daemon shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "targetd=info,td=info,target_protocol=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn open_gpio(config: &Config) -> anyhow::Result<Option<Arc<dyn GpioDriver>>> {
    let driver: Arc<dyn GpioDriver> = match config.actuator {
        ActuatorBackend::None => {
            info!("No target actuator configured");
            return Ok(None);
        }
        ActuatorBackend::Simulated => Arc::new(SimulatedGpio::new()),
        ActuatorBackend::Sysfs => Arc::new(
            SysfsGpio::open(&config.gpio_root, config.gpio_base)
                .context("failed to open sysfs GPIO")?,
        ),
    };
    Ok(Some(driver))
}

/// Completes on SIGINT, or SIGTERM on Unix. If a handler cannot be
/// installed that signal is never observed; the other one still is.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
