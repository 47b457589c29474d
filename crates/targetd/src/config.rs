//! Daemon configuration.
//!
//! Configuration comes from command-line flags, each of which can also be
//! supplied through a `TARGETD_*` environment variable. The parsed [`Args`]
//! are validated once into an immutable [`Config`]. The discovery token is
//! redacted in Debug output.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Default TCP control port (UDP discovery listens on the same number).
pub const DEFAULT_PORT: u16 = 7777;

/// Default session inactivity timeout in seconds.
pub const DEFAULT_SESSION_TIMEOUT_SECONDS: u64 = 20;

/// Default discovery token.
pub const DEFAULT_DISCOVERY_TOKEN: &str = "{BC5C0A2F-7091-4254-B576-7F0E2F0441A6}";

/// Default sysfs GPIO root.
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Placeholder replaced by the audio file name in the play command.
pub const FILE_PLACEHOLDER: &str = "{f}";

/// Which target actuator backend drives the output lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActuatorBackend {
    /// No actuator. `D` answers `ERROR=Target`, `POS=` stays empty.
    None,
    /// Logs line changes instead of driving hardware.
    Simulated,
    /// Linux sysfs GPIO (`/sys/class/gpio`).
    Sysfs,
}

impl ActuatorBackend {
    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ActuatorBackend::None => "none",
            ActuatorBackend::Simulated => "simulated",
            ActuatorBackend::Sysfs => "sysfs",
        }
    }
}

/// What the `X` command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitMode {
    /// Close the issuing session only.
    #[default]
    CloseSession,
    /// Close the session and shut the daemon down.
    Shutdown,
}

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "targetd", version, about = "Network-controlled target range daemon")]
pub struct Args {
    /// IPv4 address to bind the control and discovery sockets to.
    #[arg(long, env = "TARGETD_BIND", default_value_t = Ipv4Addr::UNSPECIFIED)]
    pub bind: Ipv4Addr,

    /// TCP control port; UDP discovery uses the same port number.
    #[arg(short, long, env = "TARGETD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Command used to play audio files. `{f}` is replaced by the file name;
    /// without it the file name is appended as the last argument.
    #[arg(long = "play-cmd", env = "TARGETD_PLAY_CMD")]
    pub play_cmd: String,

    /// Session inactivity timeout in seconds (0 disables it).
    #[arg(short, long, env = "TARGETD_TIMEOUT", default_value_t = DEFAULT_SESSION_TIMEOUT_SECONDS)]
    pub timeout: u64,

    /// Discovery token that broadcast probes must contain.
    #[arg(long, env = "TARGETD_TOKEN", default_value = DEFAULT_DISCOVERY_TOKEN)]
    pub token: String,

    /// Target actuator backend.
    #[arg(long, env = "TARGETD_ACTUATOR", value_enum, default_value_t = ActuatorBackend::Simulated)]
    pub actuator: ActuatorBackend,

    /// Offset added to every GPIO number of the sysfs backend.
    #[arg(long = "gpio-base", env = "TARGETD_GPIO_BASE", default_value_t = 0)]
    pub gpio_base: u32,

    /// Root of the sysfs GPIO tree.
    #[arg(long = "gpio-root", env = "TARGETD_GPIO_ROOT", default_value = DEFAULT_GPIO_ROOT, hide = true)]
    pub gpio_root: PathBuf,

    /// Disable the UDP discovery responder.
    #[arg(long = "no-discovery", env = "TARGETD_NO_DISCOVERY")]
    pub no_discovery: bool,

    /// Make `X` shut the daemon down instead of just closing the session.
    #[arg(long = "exit-shuts-down", env = "TARGETD_EXIT_SHUTS_DOWN")]
    pub exit_shuts_down: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long = "metrics-address", env = "TARGETD_METRICS_ADDRESS")]
    pub metrics_address: Option<SocketAddr>,

    /// Emit logs as JSON lines.
    #[arg(long = "json-logs", env = "TARGETD_JSON_LOGS")]
    pub json_logs: bool,
}

/// Validated daemon configuration.
#[derive(Clone)]
pub struct Config {
    /// Address for the control listener and discovery socket.
    pub bind: Ipv4Addr,

    /// TCP control port (default: 7777).
    pub port: u16,

    /// Audio play command template.
    pub play_command: String,

    /// Session inactivity timeout in seconds; 0 disables the watchdog.
    pub session_timeout_seconds: u64,

    /// Discovery token.
    /// Protected by `SecretString` to keep it out of logs.
    pub discovery_token: SecretString,

    /// Actuator backend.
    pub actuator: ActuatorBackend,

    /// Sysfs GPIO number offset.
    pub gpio_base: u32,

    /// Sysfs GPIO root directory.
    pub gpio_root: PathBuf,

    /// Whether the discovery responder runs.
    pub discovery_enabled: bool,

    /// Behaviour of `X`.
    pub exit_mode: ExitMode,

    /// Prometheus listener address, if metrics are exported.
    pub metrics_address: Option<SocketAddr>,

    /// JSON log output.
    pub json_logs: bool,
}

/// Custom Debug implementation that redacts the discovery token.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("play_command", &self.play_command)
            .field("session_timeout_seconds", &self.session_timeout_seconds)
            .field("discovery_token", &"[REDACTED]")
            .field("actuator", &self.actuator)
            .field("gpio_base", &self.gpio_base)
            .field("gpio_root", &self.gpio_root)
            .field("discovery_enabled", &self.discovery_enabled)
            .field("exit_mode", &self.exit_mode)
            .field("metrics_address", &self.metrics_address)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl Config {
    /// Parses the process command line (and environment) into a `Config`.
    ///
    /// Exits the process with clap's usage message when flags are malformed
    /// or `--play-cmd` is missing.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a parsed value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(Args::parse())
    }

    /// Validates parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when:
    /// - the play command is blank
    /// - the port is 0
    /// - discovery is enabled with a blank token
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let play_command = args.play_cmd.trim().to_string();
        if play_command.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "play-cmd",
                reason: "must name a program to run".to_string(),
            });
        }

        if args.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }

        let discovery_enabled = !args.no_discovery;
        if discovery_enabled && args.token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "token",
                reason: "must not be empty while discovery is enabled".to_string(),
            });
        }

        Ok(Config {
            bind: args.bind,
            port: args.port,
            play_command,
            session_timeout_seconds: args.timeout,
            discovery_token: SecretString::from(args.token),
            actuator: args.actuator,
            gpio_base: args.gpio_base,
            gpio_root: args.gpio_root,
            discovery_enabled,
            exit_mode: if args.exit_shuts_down {
                ExitMode::Shutdown
            } else {
                ExitMode::CloseSession
            },
            metrics_address: args.metrics_address,
            json_logs: args.json_logs,
        })
    }

    /// TCP listen address.
    #[must_use]
    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind, self.port))
    }

    /// Session inactivity timeout, or `None` when disabled.
    #[must_use]
    pub fn session_timeout(&self) -> Option<Duration> {
        (self.session_timeout_seconds > 0).then(|| Duration::from_secs(self.session_timeout_seconds))
    }

    /// Discovery token as plain text.
    #[must_use]
    pub fn discovery_token(&self) -> &str {
        self.discovery_token.expose_secret()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["targetd"];
        argv.extend_from_slice(extra);
        Config::from_args(Args::try_parse_from(argv).expect("arguments should parse"))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--play-cmd", "aplay {f}"]).unwrap();

        assert_eq!(config.bind, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.play_command, "aplay {f}");
        assert_eq!(config.session_timeout_seconds, 20);
        assert_eq!(config.session_timeout(), Some(Duration::from_secs(20)));
        assert_eq!(config.discovery_token(), DEFAULT_DISCOVERY_TOKEN);
        assert_eq!(config.actuator, ActuatorBackend::Simulated);
        assert_eq!(config.gpio_base, 0);
        assert_eq!(config.gpio_root, PathBuf::from(DEFAULT_GPIO_ROOT));
        assert!(config.discovery_enabled);
        assert_eq!(config.exit_mode, ExitMode::CloseSession);
        assert!(config.metrics_address.is_none());
        assert!(!config.json_logs);
        assert_eq!(config.listen_address().to_string(), "0.0.0.0:7777");
    }

    #[test]
    fn test_play_cmd_is_required() {
        let result = Args::try_parse_from(["targetd", "--port", "7000"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_values() {
        let config = parse(&[
            "--play-cmd",
            "mpg123 -q",
            "--bind",
            "192.168.1.20",
            "--port",
            "8000",
            "--timeout",
            "0",
            "--token",
            "range-7",
            "--actuator",
            "sysfs",
            "--gpio-base",
            "512",
            "--no-discovery",
            "--exit-shuts-down",
            "--metrics-address",
            "127.0.0.1:9100",
            "--json-logs",
        ])
        .unwrap();

        assert_eq!(config.listen_address().to_string(), "192.168.1.20:8000");
        assert_eq!(config.session_timeout(), None);
        assert_eq!(config.discovery_token(), "range-7");
        assert_eq!(config.actuator, ActuatorBackend::Sysfs);
        assert_eq!(config.gpio_base, 512);
        assert!(!config.discovery_enabled);
        assert_eq!(config.exit_mode, ExitMode::Shutdown);
        assert_eq!(
            config.metrics_address,
            Some("127.0.0.1:9100".parse().unwrap())
        );
        assert!(config.json_logs);
    }

    #[test]
    fn test_blank_play_cmd_rejected() {
        let result = parse(&["--play-cmd", "   "]);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { field, .. }) if field == "play-cmd")
        );
    }

    #[test]
    fn test_port_zero_rejected() {
        let result = parse(&["--play-cmd", "aplay", "--port", "0"]);
        assert!(matches!(result, Err(ConfigError::InvalidValue { field, .. }) if field == "port"));
    }

    #[test]
    fn test_blank_token_rejected_only_with_discovery() {
        let result = parse(&["--play-cmd", "aplay", "--token", ""]);
        assert!(matches!(result, Err(ConfigError::InvalidValue { field, .. }) if field == "token"));

        let config = parse(&["--play-cmd", "aplay", "--token", "", "--no-discovery"]).unwrap();
        assert!(!config.discovery_enabled);
    }

    #[test]
    fn test_invalid_actuator_rejected() {
        let result = Args::try_parse_from(["targetd", "--play-cmd", "aplay", "--actuator", "servo"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = parse(&["--play-cmd", "aplay", "--token", "very-secret-token"]).unwrap();
        let debug = format!("{config:?}");

        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("very-secret-token"));
        assert!(debug.contains("aplay"));
    }
}
