//! Audio playback.
//!
//! Playback is fire-and-forget: [`AudioPlayer::play`] starts the player and
//! returns immediately. The configured command template is split on
//! whitespace; the `{f}` placeholder is replaced by the file name, or the
//! file name is appended when no placeholder is present. The command is run
//! directly, without a shell.

use std::fmt;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::FILE_PLACEHOLDER;
use crate::errors::TdError;
use crate::observability::metrics;

/// Something that can play an audio file.
pub trait AudioPlayer: Send + Sync + fmt::Debug {
    /// Starts playing `file` without waiting for it to finish. Failures are
    /// logged, never reported to the caller.
    fn play(&self, file: &str);
}

/// Plays audio by spawning an external command.
#[derive(Debug, Clone)]
pub struct CommandAudioPlayer {
    template: Vec<String>,
}

impl CommandAudioPlayer {
    /// Builds a player from a command template such as `aplay -q {f}`.
    ///
    /// # Errors
    ///
    /// Returns `TdError::Audio` when the template names no program.
    pub fn new(template: &str) -> Result<Self, TdError> {
        let template: Vec<String> = template.split_whitespace().map(str::to_string).collect();
        if template.is_empty() {
            return Err(TdError::Audio("play command is empty".to_string()));
        }
        Ok(Self { template })
    }

    /// Program and arguments for playing `file`.
    #[must_use]
    pub fn command_line(&self, file: &str) -> Vec<String> {
        let mut argv: Vec<String> = self
            .template
            .iter()
            .map(|part| part.replace(FILE_PLACEHOLDER, file))
            .collect();
        if !self.template.iter().any(|part| part.contains(FILE_PLACEHOLDER)) {
            argv.push(file.to_string());
        }
        argv
    }
}

impl AudioPlayer for CommandAudioPlayer {
    fn play(&self, file: &str) {
        let argv = self.command_line(file);
        let Some((program, args)) = argv.split_first() else {
            return;
        };

        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(false)
            .spawn();

        match spawned {
            Ok(mut child) => {
                metrics::record_audio_play("spawned");
                debug!(
                    target: "td.audio",
                    file = %file,
                    pid = child.id(),
                    "Audio player started"
                );
                let file = file.to_string();
                // Reap the child so finished players don't linger as zombies
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if status.success() => {
                            debug!(target: "td.audio", file = %file, "Audio player finished");
                        }
                        Ok(status) => {
                            warn!(
                                target: "td.audio",
                                file = %file,
                                status = %status,
                                "Audio player exited with failure"
                            );
                        }
                        Err(e) => {
                            warn!(
                                target: "td.audio",
                                file = %file,
                                error = %e,
                                "Failed to wait for audio player"
                            );
                        }
                    }
                });
            }
            Err(e) => {
                metrics::record_audio_play("failed");
                warn!(
                    target: "td.audio",
                    file = %file,
                    program = %program,
                    error = %e,
                    "Failed to start audio player"
                );
            }
        }
    }
}
