//! Audio player double.

use std::sync::Mutex;
use std::time::Duration;

use targetd::audio::AudioPlayer;
use tokio::time::Instant;

/// One recorded play request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPlay {
    pub file: String,
    pub at: Instant,
}

/// Records play requests instead of playing anything.
#[derive(Debug, Default)]
pub struct RecordingAudioPlayer {
    plays: Mutex<Vec<AudioPlay>>,
}

impl RecordingAudioPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plays(&self) -> Vec<AudioPlay> {
        self.plays.lock().unwrap().clone()
    }

    /// File names played so far, in order.
    pub fn files(&self) -> Vec<String> {
        self.plays().into_iter().map(|play| play.file).collect()
    }

    /// Waits until at least `count` plays were recorded. Returns false on
    /// timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.plays.lock().unwrap().len() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl AudioPlayer for RecordingAudioPlayer {
    fn play(&self, file: &str) {
        self.plays.lock().unwrap().push(AudioPlay {
            file: file.to_string(),
            at: Instant::now(),
        });
    }
}
