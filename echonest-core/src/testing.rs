//! Test doubles shared by the unit tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::player::{Player, PlayerError};

/// A command the engine issued to the player
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PlayTrack(String),
    Seek(f64),
    Pause,
    Resume,
}

/// Player that records every command and never touches real audio
#[derive(Debug, Default)]
pub struct MockPlayer {
    commands: Mutex<Vec<(Instant, Command)>>,
    position: Mutex<Option<f64>>,
    failing: Mutex<bool>,
}

impl MockPlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Position reported to the drift corrector
    pub fn set_position(&self, position: Option<f64>) {
        *self.position.lock().unwrap() = position;
    }

    /// Make every following command fail (it is still recorded)
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn timed_commands(&self) -> Vec<(Instant, Command)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
    }

    fn record(&self, command: Command) -> Result<(), PlayerError> {
        self.commands.lock().unwrap().push((Instant::now(), command));
        if *self.failing.lock().unwrap() {
            Err(PlayerError::Command("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Player for MockPlayer {
    async fn is_running(&self) -> bool {
        true
    }

    async fn play_track(&self, uri: &str) -> Result<(), PlayerError> {
        self.record(Command::PlayTrack(uri.to_string()))
    }

    async fn seek_to(&self, seconds: f64) -> Result<(), PlayerError> {
        self.record(Command::Seek(seconds))
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.record(Command::Pause)
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        self.record(Command::Resume)
    }

    async fn position(&self) -> Option<f64> {
        *self.position.lock().unwrap()
    }
}
