//! Local Player Capability
//!
//! The sync engine never talks to a concrete media player directly. It only
//! needs the handful of commands below; adapters for a specific player
//! (D-Bus, AppleScript, a REST bridge, ...) live outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors a player adapter can report for a single command
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Player is not running")]
    NotRunning,

    #[error("Player command failed: {0}")]
    Command(String),
}

/// Commands the sync engine issues to the local player.
///
/// Calls are single-shot: a failed command is never retried by the engine,
/// the next server event is what brings the player back in line.
#[async_trait]
pub trait Player: Send + Sync {
    /// Whether the player process is up and reachable
    async fn is_running(&self) -> bool;

    /// Start playing the given track URI (e.g. `spotify:track:abc`)
    async fn play_track(&self, uri: &str) -> Result<(), PlayerError>;

    /// Seek to an absolute position in the current track, in seconds
    async fn seek_to(&self, seconds: f64) -> Result<(), PlayerError>;

    async fn pause(&self) -> Result<(), PlayerError>;

    async fn resume(&self) -> Result<(), PlayerError>;

    /// Current playback position in seconds, `None` when it can't be read
    async fn position(&self) -> Option<f64>;
}

#[async_trait]
impl<T: Player + ?Sized> Player for Arc<T> {
    async fn is_running(&self) -> bool {
        (**self).is_running().await
    }

    async fn play_track(&self, uri: &str) -> Result<(), PlayerError> {
        (**self).play_track(uri).await
    }

    async fn seek_to(&self, seconds: f64) -> Result<(), PlayerError> {
        (**self).seek_to(seconds).await
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        (**self).pause().await
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        (**self).resume().await
    }

    async fn position(&self) -> Option<f64> {
        (**self).position().await
    }
}
