//! Playback State Machine
//!
//! Holds what we believe the server is playing and turns each decoded
//! event into player commands. Player failures are logged and absorbed:
//! the state only records what actually took effect, so the next event
//! from the server retries whatever didn't.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::drift::DriftCorrector;
use super::event::{DomainEvent, NowPlaying, PlayerPosition};
use crate::player::Player;
use crate::status::{StatusSender, SyncEvent};

/// The only source we issue local player commands for
pub const CONTROLLED_SOURCE: &str = "spotify";

/// Prefix turning a controlled-source track ID into a player URI
const TRACK_URI_PREFIX: &str = "spotify:track:";

/// Time given to the player to start loading a new track before seeking into it
pub const TRACK_LOAD_DELAY: Duration = Duration::from_millis(500);

/// A freshly started track is only seeked if the server is further in than this
const MIN_CATCH_UP_SECS: f64 = 1.0;

/// What the client believes the server is playing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    /// Set only while a controlled-source track is playing
    pub current_track_uri: Option<String>,
    /// Source of the last reported track, empty when nothing plays
    pub current_source: String,
    /// Server-reported pause state
    pub paused: bool,
}

/// Applies server events to the local player
pub struct Synchronizer<P> {
    player: P,
    state: PlaybackState,
    drift: DriftCorrector,
    status: StatusSender,
}

impl<P: Player> Synchronizer<P> {
    pub fn new(player: P, drift: DriftCorrector) -> Self {
        Self {
            player,
            state: PlaybackState::default(),
            drift,
            status: StatusSender::disabled(),
        }
    }

    /// Report state changes on the given status channel
    pub fn with_status(mut self, status: StatusSender) -> Self {
        self.status = status;
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Apply one event. Never fails; player errors are logged.
    pub async fn apply(&mut self, event: DomainEvent) {
        match event {
            DomainEvent::NowPlaying(now_playing) => self.on_now_playing(now_playing).await,
            DomainEvent::PlayerPosition(position) => self.on_player_position(position).await,
        }
    }

    async fn on_now_playing(&mut self, event: NowPlaying) {
        if event.track_id.is_empty() {
            debug!("No track playing");
            let changed = self.state.current_track_uri.take().is_some()
                || !self.state.current_source.is_empty();
            self.state.current_source.clear();
            if changed {
                self.status.send(SyncEvent::NothingPlaying);
            }
            return;
        }

        if event.source != CONTROLLED_SOURCE {
            let changed =
                self.state.current_track_uri.take().is_some() || self.state.current_source != event.source;
            if changed {
                info!("Non-Spotify track ({}), skipping local control", event.source);
                self.status.send(SyncEvent::ForeignSource {
                    source: event.source.clone(),
                });
            }
            self.state.current_source = event.source;
            return;
        }

        let uri = format!("{}{}", TRACK_URI_PREFIX, event.track_id);
        self.state.current_source = event.source.clone();

        if self.state.current_track_uri.as_deref() != Some(uri.as_str()) {
            self.start_track(uri, &event).await;
        }

        self.sync_pause_state(&event).await;
    }

    /// Switch the player to `uri` and catch up with the server's position
    async fn start_track(&mut self, uri: String, event: &NowPlaying) {
        info!("Now playing: {}", uri);
        if let Err(e) = self.player.play_track(&uri).await {
            warn!("Failed to play {}: {}", uri, e);
            return;
        }
        self.state.current_track_uri = Some(uri.clone());
        self.status.send(SyncEvent::TrackChanged { uri });

        if let Some(elapsed) = event.elapsed_secs() {
            if elapsed > MIN_CATCH_UP_SECS {
                debug!("Seeking to {:.1}s (elapsed since start)", elapsed);
                // The seek is lost if the player hasn't started loading the track yet
                tokio::time::sleep(TRACK_LOAD_DELAY).await;
                self.seek(elapsed).await;
            }
        }
    }

    async fn sync_pause_state(&mut self, event: &NowPlaying) {
        if event.paused && !self.state.paused {
            info!("Pausing");
            match self.player.pause().await {
                Ok(()) => {
                    self.state.paused = true;
                    self.status.send(SyncEvent::PlayerPaused { paused: true });
                }
                Err(e) => warn!("Failed to pause: {}", e),
            }
        } else if !event.paused && self.state.paused {
            info!("Resuming");
            match self.player.resume().await {
                Ok(()) => {
                    self.state.paused = false;
                    self.status.send(SyncEvent::PlayerPaused { paused: false });
                    // The player's position didn't move while paused, the server's did
                    if let Some(elapsed) = event.elapsed_secs() {
                        self.seek(elapsed).await;
                    }
                }
                Err(e) => warn!("Failed to resume: {}", e),
            }
        }
    }

    async fn on_player_position(&mut self, event: PlayerPosition) {
        if event.source != CONTROLLED_SOURCE || self.state.current_track_uri.is_none() {
            return;
        }
        self.status.send(SyncEvent::PlayerPosition {
            position: event.position_secs,
        });

        let Some(local) = self.player.position().await else {
            debug!("Local position unavailable, skipping drift check");
            return;
        };

        let server = event.position_secs;
        if let Some(target) = self.drift.correction(local, server) {
            info!(
                "Drift correction: local={:.1}s server={:.1}s (drift={:.1}s)",
                local,
                server,
                DriftCorrector::drift(local, server)
            );
            if self.seek(target).await {
                self.status.send(SyncEvent::DriftCorrected { local, server });
            }
        }
    }

    /// Seek the player, logging failures. Returns whether it succeeded.
    async fn seek(&self, seconds: f64) -> bool {
        match self.player.seek_to(seconds).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to seek to {:.1}s: {}", seconds, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::server::{RawEvent, NOW_PLAYING_EVENT};
    use crate::status;
    use crate::sync::decode;
    use crate::testing::{Command, MockPlayer};

    fn synchronizer() -> (Synchronizer<Arc<MockPlayer>>, Arc<MockPlayer>) {
        let player = MockPlayer::new();
        (Synchronizer::new(Arc::clone(&player), DriftCorrector::default()), player)
    }

    fn now_playing(json: &str) -> DomainEvent {
        decode(&RawEvent::new(NOW_PLAYING_EVENT, json))
            .unwrap()
            .unwrap()
    }

    fn spotify(track_id: &str, paused: bool) -> DomainEvent {
        DomainEvent::NowPlaying(NowPlaying {
            source: CONTROLLED_SOURCE.to_string(),
            track_id: track_id.to_string(),
            paused,
            ..Default::default()
        })
    }

    fn position(source: &str, position_secs: f64) -> DomainEvent {
        DomainEvent::PlayerPosition(PlayerPosition {
            source: source.to_string(),
            position_secs,
        })
    }

    /// Put the synchronizer on `spotify:track:abc` and forget the commands it took
    async fn playing_abc(paused: bool) -> (Synchronizer<Arc<MockPlayer>>, Arc<MockPlayer>) {
        let (mut sync, player) = synchronizer();
        sync.apply(spotify("abc", paused)).await;
        player.clear();
        (sync, player)
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_track_plays_then_seeks_after_load_delay() {
        let (mut sync, player) = synchronizer();

        sync.apply(now_playing(
            r#"{"src": "spotify", "trackid": "abc", "starttime": "2024-01-01T00:00:00",
                "now": "2024-01-01T00:00:05", "paused": false}"#,
        ))
        .await;

        let commands = player.timed_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].1, Command::PlayTrack("spotify:track:abc".to_string()));
        assert_eq!(commands[1].1, Command::Seek(5.0));
        assert!(commands[1].0 - commands[0].0 >= TRACK_LOAD_DELAY);

        assert_eq!(
            sync.state(),
            &PlaybackState {
                current_track_uri: Some("spotify:track:abc".to_string()),
                current_source: "spotify".to_string(),
                paused: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_elapsed_skips_seek() {
        let (mut sync, player) = synchronizer();

        sync.apply(now_playing(
            r#"{"src": "spotify", "trackid": "abc", "starttime": "2024-01-01T00:00:00",
                "now": "2024-01-01T00:00:01"}"#,
        ))
        .await;

        assert_eq!(player.commands(), vec![Command::PlayTrack("spotify:track:abc".to_string())]);
    }

    #[tokio::test]
    async fn test_same_track_not_replayed() {
        let (mut sync, player) = playing_abc(false).await;

        sync.apply(spotify("abc", false)).await;
        assert!(player.commands().is_empty());
    }

    #[tokio::test]
    async fn test_pause_without_timestamps() {
        let (mut sync, player) = playing_abc(false).await;

        sync.apply(spotify("abc", true)).await;

        assert_eq!(player.commands(), vec![Command::Pause]);
        assert!(sync.state().paused);
    }

    #[tokio::test]
    async fn test_pause_is_idempotent() {
        let (mut sync, player) = playing_abc(false).await;

        sync.apply(spotify("abc", true)).await;
        sync.apply(spotify("abc", true)).await;

        assert_eq!(player.commands(), vec![Command::Pause]);
    }

    #[tokio::test]
    async fn test_resume_reanchors_position() {
        let (mut sync, player) = playing_abc(true).await;
        assert!(sync.state().paused);

        sync.apply(now_playing(
            r#"{"src": "spotify", "trackid": "abc", "paused": false,
                "starttime": "2024-01-01T00:00:00", "now": "2024-01-01T00:00:12"}"#,
        ))
        .await;

        assert_eq!(player.commands(), vec![Command::Resume, Command::Seek(12.0)]);
        assert!(!sync.state().paused);
    }

    #[tokio::test]
    async fn test_foreign_source_cedes_control() {
        let (mut sync, player) = playing_abc(true).await;

        // Would be a resume for a Spotify track
        sync.apply(now_playing(
            r#"{"src": "youtube", "trackid": "xyz", "paused": false,
                "starttime": "2024-01-01T00:00:00", "now": "2024-01-01T00:00:30"}"#,
        ))
        .await;

        assert!(player.commands().is_empty());
        assert_eq!(sync.state().current_track_uri, None);
        assert_eq!(sync.state().current_source, "youtube");
    }

    #[tokio::test]
    async fn test_nothing_playing_clears_track() {
        let (mut sync, player) = playing_abc(false).await;

        sync.apply(now_playing(r#"{"src": "spotify", "trackid": "", "paused": true}"#)).await;

        assert!(player.commands().is_empty());
        assert_eq!(sync.state().current_track_uri, None);
        assert_eq!(sync.state().current_source, "");
        assert!(!sync.state().paused);
    }

    #[tokio::test]
    async fn test_returning_to_spotify_replays_track() {
        let (mut sync, player) = playing_abc(false).await;

        sync.apply(now_playing(r#"{"src": "youtube", "trackid": "xyz"}"#)).await;
        sync.apply(spotify("abc", false)).await;

        assert_eq!(player.commands(), vec![Command::PlayTrack("spotify:track:abc".to_string())]);
    }

    #[tokio::test]
    async fn test_failed_play_is_retried_on_next_event() {
        let (mut sync, player) = synchronizer();

        player.set_failing(true);
        sync.apply(spotify("abc", false)).await;
        assert_eq!(sync.state().current_track_uri, None);
        assert_eq!(sync.state().current_source, "spotify");

        player.set_failing(false);
        sync.apply(spotify("abc", false)).await;
        assert_eq!(
            player.commands(),
            vec![
                Command::PlayTrack("spotify:track:abc".to_string()),
                Command::PlayTrack("spotify:track:abc".to_string()),
            ]
        );
        assert_eq!(sync.state().current_track_uri.as_deref(), Some("spotify:track:abc"));
    }

    #[tokio::test]
    async fn test_failed_pause_keeps_belief() {
        let (mut sync, player) = playing_abc(false).await;

        player.set_failing(true);
        sync.apply(spotify("abc", true)).await;
        assert!(!sync.state().paused);

        player.set_failing(false);
        sync.apply(spotify("abc", true)).await;
        assert_eq!(player.commands(), vec![Command::Pause, Command::Pause]);
        assert!(sync.state().paused);
    }

    #[tokio::test]
    async fn test_drift_inside_dead_band() {
        let (mut sync, player) = playing_abc(false).await;
        player.set_position(Some(101.5));

        sync.apply(position("spotify", 100.0)).await;
        assert!(player.commands().is_empty());
    }

    #[tokio::test]
    async fn test_drift_outside_dead_band() {
        let (mut sync, player) = playing_abc(false).await;
        player.set_position(Some(96.0));

        sync.apply(position("spotify", 100.0)).await;
        assert_eq!(player.commands(), vec![Command::Seek(100.0)]);
    }

    #[tokio::test]
    async fn test_drift_ignored_without_track_or_position() {
        let (mut sync, player) = synchronizer();
        player.set_position(Some(10.0));

        // No track believed playing
        sync.apply(position("spotify", 100.0)).await;

        // Foreign source
        sync.apply(spotify("abc", false)).await;
        player.clear();
        sync.apply(position("youtube", 100.0)).await;

        // Player unreachable
        player.set_position(None);
        sync.apply(position("spotify", 100.0)).await;

        assert!(player.commands().is_empty());
        assert_eq!(sync.state().current_track_uri.as_deref(), Some("spotify:track:abc"));
    }

    #[tokio::test]
    async fn test_status_events() {
        let (tx, mut rx) = status::channel();
        let player = MockPlayer::new();
        let mut sync = Synchronizer::new(Arc::clone(&player), DriftCorrector::default()).with_status(tx);

        sync.apply(spotify("abc", false)).await;
        sync.apply(spotify("abc", true)).await;
        sync.apply(now_playing(r#"{"src": "youtube", "trackid": "xyz"}"#)).await;
        sync.apply(now_playing(r#"{"src": "youtube", "trackid": "xyz"}"#)).await;
        sync.apply(now_playing("{}")).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SyncEvent::TrackChanged {
                    uri: "spotify:track:abc".to_string()
                },
                SyncEvent::PlayerPaused { paused: true },
                SyncEvent::ForeignSource {
                    source: "youtube".to_string()
                },
                SyncEvent::NothingPlaying,
            ]
        );
    }
}
