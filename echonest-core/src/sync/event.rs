//! Event Decoder
//!
//! Turns a raw stream event into a typed [`DomainEvent`]. Malformed payloads
//! come back as a [`DecodeError`] for the caller to log and drop; event
//! names we don't act on (`queue_update`, `volume`, ...) decode to `None`.

use chrono::{DateTime, NaiveDateTime};
use thiserror::Error;

use crate::server::{
    NowPlayingPayload, PlayerPositionPayload, RawEvent, NOW_PLAYING_EVENT, PLAYER_POSITION_EVENT,
};

/// Accepted layouts for timestamps without a UTC offset
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Why a payload was rejected
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

/// Authoritative "now playing" state reported by the server
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NowPlaying {
    /// Origin of the track, empty if missing
    pub source: String,
    /// Track ID within the source, empty when nothing is playing
    pub track_id: String,
    /// Track start, server clock. `None` if missing or unparsable.
    pub start_time: Option<NaiveDateTime>,
    /// Server clock when the event was produced. `None` if missing or unparsable.
    pub server_now: Option<NaiveDateTime>,
    /// `false` if missing
    pub paused: bool,
}

impl NowPlaying {
    /// Seconds the server has been playing this track, never negative.
    ///
    /// Both timestamps come from the server's clock and were parsed as a pair,
    /// so they share the same zone handling.
    pub fn elapsed_secs(&self) -> Option<f64> {
        let (start, now) = (self.start_time?, self.server_now?);
        let elapsed = (now - start).num_milliseconds() as f64 / 1000.0;
        Some(elapsed.max(0.0))
    }
}

impl From<NowPlayingPayload> for NowPlaying {
    fn from(payload: NowPlayingPayload) -> Self {
        let (start_time, server_now) = parse_timestamp_pair(&payload.starttime, &payload.now);
        Self {
            source: payload.src,
            track_id: payload.trackid,
            start_time,
            server_now,
            paused: payload.paused,
        }
    }
}

/// Periodic server-side playback position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerPosition {
    /// Origin of the track, empty if missing
    pub source: String,
    /// `0.0` if missing
    pub position_secs: f64,
}

impl From<PlayerPositionPayload> for PlayerPosition {
    fn from(payload: PlayerPositionPayload) -> Self {
        Self {
            source: payload.src,
            position_secs: payload.pos,
        }
    }
}

/// A decoded server event the state machine acts on
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    NowPlaying(NowPlaying),
    PlayerPosition(PlayerPosition),
}

/// Decode one raw event.
///
/// The payload must be a JSON object regardless of the event name.
pub fn decode(raw: &RawEvent) -> Result<Option<DomainEvent>, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(&raw.data)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    let event = match raw.name.as_str() {
        NOW_PLAYING_EVENT => {
            let payload: NowPlayingPayload = serde_json::from_value(value)?;
            DomainEvent::NowPlaying(payload.into())
        }
        PLAYER_POSITION_EVENT => {
            let payload: PlayerPositionPayload = serde_json::from_value(value)?;
            DomainEvent::PlayerPosition(payload.into())
        }
        _ => return Ok(None),
    };

    Ok(Some(event))
}

/// A server timestamp, normalized to UTC when it carried an offset
#[derive(Debug, Clone, Copy, PartialEq)]
struct Timestamp {
    at: NaiveDateTime,
    zoned: bool,
}

/// Parse an ISO-8601 server timestamp, with or without offset
fn parse_timestamp(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(Timestamp {
            at: dt.naive_utc(),
            zoned: true,
        });
    }

    let parsed = NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok());
    if parsed.is_none() {
        tracing::debug!("Ignoring unparsable timestamp {:?}", value);
    }
    parsed.map(|at| Timestamp { at, zoned: false })
}

/// Parse `starttime` and `now` together. A pair where only one side carries an
/// offset can't be compared, so both are dropped.
fn parse_timestamp_pair(
    start: &str,
    now: &str,
) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    match (parse_timestamp(start), parse_timestamp(now)) {
        (Some(start), Some(now)) if start.zoned != now.zoned => {
            tracing::debug!(
                "Ignoring timestamps with mismatched offsets: {:?} / {:?}",
                start,
                now
            );
            (None, None)
        }
        (start, now) => (start.map(|t| t.at), now.map(|t| t.at)),
    }
}
