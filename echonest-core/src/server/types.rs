//! Wire payloads sent by the EchoNest server
//!
//! The server is not strict about which fields it includes, so every field
//! falls back to its zero value when missing or `null`.

use serde::{Deserialize, Deserializer};

/// Payload of a `now_playing` event and of the `/api/playing` snapshot
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NowPlayingPayload {
    /// Origin of the track ("spotify", "youtube", ...)
    #[serde(default, deserialize_with = "nullable")]
    pub src: String,

    /// Track identifier within the source; empty when nothing is playing
    #[serde(default, deserialize_with = "nullable")]
    pub trackid: String,

    /// When the track started, server clock
    #[serde(default, deserialize_with = "nullable")]
    pub starttime: String,

    /// Server time at which the payload was produced
    #[serde(default, deserialize_with = "nullable")]
    pub now: String,

    #[serde(default, deserialize_with = "flag")]
    pub paused: bool,
}

/// Payload of a `player_position` event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlayerPositionPayload {
    #[serde(default, deserialize_with = "nullable")]
    pub src: String,

    /// Server-side playback position in seconds
    #[serde(default, deserialize_with = "nullable")]
    pub pos: f64,
}

/// Treat an explicit `null` like a missing field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// Truthiness of a JSON flag: booleans as-is, numbers non-zero, null false
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Flag>::deserialize(deserializer)? {
        None => false,
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        Some(Flag::Float(f)) => f != 0.0,
    })
}
