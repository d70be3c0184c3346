//! Spotify control over MPRIS2 (D-Bus session bus)

use std::collections::HashMap;

use async_trait::async_trait;
use echonest_core::{Player, PlayerError};
use tracing::debug;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};
use zbus::{Connection, Proxy};

const SPOTIFY_BUS_NAME: &str = "org.mpris.MediaPlayer2.spotify";
const MPRIS_OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
const MPRIS_PLAYER: &str = "org.mpris.MediaPlayer2.Player";
const DBUS_PROPERTIES: &str = "org.freedesktop.DBus.Properties";

/// MPRIS positions and offsets are in microseconds
const MICROS_PER_SEC: f64 = 1_000_000.0;

const TRACK_ID_KEY: &str = "mpris:trackid";

fn command_error(e: zbus::Error) -> PlayerError {
    PlayerError::Command(e.to_string())
}

/// Local Spotify desktop client
pub struct SpotifyMpris {
    connection: Connection,
}

impl SpotifyMpris {
    pub async fn connect() -> Result<Self, PlayerError> {
        let connection = Connection::session().await.map_err(command_error)?;
        Ok(Self { connection })
    }

    async fn proxy(&self, interface: &'static str) -> zbus::Result<Proxy<'static>> {
        Proxy::new(&self.connection, SPOTIFY_BUS_NAME, MPRIS_OBJECT_PATH, interface).await
    }

    async fn player_call(&self, method: &'static str) -> zbus::Result<()> {
        let proxy = self.proxy(MPRIS_PLAYER).await?;
        proxy.call_method(method, &()).await?;
        Ok(())
    }

    async fn position_micros(&self) -> zbus::Result<i64> {
        let proxy = self.proxy(DBUS_PROPERTIES).await?;
        let reply = proxy.call_method("Get", &(MPRIS_PLAYER, "Position")).await?;
        let value: OwnedValue = reply.body().deserialize()?;
        Ok(i64::try_from(value)?)
    }

    async fn current_track_id(&self) -> zbus::Result<OwnedObjectPath> {
        let proxy = self.proxy(DBUS_PROPERTIES).await?;
        let reply = proxy.call_method("Get", &(MPRIS_PLAYER, "Metadata")).await?;
        let value: OwnedValue = reply.body().deserialize()?;
        let metadata = HashMap::<String, OwnedValue>::try_from(value)?;
        track_id(&metadata)
    }
}

/// `mpris:trackid` from a Metadata map. Older Spotify builds send it as a string.
fn track_id(metadata: &HashMap<String, OwnedValue>) -> zbus::Result<OwnedObjectPath> {
    match metadata.get(TRACK_ID_KEY).map(|value| &**value) {
        Some(Value::ObjectPath(path)) => Ok(OwnedObjectPath::from(path.clone())),
        Some(Value::Str(path)) => Ok(OwnedObjectPath::try_from(path.as_str())?),
        Some(other) => Err(zbus::Error::Failure(format!(
            "unexpected {} value: {:?}",
            TRACK_ID_KEY, other
        ))),
        None => Err(zbus::Error::Failure(format!("no {} in metadata", TRACK_ID_KEY))),
    }
}

fn to_micros(seconds: f64) -> i64 {
    (seconds.max(0.0) * MICROS_PER_SEC) as i64
}

#[async_trait]
impl Player for SpotifyMpris {
    async fn is_running(&self) -> bool {
        let result: zbus::Result<bool> = async {
            let proxy = Proxy::new(
                &self.connection,
                "org.freedesktop.DBus",
                "/org/freedesktop/DBus",
                "org.freedesktop.DBus",
            )
            .await?;
            let reply = proxy.call_method("NameHasOwner", &(SPOTIFY_BUS_NAME,)).await?;
            let running: bool = reply.body().deserialize()?;
            Ok(running)
        }
        .await;

        result.unwrap_or(false)
    }

    async fn play_track(&self, uri: &str) -> Result<(), PlayerError> {
        if !self.is_running().await {
            return Err(PlayerError::NotRunning);
        }
        let proxy = self.proxy(MPRIS_PLAYER).await.map_err(command_error)?;
        proxy
            .call_method("OpenUri", &(uri,))
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn seek_to(&self, seconds: f64) -> Result<(), PlayerError> {
        // SetPosition names the track it targets, so the player ignores it
        // if a freshly opened track hasn't replaced the old one yet
        let track_id = self.current_track_id().await.map_err(command_error)?;
        let target = to_micros(seconds);
        debug!("MPRIS SetPosition: {} @ {}us", track_id.as_str(), target);

        let proxy = self.proxy(MPRIS_PLAYER).await.map_err(command_error)?;
        proxy
            .call_method("SetPosition", &(track_id, target))
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.player_call("Pause").await.map_err(command_error)
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        self.player_call("Play").await.map_err(command_error)
    }

    async fn position(&self) -> Option<f64> {
        match self.position_micros().await {
            Ok(micros) => Some(micros as f64 / MICROS_PER_SEC),
            Err(e) => {
                debug!("Could not read Spotify position: {}", e);
                None
            }
        }
    }
}
