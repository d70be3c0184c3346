//! Status events for observers (tray icon, logs, ...)
//!
//! The engine reports what it is doing through an optional unbounded
//! channel. Sending never blocks, and a dropped receiver is ignored.

use std::time::Duration;

use tokio::sync::mpsc;

/// Why the event stream went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Server ended the stream
    StreamClosed,
    /// Connect attempt or stream read failed
    Error(String),
    /// Credentials rejected, no further attempts will be made
    AuthFailed,
}

/// Something observable happened in the sync engine
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// About to open the event stream
    Connecting,
    /// Event stream is open. `reconnect` is true after an earlier drop.
    Connected { reconnect: bool },
    Disconnected { reason: DisconnectReason },
    /// Waiting before the next connect attempt
    Reconnecting { delay: Duration },
    /// The local player was switched to a new track
    TrackChanged { uri: String },
    /// Server reports nothing playing
    NothingPlaying,
    /// Server is playing something we don't control
    ForeignSource { source: String },
    PlayerPaused { paused: bool },
    /// Server-side position report
    PlayerPosition { position: f64 },
    /// Local player was re-seeked to the server position
    DriftCorrected { local: f64, server: f64 },
}

/// Sending half of the status channel; a no-op when disabled
#[derive(Debug, Clone, Default)]
pub struct StatusSender(Option<mpsc::UnboundedSender<SyncEvent>>);

impl StatusSender {
    pub fn new(tx: mpsc::UnboundedSender<SyncEvent>) -> Self {
        Self(Some(tx))
    }

    /// A sender that drops every event
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn send(&self, event: SyncEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}

/// Create a status channel
pub fn channel() -> (StatusSender, mpsc::UnboundedReceiver<SyncEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusSender::new(tx), rx)
}
