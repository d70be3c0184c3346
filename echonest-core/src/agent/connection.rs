//! Sync agent run loop
//!
//! One worker drives connect → bootstrap → stream → backoff forever. It is
//! the only writer of the playback and connection state, and applies
//! events strictly in the order the server sent them.

use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::backoff::Backoff;
use crate::player::Player;
use crate::server::{EventSource, EventStream, RawEvent, ServerError};
use crate::status::{DisconnectReason, StatusSender, SyncEvent};
use crate::sync::{decode, DriftCorrector, PlaybackState, Synchronizer};

/// Terminal outcomes of [`SyncAgent::run`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Authentication failed (401), check your token")]
    AuthenticationFailed,
}

/// Where the connection loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Streaming,
    Backoff(Duration),
    /// Credentials rejected; the loop has stopped for good
    Terminal,
}

/// Connection bookkeeping, owned by the agent
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub backoff: Backoff,
    pub auth_failed: bool,
}

/// How one streaming session ended
enum StreamEnd {
    Closed,
    Failed(ServerError),
    Cancelled,
}

/// Mirrors the server's playback onto a local player
pub struct SyncAgent<S, P> {
    source: S,
    sync: Synchronizer<P>,
    connection: ConnectionState,
    phase: ConnectionPhase,
    status: StatusSender,
    has_connected: bool,
}

impl<S: EventSource, P: Player> SyncAgent<S, P> {
    pub fn new(source: S, player: P, drift: DriftCorrector) -> Self {
        Self {
            source,
            sync: Synchronizer::new(player, drift),
            connection: ConnectionState::default(),
            phase: ConnectionPhase::Connecting,
            status: StatusSender::disabled(),
            has_connected: false,
        }
    }

    /// Report connection and playback changes on the given status channel
    pub fn with_status(mut self, status: StatusSender) -> Self {
        self.sync = self.sync.with_status(status.clone());
        self.status = status;
        self
    }

    /// Override the default 5s..60s reconnect policy
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.connection.backoff = backoff;
        self
    }

    pub fn playback(&self) -> &PlaybackState {
        self.sync.state()
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Run until cancelled or until the server rejects our credentials.
    ///
    /// Every other failure is logged and retried with backoff.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), AgentError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            self.set_phase(ConnectionPhase::Connecting);
            info!("Connecting to {} ...", self.source.endpoint());
            self.status.send(SyncEvent::Connecting);

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                attempt = self.source.subscribe() => attempt,
            };

            match attempt {
                Ok(stream) => {
                    info!("Connected, listening for events");
                    self.connection.backoff.reset();
                    self.status.send(SyncEvent::Connected {
                        reconnect: self.has_connected,
                    });
                    self.has_connected = true;
                    self.set_phase(ConnectionPhase::Streaming);

                    if !self.bootstrap(&cancel).await {
                        return Ok(());
                    }

                    match self.stream_events(stream, &cancel).await {
                        StreamEnd::Cancelled => return Ok(()),
                        StreamEnd::Closed => {
                            info!("Event stream closed by server");
                            self.status.send(SyncEvent::Disconnected {
                                reason: DisconnectReason::StreamClosed,
                            });
                        }
                        StreamEnd::Failed(e) => {
                            warn!("Event stream error: {}", e);
                            self.status.send(SyncEvent::Disconnected {
                                reason: DisconnectReason::Error(e.to_string()),
                            });
                        }
                    }
                }
                Err(e) if e.is_unauthorized() => {
                    error!("Authentication failed (401), check your token");
                    self.connection.auth_failed = true;
                    self.set_phase(ConnectionPhase::Terminal);
                    self.status.send(SyncEvent::Disconnected {
                        reason: DisconnectReason::AuthFailed,
                    });
                    return Err(AgentError::AuthenticationFailed);
                }
                Err(e) => {
                    warn!("Connection failed: {}", e);
                    self.status.send(SyncEvent::Disconnected {
                        reason: DisconnectReason::Error(e.to_string()),
                    });
                }
            }

            let delay = self.connection.backoff.next_delay();
            self.set_phase(ConnectionPhase::Backoff(delay));
            info!("Reconnecting in {}s ...", delay.as_secs());
            self.status.send(SyncEvent::Reconnecting { delay });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Sync to the server's current state before waiting for live events.
    ///
    /// A failed fetch is logged and streaming starts anyway. Returns `false`
    /// if cancelled while fetching.
    async fn bootstrap(&mut self, cancel: &CancellationToken) -> bool {
        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            snapshot = self.source.snapshot() => snapshot,
        };

        match snapshot {
            Ok(raw) => {
                debug!("Initial sync data: {}", raw.data);
                self.handle(&raw).await;
            }
            Err(e) => warn!("Initial sync failed: {}", e),
        }
        true
    }

    async fn stream_events(&mut self, mut stream: EventStream, cancel: &CancellationToken) -> StreamEnd {
        loop {
            // Only the wait is cancellable; an event already received is applied in full
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(raw)) => self.handle(&raw).await,
                Some(Err(e)) => return StreamEnd::Failed(e),
                None => return StreamEnd::Closed,
            }
        }
    }

    /// Decode and apply one raw event, dropping anything malformed
    async fn handle(&mut self, raw: &RawEvent) {
        match decode(raw) {
            Ok(Some(event)) => self.sync.apply(event).await,
            Ok(None) => trace!("Ignoring {} event", raw.name),
            Err(e) => debug!("Dropping malformed {} event: {}", raw.name, e),
        }
    }

    fn set_phase(&mut self, phase: ConnectionPhase) {
        if self.phase != phase {
            trace!("Connection phase: {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}
