//! EchoNest Server Boundary
//!
//! HTTP client, SSE framing and wire payloads for the server's event feed.

mod client;
mod sse;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use client::{EchoNestClient, ServerError};
pub use sse::{RawEvent, SseDecoder};
pub use types::*;

/// Event name carrying the authoritative track/pause state
pub const NOW_PLAYING_EVENT: &str = "now_playing";

/// Event name carrying periodic server-side positions
pub const PLAYER_POSITION_EVENT: &str = "player_position";

/// Live events of one subscription, in server emission order
pub type EventStream = BoxStream<'static, Result<RawEvent, ServerError>>;

/// Where the sync agent gets its events from
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a new authenticated subscription to the event feed
    async fn subscribe(&self) -> Result<EventStream, ServerError>;

    /// Fetch the current playback snapshot, framed as a `now_playing` event
    async fn snapshot(&self) -> Result<RawEvent, ServerError>;

    /// Human readable location of the feed, for logs
    fn endpoint(&self) -> String;
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    async fn subscribe(&self) -> Result<EventStream, ServerError> {
        (**self).subscribe().await
    }

    async fn snapshot(&self) -> Result<RawEvent, ServerError> {
        (**self).snapshot().await
    }

    fn endpoint(&self) -> String {
        (**self).endpoint()
    }
}
