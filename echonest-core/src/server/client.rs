//! EchoNest API HTTP Client

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument};

use super::sse::{RawEvent, SseDecoder};
use super::{EventSource, EventStream};

/// Connect timeout for every request, including the event stream
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall timeout for the one-shot snapshot request
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to the EchoNest server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server rejected the API token")]
    Unauthorized,

    #[error("Unexpected response (HTTP {0})")]
    Status(u16),

    #[error("Event stream failed: {0}")]
    Stream(String),
}

impl ServerError {
    /// Whether the server refused our credentials. Retrying won't help.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ServerError::Unauthorized)
    }
}

/// Client for the EchoNest server API
#[derive(Debug, Clone)]
pub struct EchoNestClient {
    http: Client,
    base_url: String,
    token: String,
}

impl EchoNestClient {
    /// Create a client for `server` (e.g. `https://echone.st`) authenticating with `token`
    pub fn new(server: &str, token: impl Into<String>) -> Result<Self, ServerError> {
        // No overall timeout: the event stream stays open indefinitely
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: server.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build an authenticated request
    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/api{}", self.base_url, path);
        self.http.get(url).bearer_auth(&self.token)
    }

    /// Map a response status onto our error taxonomy
    fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ServerError> {
        match resp.status() {
            status if status.is_success() => Ok(resp),
            StatusCode::UNAUTHORIZED => Err(ServerError::Unauthorized),
            status => Err(ServerError::Status(status.as_u16())),
        }
    }

    /// Open the `/api/events` stream
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn events(&self) -> Result<EventStream, ServerError> {
        let resp = self
            .request("/events")
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let resp = Self::check_status(resp)?;

        debug!("Event stream open (HTTP {})", resp.status());

        let body = Box::pin(resp.bytes_stream());
        let stream = futures::stream::unfold(
            (body, SseDecoder::new(), VecDeque::new()),
            |(mut body, mut decoder, mut pending)| async move {
                loop {
                    if let Some(event) = pending.pop_front() {
                        return Some((Ok(event), (body, decoder, pending)));
                    }
                    match body.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                        Some(Err(e)) => return Some((Err(ServerError::Http(e)), (body, decoder, pending))),
                        None => return None,
                    }
                }
            },
        );

        Ok(stream.boxed())
    }

    /// Fetch the current `/api/playing` snapshot as raw JSON text
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn playing(&self) -> Result<String, ServerError> {
        let resp = self
            .request("/playing")
            .timeout(SNAPSHOT_TIMEOUT)
            .send()
            .await?;
        let body = Self::check_status(resp)?.text().await?;

        debug!("Snapshot: {}", body);
        Ok(body)
    }
}

#[async_trait]
impl EventSource for EchoNestClient {
    async fn subscribe(&self) -> Result<EventStream, ServerError> {
        self.events().await
    }

    async fn snapshot(&self) -> Result<RawEvent, ServerError> {
        let body = self.playing().await?;
        Ok(RawEvent::new(super::NOW_PLAYING_EVENT, body))
    }

    fn endpoint(&self) -> String {
        format!("{}/api/events", self.base_url)
    }
}
