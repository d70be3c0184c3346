//! EchoNest Sync - Core Library
//!
//! Mirrors the "now playing" state of an EchoNest server onto a local
//! media player: a long-lived event stream feeds a small state machine
//! that issues play/seek/pause/resume commands and corrects drift.

pub mod agent;
pub mod player;
pub mod server;
pub mod status;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use agent::{AgentError, SyncAgent};
pub use player::{Player, PlayerError};
pub use server::{EchoNestClient, EventSource, ServerError};
pub use status::{StatusSender, SyncEvent};
pub use sync::{DomainEvent, DriftCorrector, PlaybackState};
