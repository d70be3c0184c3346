//! Event Stream Connection
//!
//! Keeps one subscription to the server's event feed alive for the life of
//! the process and feeds every event to the sync engine.

mod backoff;
mod connection;

pub use backoff::*;
pub use connection::*;
