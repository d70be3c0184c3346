//! Sync Engine
//!
//! Decodes server events and mirrors them onto the local player.

mod drift;
mod event;
mod state;

pub use drift::*;
pub use event::*;
pub use state::*;
