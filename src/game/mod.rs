//! Match coordination: registry, sync engine, clock, wind and powerups

pub mod clock;
pub mod command;
pub mod r#match;
pub mod powerup;
pub mod registry;
pub mod snapshot;
pub mod wind;

pub use r#match::{GameMatch, MatchHandle, WorldEvent};
pub use registry::{Outbound, SessionKey, OUTBOUND_QUEUE};
