//! Authoritative game simulation

pub mod error;
pub mod history;
pub mod hitscan;
pub mod lag_compensation;
pub mod player;
pub mod registry;
pub mod room;
pub mod simulation;
pub mod snapshot;
pub mod tick;

pub use error::RoomError;
pub use registry::RoomRegistry;
pub use room::{Room, RoomCommand, RoomHandle, RoomState};
pub use tick::Tick;
