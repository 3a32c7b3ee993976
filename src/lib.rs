//! Arena netcode - authoritative tick server with client prediction
//!
//! The server runs one fixed-rate loop per room and resolves hit-scan shots
//! against each player's recorded history. The client modules predict the
//! local player with the same simulation step and reconcile against server
//! snapshots.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
