//! WebSocket transport: protocol, per-connection delivery and the socket handler

pub mod connection;
pub mod handler;
pub mod protocol;
