//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::Tick;

/// Player identifier, assigned by the server on connect
pub type PlayerId = Uuid;

/// Small integer type code carried by every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Tag {
    JoinRoom = 0,
    JoinRoomAccepted = 1,
    JoinRoomDenied = 2,
    GameJoinRequest = 3,
    GameStart = 4,
    PlayerInput = 5,
    UnreliableGameUpdate = 6,
    ReliableGameUpdate = 7,
    LeaveRoom = 8,
    Ping = 9,
    Pong = 10,
    Welcome = 11,
    Error = 12,
}

/// Delivery class a message is sent on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Ordered, never dropped
    Reliable,
    /// Latest-wins; a newer message replaces one not yet delivered
    Unreliable,
}

/// Action keys sampled for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputKeys {
    pub forward: bool,
    pub left: bool,
    pub back: bool,
    pub right: bool,
    pub jump: bool,
    pub fire: bool,
}

/// One player's input for a single tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerInputData {
    pub keys: InputKeys,
    /// Facing rotation (yaw and pitch)
    pub look_direction: Quat,
    /// Server tick this input was sampled against
    pub tick: Tick,
}

impl PlayerInputData {
    pub fn new(keys: InputKeys, look_direction: Quat, tick: Tick) -> Self {
        Self {
            keys,
            look_direction,
            tick,
        }
    }

    /// No keys held, facing forward
    pub fn idle(tick: Tick) -> Self {
        Self::new(InputKeys::default(), Quat::IDENTITY, tick)
    }
}

/// Physical state of a player at a tick boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateData {
    pub id: PlayerId,
    pub position: Vec3,
    pub look_direction: Quat,
    /// Vertical speed carried between ticks (gravity and jumping)
    pub vertical_velocity: f32,
    /// A shot was taken during the tick that produced this state
    pub fired: bool,
}

impl PlayerStateData {
    /// Resting state at a spawn position
    pub fn spawned_at(id: PlayerId, position: Vec3) -> Self {
        Self {
            id,
            position,
            look_direction: Quat::IDENTITY,
            vertical_velocity: 0.0,
            fired: false,
        }
    }
}

/// A player entered the game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSpawnData {
    pub id: PlayerId,
    pub name: String,
    pub position: Vec3,
}

/// A player left the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDespawnData {
    pub id: PlayerId,
}

/// A player's health changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerHealthUpdateData {
    pub id: PlayerId,
    pub health: u8,
}

/// A player died; `killer == victim` marks a respawn without a shooter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerKillData {
    pub killer: PlayerId,
    pub victim: PlayerId,
}

/// Per-tick state broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreliableGameUpdate {
    /// Tick of the recipient's last processed input, if any input arrived yet
    pub last_processed_tick: Option<Tick>,
    pub players: Vec<PlayerStateData>,
    pub health_updates: Vec<PlayerHealthUpdateData>,
}

/// Batched lifecycle events, only sent when something happened
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReliableGameUpdate {
    pub spawns: Vec<PlayerSpawnData>,
    pub despawns: Vec<PlayerDespawnData>,
    pub kills: Vec<PlayerKillData>,
}

impl ReliableGameUpdate {
    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty() && self.despawns.is_empty() && self.kills.is_empty()
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join (or open) a named room
    JoinRoom { room: String, name: String },

    /// Enter the game inside the joined room
    GameJoinRequest,

    /// Input for one client tick
    PlayerInput { input: PlayerInputData },

    /// Leave the current room
    LeaveRoom,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    pub fn tag(&self) -> Tag {
        match self {
            Self::JoinRoom { .. } => Tag::JoinRoom,
            Self::GameJoinRequest => Tag::GameJoinRequest,
            Self::PlayerInput { .. } => Tag::PlayerInput,
            Self::LeaveRoom => Tag::LeaveRoom,
            Self::Ping { .. } => Tag::Ping,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: PlayerId, server_time: u64 },

    /// Room join accepted
    JoinRoomAccepted { room: String },

    /// Room join refused
    JoinRoomDenied { reason: String },

    /// The player entered the game; carries everyone already spawned
    GameStart {
        server_tick: Tick,
        players: Vec<PlayerSpawnData>,
    },

    /// State of every player, sent each tick
    UnreliableGameUpdate(UnreliableGameUpdate),

    /// Spawns, despawns and kills accumulated during a tick
    ReliableGameUpdate(ReliableGameUpdate),

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },

    /// Error message
    Error { code: String, message: String },
}

impl ServerMsg {
    pub fn tag(&self) -> Tag {
        match self {
            Self::Welcome { .. } => Tag::Welcome,
            Self::JoinRoomAccepted { .. } => Tag::JoinRoomAccepted,
            Self::JoinRoomDenied { .. } => Tag::JoinRoomDenied,
            Self::GameStart { .. } => Tag::GameStart,
            Self::UnreliableGameUpdate(_) => Tag::UnreliableGameUpdate,
            Self::ReliableGameUpdate(_) => Tag::ReliableGameUpdate,
            Self::Pong { .. } => Tag::Pong,
            Self::Error { .. } => Tag::Error,
        }
    }

    /// Only the per-tick state snapshot travels on the unreliable class
    pub fn delivery(&self) -> Delivery {
        match self {
            Self::UnreliableGameUpdate(_) => Delivery::Unreliable,
            _ => Delivery::Reliable,
        }
    }
}

/// Room listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    pub name: String,
    pub players: usize,
    pub max_slots: usize,
    pub tick: Tick,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_message_uses_snake_case_tag() {
        let msg = ClientMsg::PlayerInput {
            input: PlayerInputData::idle(Tick::INITIAL),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "player_input");
        assert_eq!(json["input"]["tick"], 2);

        let back: ClientMsg = serde_json::from_value(json).unwrap();
        assert_eq!(back.tag(), Tag::PlayerInput);
    }

    #[test]
    fn unconfirmed_update_serializes_null_tick() {
        let msg = ServerMsg::UnreliableGameUpdate(UnreliableGameUpdate {
            last_processed_tick: None,
            players: Vec::new(),
            health_updates: Vec::new(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "unreliable_game_update");
        assert!(json["last_processed_tick"].is_null());
        assert_eq!(msg.delivery(), Delivery::Unreliable);
    }

    #[test]
    fn tag_codes_are_stable() {
        assert_eq!(Tag::PlayerInput as u16, 5);
        assert_eq!(Tag::UnreliableGameUpdate as u16, 6);
        assert_eq!(Tag::ReliableGameUpdate as u16, 7);
    }
}
