//! Room errors

use crate::ws::protocol::PlayerId;

/// Errors returned by room membership operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,

    #[error("Player {0} is already in the room")]
    AlreadyInRoom(PlayerId),

    #[error("Player {0} has not joined the room")]
    NotInRoom(PlayerId),

    #[error("Player {0} is already in the game")]
    AlreadyInGame(PlayerId),

    #[error("Room has closed")]
    Closed,

    #[error("Room limit reached")]
    TooManyRooms,
}

impl RoomError {
    /// Short machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomFull => "room_full",
            Self::AlreadyInRoom(_) => "already_in_room",
            Self::NotInRoom(_) => "not_in_room",
            Self::AlreadyInGame(_) => "already_in_game",
            Self::Closed => "room_closed",
            Self::TooManyRooms => "too_many_rooms",
        }
    }
}
