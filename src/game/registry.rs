//! Registry of open rooms

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::ws::protocol::RoomInfo;

use super::error::RoomError;
use super::room::{Room, RoomCommand, RoomHandle};

/// Registry of all open rooms, keyed by name
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, RoomHandle>>,
    max_rooms: usize,
    max_slots: usize,
    history_ticks: usize,
}

impl RoomRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            max_rooms: config.max_rooms,
            max_slots: config.room_max_slots,
            history_ticks: config.lag_comp_history_ticks,
        }
    }

    pub fn get(&self, name: &str) -> Option<RoomHandle> {
        self.rooms.get(name).map(|r| r.value().clone())
    }

    /// Handle to the named room, opening it (and spawning its task) if needed
    pub fn open_or_get(&self, name: &str) -> Result<RoomHandle, RoomError> {
        if let Some(handle) = self.get(name) {
            if !handle.command_tx.is_closed() {
                return Ok(handle);
            }
        }

        // The room count is checked before the entry lock is taken; a
        // concurrent open can overshoot by one.
        let live = self.rooms.iter().filter(|r| r.key() != name).count();
        if live >= self.max_rooms {
            return Err(RoomError::TooManyRooms);
        }

        let mut entry = self.rooms.entry(name.to_string()).or_insert_with(|| self.spawn_room(name));
        if entry.command_tx.is_closed() {
            *entry = self.spawn_room(name);
        }
        Ok(entry.value().clone())
    }

    fn spawn_room(&self, name: &str) -> RoomHandle {
        let seed = rand::random::<u64>();
        let (room, handle) = Room::new(name.to_string(), self.max_slots, seed, self.history_ticks);

        let rooms = self.rooms.clone();
        let command_tx = handle.command_tx.clone();
        let room_name = name.to_string();
        tokio::spawn(async move {
            room.run().await;
            rooms.remove_if(&room_name, |_, h| h.command_tx.same_channel(&command_tx));
        });

        info!(room = %name, seed, "Room task spawned");
        handle
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().member_count()).sum()
    }

    pub fn list(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self.rooms.iter().map(|r| r.value().info()).collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    /// Ask every room to shut down
    pub fn close_all(&self) {
        for room in self.rooms.iter() {
            room.value().send(RoomCommand::Close);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::PlayerConnection;
    use std::time::Duration;
    use uuid::Uuid;

    fn registry(max_rooms: usize) -> RoomRegistry {
        let config = Config {
            max_rooms,
            room_max_slots: 2,
            lag_comp_history_ticks: 32,
            ..Config::default()
        };
        RoomRegistry::new(&config)
    }

    #[tokio::test(start_paused = true)]
    async fn same_name_returns_same_room() {
        let registry = registry(4);
        let a = registry.open_or_get("alpha").unwrap();
        let b = registry.open_or_get("alpha").unwrap();
        assert!(a.command_tx.same_channel(&b.command_tx));
        assert_eq!(registry.active_rooms(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn room_limit_is_enforced() {
        let registry = registry(1);
        tokio_test::assert_ok!(registry.open_or_get("alpha"));
        assert_eq!(
            registry.open_or_get("beta").map(|_| ()),
            Err(RoomError::TooManyRooms)
        );
        // Reopening an existing name is not a new room
        tokio_test::assert_ok!(registry.open_or_get("alpha"));
    }

    #[tokio::test(start_paused = true)]
    async fn join_full_room_is_refused() {
        let registry = registry(4);
        let room = registry.open_or_get("alpha").unwrap();
        for _ in 0..2 {
            let (conn, _outbox) = PlayerConnection::new();
            tokio_test::assert_ok!(room.join(Uuid::new_v4(), "p".into(), conn).await);
        }
        let (conn, _outbox) = PlayerConnection::new();
        assert_eq!(
            room.join(Uuid::new_v4(), "late".into(), conn).await,
            Err(RoomError::RoomFull)
        );
        assert_eq!(registry.total_players(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_room_leaves_the_registry() {
        let registry = registry(4);
        let room = registry.open_or_get("alpha").unwrap();
        assert_eq!(registry.list().len(), 1);

        registry.close_all();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(room.command_tx.is_closed());
        assert!(registry.get("alpha").is_none());
        assert!(registry.list().is_empty());
    }
}
