//! Per-tick event accumulation and snapshot building

use crate::ws::protocol::{
    PlayerDespawnData, PlayerHealthUpdateData, PlayerKillData, PlayerSpawnData, PlayerStateData,
    ReliableGameUpdate, ServerMsg, UnreliableGameUpdate,
};

use super::player::ServerPlayer;

/// Events collected during one tick, flushed by the broadcast step
#[derive(Debug, Default)]
pub struct TickEvents {
    pub spawns: Vec<PlayerSpawnData>,
    pub despawns: Vec<PlayerDespawnData>,
    pub health_updates: Vec<PlayerHealthUpdateData>,
    pub kills: Vec<PlayerKillData>,
}

impl TickEvents {
    /// The reliable batch for this tick, if anything happened
    pub fn reliable_update(&self) -> Option<ServerMsg> {
        let update = ReliableGameUpdate {
            spawns: self.spawns.clone(),
            despawns: self.despawns.clone(),
            kills: self.kills.clone(),
        };
        (!update.is_empty()).then_some(ServerMsg::ReliableGameUpdate(update))
    }

    pub fn clear(&mut self) {
        self.spawns.clear();
        self.despawns.clear();
        self.health_updates.clear();
        self.kills.clear();
    }
}

/// Builds the per-recipient state snapshot
pub struct SnapshotBuilder {
    states: Vec<PlayerStateData>,
    health_updates: Vec<PlayerHealthUpdateData>,
}

impl SnapshotBuilder {
    pub fn new(players: &[ServerPlayer], events: &TickEvents) -> Self {
        Self {
            states: players.iter().map(|p| p.state).collect(),
            health_updates: events.health_updates.clone(),
        }
    }

    /// Snapshot for one recipient, carrying its own last processed input
    pub fn build_for(&self, recipient: &ServerPlayer) -> ServerMsg {
        ServerMsg::UnreliableGameUpdate(UnreliableGameUpdate {
            last_processed_tick: recipient.last_processed_tick(),
            players: self.states.clone(),
            health_updates: self.health_updates.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Tick;
    use glam::Vec3;
    use uuid::Uuid;

    #[test]
    fn quiet_tick_has_no_reliable_update() {
        let mut events = TickEvents::default();
        events.health_updates.push(PlayerHealthUpdateData {
            id: Uuid::new_v4(),
            health: 95,
        });
        assert!(events.reliable_update().is_none());
    }

    #[test]
    fn despawn_alone_produces_reliable_update() {
        let mut events = TickEvents::default();
        let id = Uuid::new_v4();
        events.despawns.push(PlayerDespawnData { id });
        match events.reliable_update() {
            Some(ServerMsg::ReliableGameUpdate(update)) => {
                assert_eq!(update.despawns, vec![PlayerDespawnData { id }]);
                assert!(update.spawns.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        events.clear();
        assert!(events.reliable_update().is_none());
    }

    #[test]
    fn snapshot_lists_every_player() {
        let a = ServerPlayer::new(Uuid::new_v4(), "a".into(), Vec3::ZERO, Tick::INITIAL);
        let b = ServerPlayer::new(Uuid::new_v4(), "b".into(), Vec3::X, Tick::INITIAL);
        let players = vec![a, b];
        let builder = SnapshotBuilder::new(&players, &TickEvents::default());

        match builder.build_for(&players[1]) {
            ServerMsg::UnreliableGameUpdate(update) => {
                assert_eq!(update.players.len(), 2);
                assert_eq!(update.players[1].position, Vec3::X);
                assert_eq!(update.last_processed_tick, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
