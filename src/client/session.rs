//! Client view of a game: the predicted local player and server-driven remotes

use std::collections::HashMap;

use glam::Quat;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::predictor::ClientPredictor;
use super::reconcile::ReconcileOutcome;
use super::ClientError;
use crate::game::hitscan::MAX_HEALTH;
use crate::game::Tick;
use crate::ws::protocol::{
    ClientMsg, InputKeys, PlayerId, PlayerSpawnData, PlayerStateData, ReliableGameUpdate,
    ServerMsg, UnreliableGameUpdate,
};

/// A player shown exactly as the server reports it
#[derive(Debug, Clone)]
pub struct RemotePlayer {
    pub name: String,
    pub state: PlayerStateData,
    pub health: u8,
}

/// Client-side game session
pub struct ClientSession {
    player_id: PlayerId,
    outbound: mpsc::UnboundedSender<ClientMsg>,
    predictor: Option<ClientPredictor>,
    health: u8,
    remotes: HashMap<PlayerId, RemotePlayer>,
    kills: Vec<(PlayerId, PlayerId)>,
    last_outcome: Option<ReconcileOutcome>,
}

impl ClientSession {
    pub fn new(player_id: PlayerId, outbound: mpsc::UnboundedSender<ClientMsg>) -> Self {
        Self {
            player_id,
            outbound,
            predictor: None,
            health: MAX_HEALTH,
            remotes: HashMap::new(),
            kills: Vec::new(),
            last_outcome: None,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn in_game(&self) -> bool {
        self.predictor.is_some()
    }

    pub fn local_state(&self) -> Option<&PlayerStateData> {
        self.predictor.as_ref().map(ClientPredictor::current)
    }

    pub fn predictor(&self) -> Option<&ClientPredictor> {
        self.predictor.as_ref()
    }

    pub fn health(&self) -> u8 {
        self.health
    }

    pub fn remote(&self, id: PlayerId) -> Option<&RemotePlayer> {
        self.remotes.get(&id)
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Kills seen so far as `(killer, victim)`
    pub fn kills(&self) -> &[(PlayerId, PlayerId)] {
        &self.kills
    }

    pub fn last_outcome(&self) -> Option<ReconcileOutcome> {
        self.last_outcome
    }

    /// Ask the room to spawn us
    pub fn request_game_join(&self) -> Result<(), ClientError> {
        self.outbound
            .send(ClientMsg::GameJoinRequest)
            .map_err(|_| ClientError::Disconnected)
    }

    /// Run one local fixed tick; a no-op until the game has started
    pub fn tick(&mut self, keys: InputKeys, look_direction: Quat) -> Result<(), ClientError> {
        match self.predictor.as_mut() {
            Some(predictor) => predictor.step(keys, look_direction, &self.outbound).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Apply one message from the server
    pub fn handle(&mut self, msg: ServerMsg) {
        match msg {
            ServerMsg::GameStart {
                server_tick,
                players,
            } => self.start(server_tick, players),
            ServerMsg::UnreliableGameUpdate(update) => self.apply_state(update),
            ServerMsg::ReliableGameUpdate(update) => self.apply_events(update),
            ServerMsg::JoinRoomDenied { reason } => {
                warn!(reason = %reason, "Room join denied");
            }
            ServerMsg::Error { code, message } => {
                warn!(code = %code, message = %message, "Server error");
            }
            ServerMsg::Welcome { .. }
            | ServerMsg::JoinRoomAccepted { .. }
            | ServerMsg::Pong { .. } => {}
        }
    }

    fn start(&mut self, server_tick: Tick, players: Vec<PlayerSpawnData>) {
        for spawn in players {
            if spawn.id == self.player_id {
                let state = PlayerStateData::spawned_at(spawn.id, spawn.position);
                self.predictor = Some(ClientPredictor::new(state, server_tick));
                self.health = MAX_HEALTH;
            } else {
                self.spawn_remote(spawn);
            }
        }
        info!(player_id = %self.player_id, server_tick = %server_tick, "Game started");
    }

    fn apply_state(&mut self, update: UnreliableGameUpdate) {
        for state in &update.players {
            if state.id == self.player_id {
                if let Some(predictor) = self.predictor.as_mut() {
                    self.last_outcome = Some(predictor.reconcile(update.last_processed_tick, state));
                }
            } else if let Some(remote) = self.remotes.get_mut(&state.id) {
                remote.state = *state;
            }
        }

        for health in &update.health_updates {
            if health.id == self.player_id {
                self.health = health.health;
            } else if let Some(remote) = self.remotes.get_mut(&health.id) {
                remote.health = health.health;
            }
        }
    }

    fn apply_events(&mut self, update: ReliableGameUpdate) {
        for spawn in update.spawns {
            self.spawn_remote(spawn);
        }
        for despawn in update.despawns {
            if self.remotes.remove(&despawn.id).is_some() {
                debug!(player_id = %despawn.id, "Remote player despawned");
            }
        }
        for kill in update.kills {
            self.kills.push((kill.killer, kill.victim));
        }
    }

    /// Spawns for players already shown, or for ourselves, are ignored
    fn spawn_remote(&mut self, spawn: PlayerSpawnData) {
        if spawn.id == self.player_id || self.remotes.contains_key(&spawn.id) {
            return;
        }
        debug!(player_id = %spawn.id, name = %spawn.name, "Remote player spawned");
        self.remotes.insert(
            spawn.id,
            RemotePlayer {
                name: spawn.name,
                state: PlayerStateData::spawned_at(spawn.id, spawn.position),
                health: MAX_HEALTH,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{PlayerDespawnData, PlayerHealthUpdateData, PlayerKillData};
    use glam::Vec3;
    use uuid::Uuid;

    fn spawn(id: PlayerId, position: Vec3) -> PlayerSpawnData {
        PlayerSpawnData {
            id,
            name: "p".into(),
            position,
        }
    }

    fn started() -> (ClientSession, PlayerId, mpsc::UnboundedReceiver<ClientMsg>) {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = ClientSession::new(me, tx);
        session.handle(ServerMsg::GameStart {
            server_tick: Tick(20),
            players: vec![spawn(other, Vec3::X), spawn(me, Vec3::ZERO)],
        });
        (session, other, rx)
    }

    #[test]
    fn game_start_seeds_prediction_and_remotes() {
        let (session, other, _rx) = started();
        assert!(session.in_game());
        assert_eq!(session.predictor().map(|p| p.confirmed_tick()), Some(Tick(20)));
        assert_eq!(session.remote(other).map(|r| r.state.position), Some(Vec3::X));
        assert_eq!(session.remote_count(), 1);
    }

    #[test]
    fn spawns_are_idempotent_and_despawns_remove() {
        let (mut session, other, _rx) = started();
        let newcomer = Uuid::new_v4();
        let batch = ReliableGameUpdate {
            spawns: vec![spawn(other, Vec3::Y), spawn(newcomer, Vec3::Z), spawn(session.player_id(), Vec3::Z)],
            ..ReliableGameUpdate::default()
        };
        session.handle(ServerMsg::ReliableGameUpdate(batch));
        assert_eq!(session.remote_count(), 2);
        assert_eq!(session.remote(other).map(|r| r.state.position), Some(Vec3::X));

        session.handle(ServerMsg::ReliableGameUpdate(ReliableGameUpdate {
            despawns: vec![PlayerDespawnData { id: other }],
            kills: vec![PlayerKillData { killer: newcomer, victim: other }],
            ..ReliableGameUpdate::default()
        }));
        assert!(session.remote(other).is_none());
        assert_eq!(session.kills(), &[(newcomer, other)]);
    }

    #[test]
    fn snapshot_reconciles_self_and_overwrites_remotes() {
        let (mut session, other, mut rx) = started();
        let me = session.player_id();
        session.tick(InputKeys::default(), Quat::IDENTITY).unwrap();
        assert!(matches!(rx.try_recv(), Ok(ClientMsg::PlayerInput { .. })));
        let recorded = session.predictor().unwrap().history().peek_oldest().unwrap().tick;

        let remote_state = PlayerStateData::spawned_at(other, Vec3::new(3.0, 0.0, 3.0));
        session.handle(ServerMsg::UnreliableGameUpdate(UnreliableGameUpdate {
            last_processed_tick: Some(recorded),
            players: vec![PlayerStateData::spawned_at(me, Vec3::new(2.0, 0.0, 0.0)), remote_state],
            health_updates: vec![PlayerHealthUpdateData { id: me, health: 90 }],
        }));

        assert!(matches!(
            session.last_outcome(),
            Some(ReconcileOutcome::Corrected { replayed: 0, .. })
        ));
        assert_eq!(session.local_state().map(|s| s.position), Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(session.remote(other).map(|r| r.state), Some(remote_state));
        assert_eq!(session.health(), 90);
    }
}
