//! Room state and authoritative tick loop

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::util::time::{tick_duration, Timer, TICK_DURATION_MICROS};
use crate::ws::connection::PlayerConnection;
use crate::ws::protocol::{
    PlayerDespawnData, PlayerHealthUpdateData, PlayerId, PlayerInputData, PlayerKillData, RoomInfo,
    ServerMsg,
};

use super::error::RoomError;
use super::hitscan::{CombatSystem, HitResult};
use super::lag_compensation::{LagCompensation, ShotOutcome};
use super::player::ServerPlayer;
use super::simulation::SimulationStep;
use super::snapshot::{SnapshotBuilder, TickEvents};
use super::Tick;

/// Half the side length of the square players spawn in
const SPAWN_HALF_EXTENT: f32 = 20.0;

/// A connection that joined the room; it may or may not be in the game yet
#[derive(Debug, Clone)]
struct Member {
    id: PlayerId,
    name: String,
    connection: PlayerConnection,
}

/// Shot and kill counters, mostly for logs and the room listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomStats {
    pub shots: u64,
    pub hits: u64,
    pub kills: u64,
    /// Shots that referenced a frame the server had not reached yet
    pub future_frame_shots: u64,
}

/// Room state (owned by the room task)
pub struct RoomState {
    name: String,
    max_slots: usize,
    tick: Tick,
    members: Vec<Member>,
    /// Players in the game, in join order
    players: Vec<ServerPlayer>,
    events: TickEvents,
    rng: ChaCha8Rng,
    history_ticks: usize,
    stats: RoomStats,
}

impl RoomState {
    pub fn new(name: impl Into<String>, max_slots: usize, seed: u64, history_ticks: usize) -> Self {
        Self {
            name: name.into(),
            max_slots,
            tick: Tick::INITIAL,
            members: Vec::new(),
            players: Vec::new(),
            events: TickEvents::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            history_ticks: history_ticks.max(1),
            stats: RoomStats::default(),
        }
    }

    /// Re-open the room under a new name; the tick counter restarts at 2
    pub fn initialize(&mut self, name: impl Into<String>, max_slots: usize) {
        self.close();
        self.name = name.into();
        self.max_slots = max_slots;
        self.tick = Tick::INITIAL;
        self.stats = RoomStats::default();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn players(&self) -> &[ServerPlayer] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&ServerPlayer> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn stats(&self) -> RoomStats {
        self.stats
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            name: self.name.clone(),
            players: self.members.len(),
            max_slots: self.max_slots,
            tick: self.tick,
        }
    }

    /// Add a connection to the room
    pub fn add_member(
        &mut self,
        id: PlayerId,
        name: String,
        connection: PlayerConnection,
    ) -> Result<(), RoomError> {
        if self.members.iter().any(|m| m.id == id) {
            return Err(RoomError::AlreadyInRoom(id));
        }
        if self.members.len() >= self.max_slots {
            return Err(RoomError::RoomFull);
        }

        connection.send(ServerMsg::JoinRoomAccepted {
            room: self.name.clone(),
        });
        self.members.push(Member {
            id,
            name,
            connection,
        });

        info!(room = %self.name, player_id = %id, members = self.members.len(), "Player joined room");
        Ok(())
    }

    /// Spawn a room member into the game
    pub fn join_game(&mut self, id: PlayerId) -> Result<(), RoomError> {
        let member = self
            .members
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(RoomError::NotInRoom(id))?;
        if self.player(id).is_some() {
            return Err(RoomError::AlreadyInGame(id));
        }

        let spawn = self.spawn_point();
        let player = ServerPlayer::new(id, member.name, spawn, self.tick);
        self.events.spawns.push(player.spawn_data());
        self.players.push(player);

        member.connection.send(ServerMsg::GameStart {
            server_tick: self.tick,
            players: self.players.iter().map(ServerPlayer::spawn_data).collect(),
        });

        info!(room = %self.name, player_id = %id, tick = %self.tick, "Player spawned");
        Ok(())
    }

    /// Remove a member; a spawned player is despawned on the next broadcast.
    ///
    /// Returns false if the player was not in the room.
    pub fn remove_member(&mut self, id: PlayerId) -> bool {
        let Some(pos) = self.members.iter().position(|m| m.id == id) else {
            return false;
        };
        self.members.remove(pos);

        if let Some(pos) = self.players.iter().position(|p| p.id == id) {
            self.players.remove(pos);
            self.events.despawns.push(PlayerDespawnData { id });
        }

        info!(room = %self.name, player_id = %id, members = self.members.len(), "Player left room");
        true
    }

    /// Queue an input for the next tick
    pub fn receive_input(&mut self, id: PlayerId, input: PlayerInputData) {
        match self.players.iter_mut().find(|p| p.id == id) {
            Some(player) => player.receive_input(input),
            None => debug!(room = %self.name, player_id = %id, "Input from player not in game"),
        }
    }

    pub fn send_to(&self, id: PlayerId, msg: ServerMsg) {
        if let Some(member) = self.members.iter().find(|m| m.id == id) {
            member.connection.send(msg);
        }
    }

    /// Remove every member and forget all per-tick state
    pub fn close(&mut self) {
        let ids: Vec<PlayerId> = self.members.iter().map(|m| m.id).collect();
        for id in ids {
            self.remove_member(id);
        }
        self.events.clear();
    }

    /// Run one authoritative tick and broadcast the result
    pub fn run_tick(&mut self) {
        self.tick = self.tick.next();

        for player in &mut self.players {
            player.pre_update();
        }

        // Shots are resolved before anyone moves, so every history's newest
        // entry is the state recorded at `tick - 1`.
        for i in 0..self.players.len() {
            let shooter = self.players[i].id;
            for frame in self.players[i].take_shots() {
                self.resolve_shot(shooter, frame);
            }
        }

        for i in 0..self.players.len() {
            let state = self.players[i].update(self.tick, self.history_ticks);
            if SimulationStep::is_below_kill_plane(state.position) {
                self.respawn_fallen(i);
            }
        }

        self.broadcast();
        self.events.clear();
    }

    /// Lag-compensated hit test for a shot at `frame`, applying damage on hit
    pub fn resolve_shot(&mut self, shooter: PlayerId, frame: Tick) -> ShotOutcome {
        self.stats.shots += 1;
        let outcome = LagCompensation::resolve(self.tick, frame, shooter, &self.players);

        match &outcome {
            ShotOutcome::FutureFrame { .. } => self.stats.future_frame_shots += 1,
            ShotOutcome::Hit { hit, .. } => self.apply_hit(hit),
            ShotOutcome::Miss { .. } | ShotOutcome::UnknownShooter => {}
        }
        outcome
    }

    fn apply_hit(&mut self, hit: &HitResult) {
        self.stats.hits += 1;
        let spawn = self.spawn_point();
        let Some(target) = self.players.iter_mut().find(|p| p.id == hit.target_id) else {
            return;
        };

        let (health, killed) = CombatSystem::apply_damage(target.health, hit.damage);
        target.health = health;
        if killed {
            target.respawn(spawn);
            self.stats.kills += 1;
            self.events.kills.push(PlayerKillData {
                killer: hit.shooter_id,
                victim: hit.target_id,
            });
            info!(room = %self.name, killer = %hit.shooter_id, victim = %hit.target_id, "Player killed");
        }
        self.events.health_updates.push(PlayerHealthUpdateData {
            id: target.id,
            health: target.health,
        });
    }

    /// Fell out of the arena: respawn and report a kill without a shooter
    fn respawn_fallen(&mut self, index: usize) {
        let spawn = self.spawn_point();
        let player = &mut self.players[index];
        player.respawn(spawn);
        self.events.kills.push(PlayerKillData {
            killer: player.id,
            victim: player.id,
        });
        self.events.health_updates.push(PlayerHealthUpdateData {
            id: player.id,
            health: player.health,
        });
        debug!(room = %self.name, player_id = %player.id, "Player fell out of the arena");
    }

    fn broadcast(&self) {
        let snapshot = SnapshotBuilder::new(&self.players, &self.events);
        let reliable = self.events.reliable_update();

        for player in &self.players {
            let Some(member) = self.members.iter().find(|m| m.id == player.id) else {
                continue;
            };
            member.connection.send(snapshot.build_for(player));
            if let Some(msg) = &reliable {
                member.connection.send(msg.clone());
            }
        }
    }

    fn spawn_point(&mut self) -> Vec3 {
        let x = self.rng.gen_range(-SPAWN_HALF_EXTENT..SPAWN_HALF_EXTENT);
        let z = self.rng.gen_range(-SPAWN_HALF_EXTENT..SPAWN_HALF_EXTENT);
        Vec3::new(x, 0.0, z)
    }
}

/// Messages routed from connections into a room
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player_id: PlayerId,
        name: String,
        connection: PlayerConnection,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    JoinGame {
        player_id: PlayerId,
    },
    Input {
        player_id: PlayerId,
        input: PlayerInputData,
    },
    Leave {
        player_id: PlayerId,
    },
    Close,
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub name: String,
    pub max_slots: usize,
    pub command_tx: mpsc::UnboundedSender<RoomCommand>,
    pub member_count: Arc<AtomicUsize>,
    pub current_tick: Arc<AtomicU32>,
}

impl RoomHandle {
    pub fn member_count(&self) -> usize {
        self.member_count.load(Ordering::Relaxed)
    }

    pub fn current_tick(&self) -> Tick {
        Tick(self.current_tick.load(Ordering::Relaxed))
    }

    /// Add a connection to the room and wait for the room's answer
    pub async fn join(
        &self,
        player_id: PlayerId,
        name: String,
        connection: PlayerConnection,
    ) -> Result<(), RoomError> {
        let (reply, answer) = oneshot::channel();
        self.command_tx
            .send(RoomCommand::Join {
                player_id,
                name,
                connection,
                reply,
            })
            .map_err(|_| RoomError::Closed)?;
        answer.await.map_err(|_| RoomError::Closed)?
    }

    /// Fire-and-forget command; false if the room has shut down
    pub fn send(&self, command: RoomCommand) -> bool {
        self.command_tx.send(command).is_ok()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            name: self.name.clone(),
            players: self.member_count(),
            max_slots: self.max_slots,
            tick: self.current_tick(),
        }
    }
}

/// The authoritative room task
pub struct Room {
    state: RoomState,
    command_rx: mpsc::UnboundedReceiver<RoomCommand>,
    member_count: Arc<AtomicUsize>,
    current_tick: Arc<AtomicU32>,
    closing: bool,
}

impl Room {
    /// Create a new room
    pub fn new(name: String, max_slots: usize, seed: u64, history_ticks: usize) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let member_count = Arc::new(AtomicUsize::new(0));
        let current_tick = Arc::new(AtomicU32::new(Tick::INITIAL.0));

        let handle = RoomHandle {
            name: name.clone(),
            max_slots,
            command_tx,
            member_count: member_count.clone(),
            current_tick: current_tick.clone(),
        };

        let room = Self {
            state: RoomState::new(name, max_slots, seed, history_ticks),
            command_rx,
            member_count,
            current_tick,
            closing: false,
        };

        (room, handle)
    }

    /// Run the authoritative tick loop until the room empties or is closed
    pub async fn run(mut self) {
        info!(room = %self.state.name(), "Room opened");

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut had_members = false;

        loop {
            tick_interval.tick().await;
            let timer = Timer::new();

            // Drain the command queue once, before simulating
            self.process_commands();
            had_members |= self.state.member_count() > 0;

            if self.closing || (had_members && self.state.member_count() == 0) {
                break;
            }

            self.state.run_tick();
            self.current_tick.store(self.state.tick().0, Ordering::Relaxed);

            let elapsed = timer.elapsed_micros();
            if elapsed > TICK_DURATION_MICROS {
                warn!(room = %self.state.name(), tick = %self.state.tick(), elapsed_micros = elapsed, "Tick overran its budget");
            }
        }

        let stats = self.state.stats();
        self.state.close();
        self.member_count.store(0, Ordering::Relaxed);
        info!(
            room = %self.state.name(),
            ticks = self.state.tick().0,
            shots = stats.shots,
            hits = stats.hits,
            kills = stats.kills,
            future_frame_shots = stats.future_frame_shots,
            "Room closed"
        );
    }

    /// Process all pending commands
    fn process_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                RoomCommand::Join {
                    player_id,
                    name,
                    connection,
                    reply,
                } => {
                    let result = self.state.add_member(player_id, name, connection);
                    let _ = reply.send(result);
                }
                RoomCommand::JoinGame { player_id } => {
                    if let Err(e) = self.state.join_game(player_id) {
                        warn!(room = %self.state.name(), player_id = %player_id, error = %e, "Game join refused");
                        self.state.send_to(
                            player_id,
                            ServerMsg::Error {
                                code: e.code().to_string(),
                                message: e.to_string(),
                            },
                        );
                    }
                }
                RoomCommand::Input { player_id, input } => {
                    self.state.receive_input(player_id, input);
                }
                RoomCommand::Leave { player_id } => {
                    self.state.remove_member(player_id);
                }
                RoomCommand::Close => {
                    self.closing = true;
                }
            }
        }
        self.member_count
            .store(self.state.member_count(), Ordering::Relaxed);
    }
}
