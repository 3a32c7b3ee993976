//! Authoritative per-player state kept by a room

use glam::Vec3;

use super::hitscan::MAX_HEALTH;
use super::history::{HistoryBuffer, HistoryEntry};
use super::simulation::SimulationStep;
use super::Tick;
use crate::ws::protocol::{PlayerId, PlayerInputData, PlayerSpawnData, PlayerStateData};

/// Player state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct ServerPlayer {
    pub id: PlayerId,
    pub name: String,
    pub state: PlayerStateData,
    pub health: u8,

    /// Most recently applied input; `None` until the first one arrives
    pub last_input: Option<PlayerInputData>,
    /// Sequence number of the newest processed input. Inputs are numbered
    /// in arrival order starting at the join tick, which is how the client
    /// numbers its local history.
    input_tick: Option<Tick>,
    joined_at: Tick,
    /// Inputs received since the previous tick, oldest first
    pending_inputs: Vec<PlayerInputData>,
    /// Frames of shots fired in this tick's inputs
    pending_shots: Vec<Tick>,

    /// Authoritative states, one per server tick
    pub history: HistoryBuffer,
}

impl ServerPlayer {
    pub fn new(id: PlayerId, name: String, spawn: Vec3, joined_at: Tick) -> Self {
        Self {
            id,
            name,
            state: PlayerStateData::spawned_at(id, spawn),
            health: MAX_HEALTH,
            last_input: None,
            input_tick: None,
            joined_at,
            pending_inputs: Vec::new(),
            pending_shots: Vec::new(),
            history: HistoryBuffer::new(),
        }
    }

    /// Queue an input received from the client
    pub fn receive_input(&mut self, input: PlayerInputData) {
        self.pending_inputs.push(input);
    }

    /// Sequence tick of the last processed input, reported back to the client
    pub fn last_processed_tick(&self) -> Option<Tick> {
        self.input_tick
    }

    /// Reset per-tick flags and collect this tick's inputs.
    ///
    /// Every newly received input that holds fire becomes a pending shot; the
    /// newest one becomes the input driving movement. Without new input the
    /// previous one keeps driving movement but never fires again.
    pub fn pre_update(&mut self) {
        self.state.fired = false;
        self.pending_shots.clear();

        if self.pending_inputs.is_empty() {
            if let Some(input) = self.last_input.as_mut() {
                input.keys.fire = false;
            }
            return;
        }

        for input in self.pending_inputs.drain(..) {
            self.input_tick = Some(self.input_tick.map_or(self.joined_at, Tick::next));
            if input.keys.fire {
                self.pending_shots.push(input.tick);
            }
            self.last_input = Some(input);
        }
    }

    pub fn take_shots(&mut self) -> Vec<Tick> {
        std::mem::take(&mut self.pending_shots)
    }

    /// Run one simulation step and record it at `tick`
    pub fn update(&mut self, tick: Tick, max_history: usize) -> PlayerStateData {
        let input = self
            .last_input
            .unwrap_or_else(|| PlayerInputData::idle(tick.prev()));

        self.state = SimulationStep::advance(&input, &self.state);
        self.history.append(HistoryEntry::new(tick, self.state, input));
        self.history.retain_newest(max_history);

        self.state
    }

    /// Move to a spawn point with full health; history is kept so rewinds
    /// still see where the player was before dying
    pub fn respawn(&mut self, position: Vec3) {
        self.state = PlayerStateData::spawned_at(self.id, position);
        self.health = MAX_HEALTH;
    }

    pub fn spawn_data(&self) -> PlayerSpawnData {
        PlayerSpawnData {
            id: self.id,
            name: self.name.clone(),
            position: self.state.position,
        }
    }
}
