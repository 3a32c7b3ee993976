//! Player movement simulation, shared by the client predictor and the server

use glam::{Quat, Vec3};

use crate::util::time::tick_delta;
use crate::ws::protocol::{InputKeys, PlayerInputData, PlayerStateData};

/// Movement constants
#[derive(Debug, Clone, Copy)]
pub struct MovementStats {
    /// Horizontal walk speed
    pub walk_speed: f32,
    /// Downward acceleration (negative)
    pub gravity: f32,
    /// Upward speed applied on jump
    pub jump_velocity: f32,
    /// Half the side length of the square floor centred on the origin
    pub floor_half_extent: f32,
    /// Players below this height are respawned
    pub kill_plane: f32,
}

pub const MOVEMENT: MovementStats = MovementStats {
    walk_speed: 8.0,
    gravity: -20.0,
    jump_velocity: 8.0,
    floor_half_extent: 50.0,
    kill_plane: -50.0,
};

/// Height of the floor surface
pub const FLOOR_HEIGHT: f32 = 0.0;

/// Deterministic one-tick player simulation.
///
/// Reads nothing but its arguments: prediction and replay on the client and
/// the authoritative loop on the server must arrive at bit-identical states.
pub struct SimulationStep;

impl SimulationStep {
    /// Advance `state` by exactly one fixed tick using `input`
    pub fn advance(input: &PlayerInputData, state: &PlayerStateData) -> PlayerStateData {
        let dt = tick_delta();
        let stats = MOVEMENT;

        let wish = wish_direction(&input.keys, input.look_direction);
        let mut position = state.position + wish * stats.walk_speed * dt;

        let grounded = is_over_floor(state.position) && state.position.y <= FLOOR_HEIGHT;
        let mut vertical_velocity = if grounded {
            if input.keys.jump {
                stats.jump_velocity
            } else {
                0.0
            }
        } else {
            state.vertical_velocity + stats.gravity * dt
        };

        position.y = state.position.y + vertical_velocity * dt;

        // Land when crossing the floor surface from above
        if is_over_floor(position) && state.position.y >= FLOOR_HEIGHT && position.y < FLOOR_HEIGHT {
            position.y = FLOOR_HEIGHT;
            vertical_velocity = 0.0;
        }

        PlayerStateData {
            id: state.id,
            position,
            look_direction: input.look_direction,
            vertical_velocity,
            fired: input.keys.fire,
        }
    }

    /// Whether a position has fallen out of the arena
    pub fn is_below_kill_plane(position: Vec3) -> bool {
        position.y < MOVEMENT.kill_plane
    }
}

/// Unit horizontal direction requested by the held keys, relative to yaw
fn wish_direction(keys: &InputKeys, look_direction: Quat) -> Vec3 {
    let mut local = Vec3::ZERO;
    if keys.forward {
        local.z += 1.0;
    }
    if keys.back {
        local.z -= 1.0;
    }
    if keys.right {
        local.x += 1.0;
    }
    if keys.left {
        local.x -= 1.0;
    }
    if local == Vec3::ZERO {
        return Vec3::ZERO;
    }

    // Pitch must not slow the player down, so flatten the view direction
    let look = look_direction * Vec3::Z;
    let forward = Vec3::new(look.x, 0.0, look.z).try_normalize().unwrap_or(Vec3::Z);
    let right = Vec3::Y.cross(forward);

    (forward * local.z + right * local.x).normalize_or_zero()
}

fn is_over_floor(position: Vec3) -> bool {
    let half = MOVEMENT.floor_half_extent;
    position.x.abs() <= half && position.z.abs() <= half
}
