//! Lag-compensated hit-scan resolution
//!
//! A shot is tested against where every player was at the tick the shooter
//! saw on screen. The rewound positions live in a side table built for the
//! single ray test; the live player states are never touched, so nothing
//! else can observe a rewound world.

use tracing::{debug, warn};

use super::hitscan::{raycast, HitResult, Ray, Target, RIFLE};
use super::player::ServerPlayer;
use super::Tick;
use crate::ws::protocol::PlayerId;

/// Outcome of a single lag-compensated shot
#[derive(Debug, Clone, PartialEq)]
pub enum ShotOutcome {
    /// The referenced frame is not in the past yet; nothing was tested
    FutureFrame { dif: i64 },
    /// The shooter is not in the room
    UnknownShooter,
    Miss { ray: Ray },
    Hit { ray: Ray, hit: HitResult },
}

/// Server-side lag compensation
pub struct LagCompensation;

impl LagCompensation {
    /// Ticks between `frame` and the newest recorded history entry.
    ///
    /// History is appended once per tick, so at `tick` the newest entry is
    /// the state recorded at `tick - 1`.
    pub fn rewind_depth(tick: Tick, frame: Tick) -> i64 {
        tick.since(frame) - 1
    }

    /// Effective position of every player `dif` ticks back.
    ///
    /// Players whose history is shorter than `dif` stay at their live
    /// position.
    pub fn rewound_targets(players: &[ServerPlayer], dif: usize) -> Vec<Target> {
        players
            .iter()
            .map(|p| Target {
                id: p.id,
                position: p
                    .history
                    .nth_from_newest(dif)
                    .map(|entry| entry.state.position)
                    .unwrap_or(p.state.position),
            })
            .collect()
    }

    /// Resolve a shot fired by `shooter` while seeing server tick `frame`.
    ///
    /// Damage is not applied here; the caller owns the players.
    pub fn resolve(tick: Tick, frame: Tick, shooter: PlayerId, players: &[ServerPlayer]) -> ShotOutcome {
        let dif = Self::rewind_depth(tick, frame);
        if dif < 0 {
            warn!(
                shooter = %shooter,
                tick = %tick,
                frame = %frame,
                dif,
                "Shot references a frame that is not in the past, ignoring"
            );
            return ShotOutcome::FutureFrame { dif };
        }
        let dif = dif as usize;

        let Some(shooter_player) = players.iter().find(|p| p.id == shooter) else {
            return ShotOutcome::UnknownShooter;
        };

        let (position, look) = match shooter_player.history.nth_from_newest(dif) {
            Some(entry) => (entry.state.position, entry.input.look_direction),
            None => (shooter_player.state.position, shooter_player.state.look_direction),
        };
        let ray = Ray::from_view(position, look, &RIFLE);

        let targets = Self::rewound_targets(players, dif);
        match raycast(&ray, shooter, &targets) {
            Some((target_id, distance)) => {
                debug!(shooter = %shooter, target = %target_id, dif, distance, "Shot hit");
                ShotOutcome::Hit {
                    ray,
                    hit: HitResult {
                        shooter_id: shooter,
                        target_id,
                        damage: RIFLE.damage,
                        distance,
                    },
                }
            }
            None => {
                debug!(shooter = %shooter, dif, "Shot missed");
                ShotOutcome::Miss { ray }
            }
        }
    }
}
