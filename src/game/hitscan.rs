//! Combat system - weapon, hitboxes, ray tests and damage

use glam::{Quat, Vec3};

use crate::ws::protocol::PlayerId;

/// Hit-scan weapon stats
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: u8,
    /// Maximum ray length
    pub range: f32,
    /// Ray origin offset along the view direction
    pub muzzle_forward: f32,
    /// Ray origin height above the player's feet
    pub eye_height: f32,
}

pub const RIFLE: WeaponStats = WeaponStats {
    damage: 5,
    range: 200.0,
    muzzle_forward: 0.6,
    eye_height: 1.8,
};

/// Health every player (re)spawns with
pub const MAX_HEALTH: u8 = 100;

/// Upright capsule standing on the player's position
#[derive(Debug, Clone, Copy)]
pub struct Hitbox {
    pub radius: f32,
    pub height: f32,
}

pub const PLAYER_HITBOX: Hitbox = Hitbox {
    radius: 0.5,
    height: 2.0,
};

impl Hitbox {
    /// End points of the capsule's inner segment for a player at `feet`
    fn segment(&self, feet: Vec3) -> (Vec3, Vec3) {
        let bottom = feet + Vec3::Y * self.radius;
        let top = feet + Vec3::Y * (self.height - self.radius).max(self.radius);
        (bottom, top)
    }
}

/// A shot ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
    pub length: f32,
}

impl Ray {
    /// The ray fired by a player standing at `position` looking along `look`
    pub fn from_view(position: Vec3, look: Quat, weapon: &WeaponStats) -> Self {
        let direction = (look * Vec3::Z).normalize_or_zero();
        Self {
            origin: position + direction * weapon.muzzle_forward + Vec3::Y * weapon.eye_height,
            direction,
            length: weapon.range,
        }
    }

    pub fn end(&self) -> Vec3 {
        self.origin + self.direction * self.length
    }

    /// Distance along the ray to the hitbox of a player at `feet`, if hit
    pub fn intersect(&self, feet: Vec3, hitbox: &Hitbox) -> Option<f32> {
        let (bottom, top) = hitbox.segment(feet);
        let (dist_sq, s) = closest_segment_points(self.origin, self.end(), bottom, top);
        (dist_sq <= hitbox.radius * hitbox.radius).then_some(s * self.length)
    }
}

/// A candidate target for a ray test
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub id: PlayerId,
    pub position: Vec3,
}

/// Nearest target hit by `ray`, ignoring `shooter`
pub fn raycast(ray: &Ray, shooter: PlayerId, targets: &[Target]) -> Option<(PlayerId, f32)> {
    targets
        .iter()
        .filter(|t| t.id != shooter)
        .filter_map(|t| ray.intersect(t.position, &PLAYER_HITBOX).map(|d| (t.id, d)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Combat system for damage bookkeeping
pub struct CombatSystem;

impl CombatSystem {
    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: u8, damage: u8) -> (u8, bool) {
        let new_health = current_health.saturating_sub(damage);
        (new_health, new_health == 0)
    }
}

/// Hit result from combat resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub shooter_id: PlayerId,
    pub target_id: PlayerId,
    pub damage: u8,
    pub distance: f32,
}

/// Squared distance between segments `p1-q1` and `p2-q2`, and the parameter
/// of the closest point on the first segment.
fn closest_segment_points(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (f32, f32) {
    const EPS: f32 = 1e-6;
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.dot(d1);
    let e = d2.dot(d2);
    let f = d2.dot(r);

    let (s, t) = if a <= EPS && e <= EPS {
        (0.0, 0.0)
    } else if a <= EPS {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPS {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPS {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    let c1 = p1 + d1 * s;
    let c2 = p2 + d2 * t;
    (c1.distance_squared(c2), s)
}
