//! Simulation tick counter

use std::fmt;

use serde::{Deserialize, Serialize};

/// A discrete fixed-duration simulation step.
///
/// Ticks only ever count up within a session; wraparound is not handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tick(pub u32);

impl Tick {
    /// First tick of a freshly opened room.
    ///
    /// Clients stamp inputs with `server_tick - 1`, so starting at 2 keeps
    /// every stamped tick at or above 1.
    pub const INITIAL: Tick = Tick(2);

    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }

    pub fn prev(self) -> Tick {
        Tick(self.0.saturating_sub(1))
    }

    /// Signed distance `self - other`
    pub fn since(self, other: Tick) -> i64 {
        i64::from(self.0) - i64::from(other.0)
    }
}

impl Default for Tick {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_tick_leaves_room_for_previous() {
        assert_eq!(Tick::INITIAL.prev(), Tick(1));
        assert_eq!(Tick::default(), Tick(2));
    }

    #[test]
    fn since_is_signed() {
        assert_eq!(Tick(51).since(Tick(49)), 2);
        assert_eq!(Tick(49).since(Tick(51)), -2);
    }
}
