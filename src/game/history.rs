//! Per-player record of simulated ticks, used for replay and rewind

use std::collections::VecDeque;

use super::Tick;
use crate::ws::protocol::{PlayerInputData, PlayerStateData};

/// State produced at `tick` together with the input that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub tick: Tick,
    pub state: PlayerStateData,
    pub input: PlayerInputData,
}

impl HistoryEntry {
    pub fn new(tick: Tick, state: PlayerStateData, input: PlayerInputData) -> Self {
        Self { tick, state, input }
    }
}

/// FIFO of history entries in strictly increasing tick order
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the newest entry.
    ///
    /// # Panics
    ///
    /// If `entry.tick` is not greater than the newest recorded tick. An
    /// out-of-order history silently corrupts replay and rewind.
    pub fn append(&mut self, entry: HistoryEntry) {
        if let Some(newest) = self.entries.back() {
            assert!(
                entry.tick > newest.tick,
                "history append out of order: tick {} after {}",
                entry.tick,
                newest.tick
            );
        }
        self.entries.push_back(entry);
    }

    /// Discard every entry with a tick strictly less than `tick`
    pub fn trim_before(&mut self, tick: Tick) {
        while self.entries.front().is_some_and(|e| e.tick < tick) {
            self.entries.pop_front();
        }
    }

    pub fn peek_oldest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn pop_oldest(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_front()
    }

    /// Copy of the entries, oldest first
    pub fn snapshot_as_ordered_list(&self) -> Vec<HistoryEntry> {
        self.entries.iter().copied().collect()
    }

    /// Entry `n` steps back from the newest (`0` is the newest)
    pub fn nth_from_newest(&self, n: usize) -> Option<&HistoryEntry> {
        let len = self.entries.len();
        if n >= len {
            return None;
        }
        self.entries.get(len - 1 - n)
    }

    /// Drop the oldest entries until at most `max` remain
    pub fn retain_newest(&mut self, max: usize) {
        while self.entries.len() > max {
            self.entries.pop_front();
        }
    }

    /// Rewrite stored predictions in place, oldest first
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut HistoryEntry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
