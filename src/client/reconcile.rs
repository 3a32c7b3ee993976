//! Reconciliation of predicted state against server snapshots

use tracing::{debug, trace};

use crate::game::history::HistoryBuffer;
use crate::game::simulation::SimulationStep;
use crate::game::Tick;
use crate::ws::protocol::PlayerStateData;

/// Largest predicted-vs-authoritative distance accepted without correction
pub const CORRECTION_THRESHOLD: f32 = 0.05;

/// What a snapshot did to the local prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Prediction matched the server within the threshold
    Accepted { error: f32 },
    /// Snapped to the server state and replayed the remaining inputs
    Corrected { error: f32, replayed: usize },
    /// No history entry for the processed tick; prediction kept
    Unmatched,
    /// The server has not processed any input from us yet
    Unconfirmed,
}

pub struct ReconciliationEngine;

impl ReconciliationEngine {
    /// Trim confirmed history and correct `current` if it diverged.
    ///
    /// Entries older than `last_processed_tick` are dropped and the entry at
    /// exactly that tick is consumed. Replay rewrites the predicted state of
    /// every remaining entry.
    pub fn reconcile(
        history: &mut HistoryBuffer,
        current: &mut PlayerStateData,
        last_processed_tick: Option<Tick>,
        authoritative: &PlayerStateData,
    ) -> ReconcileOutcome {
        let Some(tick) = last_processed_tick else {
            return ReconcileOutcome::Unconfirmed;
        };

        history.trim_before(tick);
        let matched = match history.peek_oldest() {
            Some(entry) if entry.tick == tick => history.pop_oldest(),
            _ => None,
        };
        let Some(predicted) = matched else {
            trace!(tick = %tick, "No prediction for processed tick");
            return ReconcileOutcome::Unmatched;
        };

        let error = predicted.state.position.distance(authoritative.position);
        if error <= CORRECTION_THRESHOLD {
            return ReconcileOutcome::Accepted { error };
        }

        *current = *authoritative;
        let mut replayed = 0;
        for entry in history.iter_mut() {
            *current = SimulationStep::advance(&entry.input, current);
            entry.state = *current;
            replayed += 1;
        }

        debug!(tick = %tick, error, replayed, "Prediction corrected");
        ReconcileOutcome::Corrected { error, replayed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::history::HistoryEntry;
    use crate::ws::protocol::{InputKeys, PlayerInputData};
    use glam::{Quat, Vec3};
    use uuid::Uuid;

    fn idle_history(id: uuid::Uuid, ticks: std::ops::RangeInclusive<u32>) -> HistoryBuffer {
        let mut history = HistoryBuffer::new();
        for t in ticks {
            let state = PlayerStateData::spawned_at(id, Vec3::ZERO);
            history.append(HistoryEntry::new(Tick(t), state, PlayerInputData::idle(Tick(t))));
        }
        history
    }

    #[test]
    fn divergence_above_threshold_snaps_and_replays() {
        let id = Uuid::new_v4();
        let mut history = idle_history(id, 5..=7);
        let mut current = PlayerStateData::spawned_at(id, Vec3::ZERO);
        let server = PlayerStateData::spawned_at(id, Vec3::new(0.06, 0.0, 0.0));

        let outcome = ReconciliationEngine::reconcile(&mut history, &mut current, Some(Tick(5)), &server);

        assert!(matches!(outcome, ReconcileOutcome::Corrected { replayed: 2, .. }));
        assert!((current.position.x - 0.06).abs() < 1e-6);
        let remaining = history.snapshot_as_ordered_list();
        assert_eq!(remaining.iter().map(|e| e.tick).collect::<Vec<_>>(), vec![Tick(6), Tick(7)]);
        assert!(remaining.iter().all(|e| (e.state.position.x - 0.06).abs() < 1e-6));
    }

    #[test]
    fn divergence_within_threshold_keeps_prediction() {
        let id = Uuid::new_v4();
        let mut history = idle_history(id, 5..=7);
        let mut current = PlayerStateData::spawned_at(id, Vec3::new(0.0, 0.0, 1.0));
        let server = PlayerStateData::spawned_at(id, Vec3::new(0.04, 0.0, 0.0));

        let outcome = ReconciliationEngine::reconcile(&mut history, &mut current, Some(Tick(5)), &server);

        assert!(matches!(outcome, ReconcileOutcome::Accepted { .. }));
        assert_eq!(current.position, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn confirmed_entries_are_trimmed() {
        let id = Uuid::new_v4();
        let mut history = idle_history(id, 3..=9);
        let mut current = PlayerStateData::spawned_at(id, Vec3::ZERO);
        let server = PlayerStateData::spawned_at(id, Vec3::ZERO);

        ReconciliationEngine::reconcile(&mut history, &mut current, Some(Tick(6)), &server);

        assert_eq!(history.peek_oldest().map(|e| e.tick), Some(Tick(7)));
        assert!(history.snapshot_as_ordered_list().iter().all(|e| e.tick > Tick(6)));
    }

    #[test]
    fn missing_entry_is_unmatched_and_still_trims() {
        let id = Uuid::new_v4();
        let mut history = idle_history(id, 8..=9);
        let mut current = PlayerStateData::spawned_at(id, Vec3::ZERO);
        let far = PlayerStateData::spawned_at(id, Vec3::new(5.0, 0.0, 0.0));

        let outcome = ReconciliationEngine::reconcile(&mut history, &mut current, Some(Tick(7)), &far);
        assert_eq!(outcome, ReconcileOutcome::Unmatched);
        assert_eq!(current.position, Vec3::ZERO);
        assert_eq!(history.len(), 2);

        let outcome = ReconciliationEngine::reconcile(&mut history, &mut current, None, &far);
        assert_eq!(outcome, ReconcileOutcome::Unconfirmed);
    }

    #[test]
    fn replay_reapplies_movement_from_corrected_state() {
        let id = Uuid::new_v4();
        let keys = InputKeys {
            forward: true,
            ..InputKeys::default()
        };
        let mut history = HistoryBuffer::new();
        let mut predicted = PlayerStateData::spawned_at(id, Vec3::ZERO);
        for t in 3..=6 {
            let input = PlayerInputData::new(keys, Quat::IDENTITY, Tick(t));
            predicted = SimulationStep::advance(&input, &predicted);
            history.append(HistoryEntry::new(Tick(t), predicted, input));
        }
        let confirmed = history.peek_oldest().map(|e| e.state).unwrap();
        let mut server = confirmed;
        server.position.x += 1.0;

        let mut current = predicted;
        ReconciliationEngine::reconcile(&mut history, &mut current, Some(Tick(3)), &server);

        let expected = predicted.position + Vec3::X;
        assert!(current.position.distance(expected) < 1e-5);
    }
}
