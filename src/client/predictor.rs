//! Client-side prediction of the local player

use glam::Quat;
use tokio::sync::mpsc;
use tracing::trace;

use super::reconcile::{ReconcileOutcome, ReconciliationEngine};
use super::ClientError;
use crate::game::history::{HistoryBuffer, HistoryEntry};
use crate::game::simulation::SimulationStep;
use crate::game::Tick;
use crate::ws::protocol::{ClientMsg, InputKeys, PlayerInputData, PlayerStateData};

/// Runs the simulation step locally, ahead of server confirmation
#[derive(Debug)]
pub struct ClientPredictor {
    /// Counter of local fixed steps; keys the history
    local_tick: Tick,
    /// Last tick the server reported as processed for this client; inputs
    /// are stamped one behind it
    confirmed_tick: Tick,
    current: PlayerStateData,
    history: HistoryBuffer,
}

impl ClientPredictor {
    /// Start predicting from `spawn`, as of the server tick reported on join.
    ///
    /// The server numbers this player's inputs from the join tick, so the
    /// local counter starts there too and the processed tick echoed in
    /// snapshots names a local history entry.
    pub fn new(spawn: PlayerStateData, server_tick: Tick) -> Self {
        Self {
            local_tick: server_tick,
            confirmed_tick: server_tick,
            current: spawn,
            history: HistoryBuffer::new(),
        }
    }

    pub fn current(&self) -> &PlayerStateData {
        &self.current
    }

    pub fn local_tick(&self) -> Tick {
        self.local_tick
    }

    pub fn confirmed_tick(&self) -> Tick {
        self.confirmed_tick
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Predict one local tick from sampled input and send the input upstream
    pub fn step(
        &mut self,
        keys: InputKeys,
        look_direction: Quat,
        outbound: &mpsc::UnboundedSender<ClientMsg>,
    ) -> Result<PlayerStateData, ClientError> {
        let input = PlayerInputData::new(keys, look_direction, self.confirmed_tick.prev());
        let next = SimulationStep::advance(&input, &self.current);
        self.current = next;

        outbound
            .send(ClientMsg::PlayerInput { input })
            .map_err(|_| ClientError::Disconnected)?;

        self.history.append(HistoryEntry::new(self.local_tick, next, input));
        trace!(local_tick = %self.local_tick, frame = %input.tick, "Predicted tick");

        self.local_tick = self.local_tick.next();
        Ok(next)
    }

    /// Apply the server's view of this player.
    ///
    /// The reported tick also becomes the base for stamping later inputs.
    pub fn reconcile(
        &mut self,
        last_processed_tick: Option<Tick>,
        authoritative: &PlayerStateData,
    ) -> ReconcileOutcome {
        if let Some(tick) = last_processed_tick {
            self.confirmed_tick = self.confirmed_tick.max(tick);
        }
        ReconciliationEngine::reconcile(
            &mut self.history,
            &mut self.current,
            last_processed_tick,
            authoritative,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::lag_compensation::LagCompensation;
    use glam::Vec3;
    use uuid::Uuid;

    fn predictor() -> ClientPredictor {
        let spawn = PlayerStateData::spawned_at(Uuid::new_v4(), Vec3::ZERO);
        ClientPredictor::new(spawn, Tick(10))
    }

    #[test]
    fn step_stamps_one_behind_confirmed_tick_and_records_local_tick() {
        let mut predictor = predictor();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let keys = InputKeys {
            forward: true,
            ..InputKeys::default()
        };

        let next = predictor.step(keys, Quat::IDENTITY, &tx).unwrap();
        assert!(next.position.z > 0.0);
        assert_eq!(predictor.current().position, next.position);

        match rx.try_recv() {
            Ok(ClientMsg::PlayerInput { input }) => assert_eq!(input.tick, Tick(9)),
            other => panic!("unexpected {other:?}"),
        }

        let entries = predictor.history().snapshot_as_ordered_list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tick, Tick(10));
        assert_eq!(entries[0].state, next);
        assert_eq!(predictor.local_tick(), Tick(11));
        assert_eq!(predictor.confirmed_tick(), Tick(10));
    }

    #[test]
    fn stamp_follows_the_server_confirmation_not_the_local_clock() {
        let mut predictor = predictor();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Twenty local steps with no snapshot keep the join stamp
        for _ in 0..20 {
            predictor.step(InputKeys::default(), Quat::IDENTITY, &tx).unwrap();
        }
        let stamps: Vec<Tick> = std::iter::from_fn(|| match rx.try_recv() {
            Ok(ClientMsg::PlayerInput { input }) => Some(input.tick),
            _ => None,
        })
        .collect();
        assert_eq!(stamps, vec![Tick(9); 20]);
        assert_eq!(predictor.local_tick(), Tick(30));

        let authoritative = predictor.history().snapshot_as_ordered_list()[5].state;
        let outcome = predictor.reconcile(Some(Tick(15)), &authoritative);
        assert!(matches!(outcome, ReconcileOutcome::Accepted { .. }));
        assert_eq!(predictor.confirmed_tick(), Tick(15));

        let fire = InputKeys {
            fire: true,
            ..InputKeys::default()
        };
        predictor.step(fire, Quat::IDENTITY, &tx).unwrap();
        let frame = match rx.try_recv() {
            Ok(ClientMsg::PlayerInput { input }) => input.tick,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(frame, Tick(14));

        // A server at tick 20 can rewind to that frame
        assert_eq!(LagCompensation::rewind_depth(Tick(20), frame), 5);
    }

    #[test]
    fn stale_confirmation_does_not_move_the_stamp_back() {
        let mut predictor = predictor();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..4 {
            predictor.step(InputKeys::default(), Quat::IDENTITY, &tx).unwrap();
        }
        let entries = predictor.history().snapshot_as_ordered_list();
        predictor.reconcile(Some(Tick(12)), &entries[2].state);
        assert_eq!(
            predictor.reconcile(Some(Tick(11)), &entries[1].state),
            ReconcileOutcome::Unmatched
        );
        assert_eq!(predictor.confirmed_tick(), Tick(12));

        while rx.try_recv().is_ok() {}
        predictor.step(InputKeys::default(), Quat::IDENTITY, &tx).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(ClientMsg::PlayerInput { input }) if input.tick == Tick(11)
        ));
    }

    #[test]
    fn closed_transport_is_reported() {
        let mut predictor = predictor();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert!(matches!(
            predictor.step(InputKeys::default(), Quat::IDENTITY, &tx),
            Err(ClientError::Disconnected)
        ));
    }
}
