//! Optional bounded rollback networking layer, ported from
//! `lag_compensation.h`'s `RollbackNetworking` (`MAX_ROLLBACK_FRAMES = 8`).
//! Not wired into the default server loop — maps that opt into
//! deterministic lockstep combat (arenas, duels) can enable it per spec.md
//! §9's polymorphism note.

use std::collections::VecDeque;

pub const MAX_ROLLBACK_FRAMES: u32 = 8;

#[derive(Debug, Clone)]
pub struct RollbackState<S> {
    pub frame: u32,
    pub state: S,
}

pub struct RollbackNetworking<S, I> {
    confirmed: VecDeque<RollbackState<S>>,
    pending_inputs: VecDeque<(u32, I)>,
    current_frame: u32,
    horizon: u32,
}

impl<S: Clone, I: Clone> RollbackNetworking<S, I> {
    pub fn new(initial_state: S, horizon: u32) -> Self {
        let mut confirmed = VecDeque::new();
        confirmed.push_back(RollbackState {
            frame: 0,
            state: initial_state,
        });
        Self {
            confirmed,
            pending_inputs: VecDeque::new(),
            current_frame: 0,
            horizon: horizon.min(MAX_ROLLBACK_FRAMES),
        }
    }

    pub fn advance_frame(&mut self) {
        self.current_frame += 1;
    }

    pub fn receive_input(&mut self, frame: u32, input: I) {
        self.pending_inputs.push_back((frame, input));
        while self.confirmed.len() as u32 > self.horizon {
            self.confirmed.pop_front();
        }
    }

    /// Confirms frames up to (and including) `frame`, snapshotting the
    /// resulting state so a later, earlier-arriving input can't trigger a
    /// rollback past it.
    pub fn confirm_input(&mut self, frame: u32, resulting_state: S) {
        self.confirmed.push_back(RollbackState {
            frame,
            state: resulting_state,
        });
        while self.confirmed.len() as u32 > self.horizon {
            self.confirmed.pop_front();
        }
    }

    /// Returns the most recent confirmed state at or before `frame`,
    /// the rollback point callers resimulate forward from.
    pub fn rollback_to(&self, frame: u32) -> Option<&RollbackState<S>> {
        self.confirmed
            .iter()
            .rev()
            .find(|snap| snap.frame <= frame)
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_to_finds_latest_confirmed_state_not_exceeding_frame() {
        let mut net: RollbackNetworking<i32, ()> = RollbackNetworking::new(0, 8);
        net.confirm_input(2, 20);
        net.confirm_input(5, 50);
        let snap = net.rollback_to(4).unwrap();
        assert_eq!(snap.frame, 2);
        assert_eq!(snap.state, 20);
    }

    #[test]
    fn confirmed_history_is_bounded_by_horizon() {
        let mut net: RollbackNetworking<i32, ()> = RollbackNetworking::new(0, 2);
        for frame in 1..=5u32 {
            net.confirm_input(frame, frame as i32);
        }
        assert!(net.confirmed.len() as u32 <= 2);
    }
}
