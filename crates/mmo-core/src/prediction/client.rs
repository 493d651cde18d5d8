//! Client-side prediction and reconciliation, ported near-verbatim from the
//! teacher's `client::net::prediction::ClientPrediction`: apply input
//! immediately against a local frame, then reconcile against the
//! authoritative server state by dropping acknowledged commands and
//! replaying the rest from the server's baseline.

use std::collections::VecDeque;

use glam::Vec3;

use crate::codec::InputCommand;

#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    sequence: u32,
    move_direction: Vec3,
    dt: f32,
}

pub struct ClientPrediction {
    pending_commands: VecDeque<PendingCommand>,
    frame_position: Vec3,
    frame_orientation: f32,
    last_acked_sequence: u32,
    move_speed: f32,
    tick_rate: u32,
}

impl ClientPrediction {
    pub fn new(move_speed: f32, tick_rate: u32) -> Self {
        Self {
            pending_commands: VecDeque::new(),
            frame_position: Vec3::ZERO,
            frame_orientation: 0.0,
            last_acked_sequence: 0,
            move_speed,
            tick_rate,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.frame_position
    }

    /// Applies `command` to the local frame immediately, then records it so
    /// it can be replayed if the server's next ack doesn't yet cover it.
    pub fn apply_input(&mut self, command: &InputCommand) {
        let dt = 1.0 / self.tick_rate as f32;
        let direction = Vec3::new(
            command.move_direction[0] as f32 / 127.0,
            0.0,
            command.move_direction[2] as f32 / 127.0,
        );
        self.frame_position += direction * self.move_speed * dt;
        self.frame_orientation = command.view_angles[0] as f32 / 32768.0 * std::f32::consts::PI;

        self.pending_commands.push_back(PendingCommand {
            sequence: command.sequence,
            move_direction: direction,
            dt,
        });
    }

    /// Drops every pending command the server has acknowledged, snaps to
    /// the server's authoritative state, then replays what's left so input
    /// the server hasn't seen yet isn't lost.
    pub fn reconcile(&mut self, server_position: Vec3, server_orientation: f32, acked_sequence: u32) {
        if acked_sequence <= self.last_acked_sequence {
            return;
        }
        self.last_acked_sequence = acked_sequence;
        self.pending_commands.retain(|c| c.sequence > acked_sequence);

        let mut replayed = server_position;
        for command in &self.pending_commands {
            replayed += command.move_direction * self.move_speed * command.dt;
        }
        self.frame_position = replayed;
        self.frame_orientation = server_orientation;
    }

    pub fn pending_count(&self) -> usize {
        self.pending_commands.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(sequence: u32, dx: i8) -> InputCommand {
        InputCommand {
            client_tick: sequence,
            sequence,
            move_direction: [dx, 0, 0],
            view_angles: [0, 0],
            flags: crate::codec::InputFlags::empty(),
        }
    }

    #[test]
    fn reconcile_replays_unacked_commands_on_top_of_server_state() {
        let mut prediction = ClientPrediction::new(10.0, 60);
        prediction.apply_input(&command(1, 127));
        prediction.apply_input(&command(2, 127));
        prediction.apply_input(&command(3, 127));

        prediction.reconcile(Vec3::new(5.0, 0.0, 0.0), 0.0, 1);

        assert_eq!(prediction.pending_count(), 2);
        assert!(prediction.position().x > 5.0);
    }

    #[test]
    fn reconcile_ignores_stale_acks() {
        let mut prediction = ClientPrediction::new(10.0, 60);
        prediction.apply_input(&command(1, 127));
        prediction.reconcile(Vec3::new(1.0, 0.0, 0.0), 0.0, 1);
        let count_after_first = prediction.pending_count();
        prediction.reconcile(Vec3::ZERO, 0.0, 1);
        assert_eq!(prediction.pending_count(), count_after_first);
    }
}
