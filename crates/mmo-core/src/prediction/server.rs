//! Server-side authority over client input: validates commands before
//! they're allowed to move an entity, and dead-reckons entities whose
//! owning session has gone a tick or more without sending input.

use glam::Vec3;

use crate::codec::InputCommand;
use crate::entity::Entity;
use crate::error::ValidationError;

pub struct InputValidator {
    pub max_speed: f32,
    pub max_commands_per_tick: u32,
}

impl InputValidator {
    /// Rejects a command whose implied displacement this tick would exceed
    /// the entity's maximum speed by more than a small slack factor — the
    /// server-side twin of the client's speed cap, closing the obvious
    /// speed-hack vector without re-deriving full physics server-side.
    pub fn validate(&self, command: &InputCommand, dt: f32) -> Result<Vec3, ValidationError> {
        let direction = Vec3::new(
            command.move_direction[0] as f32 / 127.0,
            0.0,
            command.move_direction[2] as f32 / 127.0,
        );
        if direction.length_squared() > 1.000_1 {
            return Err(ValidationError::InputRejected);
        }
        Ok(direction * self.max_speed * dt)
    }
}

/// Extrapolates an entity's position from its last known velocity when no
/// fresh input has arrived, bounded by the same extrapolation budget lag
/// compensation uses so an absent player doesn't drift forever.
pub fn dead_reckon(entity: &mut Entity, dt: f32, missed_ticks: u32, max_missed_ticks: u32) {
    if missed_ticks > max_missed_ticks {
        entity.velocity = Vec3::ZERO;
        return;
    }
    entity.integrate(dt);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    fn command(dx: i8, dz: i8) -> InputCommand {
        InputCommand {
            client_tick: 1,
            sequence: 1,
            move_direction: [dx, 0, dz],
            view_angles: [0, 0],
            flags: crate::codec::InputFlags::empty(),
        }
    }

    #[test]
    fn rejects_diagonal_speed_hack() {
        let validator = InputValidator {
            max_speed: 5.0,
            max_commands_per_tick: 1,
        };
        // A raw [127, 0, 127] direction has length > 1 before normalization,
        // which is exactly the kind of command a cheat client would send.
        let result = validator.validate(&command(127, 127), 1.0 / 60.0);
        assert!(result.is_err());
    }

    #[test]
    fn accepts_axis_aligned_movement() {
        let validator = InputValidator {
            max_speed: 5.0,
            max_commands_per_tick: 1,
        };
        assert!(validator.validate(&command(127, 0), 1.0 / 60.0).is_ok());
    }

    #[test]
    fn dead_reckoning_stops_after_budget_exhausted() {
        let mut entity = Entity::new(1, EntityType::Player, Vec3::ZERO);
        entity.velocity = Vec3::new(1.0, 0.0, 0.0);
        dead_reckon(&mut entity, 1.0, 20, 12);
        assert_eq!(entity.velocity, Vec3::ZERO);
    }
}
