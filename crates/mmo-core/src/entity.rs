//! Entity representation shared by the world, spatial index, prediction and
//! lag-compensation modules. Ported from the teacher's `snapshot::entity`
//! with the rigid-body handle dropped — this crate has no physics engine,
//! only the lightweight geometry lag compensation needs.

use glam::Vec3;

use crate::codec::message::QuantizedEntityState;

pub type EntityId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Player,
    Npc,
    Projectile,
    Item,
    Static,
    Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    pub half_extents: Vec3,
}

impl Hitbox {
    pub fn capsule_default() -> Self {
        Self {
            half_extents: Vec3::new(0.4, 0.9, 0.4),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityType,
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: f32,
    pub hitbox: Hitbox,
    pub health: i32,
    pub is_alive: bool,
    pub dirty: bool,
    pub level: u32,
    /// Tick at which this entity last took damage, so map transitions can
    /// enforce the "must not be in combat" precondition without a separate
    /// combat-tracking subsystem.
    pub last_damage_tick: Option<u32>,
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityType, position: Vec3) -> Self {
        Self {
            id,
            kind,
            position,
            velocity: Vec3::ZERO,
            orientation: 0.0,
            hitbox: Hitbox::capsule_default(),
            health: 100,
            is_alive: true,
            dirty: true,
            level: 1,
            last_damage_tick: None,
        }
    }

    pub fn integrate(&mut self, dt: f32) {
        self.position += self.velocity * dt;
    }

    /// True if this entity took damage within `timeout_ticks` of `current_tick`.
    pub fn in_combat(&self, current_tick: u32, timeout_ticks: u32) -> bool {
        self.last_damage_tick
            .is_some_and(|t| current_tick.saturating_sub(t) < timeout_ticks)
    }

    pub fn aabb_min(&self) -> Vec3 {
        self.position - self.hitbox.half_extents
    }

    pub fn aabb_max(&self) -> Vec3 {
        self.position + self.hitbox.half_extents
    }

    /// Quantizes this entity's state for the wire, matching the teacher's
    /// `Entity::to_network_state` scaling (position in cm, velocity
    /// hundredths of a unit, orientation over i16 range).
    pub fn to_quantized(&self) -> QuantizedEntityState {
        const MAX_VELOCITY: f32 = 327.67;
        QuantizedEntityState {
            entity_id: self.id,
            position: [
                (self.position.x * 100.0) as i32,
                (self.position.y * 100.0) as i32,
                (self.position.z * 100.0) as i32,
            ],
            velocity: [
                (self.velocity.x.clamp(-MAX_VELOCITY, MAX_VELOCITY) * 100.0) as i16,
                (self.velocity.y.clamp(-MAX_VELOCITY, MAX_VELOCITY) * 100.0) as i16,
                (self.velocity.z.clamp(-MAX_VELOCITY, MAX_VELOCITY) * 100.0) as i16,
            ],
            orientation: (self.orientation.clamp(-std::f32::consts::PI, std::f32::consts::PI)
                / std::f32::consts::PI
                * 32767.0) as i16,
            health: self.health.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            flags: self.is_alive as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrate_moves_position_by_velocity_times_dt() {
        let mut e = Entity::new(1, EntityType::Player, Vec3::ZERO);
        e.velocity = Vec3::new(1.0, 0.0, 0.0);
        e.integrate(0.5);
        assert_eq!(e.position, Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn aabb_is_centered_on_position() {
        let e = Entity::new(1, EntityType::Player, Vec3::new(2.0, 0.0, 2.0));
        assert_eq!(e.aabb_min().x, 2.0 - e.hitbox.half_extents.x);
        assert_eq!(e.aabb_max().x, 2.0 + e.hitbox.half_extents.x);
    }

    #[test]
    fn quantized_position_round_trips_to_centimeters() {
        let e = Entity::new(1, EntityType::Player, Vec3::new(1.5, 0.0, -2.25));
        let q = e.to_quantized();
        assert_eq!(q.position, [150, 0, -225]);
        assert_eq!(q.flags, 1);
    }
}
