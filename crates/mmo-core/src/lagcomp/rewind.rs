//! Rewind and hit validation, ported from `lag_compensation.h`'s
//! `LagCompensation::ValidateHit`/`ValidateMovement` and the
//! `FavorTheShooterSettings` tunables (1000ms max rewind, 200ms max
//! extrapolation, 0.7 confidence threshold).

use glam::Vec3;

use crate::entity::EntityId;
use crate::error::HitRejectReason;

use super::snapshot::{EntitySnapshotState, SnapshotRing};

#[derive(Debug, Clone, Copy)]
pub struct FavorTheShooterSettings {
    pub max_rewind_ms: u64,
    pub hit_tolerance: f32,
    pub movement_tolerance: f32,
    pub max_extrapolation_ms: u64,
    pub lag_threshold_ms: u64,
    pub confidence_threshold: f32,
}

impl Default for FavorTheShooterSettings {
    fn default() -> Self {
        Self {
            max_rewind_ms: 1000,
            hit_tolerance: 0.1,
            movement_tolerance: 0.2,
            max_extrapolation_ms: 200,
            lag_threshold_ms: 150,
            confidence_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HitValidation {
    pub is_valid: bool,
    pub impact_point: Vec3,
    pub damage: i32,
    pub victim_id: EntityId,
    pub confidence: f32,
    pub rejection_reason: Option<HitRejectReason>,
}

/// Rewinds the ring to the shooter's claimed timestamp and resolves a
/// raycast against the victim's hitbox as it existed then, rather than
/// where the victim is on the server right now.
pub struct HitRegistration<'a> {
    pub ring: &'a SnapshotRing,
    pub settings: FavorTheShooterSettings,
}

impl<'a> HitRegistration<'a> {
    fn state_at(&self, timestamp_ms: u64, entity_id: EntityId) -> Option<(EntitySnapshotState, bool)> {
        if let Some((before, after)) = self.ring.bracketing(timestamp_ms) {
            let before_state = before.entities.get(&entity_id)?;
            let after_state = after.entities.get(&entity_id)?;
            let span = (after.captured_at_ms - before.captured_at_ms).max(1) as f32;
            let alpha = (timestamp_ms - before.captured_at_ms) as f32 / span;
            let interpolated = EntitySnapshotState {
                entity_id,
                position: before_state.position.lerp(after_state.position, alpha),
                velocity: after_state.velocity,
                orientation: before_state.orientation + (after_state.orientation - before_state.orientation) * alpha,
                health: after_state.health,
                is_alive: after_state.is_alive,
                hitbox_half_extents: after_state.hitbox_half_extents,
            };
            return Some((interpolated, false));
        }

        let latest = self.ring.latest()?;
        let state = latest.entities.get(&entity_id)?;
        let extrapolated_ms = timestamp_ms.saturating_sub(latest.captured_at_ms);
        if extrapolated_ms > self.settings.max_extrapolation_ms {
            return None;
        }
        let dt = extrapolated_ms as f32 / 1000.0;
        let extrapolated = EntitySnapshotState {
            entity_id,
            position: state.position + state.velocity * dt,
            ..*state
        };
        Some((extrapolated, true))
    }

    /// Every other entity present in the bracketing (or latest) snapshot
    /// around `timestamp_ms`, rewound the same way the victim is, so the
    /// raycast can treat them as potential occluders.
    fn other_entities_at(&self, timestamp_ms: u64, exclude: &[EntityId]) -> Vec<(EntitySnapshotState, bool)> {
        let ids: Vec<EntityId> = if let Some((_, after)) = self.ring.bracketing(timestamp_ms) {
            after.entities.keys().copied().collect()
        } else if let Some(latest) = self.ring.latest() {
            latest.entities.keys().copied().collect()
        } else {
            Vec::new()
        };

        ids.into_iter()
            .filter(|id| !exclude.contains(id))
            .filter_map(|id| self.state_at(timestamp_ms, id))
            .collect()
    }

    /// `claimed_latency_ms` is the shooter's measured one-way latency at the
    /// time of the shot (from the heartbeat channel); confidence degrades
    /// linearly above `lag_threshold_ms` so a laggy client's hits are
    /// accepted but counted less authoritatively. `max_range` bounds the
    /// ray's travel distance; `shooter_id` is excluded from the occluder
    /// sweep so the attacker's own hitbox never blocks its own shot.
    #[allow(clippy::too_many_arguments)]
    pub fn validate_hit(
        &self,
        shooter_timestamp_ms: u64,
        server_now_ms: u64,
        claimed_latency_ms: u64,
        shooter_id: EntityId,
        victim_id: EntityId,
        origin: Vec3,
        direction: Vec3,
        max_range: f32,
        base_damage: i32,
    ) -> HitValidation {
        let rewind_ms = server_now_ms.saturating_sub(shooter_timestamp_ms);
        if rewind_ms > self.settings.max_rewind_ms {
            return HitValidation {
                is_valid: false,
                impact_point: Vec3::ZERO,
                damage: 0,
                victim_id,
                confidence: 0.0,
                rejection_reason: Some(HitRejectReason::Stale),
            };
        }

        let Some((victim_state, was_extrapolated)) = self.state_at(shooter_timestamp_ms, victim_id) else {
            return HitValidation {
                is_valid: false,
                impact_point: Vec3::ZERO,
                damage: 0,
                victim_id,
                confidence: 0.0,
                rejection_reason: Some(HitRejectReason::OutOfRange),
            };
        };

        if !victim_state.is_alive {
            return HitValidation {
                is_valid: false,
                impact_point: Vec3::ZERO,
                damage: 0,
                victim_id,
                confidence: 0.0,
                rejection_reason: Some(HitRejectReason::TargetDead),
            };
        }

        let direction = direction.normalize_or_zero();
        let victim_min = victim_state.position - victim_state.hitbox_half_extents;
        let victim_max = victim_state.position + victim_state.hitbox_half_extents;
        let Some(victim_toi) = ray_aabb_intersection(origin, direction, victim_min, victim_max) else {
            return HitValidation {
                is_valid: false,
                impact_point: Vec3::ZERO,
                damage: 0,
                victim_id,
                confidence: 0.0,
                rejection_reason: Some(HitRejectReason::OutOfRange),
            };
        };
        let impact_point = origin + direction * victim_toi;

        if victim_toi > max_range {
            return HitValidation {
                is_valid: false,
                impact_point,
                damage: 0,
                victim_id,
                confidence: 0.0,
                rejection_reason: Some(HitRejectReason::OutOfRange),
            };
        }

        let occluded = self
            .other_entities_at(shooter_timestamp_ms, &[shooter_id, victim_id])
            .into_iter()
            .filter_map(|(state, _)| {
                ray_aabb_intersection(
                    origin,
                    direction,
                    state.position - state.hitbox_half_extents,
                    state.position + state.hitbox_half_extents,
                )
            })
            .any(|toi| toi + self.settings.hit_tolerance < victim_toi);
        if occluded {
            return HitValidation {
                is_valid: false,
                impact_point,
                damage: 0,
                victim_id,
                confidence: 0.0,
                rejection_reason: Some(HitRejectReason::Occluded),
            };
        }

        let mut confidence = 1.0_f32;
        if claimed_latency_ms > self.settings.lag_threshold_ms {
            let excess = (claimed_latency_ms - self.settings.lag_threshold_ms) as f32;
            confidence -= (excess / 1000.0).min(0.5);
        }
        if was_extrapolated {
            confidence -= 0.15;
        }
        confidence = confidence.clamp(0.0, 1.0);

        if confidence < self.settings.confidence_threshold {
            return HitValidation {
                is_valid: false,
                impact_point,
                damage: 0,
                victim_id,
                confidence,
                rejection_reason: Some(HitRejectReason::LowConfidence),
            };
        }

        HitValidation {
            is_valid: true,
            impact_point,
            damage: base_damage,
            victim_id,
            confidence,
            rejection_reason: None,
        }
    }

    /// Flags movement that implies a speed beyond what any legitimate input
    /// could produce between two rewound snapshots.
    pub fn validate_movement(
        &self,
        entity_id: EntityId,
        from_ms: u64,
        to_ms: u64,
        max_speed: f32,
    ) -> bool {
        let (Some((from, _)), Some((to, _))) = (
            self.state_at(from_ms, entity_id),
            self.state_at(to_ms, entity_id),
        ) else {
            return true;
        };
        let dt = (to_ms.saturating_sub(from_ms)).max(1) as f32 / 1000.0;
        let implied_speed = from.position.distance(to.position) / dt;
        implied_speed <= max_speed * (1.0 + self.settings.movement_tolerance)
    }
}

/// Slab-method ray/AABB intersection: returns the ray parameter `t` at which
/// it enters the box, or `None` if it misses or the box is entirely behind
/// the origin. `direction` must be normalized.
fn ray_aabb_intersection(origin: Vec3, direction: Vec3, aabb_min: Vec3, aabb_max: Vec3) -> Option<f32> {
    let inv_dir = Vec3::new(
        if direction.x != 0.0 { 1.0 / direction.x } else { f32::INFINITY },
        if direction.y != 0.0 { 1.0 / direction.y } else { f32::INFINITY },
        if direction.z != 0.0 { 1.0 / direction.z } else { f32::INFINITY },
    );
    let t1 = (aabb_min - origin) * inv_dir;
    let t2 = (aabb_max - origin) * inv_dir;
    let t_enter = t1.min(t2).max_element();
    let t_exit = t1.max(t2).min_element();
    if t_exit < t_enter.max(0.0) {
        None
    } else {
        Some(t_enter.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lagcomp::snapshot::WorldSnapshot;
    use std::collections::HashMap;

    fn ring_with_stationary_target(entity_id: EntityId, position: Vec3) -> SnapshotRing {
        let mut ring = SnapshotRing::new(16);
        for (tick, ms) in [(1u32, 0u64), (2, 16), (3, 32)] {
            let mut entities = HashMap::new();
            entities.insert(
                entity_id,
                EntitySnapshotState {
                    entity_id,
                    position,
                    velocity: Vec3::ZERO,
                    orientation: 0.0,
                    health: 100,
                    is_alive: true,
                    hitbox_half_extents: crate::entity::Hitbox::capsule_default().half_extents,
                },
            );
            ring.push(WorldSnapshot {
                tick,
                captured_at_ms: ms,
                entities,
            });
        }
        ring
    }

    #[test]
    fn direct_hit_on_stationary_target_is_valid() {
        let ring = ring_with_stationary_target(1, Vec3::new(10.0, 0.0, 0.0));
        let reg = HitRegistration {
            ring: &ring,
            settings: FavorTheShooterSettings::default(),
        };
        let result = reg.validate_hit(16, 20, 50, 99, 1, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 100.0, 25);
        assert!(result.is_valid);
        assert_eq!(result.damage, 25);
    }

    #[test]
    fn stale_claim_beyond_max_rewind_is_rejected() {
        let ring = ring_with_stationary_target(1, Vec3::new(10.0, 0.0, 0.0));
        let reg = HitRegistration {
            ring: &ring,
            settings: FavorTheShooterSettings::default(),
        };
        let result = reg.validate_hit(0, 5_000, 50, 99, 1, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 100.0, 25);
        assert!(!result.is_valid);
        assert_eq!(result.rejection_reason, Some(HitRejectReason::Stale));
    }

    #[test]
    fn high_latency_lowers_confidence_below_threshold() {
        let ring = ring_with_stationary_target(1, Vec3::new(10.0, 0.0, 0.0));
        let reg = HitRegistration {
            ring: &ring,
            settings: FavorTheShooterSettings::default(),
        };
        let result = reg.validate_hit(16, 20, 900, 99, 1, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 100.0, 25);
        assert!(result.confidence < 1.0);
    }

    #[test]
    fn hit_beyond_max_range_is_rejected() {
        let ring = ring_with_stationary_target(1, Vec3::new(10.0, 0.0, 0.0));
        let reg = HitRegistration {
            ring: &ring,
            settings: FavorTheShooterSettings::default(),
        };
        let result = reg.validate_hit(16, 20, 50, 99, 1, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 5.0, 25);
        assert!(!result.is_valid);
        assert_eq!(result.rejection_reason, Some(HitRejectReason::OutOfRange));
    }

    #[test]
    fn occluder_between_shooter_and_victim_blocks_the_hit() {
        let mut ring = SnapshotRing::new(16);
        for (tick, ms) in [(1u32, 0u64), (2, 16), (3, 32)] {
            let mut entities = HashMap::new();
            entities.insert(
                1,
                EntitySnapshotState {
                    entity_id: 1,
                    position: Vec3::new(10.0, 0.0, 0.0),
                    velocity: Vec3::ZERO,
                    orientation: 0.0,
                    health: 100,
                    is_alive: true,
                    hitbox_half_extents: crate::entity::Hitbox::capsule_default().half_extents,
                },
            );
            // A wall entity sitting directly between the shooter and the victim.
            entities.insert(
                2,
                EntitySnapshotState {
                    entity_id: 2,
                    position: Vec3::new(5.0, 0.0, 0.0),
                    velocity: Vec3::ZERO,
                    orientation: 0.0,
                    health: 100,
                    is_alive: true,
                    hitbox_half_extents: Vec3::new(1.0, 2.0, 1.0),
                },
            );
            ring.push(WorldSnapshot {
                tick,
                captured_at_ms: ms,
                entities,
            });
        }
        let reg = HitRegistration {
            ring: &ring,
            settings: FavorTheShooterSettings::default(),
        };
        let result = reg.validate_hit(16, 20, 50, 99, 1, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 100.0, 25);
        assert!(!result.is_valid);
        assert_eq!(result.rejection_reason, Some(HitRejectReason::Occluded));
    }
}
