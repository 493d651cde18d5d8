//! Instance runtime state, grounded on `versions/mvp14-world-systems/instance_manager.h`:
//! each map can host many concurrent instances, each progressing through
//! its own lifecycle independent of the map's static configuration.

use std::sync::Arc;

use glam::Vec3;

use crate::entity::{Entity, EntityId, EntityType};
use crate::spatial::SpatialIndex;
use crate::spawn::SpawnEngine;
use crate::world::map::MapConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Active,
    InProgress,
    Completed,
    Resetting,
    Expired,
}

/// A running occurrence of a map: its own entity set, its own spatial
/// index (built fresh per instance so instances never share membership,
/// satisfying spec.md's "entity resides in the spatial index of exactly
/// one instance" invariant), and its own lifecycle state.
pub struct Instance {
    pub id: u64,
    pub map: Arc<MapConfig>,
    pub state: InstanceState,
    pub entities: std::collections::HashMap<EntityId, Entity>,
    pub spatial: Box<dyn SpatialIndex>,
    pub player_count: u32,
    pub spawns: SpawnEngine,
    next_npc_id: EntityId,
}

impl Instance {
    pub fn new(id: u64, map: Arc<MapConfig>) -> Self {
        let spatial = map.build_spatial_index();
        Self {
            id,
            map,
            state: InstanceState::Active,
            entities: std::collections::HashMap::new(),
            spatial,
            player_count: 0,
            spawns: SpawnEngine::new(),
            next_npc_id: u32::MAX / 2,
        }
    }

    pub fn has_room(&self) -> bool {
        self.player_count < self.map.max_players
    }

    /// Adds an entity to both the authoritative entity table and the
    /// spatial index atomically with respect to this instance's own state
    /// — callers never observe one updated without the other.
    pub fn spawn_entity(&mut self, entity: Entity) {
        self.spatial.insert(entity.id, entity.position);
        self.entities.insert(entity.id, entity);
    }

    pub fn despawn_entity(&mut self, entity_id: EntityId) -> Option<Entity> {
        self.spatial.remove(entity_id);
        self.entities.remove(&entity_id)
    }

    pub fn move_entity(&mut self, entity_id: EntityId, new_position: Vec3) {
        if let Some(entity) = self.entities.get_mut(&entity_id) {
            entity.position = new_position;
            self.spatial.update(entity_id, new_position);
        }
    }

    pub fn entities_in_radius(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        self.spatial.query_radius(center, radius)
    }

    /// Drives this instance's spawn points for one tick: every point under
    /// its population floor spawns fresh NPCs drawn from a counter reserved
    /// above the player id range, so server-spawned entities never collide
    /// with a session-bound player entity id.
    pub fn tick_spawns(&mut self, dt_secs: f32) {
        for (point_id, position) in self.spawns.due_spawns(dt_secs) {
            let id = self.next_npc_id;
            self.next_npc_id = self.next_npc_id.wrapping_add(1);
            self.spawn_entity(Entity::new(id, EntityType::Npc, position));
            self.spawns.notify_spawned(point_id);
        }
    }

    pub fn advance_to(&mut self, state: InstanceState) -> bool {
        use InstanceState::*;
        let legal = matches!(
            (self.state, state),
            (Active, InProgress)
                | (InProgress, Completed)
                | (Completed, Resetting)
                | (Resetting, Active)
                | (_, Expired)
        );
        if legal {
            self.state = state;
        }
        legal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::world::map::{MapKind, SpatialBackend};

    fn test_map() -> Arc<MapConfig> {
        Arc::new(MapConfig {
            map_id: 1,
            name: "Arena".into(),
            kind: MapKind::Arena,
            max_players: 2,
            level_band: (1, 60),
            backend: SpatialBackend::Grid { cell_size_cm: 500 },
            is_instanced: true,
            spawn_points: Vec::new(),
            connections: Vec::new(),
        })
    }

    #[test]
    fn has_room_respects_map_capacity() {
        let mut instance = Instance::new(1, test_map());
        assert!(instance.has_room());
        instance.player_count = 2;
        assert!(!instance.has_room());
    }

    #[test]
    fn lifecycle_transitions_are_ordered() {
        let mut instance = Instance::new(1, test_map());
        assert!(instance.advance_to(InstanceState::InProgress));
        assert!(!instance.advance_to(InstanceState::Active));
        assert!(instance.advance_to(InstanceState::Completed));
        assert!(instance.advance_to(InstanceState::Resetting));
        assert!(instance.advance_to(InstanceState::Active));
    }

    #[test]
    fn any_state_can_expire() {
        let mut instance = Instance::new(1, test_map());
        assert!(instance.advance_to(InstanceState::Expired));
    }

    #[test]
    fn spawn_entity_adds_to_both_table_and_spatial_index() {
        let mut instance = Instance::new(1, test_map());
        instance.spawn_entity(Entity::new(1, EntityType::Npc, Vec3::ZERO));
        assert_eq!(instance.entities.len(), 1);
        assert_eq!(instance.entities_in_radius(Vec3::ZERO, 1.0), vec![1]);
    }

    #[test]
    fn despawn_entity_removes_from_both() {
        let mut instance = Instance::new(1, test_map());
        instance.spawn_entity(Entity::new(1, EntityType::Npc, Vec3::ZERO));
        instance.despawn_entity(1);
        assert!(instance.entities.is_empty());
        assert!(instance.entities_in_radius(Vec3::ZERO, 1.0).is_empty());
    }

    #[test]
    fn tick_spawns_populates_registered_points_up_to_their_floor() {
        use crate::spawn::{RespawnPolicy, RespawnTrigger, SpawnKind, SpawnPoint};

        let mut instance = Instance::new(1, test_map());
        instance.spawns.register(SpawnPoint::new(
            1,
            SpawnKind::Static { position: Vec3::ZERO },
            (2, 4),
            RespawnPolicy {
                trigger: RespawnTrigger::Timer,
                base_delay_secs: 10.0,
                density_multiplier: 0.5,
            },
        ));

        // One entity per tick (no wave), gated by a 5s cooldown (10s base *
        // 0.5 density multiplier while under the population floor).
        instance.tick_spawns(0.0);
        assert_eq!(instance.entities.len(), 1);
        instance.tick_spawns(5.0);
        assert_eq!(instance.entities.len(), 2);
        instance.tick_spawns(5.0);
        assert_eq!(instance.entities.len(), 2);
    }

    #[test]
    fn move_entity_updates_spatial_membership() {
        let mut instance = Instance::new(1, test_map());
        instance.spawn_entity(Entity::new(1, EntityType::Npc, Vec3::ZERO));
        instance.move_entity(1, Vec3::new(100.0, 0.0, 100.0));
        assert!(instance.entities_in_radius(Vec3::ZERO, 1.0).is_empty());
        assert_eq!(
            instance.entities_in_radius(Vec3::new(100.0, 0.0, 100.0), 1.0),
            vec![1]
        );
    }
}
