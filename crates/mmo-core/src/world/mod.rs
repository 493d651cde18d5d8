//! Module G: map & instance manager.

pub mod instance;
pub mod map;
pub mod transition;

pub use instance::{Instance, InstanceState};
pub use map::{MapConfig, SpatialBackend};
pub use transition::{MapBoundaryDetector, MapTransitionHandler, TransitionResult, TransitionState};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::{Entity, EntityId};
use crate::error::WorldError;
use crate::world::map::BoundaryConnection;

/// Owns every map's static config and the live instances spawned from it,
/// generalizing the teacher's single `World` (one map, one instance) into
/// the map-of-instances shape spec.md's world layer requires.
pub struct WorldManager {
    maps: HashMap<u32, Arc<MapConfig>>,
    instances: RwLock<HashMap<u64, Instance>>,
    next_instance_id: AtomicU64,
}

impl WorldManager {
    pub fn new(maps: Vec<MapConfig>) -> Self {
        Self {
            maps: maps.into_iter().map(|m| (m.map_id, Arc::new(m))).collect(),
            instances: RwLock::new(HashMap::new()),
            next_instance_id: AtomicU64::new(1),
        }
    }

    pub fn map(&self, map_id: u32) -> Option<&Arc<MapConfig>> {
        self.maps.get(&map_id)
    }

    /// Finds an instance of `map_id` with room, or creates a fresh one.
    pub fn join_or_create_instance(&self, map_id: u32) -> Result<u64, WorldError> {
        let map = self.maps.get(&map_id).ok_or(WorldError::NoSuchMap(map_id))?;

        let mut instances = self.instances.write();
        if let Some(existing) = instances
            .values()
            .find(|i| i.map.map_id == map_id && i.has_room())
        {
            return Ok(existing.id);
        }

        let id = self.next_instance_id.fetch_add(1, Ordering::Relaxed);
        instances.insert(id, Instance::new(id, map.clone()));
        Ok(id)
    }

    /// Produces a fresh, private instance of `map_id` regardless of
    /// whether existing instances have room — the path a party's explicit
    /// "private instance" request takes instead of `join_or_create_instance`.
    pub fn create_private_instance(&self, map_id: u32) -> Result<u64, WorldError> {
        let map = self.maps.get(&map_id).ok_or(WorldError::NoSuchMap(map_id))?;
        let id = self.next_instance_id.fetch_add(1, Ordering::Relaxed);
        self.instances
            .write()
            .insert(id, Instance::new(id, map.clone()));
        Ok(id)
    }

    /// Moves `entity` from `from_instance` to `to_instance`, spawning it at
    /// `spawn_position` in the destination — the atomic step of transition
    /// phase 4 (Transferring). Returns the moved entity on success. Returns
    /// `None` if the source instance never had it, or if `to_instance`
    /// doesn't exist — in the latter case the entity is put back into
    /// `from_instance` rather than dropped, so a stale destination id never
    /// loses the entity outright.
    pub fn transfer_entity(
        &self,
        from_instance: u64,
        to_instance: u64,
        entity_id: EntityId,
        spawn_position: glam::Vec3,
    ) -> Option<Entity> {
        let mut instances = self.instances.write();
        let mut entity = instances.get_mut(&from_instance)?.despawn_entity(entity_id)?;
        entity.position = spawn_position;
        match instances.get_mut(&to_instance) {
            Some(dest) => {
                dest.spawn_entity(entity.clone());
                Some(entity)
            }
            None => {
                if let Some(source) = instances.get_mut(&from_instance) {
                    source.spawn_entity(entity);
                }
                None
            }
        }
    }

    /// Each tick, samples every live entity's position against its map's
    /// boundary connections and returns the ones that should seamlessly
    /// transition, per spec.md §4.G's "Seamless boundary detection".
    pub fn detect_boundary_crossings(&self) -> Vec<(u64, EntityId, BoundaryConnection)> {
        let instances = self.instances.read();
        let mut crossings = Vec::new();
        for instance in instances.values() {
            if instance.map.connections.is_empty() {
                continue;
            }
            for entity in instance.entities.values() {
                if let Some(connection) = instance.map.connection_at(entity.position) {
                    crossings.push((instance.id, entity.id, *connection));
                }
            }
        }
        crossings
    }

    pub fn with_instance<R>(&self, instance_id: u64, f: impl FnOnce(&Instance) -> R) -> Option<R> {
        self.instances.read().get(&instance_id).map(f)
    }

    pub fn with_instance_mut<R>(
        &self,
        instance_id: u64,
        f: impl FnOnce(&mut Instance) -> R,
    ) -> Option<R> {
        self.instances.write().get_mut(&instance_id).map(f)
    }

    pub fn retire_expired(&self) {
        self.instances
            .write()
            .retain(|_, i| i.state != InstanceState::Expired);
    }

    /// Advances every live instance's spawn points one tick — the per-tick
    /// half of Module H the world loop drives; `detect_boundary_crossings`
    /// is the complementary per-tick half for Module G.
    pub fn tick_spawns(&self, dt_secs: f32) {
        for instance in self.instances.write().values_mut() {
            instance.tick_spawns(dt_secs);
        }
    }

    /// Every entity currently live across every instance, snapshot-ready
    /// for the world tick's broadcast step.
    pub fn all_entities(&self) -> Vec<(u64, Entity)> {
        self.instances
            .read()
            .values()
            .flat_map(|i| i.entities.values().map(move |e| (i.id, *e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::map::MapKind;

    fn manager() -> WorldManager {
        WorldManager::new(vec![MapConfig {
            map_id: 1,
            name: "Field".into(),
            kind: MapKind::Overworld,
            max_players: 1,
            level_band: (1, 60),
            backend: SpatialBackend::Grid { cell_size_cm: 500 },
            is_instanced: true,
            spawn_points: Vec::new(),
            connections: Vec::new(),
        }])
    }

    #[test]
    fn join_or_create_spawns_new_instance_when_full() {
        let manager = manager();
        let first = manager.join_or_create_instance(1).unwrap();
        manager.with_instance_mut(first, |i| i.player_count = 1);
        let second = manager.join_or_create_instance(1).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn unknown_map_is_an_error() {
        let manager = manager();
        assert!(matches!(
            manager.join_or_create_instance(99),
            Err(WorldError::NoSuchMap(99))
        ));
    }

    #[test]
    fn transfer_entity_moves_between_instances() {
        use crate::entity::EntityType;

        let manager = manager();
        let source = manager.join_or_create_instance(1).unwrap();
        let dest = manager.create_private_instance(1).unwrap();
        manager.with_instance_mut(source, |i| {
            i.spawn_entity(Entity::new(1, EntityType::Player, glam::Vec3::ZERO))
        });

        let moved = manager
            .transfer_entity(source, dest, 1, glam::Vec3::new(10.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(moved.id, 1);
        assert!(manager.with_instance(source, |i| i.entities.is_empty()).unwrap());
        assert!(manager.with_instance(dest, |i| i.entities.contains_key(&1)).unwrap());
    }

    #[test]
    fn detect_boundary_crossings_finds_entities_inside_connection_radius() {
        use crate::entity::EntityType;
        use crate::world::map::BoundaryConnection;

        let manager = WorldManager::new(vec![MapConfig {
            map_id: 1,
            name: "Field".into(),
            kind: MapKind::Overworld,
            max_players: 10,
            level_band: (1, 60),
            backend: SpatialBackend::Grid { cell_size_cm: 500 },
            is_instanced: true,
            spawn_points: Vec::new(),
            connections: vec![BoundaryConnection {
                point: glam::Vec3::new(100.0, 0.0, 0.0),
                radius: 5.0,
                target_map: 2,
            }],
        }]);
        let instance = manager.join_or_create_instance(1).unwrap();
        manager.with_instance_mut(instance, |i| {
            i.spawn_entity(Entity::new(1, EntityType::Player, glam::Vec3::new(101.0, 0.0, 0.0)))
        });

        let crossings = manager.detect_boundary_crossings();
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].1, 1);
        assert_eq!(crossings[0].2.target_map, 2);
    }
}
