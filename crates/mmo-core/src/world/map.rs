//! Static map configuration, resolved once at load and shared read-only
//! across every instance of that map.

use glam::Vec3;

use crate::spatial::{GridIndex, OctreeIndex, SpatialIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialBackend {
    Grid { cell_size_cm: u32 },
    Octree { world_half_size_cm: u32, max_depth: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Overworld,
    Dungeon,
    City,
    Arena,
    Raid,
}

/// An adjacent map reachable without a loading screen: a trigger volume
/// (point + radius) on this map paired with the destination map it leads
/// to, grounded on `map_manager.h`'s `MapConfig::Connection`.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryConnection {
    pub point: Vec3,
    pub radius: f32,
    pub target_map: u32,
}

impl BoundaryConnection {
    pub fn contains(&self, position: Vec3) -> bool {
        position.distance_squared(self.point) <= self.radius * self.radius
    }
}

#[derive(Debug, Clone)]
pub struct MapConfig {
    pub map_id: u32,
    pub name: String,
    pub kind: MapKind,
    pub max_players: u32,
    pub level_band: (u32, u32),
    pub backend: SpatialBackend,
    pub is_instanced: bool,
    pub spawn_points: Vec<Vec3>,
    pub connections: Vec<BoundaryConnection>,
}

impl MapConfig {
    pub fn build_spatial_index(&self) -> Box<dyn SpatialIndex> {
        match self.backend {
            SpatialBackend::Grid { cell_size_cm } => {
                Box::new(GridIndex::new(cell_size_cm as f32 / 100.0))
            }
            SpatialBackend::Octree {
                world_half_size_cm,
                max_depth,
            } => Box::new(OctreeIndex::new(world_half_size_cm as f32 / 100.0, max_depth)),
        }
    }

    pub fn accepts_level(&self, level: u32) -> bool {
        level >= self.level_band.0 && level <= self.level_band.1
    }

    /// Nearest registered spawn point to `origin` (the point the entity
    /// crossed the boundary at), or `Vec3::ZERO` if the map has none.
    pub fn nearest_spawn_point(&self, origin: Vec3) -> Vec3 {
        self.spawn_points
            .iter()
            .copied()
            .min_by(|a, b| {
                a.distance_squared(origin)
                    .total_cmp(&b.distance_squared(origin))
            })
            .unwrap_or(Vec3::ZERO)
    }

    /// Returns the first connection whose trigger volume contains
    /// `position`, per `map_manager.h`'s `CheckMapTransition`.
    pub fn connection_at(&self, position: Vec3) -> Option<&BoundaryConnection> {
        self.connections.iter().find(|c| c.contains(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_band_is_inclusive() {
        let map = MapConfig {
            map_id: 1,
            name: "Test Field".into(),
            kind: MapKind::Overworld,
            max_players: 100,
            level_band: (10, 20),
            backend: SpatialBackend::Grid { cell_size_cm: 1000 },
            is_instanced: false,
            spawn_points: Vec::new(),
            connections: Vec::new(),
        };
        assert!(map.accepts_level(10));
        assert!(map.accepts_level(20));
        assert!(!map.accepts_level(9));
        assert!(!map.accepts_level(21));
    }
}
