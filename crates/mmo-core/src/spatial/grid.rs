//! Uniform fixed-cell-size grid backend for open-world maps with roughly
//! even entity density.

use std::collections::HashMap;

use glam::Vec3;

use super::SpatialIndex;
use crate::entity::EntityId;

type Cell = (i32, i32);

pub struct GridIndex {
    cell_size: f32,
    cells: HashMap<Cell, Vec<EntityId>>,
    positions: HashMap<EntityId, Vec3>,
}

impl GridIndex {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    fn cell_of(&self, position: Vec3) -> Cell {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.z / self.cell_size).floor() as i32,
        )
    }
}

impl SpatialIndex for GridIndex {
    fn insert(&mut self, id: EntityId, position: Vec3) {
        // Guards against a caller re-inserting an id already tracked under a
        // different cell, which would otherwise leave a stale duplicate.
        self.remove(id);
        let cell = self.cell_of(position);
        self.cells.entry(cell).or_default().push(id);
        self.positions.insert(id, position);
    }

    fn remove(&mut self, id: EntityId) {
        if let Some(position) = self.positions.remove(&id) {
            let cell = self.cell_of(position);
            if let Some(bucket) = self.cells.get_mut(&cell) {
                bucket.retain(|&e| e != id);
            }
        }
    }

    fn update(&mut self, id: EntityId, position: Vec3) {
        self.remove(id);
        self.insert(id, position);
    }

    fn query_radius(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        let cell_radius = (radius / self.cell_size).ceil() as i32;
        let (cx, cz) = self.cell_of(center);
        let radius_sq = radius * radius;
        let mut found = Vec::new();
        for dx in -cell_radius..=cell_radius {
            for dz in -cell_radius..=cell_radius {
                if let Some(bucket) = self.cells.get(&(cx + dx, cz + dz)) {
                    for &id in bucket {
                        if let Some(&pos) = self.positions.get(&id) {
                            if pos.distance_squared(center) <= radius_sq {
                                found.push(id);
                            }
                        }
                    }
                }
            }
        }
        found
    }

    fn query_box(&self, min: Vec3, max: Vec3) -> Vec<EntityId> {
        let (min_cx, min_cz) = self.cell_of(min);
        let (max_cx, max_cz) = self.cell_of(max);
        let mut found = Vec::new();
        for cx in min_cx..=max_cx {
            for cz in min_cz..=max_cz {
                if let Some(bucket) = self.cells.get(&(cx, cz)) {
                    for &id in bucket {
                        if let Some(&pos) = self.positions.get(&id) {
                            if pos.x >= min.x
                                && pos.x <= max.x
                                && pos.y >= min.y
                                && pos.y <= max.y
                                && pos.z >= min.z
                                && pos.z <= max.z
                            {
                                found.push(id);
                            }
                        }
                    }
                }
            }
        }
        found
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_finds_entities_within_radius_across_cell_boundaries() {
        let mut grid = GridIndex::new(10.0);
        grid.insert(1, Vec3::new(0.0, 0.0, 0.0));
        grid.insert(2, Vec3::new(12.0, 0.0, 0.0));
        grid.insert(3, Vec3::new(500.0, 0.0, 0.0));

        let found = grid.query_radius(Vec3::ZERO, 15.0);
        assert!(found.contains(&1));
        assert!(found.contains(&2));
        assert!(!found.contains(&3));
    }

    #[test]
    fn query_box_finds_entities_inside_the_box() {
        let mut grid = GridIndex::new(10.0);
        grid.insert(1, Vec3::new(0.0, 0.0, 0.0));
        grid.insert(2, Vec3::new(30.0, 0.0, 30.0));
        let found = grid.query_box(Vec3::new(-5.0, -5.0, -5.0), Vec3::new(5.0, 5.0, 5.0));
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn update_moves_entity_between_cells() {
        let mut grid = GridIndex::new(10.0);
        grid.insert(1, Vec3::new(0.0, 0.0, 0.0));
        grid.update(1, Vec3::new(500.0, 0.0, 0.0));
        assert!(grid.query_radius(Vec3::ZERO, 5.0).is_empty());
        assert_eq!(grid.query_radius(Vec3::new(500.0, 0.0, 0.0), 5.0), vec![1]);
    }
}
