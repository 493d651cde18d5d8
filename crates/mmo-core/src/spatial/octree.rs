//! Sparse octree backend for instanced/vertical maps (dungeons, raid
//! instances) where a uniform grid would waste cells on empty space.

use glam::Vec3;

use super::SpatialIndex;
use crate::entity::EntityId;

const SPLIT_THRESHOLD: usize = 8;
const MERGE_THRESHOLD: usize = 2;

struct Node {
    center: Vec3,
    half_size: f32,
    depth: u32,
    max_depth: u32,
    entries: Vec<(EntityId, Vec3)>,
    children: Option<Box<[Node; 8]>>,
}

impl Node {
    fn new(center: Vec3, half_size: f32, depth: u32, max_depth: u32) -> Self {
        Self {
            center,
            half_size,
            depth,
            max_depth,
            entries: Vec::new(),
            children: None,
        }
    }

    fn octant_index(&self, position: Vec3) -> usize {
        let mut index = 0;
        if position.x >= self.center.x {
            index |= 1;
        }
        if position.y >= self.center.y {
            index |= 2;
        }
        if position.z >= self.center.z {
            index |= 4;
        }
        index
    }

    fn octant_center(&self, index: usize) -> Vec3 {
        let quarter = self.half_size / 2.0;
        let sx = if index & 1 != 0 { quarter } else { -quarter };
        let sy = if index & 2 != 0 { quarter } else { -quarter };
        let sz = if index & 4 != 0 { quarter } else { -quarter };
        self.center + Vec3::new(sx, sy, sz)
    }

    fn split(&mut self) {
        if self.depth >= self.max_depth {
            return;
        }
        let half = self.half_size / 2.0;
        let mut children: Vec<Node> = (0..8)
            .map(|i| Node::new(self.octant_center(i), half, self.depth + 1, self.max_depth))
            .collect();
        for (id, pos) in self.entries.drain(..) {
            let idx = children[0].octant_index_for(self.center, pos);
            children[idx].insert(id, pos);
        }
        self.children = Some(Box::new(children.try_into().unwrap_or_else(|_| unreachable!())));
    }

    fn octant_index_for(&self, parent_center: Vec3, position: Vec3) -> usize {
        let mut index = 0;
        if position.x >= parent_center.x {
            index |= 1;
        }
        if position.y >= parent_center.y {
            index |= 2;
        }
        if position.z >= parent_center.z {
            index |= 4;
        }
        index
    }

    fn insert(&mut self, id: EntityId, position: Vec3) {
        if let Some(children) = &mut self.children {
            let idx = self.octant_index(position);
            children[idx].insert(id, position);
            return;
        }
        self.entries.push((id, position));
        if self.entries.len() > SPLIT_THRESHOLD && self.depth < self.max_depth {
            self.split();
        }
    }

    fn remove(&mut self, id: EntityId) -> bool {
        if let Some(children) = &mut self.children {
            let removed = children.iter_mut().any(|c| c.remove(id));
            if removed {
                let total: usize = children.iter().map(|c| c.count()).sum();
                if total < MERGE_THRESHOLD {
                    self.merge();
                }
            }
            return removed;
        }
        let before = self.entries.len();
        self.entries.retain(|(e, _)| *e != id);
        self.entries.len() != before
    }

    fn merge(&mut self) {
        if let Some(children) = self.children.take() {
            for mut child in children.into_iter() {
                self.entries.append(&mut child.entries);
            }
        }
    }

    fn count(&self) -> usize {
        match &self.children {
            Some(children) => children.iter().map(|c| c.count()).sum(),
            None => self.entries.len(),
        }
    }

    fn query_radius(&self, center: Vec3, radius: f32, out: &mut Vec<EntityId>) {
        match &self.children {
            Some(children) => {
                for child in children.iter() {
                    if child.center.distance(center) <= radius + child.half_size * 1.8 {
                        child.query_radius(center, radius, out);
                    }
                }
            }
            None => {
                let radius_sq = radius * radius;
                for (id, pos) in &self.entries {
                    if pos.distance_squared(center) <= radius_sq {
                        out.push(*id);
                    }
                }
            }
        }
    }

    fn aabb_overlaps(&self, min: Vec3, max: Vec3) -> bool {
        let node_min = self.center - Vec3::splat(self.half_size);
        let node_max = self.center + Vec3::splat(self.half_size);
        node_min.x <= max.x
            && node_max.x >= min.x
            && node_min.y <= max.y
            && node_max.y >= min.y
            && node_min.z <= max.z
            && node_max.z >= min.z
    }

    fn query_box(&self, min: Vec3, max: Vec3, out: &mut Vec<EntityId>) {
        match &self.children {
            Some(children) => {
                for child in children.iter() {
                    if child.aabb_overlaps(min, max) {
                        child.query_box(min, max, out);
                    }
                }
            }
            None => {
                for (id, pos) in &self.entries {
                    if pos.x >= min.x
                        && pos.x <= max.x
                        && pos.y >= min.y
                        && pos.y <= max.y
                        && pos.z >= min.z
                        && pos.z <= max.z
                    {
                        out.push(*id);
                    }
                }
            }
        }
    }
}

pub struct OctreeIndex {
    root: Node,
    locations: std::collections::HashMap<EntityId, Vec3>,
}

impl OctreeIndex {
    pub fn new(world_half_size: f32, max_depth: u32) -> Self {
        Self {
            root: Node::new(Vec3::ZERO, world_half_size, 0, max_depth),
            locations: std::collections::HashMap::new(),
        }
    }
}

impl SpatialIndex for OctreeIndex {
    fn insert(&mut self, id: EntityId, position: Vec3) {
        // Guards against a caller re-inserting an id already tracked under a
        // different node, which would otherwise leave a stale duplicate.
        self.remove(id);
        self.root.insert(id, position);
        self.locations.insert(id, position);
    }

    fn remove(&mut self, id: EntityId) {
        self.root.remove(id);
        self.locations.remove(&id);
    }

    fn update(&mut self, id: EntityId, position: Vec3) {
        self.remove(id);
        self.insert(id, position);
    }

    fn query_radius(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        let mut out = Vec::new();
        self.root.query_radius(center, radius, &mut out);
        out
    }

    fn query_box(&self, min: Vec3, max: Vec3) -> Vec<EntityId> {
        let mut out = Vec::new();
        self.root.query_box(min, max, &mut out);
        out
    }

    fn len(&self) -> usize {
        self.locations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_entities_after_splitting() {
        let mut tree = OctreeIndex::new(1000.0, 6);
        for i in 0..20 {
            tree.insert(i, Vec3::new(i as f32, 0.0, 0.0));
        }
        let found = tree.query_radius(Vec3::new(5.0, 0.0, 0.0), 3.0);
        assert!(found.contains(&5));
        assert_eq!(tree.len(), 20);
    }

    #[test]
    fn query_box_finds_entities_inside_the_box() {
        let mut tree = OctreeIndex::new(1000.0, 6);
        tree.insert(1, Vec3::new(5.0, 0.0, 0.0));
        tree.insert(2, Vec3::new(500.0, 0.0, 0.0));
        let found = tree.query_box(Vec3::new(-10.0, -10.0, -10.0), Vec3::new(10.0, 10.0, 10.0));
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn remove_then_query_does_not_find_entity() {
        let mut tree = OctreeIndex::new(1000.0, 6);
        tree.insert(1, Vec3::ZERO);
        tree.remove(1);
        assert!(tree.query_radius(Vec3::ZERO, 10.0).is_empty());
    }
}
