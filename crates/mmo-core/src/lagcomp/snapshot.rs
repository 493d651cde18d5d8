//! Snapshot ring, generalizing the teacher's `snapshot::buffer::SnapshotBuffer`
//! (tick-indexed, fixed capacity) to also carry wallclock timestamps, the
//! way `lag_compensation.h`'s `WorldSnapshot` ring needs both axes: tick
//! for simulation replay, wallclock for rewinding to "where the shooter
//! actually saw the target."

use std::collections::HashMap;
use std::time::Duration;

use glam::Vec3;

use crate::entity::EntityId;

pub const MAX_SNAPSHOTS: usize = 300;
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy)]
pub struct EntitySnapshotState {
    pub entity_id: EntityId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: f32,
    pub health: i32,
    pub is_alive: bool,
    /// Half-extents of the entity's hitbox at capture time, carried so hit
    /// validation can raycast against the rewound volume instead of a point.
    pub hitbox_half_extents: Vec3,
}

#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    pub tick: u32,
    pub captured_at_ms: u64,
    pub entities: HashMap<EntityId, EntitySnapshotState>,
}

pub struct SnapshotRing {
    slots: Vec<Option<WorldSnapshot>>,
    capacity: usize,
}

impl SnapshotRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: WorldSnapshot) {
        let index = snapshot.tick as usize % self.capacity;
        self.slots[index] = Some(snapshot);
    }

    pub fn get_by_tick(&self, tick: u32) -> Option<&WorldSnapshot> {
        self.slots[tick as usize % self.capacity]
            .as_ref()
            .filter(|s| s.tick == tick)
    }

    /// Returns the two snapshots bracketing `timestamp_ms`, ordered
    /// (earlier, later), for callers that need to interpolate rather than
    /// rewind to an exact tick.
    ///
    /// Picks the closest snapshot on each side in a single pass instead of
    /// sorting the whole ring, since this runs once per inbound hit claim.
    pub fn bracketing(&self, timestamp_ms: u64) -> Option<(&WorldSnapshot, &WorldSnapshot)> {
        let mut earlier: Option<&WorldSnapshot> = None;
        let mut later: Option<&WorldSnapshot> = None;

        for snap in self.slots.iter().flatten() {
            if snap.captured_at_ms <= timestamp_ms {
                let closer = match earlier {
                    Some(e) => snap.captured_at_ms > e.captured_at_ms,
                    None => true,
                };
                if closer {
                    earlier = Some(snap);
                }
            } else {
                let closer = match later {
                    Some(l) => snap.captured_at_ms < l.captured_at_ms,
                    None => true,
                };
                if closer {
                    later = Some(snap);
                }
            }
        }

        match (earlier, later) {
            (Some(e), Some(l)) => Some((e, l)),
            _ => None,
        }
    }

    pub fn latest(&self) -> Option<&WorldSnapshot> {
        self.slots.iter().flatten().max_by_key(|s| s.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tick: u32, captured_at_ms: u64) -> WorldSnapshot {
        WorldSnapshot {
            tick,
            captured_at_ms,
            entities: HashMap::new(),
        }
    }

    #[test]
    fn get_by_tick_rejects_wrapped_around_stale_slot() {
        let mut ring = SnapshotRing::new(4);
        ring.push(snapshot(1, 16));
        ring.push(snapshot(5, 80)); // wraps to the same slot as tick 1
        assert!(ring.get_by_tick(1).is_none());
        assert!(ring.get_by_tick(5).is_some());
    }

    #[test]
    fn bracketing_finds_the_pair_around_a_timestamp() {
        let mut ring = SnapshotRing::new(8);
        ring.push(snapshot(1, 0));
        ring.push(snapshot(2, 16));
        ring.push(snapshot(3, 32));

        let (before, after) = ring.bracketing(20).unwrap();
        assert_eq!(before.tick, 2);
        assert_eq!(after.tick, 3);
    }

    #[test]
    fn latest_returns_highest_tick() {
        let mut ring = SnapshotRing::new(8);
        ring.push(snapshot(1, 0));
        ring.push(snapshot(3, 32));
        ring.push(snapshot(2, 16));
        assert_eq!(ring.latest().unwrap().tick, 3);
    }
}
