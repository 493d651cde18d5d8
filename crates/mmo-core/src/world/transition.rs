//! Map transition handler, ported from `game/world/map_transition_handler.h`:
//! a five-phase state machine per in-flight transition, plus boundary
//! detection for seamless (no loading screen) transitions between
//! adjacent maps.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use glam::Vec3;

use crate::entity::EntityId;
use crate::error::WorldError;

pub const TRANSITION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    None,
    Preparing,
    Saving,
    Loading,
    Transferring,
    Completing,
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionResult {
    pub entity_id: EntityId,
    pub destination_map: u32,
    pub destination_instance: u64,
    pub seamless: bool,
}

struct TransitionInfo {
    state: TransitionState,
    destination_map: u32,
    destination_instance: u64,
    seamless: bool,
    started_at: Instant,
}

#[derive(Default)]
pub struct MapTransitionHandler {
    in_flight: HashMap<EntityId, TransitionInfo>,
}

impl MapTransitionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_transition(&self, entity_id: EntityId) -> bool {
        self.in_flight.contains_key(&entity_id)
    }

    pub fn initiate_transition(
        &mut self,
        entity_id: EntityId,
        destination_map: u32,
        destination_instance: u64,
        seamless: bool,
    ) -> Result<(), WorldError> {
        if self.is_in_transition(entity_id) {
            return Err(WorldError::AlreadyTransitioning);
        }
        self.in_flight.insert(
            entity_id,
            TransitionInfo {
                state: TransitionState::Preparing,
                destination_map,
                destination_instance,
                seamless,
                started_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Advances the transition one phase. Phases run in a fixed order;
    /// callers drive each phase's actual work (saving player state,
    /// loading the destination instance, transferring ownership) and call
    /// this once that phase's work completes.
    pub fn advance(&mut self, entity_id: EntityId) -> Result<Option<TransitionResult>, WorldError> {
        let info = self
            .in_flight
            .get_mut(&entity_id)
            .ok_or(WorldError::NotTransitioning)?;

        if info.started_at.elapsed() > TRANSITION_TIMEOUT {
            self.in_flight.remove(&entity_id);
            return Err(WorldError::TransitionTimeout);
        }

        use TransitionState::*;
        info.state = match info.state {
            None => Preparing,
            Preparing => Saving,
            Saving => Loading,
            Loading => Transferring,
            Transferring => Completing,
            Completing => {
                let result = TransitionResult {
                    entity_id,
                    destination_map: info.destination_map,
                    destination_instance: info.destination_instance,
                    seamless: info.seamless,
                };
                self.in_flight.remove(&entity_id);
                return Ok(Some(result));
            }
        };
        Ok(None)
    }

    pub fn cancel(&mut self, entity_id: EntityId) {
        self.in_flight.remove(&entity_id);
    }
}

/// Detects proximity to an instanced map's edge so the destination
/// instance can be preloaded before the player actually crosses it.
pub struct MapBoundaryDetector {
    pub bounds_half_extent: Vec3,
    pub preload_margin: f32,
}

impl MapBoundaryDetector {
    pub fn distance_to_boundary(&self, position: Vec3) -> f32 {
        let dx = self.bounds_half_extent.x - position.x.abs();
        let dz = self.bounds_half_extent.z - position.z.abs();
        dx.min(dz)
    }

    pub fn should_preload_adjacent(&self, position: Vec3) -> bool {
        self.distance_to_boundary(position) <= self.preload_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_runs_through_every_phase_before_completing() {
        let mut handler = MapTransitionHandler::new();
        handler.initiate_transition(1, 7, 100, true).unwrap();
        assert!(handler.is_in_transition(1));

        let mut result = None;
        for _ in 0..5 {
            result = handler.advance(1).unwrap();
            if result.is_some() {
                break;
            }
        }
        let result = result.expect("transition should complete within 5 phase advances");
        assert_eq!(result.destination_map, 7);
        assert!(!handler.is_in_transition(1));
    }

    #[test]
    fn cannot_start_a_second_transition_concurrently() {
        let mut handler = MapTransitionHandler::new();
        handler.initiate_transition(1, 7, 100, false).unwrap();
        assert!(matches!(
            handler.initiate_transition(1, 8, 200, false),
            Err(WorldError::AlreadyTransitioning)
        ));
    }

    #[test]
    fn boundary_detector_flags_preload_near_edge() {
        let detector = MapBoundaryDetector {
            bounds_half_extent: Vec3::new(100.0, 0.0, 100.0),
            preload_margin: 10.0,
        };
        assert!(detector.should_preload_adjacent(Vec3::new(95.0, 0.0, 0.0)));
        assert!(!detector.should_preload_adjacent(Vec3::ZERO));
    }
}
