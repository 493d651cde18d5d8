//! Module H: spawn engine, ported from `game/world/spawn_system.h`'s spawn
//! point kinds and population-band/respawn-policy controls.

use glam::Vec3;

use crate::entity::EntityId;

#[derive(Debug, Clone)]
pub enum SpawnKind {
    Static { position: Vec3 },
    RandomArea { center: Vec3, radius: f32 },
    Path { waypoints: Vec<Vec3> },
    Triggered { position: Vec3, trigger_id: u32 },
    Wave { center: Vec3, radius: f32, wave_size: u32 },
}

/// What causes a spawn point to re-evaluate its population deficit.
/// `due_spawns` gates on population band and the point's respawn cooldown;
/// this tags *why* a deficit should be believed, for collaborators (world
/// events, kill feeds) that decide whether to notify the engine at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnTrigger {
    Timer,
    OnDeath,
    WorldEvent,
    PlayerCount,
    Custom,
}

/// Initial AI behavior a freshly spawned entity is configured with,
/// matching spec's `idle | patrol | guard | aggressive | defensive` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialBehavior {
    Idle,
    Patrol,
    Guard,
    Aggressive,
    Defensive,
}

#[derive(Debug, Clone)]
pub struct PatrolRoute {
    pub waypoints: Vec<Vec3>,
    pub speed: f32,
    pub pause_secs: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RespawnPolicy {
    pub trigger: RespawnTrigger,
    pub base_delay_secs: f32,
    /// Multiplies `base_delay_secs` when the area is under-populated
    /// relative to its target band, shortening the wait to restore density.
    pub density_multiplier: f32,
}

impl RespawnPolicy {
    pub fn delay_for(&self, current: u32, target_min: u32) -> f32 {
        if current < target_min {
            self.base_delay_secs * self.density_multiplier
        } else {
            self.base_delay_secs
        }
    }
}

pub struct SpawnPoint {
    pub id: u32,
    pub kind: SpawnKind,
    pub population_band: (u32, u32),
    pub respawn: RespawnPolicy,
    pub initial_behavior: InitialBehavior,
    pub patrol_route: Option<PatrolRoute>,
    alive_count: u32,
    next_spawn_sequence: u32,
    /// Seconds remaining before this point is eligible to spawn again;
    /// ticks down in `due_spawns` and is reset to `respawn.delay_for(..)`
    /// each time the point actually produces a deficit.
    cooldown_secs: f32,
}

impl SpawnPoint {
    pub fn new(id: u32, kind: SpawnKind, population_band: (u32, u32), respawn: RespawnPolicy) -> Self {
        Self {
            id,
            kind,
            population_band,
            respawn,
            initial_behavior: InitialBehavior::Idle,
            patrol_route: None,
            alive_count: 0,
            next_spawn_sequence: 0,
            cooldown_secs: 0.0,
        }
    }

    pub fn with_behavior(mut self, behavior: InitialBehavior) -> Self {
        self.initial_behavior = behavior;
        self
    }

    pub fn with_patrol_route(mut self, route: PatrolRoute) -> Self {
        self.patrol_route = Some(route);
        self.initial_behavior = InitialBehavior::Patrol;
        self
    }

    pub fn needs_spawn(&self) -> bool {
        self.alive_count < self.population_band.0
    }

    pub fn at_capacity(&self) -> bool {
        self.alive_count >= self.population_band.1
    }

    /// Counts `dt` seconds off the respawn cooldown and reports whether the
    /// point is past it, ready to produce a deficit this tick.
    fn tick_cooldown(&mut self, dt: f32) -> bool {
        self.cooldown_secs = (self.cooldown_secs - dt).max(0.0);
        self.cooldown_secs <= 0.0
    }

    fn arm_cooldown(&mut self) {
        self.cooldown_secs = self.respawn.delay_for(self.alive_count, self.population_band.0);
    }

    pub fn position_for_spawn(&mut self) -> Vec3 {
        let position = match &self.kind {
            SpawnKind::Static { position } => *position,
            SpawnKind::RandomArea { center, radius } => {
                let angle = (self.next_spawn_sequence as f32) * 2.399963; // golden-angle jitter
                *center + Vec3::new(angle.cos(), 0.0, angle.sin()) * (*radius * 0.5)
            }
            SpawnKind::Path { waypoints } => waypoints
                .get(self.next_spawn_sequence as usize % waypoints.len().max(1))
                .copied()
                .unwrap_or(Vec3::ZERO),
            SpawnKind::Triggered { position, .. } => *position,
            SpawnKind::Wave { center, .. } => *center,
        };
        self.next_spawn_sequence = self.next_spawn_sequence.wrapping_add(1);
        position
    }

    pub fn on_spawned(&mut self) {
        self.alive_count += 1;
    }

    pub fn on_despawned(&mut self) {
        self.alive_count = self.alive_count.saturating_sub(1);
    }

    pub fn wave_size(&self) -> Option<u32> {
        match self.kind {
            SpawnKind::Wave { wave_size, .. } => Some(wave_size),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct SpawnEngine {
    points: Vec<SpawnPoint>,
}

impl SpawnEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, point: SpawnPoint) {
        self.points.push(point);
    }

    /// Returns `(spawn_point_id, position)` for every point that currently
    /// needs a new entity and whose respawn cooldown has elapsed, without
    /// mutating alive counts — callers spawn the entity then call
    /// `on_spawned`. `dt` is the elapsed time since the previous call, used
    /// to count down each point's `RespawnPolicy` delay.
    pub fn due_spawns(&mut self, dt: f32) -> Vec<(u32, Vec3)> {
        let mut due = Vec::new();
        for point in &mut self.points {
            let cooled_down = point.tick_cooldown(dt);
            if !cooled_down || !point.needs_spawn() || point.at_capacity() {
                continue;
            }
            let count = match point.wave_size() {
                Some(size) => size,
                None => 1,
            };
            for _ in 0..count {
                due.push((point.id, point.position_for_spawn()));
            }
            point.arm_cooldown();
        }
        due
    }

    pub fn notify_spawned(&mut self, point_id: u32) {
        if let Some(point) = self.points.iter_mut().find(|p| p.id == point_id) {
            point.on_spawned();
        }
    }

    pub fn notify_despawned(&mut self, point_id: u32, _entity_id: EntityId) {
        if let Some(point) = self.points.iter_mut().find(|p| p.id == point_id) {
            point.on_despawned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_spawns_stops_once_population_band_minimum_is_met() {
        let mut engine = SpawnEngine::new();
        engine.register(SpawnPoint::new(
            1,
            SpawnKind::Static { position: Vec3::ZERO },
            (3, 5),
            RespawnPolicy {
                trigger: RespawnTrigger::Timer,
                base_delay_secs: 10.0,
                density_multiplier: 0.5,
            },
        ));

        let due = engine.due_spawns(0.0);
        assert_eq!(due.len(), 1);
        engine.notify_spawned(1);
        engine.notify_spawned(1);
        engine.notify_spawned(1);
        assert!(engine.due_spawns(0.0).is_empty());
    }

    #[test]
    fn wave_spawn_point_produces_full_wave_at_once() {
        let mut engine = SpawnEngine::new();
        engine.register(SpawnPoint::new(
            1,
            SpawnKind::Wave {
                center: Vec3::ZERO,
                radius: 5.0,
                wave_size: 4,
            },
            (1, 10),
            RespawnPolicy {
                trigger: RespawnTrigger::Timer,
                base_delay_secs: 30.0,
                density_multiplier: 1.0,
            },
        ));
        assert_eq!(engine.due_spawns(0.0).len(), 4);
    }

    #[test]
    fn with_patrol_route_sets_patrol_behavior() {
        let point = SpawnPoint::new(
            1,
            SpawnKind::Static { position: Vec3::ZERO },
            (1, 1),
            RespawnPolicy {
                trigger: RespawnTrigger::OnDeath,
                base_delay_secs: 5.0,
                density_multiplier: 1.0,
            },
        )
        .with_patrol_route(PatrolRoute {
            waypoints: vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)],
            speed: 3.0,
            pause_secs: 2.0,
        });

        assert_eq!(point.initial_behavior, InitialBehavior::Patrol);
        assert_eq!(point.patrol_route.unwrap().waypoints.len(), 2);
    }

    #[test]
    fn with_behavior_overrides_default_idle() {
        let point = SpawnPoint::new(
            1,
            SpawnKind::Static { position: Vec3::ZERO },
            (1, 1),
            RespawnPolicy {
                trigger: RespawnTrigger::Timer,
                base_delay_secs: 5.0,
                density_multiplier: 1.0,
            },
        )
        .with_behavior(InitialBehavior::Aggressive);

        assert_eq!(point.initial_behavior, InitialBehavior::Aggressive);
    }

    #[test]
    fn density_multiplier_shortens_delay_when_under_target() {
        let policy = RespawnPolicy {
            trigger: RespawnTrigger::Timer,
            base_delay_secs: 20.0,
            density_multiplier: 0.25,
        };
        assert_eq!(policy.delay_for(1, 5), 5.0);
        assert_eq!(policy.delay_for(5, 5), 20.0);
    }

    #[test]
    fn respawn_waits_out_its_cooldown_before_filling_the_deficit_again() {
        let mut engine = SpawnEngine::new();
        engine.register(SpawnPoint::new(
            1,
            SpawnKind::Static { position: Vec3::ZERO },
            (1, 5),
            RespawnPolicy {
                trigger: RespawnTrigger::Timer,
                base_delay_secs: 10.0,
                density_multiplier: 1.0,
            },
        ));

        assert_eq!(engine.due_spawns(0.0).len(), 1);
        engine.notify_spawned(1);
        engine.notify_despawned(1, 100);
        // Deficit exists again, but the cooldown armed by the first spawn
        // hasn't elapsed yet.
        assert!(engine.due_spawns(1.0).is_empty());
        assert!(engine.due_spawns(4.0).is_empty());
        assert_eq!(engine.due_spawns(5.0).len(), 1);
    }
}
