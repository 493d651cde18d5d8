//! Module J: lag compensation.

pub mod rewind;
pub mod rollback;
pub mod snapshot;

pub use rewind::{FavorTheShooterSettings, HitRegistration, HitValidation};
pub use rollback::RollbackNetworking;
pub use snapshot::{EntitySnapshotState, SnapshotRing, WorldSnapshot, MAX_SNAPSHOTS, SNAPSHOT_INTERVAL};
