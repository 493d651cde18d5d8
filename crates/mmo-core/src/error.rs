//! Error taxonomy per category (transport, framing, auth, world, validation, routing).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("read error: {0}")]
    Read(#[from] std::io::Error),
    #[error("write error")]
    Write,
    #[error("idle timeout")]
    IdleTimeout,
    #[error("slow consumer")]
    SlowConsumer,
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("malformed frame")]
    MalformedFrame,
    #[error("oversize frame: {0} bytes")]
    OversizeFrame(usize),
    #[error("unknown message type: {0}")]
    UnknownType(u16),
    #[error("sequence violation: expected > {expected}, got {got}")]
    SequenceViolation { expected: u32, got: u32 },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("too many attempts")]
    TooManyAttempts,
    #[error("banned")]
    Banned,
}

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("no such map: {0}")]
    NoSuchMap(u32),
    #[error("instance full")]
    InstanceFull,
    #[error("level band violation")]
    LevelBand,
    #[error("entity is in combat")]
    InCombat,
    #[error("transition timed out")]
    TransitionTimeout,
    #[error("entity already mid-transition")]
    AlreadyTransitioning,
    #[error("entity is not mid-transition")]
    NotTransitioning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitRejectReason {
    Stale,
    OutOfRange,
    TargetDead,
    LowConfidence,
    Occluded,
}

impl std::fmt::Display for HitRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HitRejectReason::Stale => "stale",
            HitRejectReason::OutOfRange => "out_of_range",
            HitRejectReason::TargetDead => "target_dead",
            HitRejectReason::LowConfidence => "low_confidence",
            HitRejectReason::Occluded => "occluded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("input rejected")]
    InputRejected,
    #[error("hit rejected: {0}")]
    HitRejected(HitRejectReason),
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no healthy server available")]
    NoHealthyServer,
    #[error("region unavailable: {0}")]
    RegionUnavailable(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("configuration error: {0}")]
    Config(String),
}
