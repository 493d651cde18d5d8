//! Wire message catalogue. Follows the teacher's `net::protocol` approach of
//! one `rkyv`-archivable struct per message plus a tag enum, but widened to
//! the session/auth/world/routing traffic this server actually carries.

use rkyv::{Archive, Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
#[repr(u16)]
pub enum MessageType {
    Hello = 0,
    LoginRequest = 1,
    LoginResponse = 2,
    Heartbeat = 3,
    Logout = 4,
    InputCommand = 5,
    WorldSnapshot = 6,
    HitClaim = 7,
    HitResult = 8,
    MapTransitionBegin = 9,
    MapTransitionComplete = 10,
    Error = 11,
    EntitySpawn = 12,
    EntityRemove = 13,
    ChatMessage = 14,
    MapChange = 15,
    RouteRequest = 16,
    RouteResponse = 17,
    HeartbeatResponse = 18,
}

impl MessageType {
    pub fn from_tag(tag: u16) -> Option<Self> {
        Some(match tag {
            0 => Self::Hello,
            1 => Self::LoginRequest,
            2 => Self::LoginResponse,
            3 => Self::Heartbeat,
            4 => Self::Logout,
            5 => Self::InputCommand,
            6 => Self::WorldSnapshot,
            7 => Self::HitClaim,
            8 => Self::HitResult,
            9 => Self::MapTransitionBegin,
            10 => Self::MapTransitionComplete,
            11 => Self::Error,
            12 => Self::EntitySpawn,
            13 => Self::EntityRemove,
            14 => Self::ChatMessage,
            15 => Self::MapChange,
            16 => Self::RouteRequest,
            17 => Self::RouteResponse,
            18 => Self::HeartbeatResponse,
            _ => return None,
        })
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
    #[rkyv(derive(Debug))]
    pub struct InputFlags: u16 {
        const SPRINT = 1 << 0;
        const JUMP   = 1 << 1;
        const CROUCH = 1 << 2;
        const FIRE   = 1 << 3;
        const USE    = 1 << 4;
        const RELOAD = 1 << 5;
    }
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct LoginRequest {
    pub protocol_version: u16,
    pub account: Vec<u8>,
    pub credential: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct LoginResponse {
    pub accepted: bool,
    pub player_id: u64,
    pub udp_cookie: u32,
}

/// Bit-packed to match the teacher's `ClientCommand`: direction and view
/// angles are quantized rather than carried as floats over the wire.
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct InputCommand {
    pub client_tick: u32,
    pub sequence: u32,
    pub move_direction: [i8; 3],
    pub view_angles: [i16; 2],
    pub flags: InputFlags,
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct QuantizedEntityState {
    pub entity_id: u32,
    pub position: [i32; 3],
    pub velocity: [i16; 3],
    pub orientation: i16,
    pub health: i16,
    pub flags: u8,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct WorldSnapshotMsg {
    pub server_tick: u32,
    pub server_time_ms: u64,
    pub last_ack_sequence: u32,
    pub entities: Vec<QuantizedEntityState>,
}

/// Carries the client's local clock so the server can echo back the
/// measured one-way latency (`server_time_ms - client_time_ms`).
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct HeartbeatRequest {
    pub client_time_ms: u64,
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct HeartbeatResponse {
    pub server_time_ms: u64,
    pub latency_ms: u32,
}

/// Requests the explicit (loading-screen) map transition path, as opposed
/// to the seamless boundary crossing the world tick detects on its own.
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct MapTransitionBeginMsg {
    pub target_map: u32,
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct MapTransitionCompleteMsg {
    pub map_id: u32,
    pub accepted: bool,
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct HitClaim {
    pub client_tick: u32,
    pub target_entity_id: u32,
    pub origin: [f32; 3],
    pub direction: [f32; 3],
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct HitResult {
    pub accepted: bool,
    pub damage: i32,
    pub confidence: f32,
}

/// Sent to observers in the destination instance when an entity (player or
/// NPC) becomes visible there, distinct from the periodic `WorldSnapshot` —
/// required so a newly-entered observer learns of an entity before the next
/// snapshot tick, per spec's seamless-transition scenario.
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct EntitySpawnMsg {
    pub entity_id: u32,
    pub entity_type: u8,
    pub position: [f32; 3],
}

/// Sent to observers left behind in the source instance when an entity
/// leaves it (map transition, despawn, or disconnect).
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct EntityRemoveMsg {
    pub entity_id: u32,
}

/// Sent to the transitioning client itself once phase 5 (Completing)
/// finishes, naming the map it now resides on.
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct MapChangeMsg {
    pub map_id: u32,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct ChatMessageMsg {
    pub sender_player_id: u64,
    pub channel: u8,
    pub text: Vec<u8>,
}

/// Sent by a client to the edge gateway tier (Module K) before it ever
/// dials a game node, carrying enough for `GlobalLoadBalancer::route_client`.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct RouteRequestMsg {
    pub player_id: u64,
    pub preferred_region: Option<Vec<u8>>,
    pub client_lat: f64,
    pub client_lon: f64,
}

/// The gateway's answer: which node to connect to and why, per the data
/// model's `Route` record.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct RouteResponseMsg {
    pub accepted: bool,
    pub hostname: Vec<u8>,
    pub port: u16,
    pub estimated_latency_ms: f32,
    pub reason: Vec<u8>,
}
