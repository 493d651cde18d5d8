//! Module B: session layer.
//!
//! Each connected peer is represented by one `Session` (state, identity,
//! UDP endpoint) owned by one actor task, the same one-task-per-connection
//! shape as the teacher's per-client handling in `server.rs`, generalized
//! from a single UDP loop into an owned outbound queue per peer.

pub mod registry;
pub mod state;

pub use registry::SessionRegistry;
pub use state::SessionState;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::error::TransportError;

pub type SessionId = Uuid;
pub type PlayerId = u64;

/// Outbound frames are pushed here in FIFO order; the session's write task
/// drains it. Bounded on both frame count and byte size so one slow
/// consumer can't grow memory unboundedly.
#[derive(Clone)]
pub struct SendQueue {
    tx: mpsc::Sender<Vec<u8>>,
    queued_bytes: std::sync::Arc<AtomicU64>,
    high_water_bytes: u64,
}

impl SendQueue {
    pub fn new(capacity_frames: usize, high_water_bytes: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity_frames);
        (
            Self {
                tx,
                queued_bytes: std::sync::Arc::new(AtomicU64::new(0)),
                high_water_bytes: high_water_bytes as u64,
            },
            rx,
        )
    }

    pub fn try_send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let current = self.queued_bytes.load(Ordering::Relaxed);
        if current + frame.len() as u64 > self.high_water_bytes {
            return Err(TransportError::SlowConsumer);
        }
        let len = frame.len() as u64;
        self.tx
            .try_send(frame)
            .map_err(|_| TransportError::SlowConsumer)?;
        self.queued_bytes.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    pub fn mark_sent(&self, len: usize) {
        self.queued_bytes.fetch_sub(len as u64, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct Session {
    pub id: SessionId,
    pub player_id: Option<PlayerId>,
    pub udp_endpoint: Option<SocketAddr>,
    pub state: SessionState,
    pub send_queue: SendQueue,
    pub last_activity: Instant,
    /// The token minted at login, kept so `Logout` can invalidate the right
    /// one instead of a placeholder.
    pub token: Option<String>,
    /// One-way latency last measured over the heartbeat channel, consumed
    /// by hit validation to degrade confidence for laggy attackers.
    pub measured_latency_ms: u32,
    /// Lets a background sweep (idle timeout, forced logout) wake this
    /// session's blocked read loop without a handle to its task.
    pub close_signal: Arc<Notify>,
}

impl Session {
    pub fn new(id: SessionId, send_queue: SendQueue) -> Self {
        Self {
            id,
            player_id: None,
            udp_endpoint: None,
            state: SessionState::Connecting,
            send_queue,
            last_activity: Instant::now(),
            token: None,
            measured_latency_ms: 0,
            close_signal: Arc::new(Notify::new()),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_idle(&self, timeout_secs: u64) -> bool {
        self.last_activity.elapsed().as_secs() >= timeout_secs
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), TransportError> {
        if !self.state.can_transition_to(next) {
            return Err(TransportError::HandshakeFailed(format!(
                "illegal transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}
