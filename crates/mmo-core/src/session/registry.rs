//! Module C: session registry.
//!
//! Three independent lookup paths over the same set of live sessions —
//! by session id, by player id, and by UDP endpoint — each backed by a
//! `DashMap` the way the pack's `valence-rs-valence` and `NexusSocial`
//! replication layers keep concurrent player indexes without a single
//! coarse-grained lock.

use std::net::SocketAddr;

use dashmap::DashMap;

use super::{PlayerId, Session, SessionId, SessionState};
use crate::error::TransportError;

#[derive(Default)]
pub struct SessionRegistry {
    by_session: DashMap<SessionId, Session>,
    by_player: DashMap<PlayerId, SessionId>,
    by_udp: DashMap<SocketAddr, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) {
        self.by_session.insert(session.id, session);
    }

    pub fn remove(&self, id: SessionId) -> Option<Session> {
        let session = self.by_session.remove(&id).map(|(_, s)| s)?;
        if let Some(player_id) = session.player_id {
            self.by_player.remove(&player_id);
        }
        if let Some(addr) = session.udp_endpoint {
            self.by_udp.remove(&addr);
        }
        Some(session)
    }

    pub fn bind_player(&self, id: SessionId, player_id: PlayerId) {
        if let Some(mut entry) = self.by_session.get_mut(&id) {
            entry.player_id = Some(player_id);
        }
        self.by_player.insert(player_id, id);
    }

    pub fn bind_udp(&self, id: SessionId, addr: SocketAddr) {
        if let Some(mut entry) = self.by_session.get_mut(&id) {
            entry.udp_endpoint = Some(addr);
        }
        self.by_udp.insert(addr, id);
    }

    pub fn get(&self, id: SessionId) -> Option<dashmap::mapref::one::Ref<'_, SessionId, Session>> {
        self.by_session.get(&id)
    }

    pub fn get_by_player(&self, player_id: PlayerId) -> Option<SessionId> {
        self.by_player.get(&player_id).map(|r| *r)
    }

    pub fn get_by_udp(&self, addr: SocketAddr) -> Option<SessionId> {
        self.by_udp.get(&addr).map(|r| *r)
    }

    pub fn len(&self) -> usize {
        self.by_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_session.is_empty()
    }

    pub fn idle_sessions(&self, timeout_secs: u64) -> Vec<SessionId> {
        self.by_session
            .iter()
            .filter(|entry| entry.value().is_idle(timeout_secs))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Every session currently `Authenticated`, the set the world tick's
    /// per-player snapshot broadcast iterates.
    pub fn authenticated_session_ids(&self) -> Vec<SessionId> {
        self.by_session
            .iter()
            .filter(|entry| entry.value().state == SessionState::Authenticated)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn bind_token(&self, id: SessionId, token: String) {
        if let Some(mut entry) = self.by_session.get_mut(&id) {
            entry.token = Some(token);
        }
    }

    pub fn take_token(&self, id: SessionId) -> Option<String> {
        self.by_session.get(&id).and_then(|e| e.token.clone())
    }

    pub fn record_latency(&self, id: SessionId, latency_ms: u32) {
        if let Some(mut entry) = self.by_session.get_mut(&id) {
            entry.measured_latency_ms = latency_ms;
        }
    }

    pub fn latency_ms(&self, id: SessionId) -> u32 {
        self.by_session
            .get(&id)
            .map(|e| e.measured_latency_ms)
            .unwrap_or(0)
    }

    /// Wakes the session's read loop so it can observe a state transition
    /// (idle timeout, forced logout) without waiting for the peer to send
    /// or close anything.
    pub fn notify_close(&self, id: SessionId) {
        if let Some(entry) = self.by_session.get(&id) {
            entry.close_signal.notify_one();
        }
    }

    /// Enqueues `frame` on one session's outbound queue, touching its
    /// activity clock the way a successful write does.
    pub fn send_frame(&self, id: SessionId, frame: Vec<u8>) -> Result<(), TransportError> {
        let mut entry = self
            .by_session
            .get_mut(&id)
            .ok_or(TransportError::SlowConsumer)?;
        entry.send_queue.try_send(frame)
    }

    /// Enqueues `frame` on every session for which `filter` returns true,
    /// skipping (not failing on) any session whose queue is already full —
    /// the way a world-tick broadcast tolerates one slow peer.
    pub fn broadcast(&self, frame: &[u8], filter: impl Fn(&Session) -> bool) {
        for entry in self.by_session.iter() {
            if filter(entry.value()) {
                let _ = entry.value().send_queue.try_send(frame.to_vec());
            }
        }
    }

    /// Drives the session state machine for one peer, returning an error
    /// if the requested transition is illegal from its current state.
    pub fn transition(&self, id: SessionId, next: SessionState) -> Result<(), TransportError> {
        let mut entry = self
            .by_session
            .get_mut(&id)
            .ok_or(TransportError::SlowConsumer)?;
        entry.transition(next)
    }

    /// Resets one session's idle-timeout clock, e.g. after any inbound frame.
    pub fn touch(&self, id: SessionId) {
        if let Some(mut entry) = self.by_session.get_mut(&id) {
            entry.touch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SendQueue;

    fn new_session() -> Session {
        let (queue, _rx) = SendQueue::new(8, 1024);
        Session::new(SessionId::new_v4(), queue)
    }

    #[test]
    fn lookups_stay_consistent_after_binding() {
        let registry = SessionRegistry::new();
        let session = new_session();
        let id = session.id;
        registry.insert(session);
        registry.bind_player(id, 42);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        registry.bind_udp(id, addr);

        assert_eq!(registry.get_by_player(42), Some(id));
        assert_eq!(registry.get_by_udp(addr), Some(id));
    }

    #[test]
    fn remove_clears_all_three_indexes() {
        let registry = SessionRegistry::new();
        let session = new_session();
        let id = session.id;
        registry.insert(session);
        registry.bind_player(id, 7);
        registry.remove(id);

        assert!(registry.get(id).is_none());
        assert_eq!(registry.get_by_player(7), None);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn send_frame_enqueues_on_the_right_session() {
        let registry = SessionRegistry::new();
        let session = new_session();
        let id = session.id;
        registry.insert(session);

        registry.send_frame(id, vec![1, 2, 3]).unwrap();
        assert!(registry.send_frame(SessionId::new_v4(), vec![1]).is_err());
    }

    #[test]
    fn broadcast_skips_sessions_failing_the_filter() {
        let registry = SessionRegistry::new();
        let a = new_session();
        let a_id = a.id;
        registry.insert(a);
        registry.bind_player(a_id, 1);
        let b = new_session();
        registry.insert(b);

        registry.broadcast(&[9], |s| s.player_id.is_some());
        assert!(registry.get(a_id).is_some());
    }

    #[test]
    fn transition_rejects_illegal_moves() {
        let registry = SessionRegistry::new();
        let session = new_session();
        let id = session.id;
        registry.insert(session);

        assert!(registry.transition(id, SessionState::Authenticated).is_err());
        assert!(registry.transition(id, SessionState::Handshake).is_ok());
    }

    #[test]
    fn token_and_latency_round_trip_through_the_registry() {
        let registry = SessionRegistry::new();
        let session = new_session();
        let id = session.id;
        registry.insert(session);

        assert_eq!(registry.take_token(id), None);
        registry.bind_token(id, "a-token".to_string());
        assert_eq!(registry.take_token(id), Some("a-token".to_string()));

        assert_eq!(registry.latency_ms(id), 0);
        registry.record_latency(id, 120);
        assert_eq!(registry.latency_ms(id), 120);
    }

    #[test]
    fn authenticated_session_ids_excludes_unauthenticated_peers() {
        let registry = SessionRegistry::new();
        let a = new_session();
        let a_id = a.id;
        registry.insert(a);
        registry.transition(a_id, SessionState::Handshake).unwrap();
        registry.transition(a_id, SessionState::Connected).unwrap();
        registry.transition(a_id, SessionState::Authenticated).unwrap();

        let b = new_session();
        registry.insert(b);

        assert_eq!(registry.authenticated_session_ids(), vec![a_id]);
    }

    #[test]
    fn notify_close_wakes_a_pending_wait_without_panicking_when_absent() {
        let registry = SessionRegistry::new();
        let session = new_session();
        let id = session.id;
        registry.insert(session);

        registry.notify_close(id);
        registry.notify_close(SessionId::new_v4());
    }
}
