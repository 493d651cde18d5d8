//! Module D: packet dispatcher.
//!
//! A static type-tag to handler table built once at startup, the same
//! shape as the teacher's `handle_packet` match on `PacketType` in
//! `server.rs`, generalized from a hand-written match arm per tag into a
//! registered handler map so modules (auth, world, lag comp) can each own
//! their slice of the dispatch table instead of one growing match.

use std::collections::HashMap;

use crate::codec::{Envelope, MessageType};
use crate::error::ServerError;
use crate::session::SessionId;

pub trait Handler: Send + Sync {
    fn handle(&self, session_id: SessionId, envelope: &Envelope) -> Result<(), ServerError>;
}

impl<F> Handler for F
where
    F: Fn(SessionId, &Envelope) -> Result<(), ServerError> + Send + Sync,
{
    fn handle(&self, session_id: SessionId, envelope: &Envelope) -> Result<(), ServerError> {
        self(session_id, envelope)
    }
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageType, Box<dyn Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, message_type: MessageType, handler: Box<dyn Handler>) {
        self.handlers.insert(message_type, handler);
    }

    pub fn dispatch(&self, session_id: SessionId, envelope: &Envelope) -> Result<(), ServerError> {
        match self.handlers.get(&envelope.message_type) {
            Some(handler) => handler.handle(session_id, envelope),
            None => {
                log::warn!("no handler registered for {:?}", envelope.message_type);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispatch_routes_to_registered_handler() {
        let mut dispatcher = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        dispatcher.register(
            MessageType::Heartbeat,
            Box::new(move |_id, _env| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let envelope = Envelope::new(MessageType::Heartbeat, Vec::new());
        dispatcher.dispatch(SessionId::new_v4(), &envelope).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_ignores_unregistered_type() {
        let dispatcher = Dispatcher::new();
        let envelope = Envelope::new(MessageType::Logout, Vec::new());
        assert!(dispatcher.dispatch(SessionId::new_v4(), &envelope).is_ok());
    }
}
