//! Module A: packet codec.
//!
//! Wire format is a 4-byte big-endian length prefix followed by an
//! `rkyv`-archived envelope, the same shape as the teacher's
//! `net::protocol::Packet::serialize`/`deserialize` but framed for a
//! stream transport (TLS-over-TCP) rather than datagrams.

pub mod message;

pub use message::{
    ChatMessageMsg, EntityRemoveMsg, EntitySpawnMsg, HeartbeatRequest, HeartbeatResponse, HitClaim,
    HitResult, InputCommand, InputFlags, LoginRequest, LoginResponse, MapChangeMsg,
    MapTransitionBeginMsg, MapTransitionCompleteMsg, MessageType, QuantizedEntityState,
    RouteRequestMsg, RouteResponseMsg, WorldSnapshotMsg,
};

use crate::error::FramingError;

pub const MAX_FRAME_BYTES: usize = 1024 * 1024;
const LENGTH_PREFIX_BYTES: usize = 4;

/// An envelope pairs a message-type tag with its encoded payload so the
/// dispatcher can route on the tag without decoding the payload first.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    /// Encodes `[len: u32 BE][tag: u16 BE][payload]`. `len` covers the tag
    /// and payload, not itself, matching the teacher's header-then-body split.
    pub fn encode(&self) -> Result<Vec<u8>, FramingError> {
        let body_len = 2 + self.payload.len();
        if body_len > MAX_FRAME_BYTES {
            return Err(FramingError::OversizeFrame(body_len));
        }
        let mut buf = Vec::with_capacity(LENGTH_PREFIX_BYTES + body_len);
        buf.extend_from_slice(&(body_len as u32).to_be_bytes());
        buf.extend_from_slice(&(self.message_type as u16).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, FramingError> {
        if frame.len() < 2 {
            return Err(FramingError::MalformedFrame);
        }
        let tag = u16::from_be_bytes([frame[0], frame[1]]);
        let message_type = MessageType::from_tag(tag).ok_or(FramingError::UnknownType(tag))?;
        Ok(Self {
            message_type,
            payload: frame[2..].to_vec(),
        })
    }
}

/// Reads the 4-byte length prefix, returning the body length if a complete
/// frame is already buffered, or `None` if more bytes are needed.
pub fn try_read_frame_len(buf: &[u8]) -> Result<Option<usize>, FramingError> {
    if buf.len() < LENGTH_PREFIX_BYTES {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(FramingError::OversizeFrame(len));
    }
    if buf.len() < LENGTH_PREFIX_BYTES + len {
        return Ok(None);
    }
    Ok(Some(len))
}

pub fn encode_payload<T>(value: &T) -> Vec<u8>
where
    T: for<'a> rkyv::Serialize<
        rkyv::api::high::HighSerializer<
            rkyv::util::AlignedVec,
            rkyv::ser::allocator::ArenaHandle<'a>,
            rkyv::rancor::Error,
        >,
    >,
{
    rkyv::to_bytes::<rkyv::rancor::Error>(value)
        .expect("message serialization is infallible for owned values")
        .into_vec()
}

pub fn decode_payload<T>(bytes: &[u8]) -> Result<T, FramingError>
where
    T: rkyv::Archive,
    T::Archived: rkyv::Deserialize<T, rkyv::api::high::HighDeserializer<rkyv::rancor::Error>>
        + for<'a> rkyv::bytecheck::CheckBytes<
            rkyv::api::high::HighValidator<'a, rkyv::rancor::Error>,
        >,
{
    rkyv::from_bytes::<T, rkyv::rancor::Error>(bytes).map_err(|_| FramingError::MalformedFrame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrips_through_encode_decode() {
        let payload = encode_payload(&LoginRequest {
            protocol_version: 3,
            account: b"player1".to_vec(),
            credential: b"hunter2".to_vec(),
        });
        let envelope = Envelope::new(MessageType::LoginRequest, payload);
        let frame = envelope.encode().unwrap();

        let body_len = try_read_frame_len(&frame).unwrap().unwrap();
        assert_eq!(body_len + LENGTH_PREFIX_BYTES, frame.len());

        let decoded = Envelope::decode(&frame[LENGTH_PREFIX_BYTES..]).unwrap();
        assert_eq!(decoded.message_type, MessageType::LoginRequest);
        let req: LoginRequest = decode_payload(&decoded.payload).unwrap();
        assert_eq!(req.protocol_version, 3);
        assert_eq!(req.credential, b"hunter2");
    }

    #[test]
    fn rejects_oversize_frame() {
        let payload = vec![0u8; MAX_FRAME_BYTES + 1];
        let envelope = Envelope::new(MessageType::Heartbeat, payload);
        assert!(matches!(
            envelope.encode(),
            Err(FramingError::OversizeFrame(_))
        ));
    }

    #[test]
    fn rejects_unknown_message_type() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&999u16.to_be_bytes());
        assert!(matches!(
            Envelope::decode(&frame),
            Err(FramingError::UnknownType(999))
        ));
    }

    #[test]
    fn try_read_frame_len_waits_for_full_buffer() {
        let payload = encode_payload(&LoginRequest {
            protocol_version: 1,
            account: b"a".to_vec(),
            credential: b"b".to_vec(),
        });
        let frame = Envelope::new(MessageType::LoginRequest, payload).encode().unwrap();
        assert_eq!(try_read_frame_len(&frame[..2]).unwrap(), None);
        assert!(try_read_frame_len(&frame).unwrap().is_some());
    }
}
