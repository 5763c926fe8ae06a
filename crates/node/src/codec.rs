//! Message encoding and decoding for network transport.
//!
//! # Wire format
//!
//! ```text
//! [length: u32 big-endian][payload: bincode-encoded Message]
//! ```
//!
//! The payload is always an envelope: a [`Message`] whose body is
//! [`Body::Network`] carrying the inner message, the sender's host (empty
//! for local sends) and the sender's listening port, with the system-id
//! and abstraction-id tags on the outer message. The receiver resolves
//! the sender to a process through the membership list by listening
//! port.

use bytes::{BufMut, BytesMut};
use paxon_core::{AbstractionId, Body, Message};
use paxon_types::{Port, SystemId};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upper bound on a frame payload. Consensus messages are tiny; anything
/// near this size is garbage.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(u32),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Wrap a message in the wire envelope.
pub fn wrap_envelope(
    message: Message,
    abstraction: Option<AbstractionId>,
    system_id: Option<SystemId>,
    sender_listening_port: Port,
) -> Message {
    Message {
        system_id,
        abstraction,
        body: Body::Network {
            message: Box::new(message),
            sender_host: String::new(),
            sender_listening_port,
        },
    }
}

/// Encode a message to a length-prefixed frame.
pub fn encode_frame(message: &Message) -> Result<BytesMut, CodecError> {
    let payload = bincode::serialize(message).map_err(|e| CodecError::Encode(e.to_string()))?;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(CodecError::FrameTooLarge(payload.len() as u32));
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Read one length-prefixed frame from a stream.
pub async fn read_frame<R: AsyncReadExt + Unpin>(stream: &mut R) -> Result<Message, CodecError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    bincode::deserialize(&payload).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Write one length-prefixed frame to a stream.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    stream: &mut W,
    message: &Message,
) -> Result<(), CodecError> {
    let frame = encode_frame(message)?;
    stream.write_all(&frame).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paxon_types::{ProcessId, Value};

    fn envelope() -> Message {
        wrap_envelope(
            Message::tagged(
                AbstractionId::Ec,
                Body::EcNewEpoch { timestamp: 6 },
            ),
            Some(AbstractionId::Beb),
            Some(SystemId::from("sys-1")),
            5011,
        )
    }

    #[tokio::test]
    async fn test_round_trip() {
        let message = envelope();
        let frame = encode_frame(&message).unwrap();
        assert_eq!(
            u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize,
            frame.len() - 4
        );

        let mut cursor = std::io::Cursor::new(frame.to_vec());
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn test_round_trip_nested_payload() {
        let inner = Message::tagged(
            AbstractionId::Ep,
            Body::PlDeliver {
                sender: ProcessId::new("127.0.0.1", 5012, 2),
                message: Box::new(Message::new(Body::EpWrite { value: Value::of(42) })),
            },
        );
        let message = wrap_envelope(inner, Some(AbstractionId::Ep), None, 5012);

        let mut buf = std::io::Cursor::new(Vec::new());
        write_frame(&mut buf, &message).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf.into_inner());
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let frame = encode_frame(&envelope()).unwrap();
        let mut cursor = std::io::Cursor::new(frame[..frame.len() - 2].to_vec());
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(CodecError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_is_rejected() {
        let mut frame = BytesMut::new();
        frame.put_u32(MAX_FRAME_LEN + 1);
        let mut cursor = std::io::Cursor::new(frame.to_vec());
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(CodecError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_payload_is_a_decode_error() {
        let mut frame = BytesMut::new();
        frame.put_u32(3);
        frame.extend_from_slice(&[0xff, 0xff, 0xff]);
        let mut cursor = std::io::Cursor::new(frame.to_vec());
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(CodecError::Decode(_))
        ));
    }
}
