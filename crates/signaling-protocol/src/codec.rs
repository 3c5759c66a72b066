//! Codec for encoding and decoding signaling frames.

use crate::frame::Envelope;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame body exceeds [`Envelope::MAX_BODY_SIZE`]
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Body is not a valid envelope
    #[error("Invalid frame format: {0}")]
    InvalidFormat(String),

    /// Underlying stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode an envelope to a length-prefixed frame
///
/// # Errors
///
/// Returns an error if serialization fails or the body is too large
pub fn encode_envelope(envelope: &Envelope) -> Result<Bytes, CodecError> {
    let body =
        serde_json::to_vec(envelope).map_err(|e| CodecError::InvalidFormat(e.to_string()))?;

    if body.len() > Envelope::MAX_BODY_SIZE {
        return Err(CodecError::FrameTooLarge(body.len()));
    }

    let mut buf = BytesMut::with_capacity(Envelope::LENGTH_PREFIX_SIZE + body.len());

    // Body length (4 bytes); bounded by MAX_BODY_SIZE above
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u32(body.len() as u32);

    buf.extend_from_slice(&body);

    Ok(buf.freeze())
}

/// Decode one envelope from the front of `buf`
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete frame; the
/// buffer is left untouched in that case.
///
/// # Errors
///
/// Returns an error if the declared length exceeds the maximum or the body is
/// not a valid envelope
pub fn decode_envelope(buf: &mut BytesMut) -> Result<Option<Envelope>, CodecError> {
    let Some(prefix) = buf.get(..Envelope::LENGTH_PREFIX_SIZE) else {
        return Ok(None);
    };

    let mut length_bytes = [0u8; Envelope::LENGTH_PREFIX_SIZE];
    length_bytes.copy_from_slice(prefix);
    let body_len = u32::from_be_bytes(length_bytes) as usize;

    if body_len > Envelope::MAX_BODY_SIZE {
        return Err(CodecError::FrameTooLarge(body_len));
    }

    let frame_len = Envelope::LENGTH_PREFIX_SIZE + body_len;
    if buf.len() < frame_len {
        buf.reserve(frame_len - buf.len());
        return Ok(None);
    }

    buf.advance(Envelope::LENGTH_PREFIX_SIZE);
    let body = buf.split_to(body_len);

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| CodecError::InvalidFormat(e.to_string()))
}

/// `tokio_util` codec for framed signaling streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalingCodec;

impl Decoder for SignalingCodec {
    type Item = Envelope;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_envelope(src)
    }
}

impl Encoder<Envelope> for SignalingCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = encode_envelope(&item)?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::messages::{JoinRoomRequest, SignalingEvent, SignalingRequest};
    use common::types::MediaId;
    use futures::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn join_request() -> Envelope {
        Envelope::Request {
            id: 7,
            request: SignalingRequest::JoinRoom(JoinRoomRequest {
                display_name: "Alice".to_string(),
                room_id: "standup".to_string(),
            }),
        }
    }

    #[test]
    fn test_envelope_wire_shape() {
        let value = serde_json::to_value(join_request()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "request",
                "id": 7,
                "request": {
                    "topic": "joinRoom",
                    "payload": {"displayName": "Alice", "roomId": "standup"}
                }
            })
        );
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let frame = encode_envelope(&join_request()).unwrap();
        let split = frame.len() - 3;

        let mut buf = BytesMut::from(&frame[..split]);
        assert!(decode_envelope(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), split, "partial frame must not be consumed");

        buf.extend_from_slice(&frame[split..]);
        let decoded = decode_envelope(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, join_request());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_short_prefix() {
        let mut buf = BytesMut::from(&[0u8, 0][..]);
        assert!(decode_envelope(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut buf = BytesMut::new();
        buf.put_u32(u32::MAX);
        let result = decode_envelope(&mut buf);
        assert!(matches!(result, Err(CodecError::FrameTooLarge(_))));
    }

    #[test]
    fn test_decode_rejects_invalid_body() {
        let body = br#"{"type":"bogus"}"#;
        let mut buf = BytesMut::new();
        buf.put_u32(body.len() as u32);
        buf.extend_from_slice(body);

        let result = decode_envelope(&mut buf);
        assert!(matches!(result, Err(CodecError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn test_framed_stream_carries_back_to_back_frames() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FramedWrite::new(client, SignalingCodec);
        let mut reader = FramedRead::new(server, SignalingCodec);

        let event = Envelope::Event {
            event: SignalingEvent::ActiveSpeakerUpdate(vec![MediaId::new("a1")]),
        };

        let send = tokio::spawn(async move {
            writer.send(join_request()).await.unwrap();
            writer.send(event).await.unwrap();
        });

        let first = reader.next().await.unwrap().unwrap();
        assert_eq!(first.kind(), "request");

        let second = reader.next().await.unwrap().unwrap();
        assert!(matches!(
            second,
            Envelope::Event {
                event: SignalingEvent::ActiveSpeakerUpdate(ref ids)
            } if ids == &vec![MediaId::new("a1")]
        ));

        send.await.unwrap();
    }
}
