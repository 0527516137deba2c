//! Tokio codec for framed protocol messages

use std::marker::PhantomData;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, MAX_PAYLOAD_SIZE};
use crate::message::MessageKind;

/// A message family that can travel in a frame
pub trait WireMessage: Serialize + DeserializeOwned + Sized {
    /// Kind byte written into the frame header
    fn kind(&self) -> u8;

    /// Whether a known kind belongs to this family
    fn accepts(kind: MessageKind) -> bool;

    /// Value to produce for a kind byte this build does not know
    ///
    /// Families without a fallback fail the decode instead.
    fn unknown(_kind: u8) -> Option<Self> {
        None
    }
}

/// Codec for encoding `Out` frames and decoding `In` frames
///
/// A client stream uses `FrameCodec<ClientMessage, ServerMessage>`; the
/// relay side of the same connection uses the mirrored type.
pub struct FrameCodec<Out, In> {
    /// Header read while its payload is still arriving
    pending_header: Option<FrameHeader>,
    _marker: PhantomData<fn(Out) -> In>,
}

impl<Out, In> FrameCodec<Out, In> {
    pub fn new() -> Self {
        Self {
            pending_header: None,
            _marker: PhantomData,
        }
    }
}

impl<Out, In> Default for FrameCodec<Out, In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out, In> std::fmt::Debug for FrameCodec<Out, In> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("pending_header", &self.pending_header)
            .finish()
    }
}

fn check_len(len: usize) -> Result<usize, ProtocolError> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(len)
}

impl<Out, In: WireMessage> Decoder for FrameCodec<Out, In> {
    type Item = In;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = self
            .pending_header
            .take()
            .or_else(|| FrameHeader::decode(src))
        else {
            return Ok(None);
        };

        let len = check_len(header.payload_length as usize)?;
        if src.len() < len {
            src.reserve(len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }
        let payload = src.split_to(len);

        match MessageKind::from_u8(header.kind) {
            Some(kind) if In::accepts(kind) => Ok(Some(bincode::deserialize(&payload)?)),
            Some(_) => Err(ProtocolError::UnexpectedMessageType(header.kind)),
            None => {
                // payload is already consumed; the next frame stays aligned
                tracing::debug!(kind = header.kind, len, "Skipping unknown frame");
                In::unknown(header.kind)
                    .map(Some)
                    .ok_or(ProtocolError::UnknownMessageType(header.kind))
            }
        }
    }
}

impl<Out: WireMessage, In> Encoder<Out> for FrameCodec<Out, In> {
    type Error = ProtocolError;

    fn encode(&mut self, message: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(&message)?;
        let len = check_len(payload.len())?;

        FrameHeader::new(message.kind(), len as u32).encode(dst);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_SIZE;
    use crate::message::{
        ClientMessage, ClientPayload, ServerMessage, ServerPayload, TerminalSize,
    };
    use crate::session::SessionId;
    use bytes::{BufMut, Bytes};

    type ClientSide = FrameCodec<ClientMessage, ServerMessage>;
    type RelaySide = FrameCodec<ServerMessage, ClientMessage>;

    #[test]
    fn test_codec_client_to_relay() {
        let mut client = ClientSide::new();
        let mut relay = RelaySide::new();

        let message = ClientMessage::new(
            SessionId::new("s1"),
            "s1-1".to_string(),
            ClientPayload::Resize(TerminalSize::new(100, 30)),
        );

        let mut buf = BytesMut::new();
        client.encode(message.clone(), &mut buf).unwrap();

        let decoded = relay.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, message);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_output_message() {
        let mut client = ClientSide::new();
        let mut relay = RelaySide::new();

        let message = ServerMessage::new(
            SessionId::new("s1"),
            ServerPayload::Output {
                data: Bytes::from("Hello, world!"),
                sequence: 7,
            },
        );

        let mut buf = BytesMut::new();
        relay.encode(message, &mut buf).unwrap();

        let decoded = client.decode(&mut buf).unwrap().unwrap();
        if let ServerPayload::Output { data, sequence } = decoded.payload {
            assert_eq!(data.as_ref(), b"Hello, world!");
            assert_eq!(sequence, 7);
        } else {
            panic!("Expected Output message");
        }
    }

    #[test]
    fn test_codec_partial_read() {
        let mut client = ClientSide::new();
        let mut relay = RelaySide::new();

        let message = ServerMessage::new(SessionId::new("s1"), ServerPayload::Ping);

        let mut full_buf = BytesMut::new();
        relay.encode(message, &mut full_buf).unwrap();

        // Split the buffer to simulate partial read
        let mut partial = full_buf.split_to(HEADER_SIZE - 1);

        // Should return None (need more data)
        assert!(client.decode(&mut partial).unwrap().is_none());

        // Add the rest
        partial.extend_from_slice(&full_buf);

        let decoded = client.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.payload, ServerPayload::Ping);
    }

    #[test]
    fn test_unknown_kind_is_skipped() {
        let mut client = ClientSide::new();
        let mut relay = RelaySide::new();

        // A frame from a newer relay, followed by a normal one
        let mut buf = BytesMut::new();
        FrameHeader::new(0x7E, 3).encode(&mut buf);
        buf.put_slice(&[1, 2, 3]);
        relay
            .encode(
                ServerMessage::new(SessionId::new("s1"), ServerPayload::SessionStarted),
                &mut buf,
            )
            .unwrap();

        let first = client.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.payload, ServerPayload::Unknown { kind: 0x7E });

        let second = client.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.payload, ServerPayload::SessionStarted);
    }

    #[test]
    fn test_unknown_kind_without_fallback_fails() {
        let mut relay = RelaySide::new();

        let mut buf = BytesMut::new();
        FrameHeader::new(0x7E, 0).encode(&mut buf);

        assert!(matches!(
            relay.decode(&mut buf),
            Err(ProtocolError::UnknownMessageType(0x7E))
        ));
    }

    #[test]
    fn test_wrong_family_rejected() {
        let mut client = ClientSide::new();

        // A client message arriving on the client's inbound side
        let mut buf = BytesMut::new();
        let mut mirrored = FrameCodec::<ClientMessage, ClientMessage>::new();
        mirrored
            .encode(
                ClientMessage::new(SessionId::new("s1"), "s1-1".into(), ClientPayload::Heartbeat),
                &mut buf,
            )
            .unwrap();

        assert!(matches!(
            client.decode(&mut buf),
            Err(ProtocolError::UnexpectedMessageType(_))
        ));
    }
}
