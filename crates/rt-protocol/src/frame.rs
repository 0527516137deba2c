//! Wire header shared by every relay frame
//!
//! ```text
//! +------+-----------------------+----------------+
//! | kind | payload length (u24)  | payload ...    |
//! | 1 B  | 3 B, big-endian       | length bytes   |
//! +------+-----------------------+----------------+
//! ```
//!
//! Session ids travel inside the payload, so streams and unary calls use
//! the same header.

use bytes::{Buf, BufMut, BytesMut};

/// Bytes occupied by [`FrameHeader`] on the wire
pub const HEADER_SIZE: usize = 4;

/// Largest payload the 24-bit length field can describe
pub const MAX_PAYLOAD_SIZE: usize = (1 << 24) - 1;

const LENGTH_BYTES: usize = HEADER_SIZE - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message kind byte, left uninterpreted here so unknown kinds can be
    /// skipped by the codec
    pub kind: u8,
    pub payload_length: u32,
}

impl FrameHeader {
    pub fn new(kind: u8, payload_length: u32) -> Self {
        Self {
            kind,
            payload_length,
        }
    }

    /// Append the header to `dst`
    ///
    /// Callers check `payload_length` against [`MAX_PAYLOAD_SIZE`] first;
    /// higher bits are dropped.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.kind);
        dst.put_uint(u64::from(self.payload_length) & MAX_PAYLOAD_SIZE as u64, LENGTH_BYTES);
    }

    /// Consume a header from the front of `src`, or leave it untouched
    /// when fewer than [`HEADER_SIZE`] bytes are buffered
    pub fn decode(src: &mut BytesMut) -> Option<Self> {
        if src.remaining() < HEADER_SIZE {
            return None;
        }
        let kind = src.get_u8();
        let payload_length = src.get_uint(LENGTH_BYTES) as u32;
        Some(Self::new(kind, payload_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    #[test]
    fn test_header_layout() {
        let mut buf = BytesMut::new();
        FrameHeader::new(MessageKind::Output.as_u8(), 0x01_02_03).encode(&mut buf);

        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[1..], &[0x01, 0x02, 0x03]);

        let decoded = FrameHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded.kind, MessageKind::Output.as_u8());
        assert_eq!(decoded.payload_length, 0x01_02_03);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_largest_length_survives() {
        let mut buf = BytesMut::new();
        FrameHeader::new(MessageKind::Input.as_u8(), MAX_PAYLOAD_SIZE as u32).encode(&mut buf);

        let decoded = FrameHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded.payload_length as usize, MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_short_buffer_is_left_alone() {
        let mut buf = BytesMut::from(&[7u8, 0, 0][..]);
        assert!(FrameHeader::decode(&mut buf).is_none());
        assert_eq!(&buf[..], &[7, 0, 0]);
    }
}
