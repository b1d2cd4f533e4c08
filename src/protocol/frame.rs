//! Frame struct plus the `frame`/`unframe` pair.
//!
//! A frame is a header followed by one serialized protocol message.
//! `unframe` is the non-streaming half of reassembly: it looks at the front
//! of a buffer and reports whether a complete frame is there.
//!
//! # Example
//!
//! ```
//! use apollo_client::protocol::{frame, unframe, Unframe};
//!
//! let bytes = frame(42, b"hello");
//! match unframe(&bytes) {
//!     Unframe::Complete { correlation_id, payload, consumed } => {
//!         assert_eq!(correlation_id, 42);
//!         assert_eq!(payload, b"hello");
//!         assert_eq!(consumed, bytes.len());
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete inbound protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the correlation id.
    #[inline]
    pub fn correlation_id(&self) -> u16 {
        self.header.correlation_id
    }
}

/// Outcome of looking for a frame at the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Unframe<'a> {
    /// A whole frame is available.
    Complete {
        /// Correlation id from the header.
        correlation_id: u16,
        /// Payload slice.
        payload: &'a [u8],
        /// Bytes taken by header and payload.
        consumed: usize,
    },
    /// Fewer than 6 bytes, or fewer than the declared length.
    Incomplete,
    /// Declared length implies a negative payload size.
    Malformed {
        /// The offending declared length.
        length: u32,
    },
}

/// Build a complete frame as a single byte vector.
pub fn frame(correlation_id: u16, payload: &[u8]) -> Vec<u8> {
    let header = Header::new(correlation_id, payload.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Look for one frame at the front of `buf`.
pub fn unframe(buf: &[u8]) -> Unframe<'_> {
    let Some(header) = Header::decode(buf) else {
        return Unframe::Incomplete;
    };

    let Some(payload_len) = header.payload_length() else {
        return Unframe::Malformed {
            length: header.length,
        };
    };

    let end = HEADER_SIZE + payload_len as usize;
    if buf.len() < end {
        return Unframe::Incomplete;
    }

    Unframe::Complete {
        correlation_id: header.correlation_id,
        payload: &buf[HEADER_SIZE..end],
        consumed: end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let bytes = frame(0x0102, b"abc");
        assert_eq!(bytes, vec![0, 0, 0, 5, 0x01, 0x02, b'a', b'b', b'c']);
    }

    #[test]
    fn test_unframe_roundtrip() {
        let bytes = frame(7, b"payload");
        assert_eq!(
            unframe(&bytes),
            Unframe::Complete {
                correlation_id: 7,
                payload: b"payload",
                consumed: HEADER_SIZE + 7,
            }
        );
    }

    #[test]
    fn test_unframe_empty_payload() {
        let bytes = frame(3, b"");
        assert_eq!(
            unframe(&bytes),
            Unframe::Complete {
                correlation_id: 3,
                payload: b"",
                consumed: HEADER_SIZE,
            }
        );
    }

    #[test]
    fn test_unframe_short_header_is_incomplete() {
        assert_eq!(unframe(&[0, 0, 0, 9, 0]), Unframe::Incomplete);
        assert_eq!(unframe(&[]), Unframe::Incomplete);
    }

    #[test]
    fn test_unframe_declared_length_exceeds_buffer() {
        let bytes = frame(1, b"0123456789");
        assert_eq!(unframe(&bytes[..bytes.len() - 1]), Unframe::Incomplete);
    }

    #[test]
    fn test_unframe_negative_payload_is_malformed() {
        assert_eq!(
            unframe(&[0, 0, 0, 1, 0, 0, 0xFF]),
            Unframe::Malformed { length: 1 }
        );
    }

    #[test]
    fn test_unframe_leaves_trailing_bytes() {
        let mut bytes = frame(1, b"one");
        bytes.extend_from_slice(&frame(2, b"two"));
        match unframe(&bytes) {
            Unframe::Complete { consumed, .. } => assert_eq!(consumed, HEADER_SIZE + 3),
            other => panic!("expected complete frame, got {:?}", other),
        }
    }
}
