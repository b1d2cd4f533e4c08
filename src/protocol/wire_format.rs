//! Wire format encoding and decoding.
//!
//! Implements the 6-byte frame header:
//! ```text
//! ┌──────────────┬────────────────┐
//! │ Length       │ Correlation ID │
//! │ 4 bytes      │ 2 bytes        │
//! │ uint32 BE    │ uint16 BE      │
//! └──────────────┴────────────────┘
//! ```
//!
//! `Length` counts the correlation id plus the payload, so it is always
//! `payload_len + 2`. All multi-byte integers are Big Endian.

/// Header size in bytes (fixed, exactly 6).
pub const HEADER_SIZE: usize = 6;

/// Bytes of the header covered by the length field.
pub const CORRELATION_ID_SIZE: u32 = 2;

/// Default maximum payload size (16 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Declared length: payload length + 2.
    pub length: u32,
    /// Correlation identifier matching a response to its request.
    pub correlation_id: u16,
}

impl Header {
    /// Create a header for a payload of `payload_len` bytes.
    pub fn new(correlation_id: u16, payload_len: u32) -> Self {
        Self {
            length: payload_len.saturating_add(CORRELATION_ID_SIZE),
            correlation_id,
        }
    }

    /// Payload length implied by the declared length.
    ///
    /// Returns `None` when the declared length is smaller than the
    /// correlation id field, i.e. the implied payload size is negative.
    #[inline]
    pub fn payload_length(&self) -> Option<u32> {
        self.length.checked_sub(CORRELATION_ID_SIZE)
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use apollo_client::protocol::Header;
    ///
    /// let header = Header::new(42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [0, 0, 0, 102, 0, 42]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.correlation_id.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            correlation_id: u16::from_be_bytes([buf[4], buf[5]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(0xBEEF, 1234);
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(decoded.payload_length(), Some(1234));
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header {
            length: 0x0102_0304,
            correlation_id: 0x0506,
        };
        assert_eq!(header.encode(), [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_length_counts_correlation_id() {
        let header = Header::new(1, 0);
        assert_eq!(header.length, 2);
        assert_eq!(header.payload_length(), Some(0));
    }

    #[test]
    fn test_negative_implied_payload() {
        let header = Header::decode(&[0, 0, 0, 1, 0, 9]).unwrap();
        assert_eq!(header.payload_length(), None);
    }

    #[test]
    fn test_decode_short_buffer() {
        assert!(Header::decode(&[0, 0, 0, 2, 0]).is_none());
    }
}
