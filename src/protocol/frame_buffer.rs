//! Streaming frame reassembly.
//!
//! Socket reads split and merge frames arbitrarily. [`FrameBuffer`] keeps
//! the unconsumed tail in a `BytesMut` and repeatedly applies
//! [`unframe`](super::unframe) to the front of it, so one read can yield
//! zero, one or many frames.
//!
//! A header that declares an impossible length (negative implied payload,
//! or more than the configured maximum) cannot be resynchronised from: the
//! bytes buffered so far are discarded and parsing restarts with the next
//! read. The caller only sees fewer frames; the drop is logged and counted
//! in [`FrameBuffer::dropped`].
//!
//! # Example
//!
//! ```
//! use apollo_client::protocol::{frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = frame(9, b"response");
//!
//! assert!(buffer.push(&bytes[..4]).is_empty());
//! let frames = buffer.push(&bytes[4..]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].correlation_id(), 9);
//! ```

use bytes::BytesMut;
use tracing::warn;

use super::frame::{unframe, Frame, Unframe};
use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};

/// Initial capacity of the reassembly buffer.
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Accumulates inbound bytes and cuts them into frames.
pub struct FrameBuffer {
    pending: BytesMut,
    max_payload_size: u32,
    dropped: u64,
}

impl FrameBuffer {
    /// Buffer accepting payloads up to [`DEFAULT_MAX_PAYLOAD_SIZE`].
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            pending: BytesMut::with_capacity(INITIAL_CAPACITY),
            max_payload_size,
            dropped: 0,
        }
    }

    /// Append one read and return every frame it completes, in order.
    ///
    /// Never fails. An incomplete tail is kept for the next call.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if let Some(declared) = Header::decode(&self.pending).and_then(|h| h.payload_length()) {
            if declared > self.max_payload_size {
                warn!(
                    buffered = self.pending.len(),
                    declared,
                    max = self.max_payload_size,
                    "Discarding buffered bytes: frame exceeds maximum payload size"
                );
                self.discard();
                return None;
            }
        }

        let (correlation_id, consumed) = match unframe(&self.pending) {
            Unframe::Complete {
                correlation_id,
                consumed,
                ..
            } => (correlation_id, consumed),
            Unframe::Incomplete => return None,
            Unframe::Malformed { length } => {
                warn!(
                    buffered = self.pending.len(),
                    length, "Discarding buffered bytes: invalid declared length"
                );
                self.discard();
                return None;
            }
        };

        let mut bytes = self.pending.split_to(consumed);
        let payload = bytes.split_off(HEADER_SIZE).freeze();
        let header = Header::new(correlation_id, payload.len() as u32);
        Some(Frame::new(header, payload))
    }

    fn discard(&mut self) {
        self.pending.clear();
        self.dropped += 1;
    }

    /// Bytes waiting for the rest of their frame.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of times buffered bytes were discarded.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame;

    #[test]
    fn test_one_read_one_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&frame(42, b"hello"));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].correlation_id(), 42);
        assert_eq!(frames[0].payload(), b"hello");
        assert_eq!(frames[0].header.length, 7);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_one_read_many_frames() {
        let mut bytes = Vec::new();
        for cid in 0..5u16 {
            bytes.extend(frame(cid, format!("payload-{}", cid).as_bytes()));
        }

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes);
        let ids: Vec<u16> = frames.iter().map(|f| f.correlation_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(frames[3].payload(), b"payload-3");
    }

    #[test]
    fn test_header_split_across_reads() {
        let bytes = frame(1, b"abc");
        let mut buffer = FrameBuffer::new();

        assert!(buffer.push(&bytes[..3]).is_empty());
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.push(&bytes[3..]).len(), 1);
    }

    #[test]
    fn test_payload_split_across_reads() {
        let payload = vec![7u8; 1000];
        let bytes = frame(2, &payload);
        let mut buffer = FrameBuffer::new();

        assert!(buffer.push(&bytes[..HEADER_SIZE + 10]).is_empty());
        assert!(buffer.push(&bytes[HEADER_SIZE + 10..500]).is_empty());
        let frames = buffer.push(&bytes[500..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &payload[..]);
    }

    #[test]
    fn test_complete_frame_then_partial() {
        let first = frame(1, b"one");
        let second = frame(2, b"two");
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second[..5]);

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.len(), 5);

        let frames = buffer.push(&second[5..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].correlation_id(), 2);
    }

    #[test]
    fn test_every_split_point() {
        let bytes = frame(300, b"split me anywhere");
        for cut in 0..=bytes.len() {
            let mut buffer = FrameBuffer::new();
            let mut frames = buffer.push(&bytes[..cut]);
            frames.extend(buffer.push(&bytes[cut..]));
            assert_eq!(frames.len(), 1, "cut at {}", cut);
            assert_eq!(frames[0].payload(), b"split me anywhere");
        }
    }

    #[test]
    fn test_empty_payload() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&frame(5, b""));
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload().is_empty());
    }

    #[test]
    fn test_oversized_frame_discarded() {
        let mut buffer = FrameBuffer::with_max_payload(8);
        let frames = buffer.push(&frame(1, &[0u8; 9]));

        assert!(frames.is_empty());
        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped(), 1);
    }

    #[test]
    fn test_negative_length_discarded_then_recovers() {
        let mut buffer = FrameBuffer::new();
        // length 0 and 1 both imply a negative payload
        assert!(buffer.push(&[0, 0, 0, 0, 0, 9, 1, 2]).is_empty());
        assert!(buffer.push(&[0, 0, 0, 1, 0, 9]).is_empty());
        assert_eq!(buffer.dropped(), 2);
        assert!(buffer.is_empty());

        let frames = buffer.push(&frame(9, b"fine"));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"fine");
    }

    #[test]
    fn test_declared_length_beyond_available_bytes() {
        let mut buffer = FrameBuffer::new();
        // declares 100 payload bytes, carries 3
        let frames = buffer.push(&[0, 0, 0, 102, 0, 1, b'a', b'b', b'c']);
        assert!(frames.is_empty());
        assert_eq!(buffer.dropped(), 0);
        assert_eq!(buffer.len(), 9);
    }
}
