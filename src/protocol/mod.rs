//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary framing layer:
//! - 6-byte header encoding/decoding (`[u32 BE length][u16 BE correlation id]`)
//! - `frame`/`unframe` for single frames
//! - Frame buffer for accumulating partial reads

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{frame, unframe, Frame, Unframe};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{Header, CORRELATION_ID_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
