//! Big-endian unsigned encoding for numeric fields carried as raw bytes.
//!
//! Update thresholds, update set-values and index-read timestamp bounds are
//! all sent as big-endian byte strings of minimal width (no leading zero
//! bytes). A value that is zero, negative, or not an integer encodes to an
//! empty buffer, which the server reads as "unset". Every such field goes
//! through [`encode_unsigned`] (or [`encode_number`] for dynamic input) so
//! the encoding stays identical across operations.

/// Encode a host integer. Non-positive values yield an empty buffer.
///
/// ```
/// use apollo_client::pdu::encode_unsigned;
///
/// assert_eq!(encode_unsigned(0), Vec::<u8>::new());
/// assert_eq!(encode_unsigned(-4), Vec::<u8>::new());
/// assert_eq!(encode_unsigned(255), vec![0xFF]);
/// assert_eq!(encode_unsigned(256), vec![0x01, 0x00]);
/// ```
pub fn encode_unsigned(value: i64) -> Vec<u8> {
    if value <= 0 {
        return Vec::new();
    }
    minimal_be(value as u64)
}

/// Encode a dynamically typed number.
///
/// Non-finite, non-integral, non-positive, or out-of-range values yield an
/// empty buffer rather than an error.
pub fn encode_number(value: f64) -> Vec<u8> {
    if !value.is_finite() || value.fract() != 0.0 || value <= 0.0 {
        return Vec::new();
    }
    // 2^64 is the first integer that does not fit
    if value >= 18_446_744_073_709_551_616.0 {
        return Vec::new();
    }
    minimal_be(value as u64)
}

/// Decode a big-endian unsigned value of up to 8 bytes.
///
/// An empty buffer decodes to 0. Returns `None` for wider inputs.
pub fn decode_unsigned(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn minimal_be(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8) as usize;
    bytes[skip..].to_vec()
}
