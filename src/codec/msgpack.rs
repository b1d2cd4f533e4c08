//! MsgPack codec using `rmp-serde`.
//!
//! **Always `to_vec_named`, never `to_vec`.** The message schema is
//! field-name based: `to_vec` writes structs as positional arrays, which
//! the server cannot map back onto message fields. `to_vec_named` writes
//! them as maps keyed by field name.
//!
//! # Example
//!
//! ```
//! use apollo_client::codec::MsgPackCodec;
//! use apollo_client::pdu::Field;
//!
//! let field = Field::string("name", "Erdem Aksu");
//! let encoded = MsgPackCodec::encode(&field).unwrap();
//! let decoded: Field = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, field);
//! ```

use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes, structs as maps.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        // to_vec_named, NOT to_vec
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApolloError;
    use crate::pdu::{Field, TableRef};

    #[test]
    fn test_structs_are_maps() {
        let encoded = MsgPackCodec::encode(&TableRef::new("t")).unwrap();
        // fixmap(1) "tableName" fixstr(1) "t"
        assert_eq!(encoded[0], 0x81, "Expected fixmap, got {:02X}", encoded[0]);
        assert_eq!(encoded[1], 0xA9);
        assert_eq!(&encoded[2..11], b"tableName");
        assert_eq!(&encoded[11..], &[0xA1, b't']);
    }

    #[test]
    fn test_field_is_name_and_tagged_value() {
        let encoded = MsgPackCodec::encode(&Field::int("n", 1)).unwrap();
        assert_eq!(
            encoded,
            vec![
                0x82, 0xA4, b'n', b'a', b'm', b'e', 0xA1, b'n', // name: "n"
                0xA5, b'v', b'a', b'l', b'u', b'e', // value:
                0x81, 0xA3, b'i', b'n', b't', 0x01, // {int: 1}
            ]
        );
    }

    #[test]
    fn test_binary_uses_bin_format() {
        let encoded = MsgPackCodec::encode(&Field::binary("b", vec![1u8, 2, 3])).unwrap();
        let tail = &encoded[encoded.len() - 5..];
        assert_eq!(tail, &[0xC4, 0x03, 1, 2, 3]);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Field> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(matches!(result, Err(ApolloError::Decode(_))));
    }

    #[test]
    fn test_decode_error_on_empty_input() {
        let result: Result<TableRef> = MsgPackCodec::decode(&[]);
        assert!(result.is_err());
    }
}
