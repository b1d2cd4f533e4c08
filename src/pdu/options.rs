//! Enumerated option tables used by table creation, indexing and updates.
//!
//! Discriminants are the numeric values the server expects on the wire.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Storage engine backing a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TableType {
    /// RocksDB engine.
    Rocksdb = 6,
}

/// Unicode normalization applied before tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CharFilter {
    Nfc = 0,
    Nfd = 1,
    Nfkc = 2,
    Nfkd = 3,
}

/// Key ordering of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Comparator {
    Descending = 0,
    Ascending = 1,
}

/// Shape of the values stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DataModel {
    Kv = 0,
    Array = 1,
    Map = 2,
}

/// Shard placement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum HashingMethod {
    VirtualNodes = 0,
    Consistent = 1,
    Uniform = 2,
    Rendezvous = 3,
}

/// Ordering of index-read postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SortBy {
    #[default]
    Relevance = 0,
    Timestamp = 1,
}

/// Resolution of time series timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TimeUnit {
    Second = 0,
    Millisecond = 1,
    Microsecond = 2,
    Nanosecond = 3,
}

/// Tokenizer used by a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Tokenizer {
    #[default]
    UnicodeWordBoundaries = 0,
}

/// Statistics kept per indexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TokenStats {
    #[default]
    NoStats = 0,
    Unique = 1,
    Frequency = 2,
    Position = 3,
}

/// Case transform applied to tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TokenTransform {
    Lowercase = 0,
    Uppercase = 1,
    Casefold = 2,
}

/// Update instruction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Instruction {
    Increment = 0,
    Overwrite = 7,
}

/// One table creation option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableOption {
    /// Storage engine.
    Type(TableType),
    /// Value layout.
    DataModel(DataModel),
    /// Key ordering.
    Comparator(Comparator),
    /// Shard placement strategy.
    HashingMethod(HashingMethod),
    /// Number of shards.
    NumOfShards(u32),
    /// Time series table with the given timestamp resolution.
    TimeSeries(TimeUnit),
}

impl TableOption {
    /// Options used when a caller passes none: a RocksDB table.
    pub fn defaults() -> Vec<TableOption> {
        vec![TableOption::Type(TableType::Rocksdb)]
    }
}

/// Token filter stage of an index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenFilter {
    /// Case transform, if any.
    #[serde(default)]
    pub transform: Option<TokenTransform>,
    /// Tokens always added.
    #[serde(default)]
    pub add: Vec<String>,
    /// Tokens always removed (stop words).
    #[serde(default)]
    pub delete: Vec<String>,
    /// Statistics to keep.
    #[serde(default)]
    pub stats: TokenStats,
}

/// Secondary index configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    /// Normalization before tokenizing.
    #[serde(default)]
    pub char_filter: Option<CharFilter>,
    /// Tokenizer.
    #[serde(default)]
    pub tokenizer: Tokenizer,
    /// Token filter.
    #[serde(default)]
    pub token_filter: Option<TokenFilter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;

    #[test]
    fn test_enums_encode_as_wire_numbers() {
        assert_eq!(MsgPackCodec::encode(&TableType::Rocksdb).unwrap(), vec![6]);
        assert_eq!(MsgPackCodec::encode(&Instruction::Overwrite).unwrap(), vec![7]);
        assert_eq!(MsgPackCodec::encode(&Comparator::Ascending).unwrap(), vec![1]);
    }

    #[test]
    fn test_unknown_discriminant_rejected() {
        let encoded = MsgPackCodec::encode(&5u8).unwrap();
        let decoded: crate::error::Result<Instruction> = MsgPackCodec::decode(&encoded);
        assert!(decoded.is_err());
    }

    #[test]
    fn test_default_table_options() {
        assert_eq!(
            TableOption::defaults(),
            vec![TableOption::Type(TableType::Rocksdb)]
        );
    }
}
