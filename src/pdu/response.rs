//! Server replies and their normalization into caller-facing shapes.
//!
//! A [`Response`] is either one of the success payloads or an error payload
//! with an [`ErrorKind`] and message. The `into_*` methods turn a success
//! payload into the shape an operation documents and turn every other
//! variant into an error, so callers never see an error disguised as data.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::field::Field;
use super::uint::decode_unsigned;
use crate::error::{ApolloError, Result};

/// Category of a server-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TableNotFound,
    TableExists,
    TableNotOpen,
    KeyNotFound,
    IndexNotFound,
    IndexExists,
    InvalidArgument,
    IteratorExhausted,
    NotAuthorized,
    Internal,
    /// A kind this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TableNotFound => "table_not_found",
            ErrorKind::TableExists => "table_exists",
            ErrorKind::TableNotOpen => "table_not_open",
            ErrorKind::KeyNotFound => "key_not_found",
            ErrorKind::IndexNotFound => "index_not_found",
            ErrorKind::IndexExists => "index_exists",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::IteratorExhausted => "iterator_exhausted",
            ErrorKind::NotAuthorized => "not_authorized",
            ErrorKind::Internal => "internal",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque server-side cursor handle.
///
/// Only meaningful on the connection that produced it, and only while the
/// owning table stays open.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IteratorToken(#[serde(with = "serde_bytes")] Vec<u8>);

impl IteratorToken {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for IteratorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IteratorToken({} bytes)", self.0.len())
    }
}

/// A key with its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<Field>,
    pub columns: Vec<Field>,
}

/// A record plus the cursor positioned on it.
#[derive(Debug, Clone, PartialEq)]
pub struct IteratorRecord {
    pub key: Vec<Field>,
    pub columns: Vec<Field>,
    /// Pass to `next`/`prev` to move the cursor.
    pub it: IteratorToken,
}

/// Posting as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePosting {
    pub key: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Big-endian unsigned timestamp.
    #[serde(with = "serde_bytes", default)]
    pub timestamp: Vec<u8>,
}

/// An index search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub key: Vec<Field>,
    pub frequency: Option<u32>,
    pub position: Option<u32>,
    pub timestamp: u64,
}

impl TryFrom<WirePosting> for Posting {
    type Error = ApolloError;

    fn try_from(wire: WirePosting) -> Result<Self> {
        let timestamp = decode_unsigned(&wire.timestamp).ok_or_else(|| {
            ApolloError::InvalidValue(format!(
                "posting timestamp is {} bytes wide",
                wire.timestamp.len()
            ))
        })?;
        Ok(Posting {
            key: wire.key,
            frequency: wire.frequency,
            position: wire.position,
            timestamp,
        })
    }
}

/// Server reply payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Response {
    /// Bare success.
    Ok {},
    Columns {
        columns: Vec<Field>,
    },
    KeyColumns {
        key: Vec<Field>,
        columns: Vec<Field>,
    },
    KeyColumnsIterator {
        key: Vec<Field>,
        columns: Vec<Field>,
        it: IteratorToken,
    },
    KeyColumnsList {
        list: Vec<Record>,
    },
    Postings {
        postings: Vec<WirePosting>,
    },
    TableNames {
        names: Vec<String>,
    },
    Error {
        kind: ErrorKind,
        #[serde(default)]
        message: String,
    },
}

impl Response {
    /// Variant tag, for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Response::Ok {} => "ok",
            Response::Columns { .. } => "columns",
            Response::KeyColumns { .. } => "keyColumns",
            Response::KeyColumnsIterator { .. } => "keyColumnsIterator",
            Response::KeyColumnsList { .. } => "keyColumnsList",
            Response::Postings { .. } => "postings",
            Response::TableNames { .. } => "tableNames",
            Response::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    /// Turn an error payload into [`ApolloError::Server`]; pass success through.
    pub fn into_result(self) -> Result<Response> {
        match self {
            Response::Error { kind, message } => Err(ApolloError::Server { kind, message }),
            other => Ok(other),
        }
    }

    fn unexpected<T>(self, expected: &'static str) -> Result<T> {
        match self {
            Response::Error { kind, message } => Err(ApolloError::Server { kind, message }),
            other => Err(ApolloError::UnexpectedResponse {
                expected,
                actual: other.variant_name(),
            }),
        }
    }

    pub fn into_ok(self) -> Result<()> {
        match self {
            Response::Ok {} => Ok(()),
            other => other.unexpected("ok"),
        }
    }

    /// Column set. A keyed reply contributes its columns.
    pub fn into_columns(self) -> Result<Vec<Field>> {
        match self {
            Response::Columns { columns } | Response::KeyColumns { columns, .. } => Ok(columns),
            other => other.unexpected("columns"),
        }
    }

    pub fn into_record(self) -> Result<Record> {
        match self {
            Response::KeyColumns { key, columns }
            | Response::KeyColumnsIterator { key, columns, .. } => Ok(Record { key, columns }),
            other => other.unexpected("keyColumns"),
        }
    }

    pub fn into_iterator_record(self) -> Result<IteratorRecord> {
        match self {
            Response::KeyColumnsIterator { key, columns, it } => Ok(IteratorRecord { key, columns, it }),
            other => other.unexpected("keyColumnsIterator"),
        }
    }

    pub fn into_records(self) -> Result<Vec<Record>> {
        match self {
            Response::KeyColumnsList { list } => Ok(list),
            other => other.unexpected("keyColumnsList"),
        }
    }

    pub fn into_postings(self) -> Result<Vec<Posting>> {
        match self {
            Response::Postings { postings } => postings.into_iter().map(Posting::try_from).collect(),
            other => other.unexpected("postings"),
        }
    }

    pub fn into_table_names(self) -> Result<Vec<String>> {
        match self {
            Response::TableNames { names } => Ok(names),
            other => other.unexpected("tableNames"),
        }
    }
}
