//! Outbound protocol messages.
//!
//! Every message is an [`ApolloPdu`]: a protocol [`Version`] plus exactly
//! one [`Procedure`]. Procedures are externally tagged on the wire, e.g.
//! `{"createTable": {"tableName": .., "keys": .., "tableOptions": ..}}`.
//!
//! [`ApolloPdu::validate`] runs before encoding; a message that fails it is
//! never framed or sent.

use serde::{Deserialize, Serialize};

use super::field::{Field, Value};
use super::options::{IndexConfig, Instruction, SortBy, TableOption};
use super::response::{IteratorToken, Response};
use super::uint::encode_unsigned;
use crate::error::{ApolloError, Result};

/// Protocol version stamped on every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

/// Version spoken by this client.
pub const PROTOCOL_VERSION: Version = Version { major: 0, minor: 1 };

impl Default for Version {
    fn default() -> Self {
        PROTOCOL_VERSION
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApolloPdu {
    pub version: Version,
    pub procedure: Procedure,
}

impl ApolloPdu {
    /// Wrap a procedure in an envelope carrying `version`.
    pub fn new(version: Version, procedure: Procedure) -> Self {
        Self { version, procedure }
    }

    /// Check the message is complete enough to send.
    ///
    /// # Errors
    ///
    /// [`ApolloError::Validation`] naming the first missing or malformed part.
    pub fn validate(&self) -> Result<()> {
        self.procedure.validate()
    }
}

/// The procedure carried by a message. Exactly one per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Procedure {
    TableInfo(TableInfo),
    CreateTable(CreateTable),
    OpenTable(TableRef),
    CloseTable(TableRef),
    DeleteTable(TableRef),
    Read(Read),
    Write(Write),
    Delete(Delete),
    ReadRange(ReadRange),
    ReadRangeN(ReadRangeN),
    Update(Update),
    First(TableRef),
    Next(IteratorStep),
    Prev(IteratorStep),
    Last(TableRef),
    Seek(Seek),
    AddIndex(AddIndex),
    RemoveIndex(RemoveIndex),
    IndexRead(IndexRead),
    ListTables(ListTables),
    /// Server reply. Only ever inbound.
    Response(Response),
}

impl Procedure {
    /// Wire tag of the procedure.
    pub fn name(&self) -> &'static str {
        match self {
            Procedure::TableInfo(_) => "tableInfo",
            Procedure::CreateTable(_) => "createTable",
            Procedure::OpenTable(_) => "openTable",
            Procedure::CloseTable(_) => "closeTable",
            Procedure::DeleteTable(_) => "deleteTable",
            Procedure::Read(_) => "read",
            Procedure::Write(_) => "write",
            Procedure::Delete(_) => "delete",
            Procedure::ReadRange(_) => "readRange",
            Procedure::ReadRangeN(_) => "readRangeN",
            Procedure::Update(_) => "update",
            Procedure::First(_) => "first",
            Procedure::Next(_) => "next",
            Procedure::Prev(_) => "prev",
            Procedure::Last(_) => "last",
            Procedure::Seek(_) => "seek",
            Procedure::AddIndex(_) => "addIndex",
            Procedure::RemoveIndex(_) => "removeIndex",
            Procedure::IndexRead(_) => "indexRead",
            Procedure::ListTables(_) => "listTables",
            Procedure::Response(_) => "response",
        }
    }

    fn validate(&self) -> Result<()> {
        let name = self.name();
        match self {
            Procedure::TableInfo(p) => {
                require_table(name, &p.table_name)?;
                require_names(name, "attribute", &p.attributes)
            }
            Procedure::CreateTable(p) => {
                require_table(name, &p.table_name)?;
                require_nonempty(name, "keys", &p.keys)?;
                require_names(name, "key", &p.keys)
            }
            Procedure::OpenTable(p)
            | Procedure::CloseTable(p)
            | Procedure::DeleteTable(p)
            | Procedure::First(p)
            | Procedure::Last(p) => require_table(name, &p.table_name),
            Procedure::Read(p) => {
                require_table(name, &p.table_name)?;
                require_key(name, &p.key)
            }
            Procedure::Write(p) => {
                require_table(name, &p.table_name)?;
                require_key(name, &p.key)?;
                require_nonempty(name, "columns", &p.columns)?;
                require_fields(name, "column", &p.columns)
            }
            Procedure::Delete(p) => {
                require_table(name, &p.table_name)?;
                require_key(name, &p.key)
            }
            Procedure::ReadRange(p) => {
                require_table(name, &p.table_name)?;
                require_key(name, &p.start_key)?;
                require_key(name, &p.end_key)
            }
            Procedure::ReadRangeN(p) => {
                require_table(name, &p.table_name)?;
                require_key(name, &p.start_key)?;
                if p.n == 0 {
                    return Err(invalid(name, "n must be at least 1"));
                }
                Ok(())
            }
            Procedure::Update(p) => {
                require_table(name, &p.table_name)?;
                require_key(name, &p.key)?;
                require_nonempty(name, "operations", &p.operations)?;
                for op in &p.operations {
                    if op.field.is_empty() {
                        return Err(invalid(name, "update operation has an empty field name"));
                    }
                }
                Ok(())
            }
            Procedure::Next(p) | Procedure::Prev(p) => {
                if p.it.is_empty() {
                    return Err(invalid(name, "iterator token is empty"));
                }
                Ok(())
            }
            Procedure::Seek(p) => {
                require_table(name, &p.table_name)?;
                require_key(name, &p.key)
            }
            Procedure::AddIndex(p) => {
                require_table(name, &p.table_name)?;
                require_column(name, &p.column)
            }
            Procedure::RemoveIndex(p) => {
                require_table(name, &p.table_name)?;
                require_column(name, &p.column)
            }
            Procedure::IndexRead(p) => {
                require_table(name, &p.table_name)?;
                require_column(name, &p.column)?;
                require_nonempty(name, "tokens", &p.tokens)?;
                require_names(name, "token", &p.tokens)
            }
            Procedure::ListTables(_) => Ok(()),
            Procedure::Response(_) => Err(invalid(name, "responses are never sent by a client")),
        }
    }
}

fn invalid(procedure: &str, reason: &str) -> ApolloError {
    ApolloError::Validation(format!("{}: {}", procedure, reason))
}

fn require_table(procedure: &str, table_name: &str) -> Result<()> {
    if table_name.is_empty() {
        return Err(invalid(procedure, "table name is empty"));
    }
    Ok(())
}

fn require_column(procedure: &str, column: &str) -> Result<()> {
    if column.is_empty() {
        return Err(invalid(procedure, "column name is empty"));
    }
    Ok(())
}

fn require_nonempty<T>(procedure: &str, what: &str, items: &[T]) -> Result<()> {
    if items.is_empty() {
        return Err(ApolloError::Validation(format!("{}: {} is empty", procedure, what)));
    }
    Ok(())
}

fn require_names(procedure: &str, what: &str, names: &[String]) -> Result<()> {
    if names.iter().any(String::is_empty) {
        return Err(ApolloError::Validation(format!("{}: empty {} name", procedure, what)));
    }
    Ok(())
}

fn require_fields(procedure: &str, what: &str, fields: &[Field]) -> Result<()> {
    if fields.iter().any(|f| f.name.is_empty()) {
        return Err(ApolloError::Validation(format!("{}: {} without a name", procedure, what)));
    }
    Ok(())
}

fn require_key(procedure: &str, key: &[Field]) -> Result<()> {
    require_nonempty(procedure, "key", key)?;
    require_fields(procedure, "key part", key)
}

/// Procedures that only name a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub table_name: String,
}

impl TableRef {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub table_name: String,
    /// Attributes to report; empty asks for all of them.
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTable {
    pub table_name: String,
    /// Key column names, in key order.
    pub keys: Vec<String>,
    #[serde(default)]
    pub table_options: Vec<TableOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Read {
    pub table_name: String,
    pub key: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    pub table_name: String,
    pub key: Vec<Field>,
    pub columns: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delete {
    pub table_name: String,
    pub key: Vec<Field>,
}

/// Records with keys in `[start_key, end_key]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRange {
    pub table_name: String,
    pub start_key: Vec<Field>,
    pub end_key: Vec<Field>,
}

/// Up to `n` records starting at `start_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRangeN {
    pub table_name: String,
    pub start_key: Vec<Field>,
    pub n: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    pub table_name: String,
    pub key: Vec<Field>,
    pub operations: Vec<UpdateOperation>,
}

/// How an update applies to one column.
///
/// `threshold` and `set_value` are big-endian unsigned byte strings; empty
/// means unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstruction {
    pub instruction: Instruction,
    #[serde(with = "serde_bytes", default)]
    pub threshold: Vec<u8>,
    #[serde(with = "serde_bytes", default)]
    pub set_value: Vec<u8>,
}

/// One column update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOperation {
    pub field: String,
    pub instruction: UpdateInstruction,
    pub value: Value,
}

impl UpdateOperation {
    /// Add `by` to the column. Once the result passes `threshold` the
    /// column is reset to `set_value`. Non-positive bounds are sent unset.
    pub fn increment(field: impl Into<String>, by: impl Into<Value>, threshold: i64, set_value: i64) -> Self {
        Self {
            field: field.into(),
            instruction: UpdateInstruction {
                instruction: Instruction::Increment,
                threshold: encode_unsigned(threshold),
                set_value: encode_unsigned(set_value),
            },
            value: by.into(),
        }
    }

    /// Replace the column value.
    pub fn overwrite(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            instruction: UpdateInstruction {
                instruction: Instruction::Overwrite,
                threshold: Vec::new(),
                set_value: Vec::new(),
            },
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IteratorStep {
    pub it: IteratorToken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seek {
    pub table_name: String,
    pub key: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddIndex {
    pub table_name: String,
    pub column: String,
    #[serde(default)]
    pub config: IndexConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveIndex {
    pub table_name: String,
    pub column: String,
}

/// Selects and orders postings returned by an index read.
///
/// Timestamp bounds use the same big-endian unsigned encoding as update
/// thresholds; empty bounds leave that side of the window open.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingFilter {
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(with = "serde_bytes", default)]
    pub start_ts: Vec<u8>,
    #[serde(with = "serde_bytes", default)]
    pub end_ts: Vec<u8>,
    /// Zero means no limit.
    #[serde(default)]
    pub max_postings: u32,
}

impl PostingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// Restrict postings to timestamps in `[start, end]`.
    pub fn between(mut self, start: i64, end: i64) -> Self {
        self.start_ts = encode_unsigned(start);
        self.end_ts = encode_unsigned(end);
        self
    }

    pub fn max_postings(mut self, max: u32) -> Self {
        self.max_postings = max;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRead {
    pub table_name: String,
    pub column: String,
    pub tokens: Vec<String>,
    #[serde(default)]
    pub filter: PostingFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListTables {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;

    fn pdu(procedure: Procedure) -> ApolloPdu {
        ApolloPdu::new(PROTOCOL_VERSION, procedure)
    }

    #[test]
    fn test_procedure_is_externally_tagged() {
        let message = pdu(Procedure::OpenTable(TableRef::new("t")));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "version": {"major": 0, "minor": 1},
                "procedure": {"openTable": {"tableName": "t"}}
            })
        );
    }

    #[test]
    fn test_create_table_roundtrip() {
        let message = pdu(Procedure::CreateTable(CreateTable {
            table_name: "people".into(),
            keys: vec!["id".into(), "ts".into()],
            table_options: TableOption::defaults(),
        }));
        message.validate().unwrap();
        let encoded = MsgPackCodec::encode(&message).unwrap();
        let decoded: ApolloPdu = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_validation_rejects_missing_parts() {
        let cases = vec![
            Procedure::OpenTable(TableRef::new("")),
            Procedure::CreateTable(CreateTable {
                table_name: "t".into(),
                keys: vec![],
                table_options: vec![],
            }),
            Procedure::Read(Read {
                table_name: "t".into(),
                key: vec![],
            }),
            Procedure::Write(Write {
                table_name: "t".into(),
                key: vec![Field::string("id", "1")],
                columns: vec![Field::string("", "x")],
            }),
            Procedure::ReadRangeN(ReadRangeN {
                table_name: "t".into(),
                start_key: vec![Field::string("id", "1")],
                n: 0,
            }),
            Procedure::Next(IteratorStep {
                it: IteratorToken::new(Vec::new()),
            }),
            Procedure::AddIndex(AddIndex {
                table_name: "t".into(),
                column: "".into(),
                config: IndexConfig::default(),
            }),
            Procedure::IndexRead(IndexRead {
                table_name: "t".into(),
                column: "name".into(),
                tokens: vec![],
                filter: PostingFilter::new(),
            }),
            Procedure::Response(Response::Ok {}),
        ];

        for procedure in cases {
            let name = procedure.name();
            let err = pdu(procedure).validate().unwrap_err();
            assert!(
                matches!(&err, ApolloError::Validation(msg) if msg.starts_with(name)),
                "unexpected error for {}: {}",
                name,
                err
            );
        }
    }

    #[test]
    fn test_list_tables_needs_nothing() {
        pdu(Procedure::ListTables(ListTables {})).validate().unwrap();
    }

    #[test]
    fn test_increment_encodes_bounds() {
        let op = UpdateOperation::increment("hits", 1i64, 256, 0);
        assert_eq!(op.instruction.instruction, Instruction::Increment);
        assert_eq!(op.instruction.threshold, vec![0x01, 0x00]);
        assert!(op.instruction.set_value.is_empty());

        let op = UpdateOperation::overwrite("name", "x");
        assert_eq!(op.instruction.instruction, Instruction::Overwrite);
        assert!(op.instruction.threshold.is_empty());
    }

    #[test]
    fn test_posting_filter_shares_uint_encoding() {
        let filter = PostingFilter::new().between(1_690_000_000, -1).max_postings(10);
        assert_eq!(filter.start_ts, encode_unsigned(1_690_000_000));
        assert!(filter.end_ts.is_empty());
        assert_eq!(filter.max_postings, 10);
        assert_eq!(filter.sort_by, SortBy::Relevance);
    }

    #[test]
    fn test_version_display() {
        assert_eq!(PROTOCOL_VERSION.to_string(), "0.1");
        assert_eq!(Version::default(), PROTOCOL_VERSION);
    }
}
