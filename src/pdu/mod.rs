//! Protocol message model.
//!
//! - [`ApolloPdu`] / [`Procedure`]: outbound messages, one variant per
//!   server procedure
//! - [`Response`]: server replies and their normalization
//! - [`Field`] / [`Value`]: named, typed key parts and columns
//! - option tables and the big-endian unsigned encoding shared by update
//!   bounds and index-read time windows

mod field;
mod options;
mod request;
mod response;
mod uint;

pub use field::{Field, Value, NULL_SENTINEL};
pub use options::{
    CharFilter, Comparator, DataModel, HashingMethod, IndexConfig, Instruction, SortBy,
    TableOption, TableType, TimeUnit, TokenFilter, TokenStats, TokenTransform, Tokenizer,
};
pub use request::{
    AddIndex, ApolloPdu, CreateTable, Delete, IndexRead, IteratorStep, ListTables, PostingFilter,
    Procedure, Read, ReadRange, ReadRangeN, RemoveIndex, Seek, TableInfo, TableRef, Update,
    UpdateInstruction, UpdateOperation, Version, Write, PROTOCOL_VERSION,
};
pub use response::{
    ErrorKind, IteratorRecord, IteratorToken, Posting, Record, Response, WirePosting,
};
pub use uint::{decode_unsigned, encode_number, encode_unsigned};
