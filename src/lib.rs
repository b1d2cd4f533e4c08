//! # apollo-client
//!
//! Async Rust client for the Apollo table store.
//!
//! The server speaks length-prefixed MessagePack frames over TLS. Each
//! connection authenticates with SCRAM-SHA-1 before any protocol traffic,
//! then multiplexes concurrent requests using a 16-bit correlation id.
//!
//! ## Architecture
//!
//! - **Transport**: TLS socket, handshake, frame reassembly and a writer task
//! - **Broker**: correlation ids, pending requests and per-request deadlines
//! - **PDU**: typed procedures and responses, encoded as MessagePack maps
//!
//! ## Example
//!
//! ```ignore
//! use apollo_client::{Client, Field};
//!
//! #[tokio::main]
//! async fn main() -> apollo_client::Result<()> {
//!     let client = Client::builder()
//!         .host("localhost")
//!         .port(32768)
//!         .credentials("admin", "admin")
//!         .connect()
//!         .await?;
//!
//!     let record = client.first("users").await?;
//!     println!("{:?}", record.columns);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod pdu;
pub mod protocol;
pub mod transport;

mod broker;
mod client;
mod writer;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ConnectOptions, Credentials};
pub use error::{ApolloError, Result};
pub use pdu::{
    ErrorKind, Field, IndexConfig, IteratorRecord, IteratorToken, Posting, PostingFilter, Record,
    TableOption, UpdateOperation, Value,
};
