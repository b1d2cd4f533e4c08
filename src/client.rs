//! Client builder and request API.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the
//! endpoint, credentials and deadlines. The [`Client`] manages the
//! connection lifecycle:
//! 1. Open the TLS socket
//! 2. Authenticate (SCRAM-SHA-1 unless another mechanism is plugged in)
//! 3. Route responses to waiting requests by correlation id
//!
//! Every procedure is one async method. Requests are stamped with the
//! configured protocol version and bounded by the request deadline, or
//! the admin deadline for table lifecycle and index administration.
//!
//! # Example
//!
//! ```ignore
//! use apollo_client::{Client, Field};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .host("localhost")
//!         .port(32768)
//!         .credentials("admin", "admin")
//!         .reject_unauthorized(false)
//!         .build()?;
//!     client.connect().await?;
//!
//!     client.create_table("users", &["id", "ts"], Vec::new()).await?;
//!     let key = vec![Field::string("id", "0001"), Field::int("ts", 1690000000)];
//!     client
//!         .write("users", key.clone(), vec![Field::string("name", "Erdem Aksu")])
//!         .await?;
//!     let columns = client.read("users", key).await?;
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::auth::{default_mechanism, MechanismFactory};
use crate::broker::Broker;
use crate::config::{ClientConfig, ConnectOptions, Credentials};
use crate::error::{ApolloError, Result};
use crate::pdu::{
    AddIndex, ApolloPdu, CreateTable, Delete, Field, IndexConfig, IndexRead, IteratorRecord,
    IteratorStep, IteratorToken, ListTables, Posting, PostingFilter, Procedure, Read, ReadRange,
    ReadRangeN, Record, RemoveIndex, Response, Seek, TableInfo, TableOption, TableRef, Update,
    UpdateOperation, Version, Write,
};
use crate::transport::Transport;

/// Builder for configuring and creating an Apollo client.
///
/// Use the fluent API to set the endpoint and options, then call
/// `build()` (or `connect()` to build and connect in one step).
pub struct ClientBuilder {
    config: ClientConfig,
    mechanism: MechanismFactory,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self::from_config(ClientConfig::new(
            ConnectOptions::new("", 0),
            Credentials::new("", ""),
        ))
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            mechanism: default_mechanism(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.connect.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.connect.port = port;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Credentials::new(username, password);
        self
    }

    /// Verify the server certificate.
    ///
    /// Default: true
    pub fn reject_unauthorized(mut self, reject: bool) -> Self {
        self.config.connect.reject_unauthorized = reject;
        self
    }

    /// TLS server name, when it differs from the host.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.connect.server_name = Some(name.into());
        self
    }

    /// Deadline for the authentication handshake.
    ///
    /// Default: 2 seconds
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Deadline for record, range, iterator and index-read requests.
    ///
    /// Default: 1 second
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Deadline for table lifecycle and index administration.
    ///
    /// Default: 5 seconds
    pub fn admin_timeout(mut self, timeout: Duration) -> Self {
        self.config.admin_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Length of the client nonce.
    ///
    /// Default: 12
    pub fn nonce_length(mut self, len: usize) -> Self {
        self.config.nonce_length = len;
        self
    }

    /// Version stamped on every request.
    pub fn protocol_version(mut self, version: Version) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Largest inbound payload accepted before the read buffer is reset.
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Replace the authentication mechanism.
    pub fn mechanism(mut self, factory: MechanismFactory) -> Self {
        self.mechanism = factory;
        self
    }

    /// Validate the configuration and create a disconnected client.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        Ok(Client {
            config: self.config,
            mechanism: self.mechanism,
            connection: Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
        })
    }

    /// Build and connect.
    pub async fn connect(self) -> Result<Client> {
        let client = self.build()?;
        client.connect().await?;
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One authenticated connection and its pending-request table.
struct Connection {
    transport: Transport,
    broker: Arc<Broker>,
}

/// An Apollo client.
///
/// Safe to share between tasks; concurrent requests are multiplexed over
/// one connection.
pub struct Client {
    config: ClientConfig,
    mechanism: MechanismFactory,
    connection: Mutex<Option<Arc<Connection>>>,
    connecting: tokio::sync::Mutex<()>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a disconnected client from a configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::from_config(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the socket and authenticate. No-op while connected.
    ///
    /// # Errors
    ///
    /// `Connect` / `Tls` for socket failures, `Handshake` / `AuthTimeout`
    /// if authentication does not complete.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connecting.lock().await;
        if self.is_connected() {
            debug!("Already authenticated");
            return Ok(());
        }
        let broker = Arc::new(Broker::with_max_payload(self.config.max_payload_size));
        let transport = Transport::connect(&self.config, (self.mechanism)(), broker.clone()).await?;
        self.install(transport, broker);
        Ok(())
    }

    /// Authenticate over a caller-supplied stream instead of opening a
    /// TLS socket. No-op while connected.
    pub async fn connect_with_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let _guard = self.connecting.lock().await;
        if self.is_connected() {
            debug!("Already authenticated");
            return Ok(());
        }
        let broker = Arc::new(Broker::with_max_payload(self.config.max_payload_size));
        let transport =
            Transport::establish(stream, &self.config, (self.mechanism)(), broker.clone()).await?;
        self.install(transport, broker);
        Ok(())
    }

    fn install(&self, transport: Transport, broker: Arc<Broker>) {
        *self.connection.lock() = Some(Arc::new(Connection { transport, broker }));
        debug!("Connection successful");
    }

    /// Close the connection. Pending requests fail with
    /// [`ApolloError::ConnectionClosed`].
    pub async fn disconnect(&self) {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.transport.disconnect().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|c| c.transport.is_connected())
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.connection
            .lock()
            .as_ref()
            .map_or(0, |c| c.broker.pending_count())
    }

    /// Send any procedure and return its raw response.
    ///
    /// Error payloads are already turned into [`ApolloError::Server`].
    pub async fn request(&self, procedure: Procedure, timeout: Duration) -> Result<Response> {
        let pdu = ApolloPdu::new(self.config.protocol_version, procedure);
        pdu.validate()?;

        let connection = self
            .connection
            .lock()
            .clone()
            .ok_or(ApolloError::ConnectionClosed)?;
        connection
            .broker
            .send(&connection.transport, &pdu, timeout)
            .await
    }

    async fn admin(&self, procedure: Procedure) -> Result<Response> {
        self.request(procedure, self.config.admin_timeout()).await
    }

    async fn call(&self, procedure: Procedure) -> Result<Response> {
        self.request(procedure, self.config.request_timeout()).await
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Table attributes as fields. An empty `attributes` asks for all.
    pub async fn table_info(&self, table: impl Into<String>, attributes: &[&str]) -> Result<Vec<Field>> {
        self.admin(Procedure::TableInfo(TableInfo {
            table_name: table.into(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        }))
        .await?
        .into_columns()
    }

    /// Create a table keyed by `keys`. Empty `options` creates a RocksDB
    /// table.
    pub async fn create_table(
        &self,
        table: impl Into<String>,
        keys: &[&str],
        options: Vec<TableOption>,
    ) -> Result<()> {
        let table_options = if options.is_empty() {
            TableOption::defaults()
        } else {
            options
        };
        self.admin(Procedure::CreateTable(CreateTable {
            table_name: table.into(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            table_options,
        }))
        .await?
        .into_ok()
    }

    pub async fn open_table(&self, table: impl Into<String>) -> Result<()> {
        self.admin(Procedure::OpenTable(TableRef::new(table)))
            .await?
            .into_ok()
    }

    pub async fn close_table(&self, table: impl Into<String>) -> Result<()> {
        self.admin(Procedure::CloseTable(TableRef::new(table)))
            .await?
            .into_ok()
    }

    pub async fn delete_table(&self, table: impl Into<String>) -> Result<()> {
        self.admin(Procedure::DeleteTable(TableRef::new(table)))
            .await?
            .into_ok()
    }

    /// Names of every table on the server.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.call(Procedure::ListTables(ListTables {}))
            .await?
            .into_table_names()
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Columns stored under `key`.
    pub async fn read(&self, table: impl Into<String>, key: Vec<Field>) -> Result<Vec<Field>> {
        self.call(Procedure::Read(Read {
            table_name: table.into(),
            key,
        }))
        .await?
        .into_columns()
    }

    /// Store `columns` under `key`.
    pub async fn write(&self, table: impl Into<String>, key: Vec<Field>, columns: Vec<Field>) -> Result<()> {
        self.call(Procedure::Write(Write {
            table_name: table.into(),
            key,
            columns,
        }))
        .await?
        .into_ok()
    }

    pub async fn delete(&self, table: impl Into<String>, key: Vec<Field>) -> Result<()> {
        self.call(Procedure::Delete(Delete {
            table_name: table.into(),
            key,
        }))
        .await?
        .into_ok()
    }

    /// Apply `operations` to the record under `key` and return it.
    pub async fn update(
        &self,
        table: impl Into<String>,
        key: Vec<Field>,
        operations: Vec<UpdateOperation>,
    ) -> Result<Record> {
        self.call(Procedure::Update(Update {
            table_name: table.into(),
            key,
            operations,
        }))
        .await?
        .into_record()
    }

    /// Records with keys between `start_key` and `end_key`, inclusive.
    pub async fn read_range(
        &self,
        table: impl Into<String>,
        start_key: Vec<Field>,
        end_key: Vec<Field>,
    ) -> Result<Vec<Record>> {
        self.call(Procedure::ReadRange(ReadRange {
            table_name: table.into(),
            start_key,
            end_key,
        }))
        .await?
        .into_records()
    }

    /// Up to `n` records starting at `start_key`.
    pub async fn read_range_n(&self, table: impl Into<String>, start_key: Vec<Field>, n: u32) -> Result<Vec<Record>> {
        self.call(Procedure::ReadRangeN(ReadRangeN {
            table_name: table.into(),
            start_key,
            n,
        }))
        .await?
        .into_records()
    }

    // ========================================================================
    // Iterators
    // ========================================================================

    /// Cursor on the first record.
    pub async fn first(&self, table: impl Into<String>) -> Result<IteratorRecord> {
        self.call(Procedure::First(TableRef::new(table)))
            .await?
            .into_iterator_record()
    }

    /// Cursor on the last record.
    pub async fn last(&self, table: impl Into<String>) -> Result<IteratorRecord> {
        self.call(Procedure::Last(TableRef::new(table)))
            .await?
            .into_iterator_record()
    }

    /// Cursor on `key`, or the record after it.
    pub async fn seek(&self, table: impl Into<String>, key: Vec<Field>) -> Result<IteratorRecord> {
        self.call(Procedure::Seek(Seek {
            table_name: table.into(),
            key,
        }))
        .await?
        .into_iterator_record()
    }

    /// Advance the cursor.
    ///
    /// Running off the end surfaces as a server error of kind
    /// `IteratorExhausted`.
    pub async fn next(&self, it: &IteratorToken) -> Result<IteratorRecord> {
        self.call(Procedure::Next(IteratorStep { it: it.clone() }))
            .await?
            .into_iterator_record()
    }

    /// Move the cursor back.
    pub async fn prev(&self, it: &IteratorToken) -> Result<IteratorRecord> {
        self.call(Procedure::Prev(IteratorStep { it: it.clone() }))
            .await?
            .into_iterator_record()
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    pub async fn add_index(&self, table: impl Into<String>, column: impl Into<String>, config: IndexConfig) -> Result<()> {
        self.admin(Procedure::AddIndex(AddIndex {
            table_name: table.into(),
            column: column.into(),
            config,
        }))
        .await?
        .into_ok()
    }

    pub async fn remove_index(&self, table: impl Into<String>, column: impl Into<String>) -> Result<()> {
        self.admin(Procedure::RemoveIndex(RemoveIndex {
            table_name: table.into(),
            column: column.into(),
        }))
        .await?
        .into_ok()
    }

    /// Postings for `tokens` in the index on `column`.
    pub async fn index_read(
        &self,
        table: impl Into<String>,
        column: impl Into<String>,
        tokens: &[&str],
        filter: PostingFilter,
    ) -> Result<Vec<Posting>> {
        self.call(Procedure::IndexRead(IndexRead {
            table_name: table.into(),
            column: column.into(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            filter,
        }))
        .await?
        .into_postings()
    }
}
