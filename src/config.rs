//! Client configuration.
//!
//! Every field has a default except the endpoint and credentials, so a
//! config file only needs to name what differs:
//!
//! ```json
//! {
//!   "connect": { "host": "db.internal", "port": 32768, "reject_unauthorized": false },
//!   "credentials": { "username": "admin", "password": "admin" },
//!   "request_timeout_ms": 1500
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use zeroize::Zeroize;

use crate::error::{ApolloError, Result};
use crate::pdu::Version;
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Default handshake deadline.
pub const DEFAULT_AUTH_TIMEOUT_MS: u64 = 2000;
/// Default deadline for record, range, iterator and search operations.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1000;
/// Default deadline for table lifecycle and index administration.
pub const DEFAULT_ADMIN_TIMEOUT_MS: u64 = 5000;
/// Default client nonce length, in characters.
pub const DEFAULT_NONCE_LENGTH: usize = 12;
/// Largest accepted nonce length.
pub const MAX_NONCE_LENGTH: usize = 64;

/// Where to connect.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    /// Verify the server certificate chain. Disable only for self-signed
    /// development servers.
    #[serde(default = "default_reject_unauthorized")]
    pub reject_unauthorized: bool,
    /// TLS server name; the host is used when unset.
    #[serde(default)]
    pub server_name: Option<String>,
}

fn default_reject_unauthorized() -> bool {
    true
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reject_unauthorized: true,
            server_name: None,
        }
    }

    /// Name presented for SNI and certificate verification.
    pub fn tls_server_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.host)
    }
}

/// Username and password for the SCRAM exchange.
///
/// The password is wiped on drop and never printed.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Full client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub connect: ConnectOptions,
    pub credentials: Credentials,
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: u64,
    #[serde(default = "default_nonce_length")]
    pub nonce_length: usize,
    #[serde(default)]
    pub protocol_version: Version,
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: u32,
}

fn default_auth_timeout_ms() -> u64 {
    DEFAULT_AUTH_TIMEOUT_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_admin_timeout_ms() -> u64 {
    DEFAULT_ADMIN_TIMEOUT_MS
}

fn default_nonce_length() -> usize {
    DEFAULT_NONCE_LENGTH
}

fn default_max_payload_size() -> u32 {
    DEFAULT_MAX_PAYLOAD_SIZE
}

impl ClientConfig {
    /// Config with every optional field at its default.
    pub fn new(connect: ConnectOptions, credentials: Credentials) -> Self {
        Self {
            connect,
            credentials,
            auth_timeout_ms: DEFAULT_AUTH_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            admin_timeout_ms: DEFAULT_ADMIN_TIMEOUT_MS,
            nonce_length: DEFAULT_NONCE_LENGTH,
            protocol_version: Version::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ClientConfig =
            serde_json::from_str(json).map_err(|e| ApolloError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.admin_timeout_ms)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.connect.host.is_empty() {
            return Err(ApolloError::Config("host is empty".into()));
        }
        if self.connect.port == 0 {
            return Err(ApolloError::Config("port must be non-zero".into()));
        }
        if self.credentials.username.is_empty() {
            return Err(ApolloError::Config("username is empty".into()));
        }
        for (name, value) in [
            ("auth_timeout_ms", self.auth_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("admin_timeout_ms", self.admin_timeout_ms),
        ] {
            if value == 0 {
                return Err(ApolloError::Config(format!("{} must be non-zero", name)));
            }
        }
        if self.nonce_length == 0 || self.nonce_length > MAX_NONCE_LENGTH {
            return Err(ApolloError::Config(format!(
                "nonce_length must be within 1..={}",
                MAX_NONCE_LENGTH
            )));
        }
        if self.max_payload_size == 0 {
            return Err(ApolloError::Config("max_payload_size must be non-zero".into()));
        }
        Ok(())
    }
}
