//! Error types for apollo-client.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::pdu::ErrorKind;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum ApolloError {
    /// Socket could not be opened.
    #[error("Connect error: {0}")]
    Connect(#[source] std::io::Error),

    /// TLS configuration or TLS handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// SCRAM exchange rejected or malformed.
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Authentication did not complete in time.
    #[error("Auth timeout after {0:?}")]
    AuthTimeout(Duration),

    /// Socket write failure. Shared because one failed batch settles
    /// every frame in it.
    #[error("Write error: {0}")]
    Write(#[source] Arc<std::io::Error>),

    /// Outbound message failed schema validation and was not sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// No response arrived for the request before its deadline.
    #[error("Timeout waiting for response with correlation id {correlation_id}")]
    Timeout {
        /// Correlation id of the expired request.
        correlation_id: u16,
    },

    /// The server answered with an error payload.
    #[error("Server error ({kind}): {message}")]
    Server {
        /// Error kind reported by the server.
        kind: ErrorKind,
        /// Human readable message from the server.
        message: String,
    },

    /// The server answered with a success payload of the wrong shape.
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Response variant the operation expects.
        expected: &'static str,
        /// Response variant that arrived.
        actual: &'static str,
    },

    /// A host value could not be mapped onto a field variant.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection closed or never established.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O error outside of connect/write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApolloError {
    /// Whether this is a request or authentication timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::AuthTimeout(_))
    }

    /// Error kind if this error came from the server.
    pub fn server_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Server { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type alias using ApolloError.
pub type Result<T> = std::result::Result<T, ApolloError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(ApolloError::Timeout { correlation_id: 7 }.is_timeout());
        assert!(ApolloError::AuthTimeout(Duration::from_millis(2000)).is_timeout());
        assert!(!ApolloError::ConnectionClosed.is_timeout());
    }

    #[test]
    fn test_server_error_display() {
        let err = ApolloError::Server {
            kind: ErrorKind::TableNotFound,
            message: "no such table: t1".to_string(),
        };
        assert_eq!(err.server_kind(), Some(ErrorKind::TableNotFound));
        assert!(err.to_string().contains("no such table: t1"));
        assert!(err.to_string().contains("table_not_found"));
    }

    #[test]
    fn test_timeout_display_carries_correlation_id() {
        let err = ApolloError::Timeout { correlation_id: 513 };
        assert!(err.to_string().contains("513"));
    }
}
