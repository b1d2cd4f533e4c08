//! Transport module - secure socket and authenticated connection.
//!
//! - [`TlsConnector`]: TCP + TLS, honoring `reject_unauthorized`
//! - [`Transport`]: authenticate, then one read loop feeding a [`FrameHandler`]

mod connection;
mod tls;

pub use connection::{FrameHandler, Transport};
pub use tls::TlsConnector;
