//! Authentication - SCRAM exchange run before any protocol traffic.
//!
//! - [`Handshake`]: sans-I/O state machine over a pluggable mechanism
//! - [`authenticate`]: drives a handshake over a stream with a deadline
//! - [`ScramMechanism`] / [`ScramSha1`]: the mechanism seam and its default

mod handshake;
mod scram;

use std::sync::Arc;

pub use handshake::{authenticate, generate_nonce, Handshake, HandshakeAction, HandshakeState};
pub use scram::{ScramMechanism, ScramSha1, MAX_ITERATIONS};

/// Builds a fresh mechanism for each connection attempt.
pub type MechanismFactory = Arc<dyn Fn() -> Box<dyn ScramMechanism> + Send + Sync>;

/// Factory for the default SCRAM-SHA-1 mechanism.
pub fn default_mechanism() -> MechanismFactory {
    Arc::new(|| Box::new(ScramSha1::new()) as Box<dyn ScramMechanism>)
}
