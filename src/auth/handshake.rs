//! Authentication handshake state machine.
//!
//! ```text
//! ┌──────┐ client-first ┌────────────────────┐ client-final ┌────────────────────┐ server-final ┌───────────────┐
//! │ Idle │─────────────>│ AwaitingServerFirst│─────────────>│ AwaitingServerFinal│─────────────>│ Authenticated │
//! └──────┘              └────────────────────┘              └────────────────────┘              └───────────────┘
//!                                 │ invalid / timeout                  │ invalid / timeout
//!                                 ↓                                    ↓
//!                              ┌────────┐                          ┌────────┐
//!                              │ Failed │                          │ Failed │
//!                              └────────┘                          └────────┘
//! ```
//!
//! [`Handshake`] does no I/O: it takes inbound messages and returns the
//! message to send next. [`authenticate`] drives it over a stream under a
//! deadline. The stream is borrowed only for the duration of the exchange,
//! so nothing else can read from it until authentication has settled.
//! Mechanism steps run on the blocking pool: key derivation must not hold
//! up the runtime or the deadline timer.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::scram::ScramMechanism;
use crate::config::Credentials;
use crate::error::{ApolloError, Result};

/// Upper bound on a single handshake message.
const MAX_HANDSHAKE_MESSAGE: usize = 4096;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Idle,
    /// Client-first sent.
    AwaitingServerFirst,
    /// Client-final sent.
    AwaitingServerFinal,
    /// Server proof accepted.
    Authenticated,
    /// Exchange aborted.
    Failed,
}

/// What the driver does after feeding a server message in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Write this message to the server.
    Send(Vec<u8>),
    /// Authentication finished.
    Complete,
}

/// Client side of the three-message exchange.
pub struct Handshake {
    state: HandshakeState,
    mechanism: Box<dyn ScramMechanism>,
    credentials: Credentials,
    nonce: String,
}

impl Handshake {
    /// New handshake with a freshly generated nonce of `nonce_length` characters.
    pub fn new(mechanism: Box<dyn ScramMechanism>, credentials: Credentials, nonce_length: usize) -> Self {
        Self::with_nonce(mechanism, credentials, generate_nonce(nonce_length))
    }

    /// New handshake with a caller-chosen nonce.
    pub fn with_nonce(
        mechanism: Box<dyn ScramMechanism>,
        credentials: Credentials,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            state: HandshakeState::Idle,
            mechanism,
            credentials,
            nonce: nonce.into(),
        }
    }

    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == HandshakeState::Authenticated
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Produce the client-first message. `Idle → AwaitingServerFirst`.
    pub fn start(&mut self) -> Result<Vec<u8>> {
        if self.state != HandshakeState::Idle {
            return Err(self.fail(format!("cannot start from {:?}", self.state)));
        }
        match self.mechanism.client_first(&self.credentials, &self.nonce) {
            Ok(message) => {
                self.state = HandshakeState::AwaitingServerFirst;
                Ok(message)
            }
            Err(e) => Err(self.fail_with(e)),
        }
    }

    /// Feed one server message in.
    pub fn on_message(&mut self, message: &[u8]) -> Result<HandshakeAction> {
        match self.state {
            HandshakeState::AwaitingServerFirst => {
                match self.mechanism.client_final(&self.credentials, message) {
                    Ok(reply) => {
                        self.state = HandshakeState::AwaitingServerFinal;
                        Ok(HandshakeAction::Send(reply))
                    }
                    Err(e) => Err(self.fail_with(e)),
                }
            }
            HandshakeState::AwaitingServerFinal => match self.mechanism.verify_server_final(message) {
                Ok(()) => {
                    self.state = HandshakeState::Authenticated;
                    Ok(HandshakeAction::Complete)
                }
                Err(e) => Err(self.fail_with(e)),
            },
            other => Err(self.fail(format!("unexpected server message in {:?}", other))),
        }
    }

    /// Abort the exchange.
    pub fn abort(&mut self) {
        if self.state != HandshakeState::Authenticated {
            self.state = HandshakeState::Failed;
        }
    }

    fn fail(&mut self, reason: String) -> ApolloError {
        self.state = HandshakeState::Failed;
        ApolloError::Handshake(reason)
    }

    fn fail_with(&mut self, err: ApolloError) -> ApolloError {
        self.state = HandshakeState::Failed;
        err
    }
}

/// Random nonce of `len` characters drawn from the base64 alphabet with `+`
/// and `/` replaced by `0`.
pub fn generate_nonce(len: usize) -> String {
    let mut bytes = vec![0u8; (len * 3).div_ceil(4)];
    OsRng.fill_bytes(&mut bytes);
    let mut nonce = BASE64.encode(&bytes);
    nonce.truncate(len);
    nonce.replace(['+', '/'], "0")
}

/// Run `handshake` to completion over `stream`, bounded by `deadline`.
///
/// Each server message must arrive in a single read. A message split
/// across reads is handed to the mechanism in pieces, which fails
/// authentication; it is not reassembled.
///
/// # Errors
///
/// [`ApolloError::AuthTimeout`] if the deadline passes first, otherwise the
/// error that moved the handshake to `Failed`.
pub async fn authenticate<S>(stream: &mut S, handshake: &mut Handshake, deadline: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = tokio::time::timeout(deadline, exchange(stream, handshake)).await;
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            handshake.abort();
            warn!(error = %e, "Authentication failed");
            Err(e)
        }
        Err(_) => {
            handshake.abort();
            warn!(?deadline, state = ?handshake.state(), "Authentication timed out");
            Err(ApolloError::AuthTimeout(deadline))
        }
    }
}

async fn exchange<S>(stream: &mut S, handshake: &mut Handshake) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let first = handshake.start()?;
    debug!("Sending client-first");
    send(stream, &first).await?;

    let mut buf = vec![0u8; MAX_HANDSHAKE_MESSAGE];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ApolloError::Handshake(
                "connection closed during authentication".into(),
            ));
        }
        match on_message_blocking(handshake, buf[..n].to_vec()).await? {
            HandshakeAction::Send(reply) => {
                debug!("Received server-first, sending client-final");
                send(stream, &reply).await?;
            }
            HandshakeAction::Complete => {
                debug!("Server-final verified");
                return Ok(());
            }
        }
    }
}

/// Stands in for the mechanism while it runs on the blocking pool.
struct Detached;

impl ScramMechanism for Detached {
    fn name(&self) -> &'static str {
        "DETACHED"
    }

    fn client_first(&mut self, _: &Credentials, _: &str) -> Result<Vec<u8>> {
        Err(detached())
    }

    fn client_final(&mut self, _: &Credentials, _: &[u8]) -> Result<Vec<u8>> {
        Err(detached())
    }

    fn verify_server_final(&mut self, _: &[u8]) -> Result<()> {
        Err(detached())
    }
}

fn detached() -> ApolloError {
    ApolloError::Handshake("mechanism is busy".into())
}

/// Feed `message` in on the blocking pool. If the caller stops waiting,
/// `handshake` is left `Failed` and the step finishes in the background.
async fn on_message_blocking(handshake: &mut Handshake, message: Vec<u8>) -> Result<HandshakeAction> {
    let placeholder = Handshake {
        state: HandshakeState::Failed,
        mechanism: Box::new(Detached),
        credentials: handshake.credentials.clone(),
        nonce: handshake.nonce.clone(),
    };
    let mut owned = std::mem::replace(handshake, placeholder);
    let (owned, result) = tokio::task::spawn_blocking(move || {
        let result = owned.on_message(&message);
        (owned, result)
    })
    .await
    .map_err(|e| ApolloError::Handshake(format!("authentication step did not complete: {}", e)))?;
    *handshake = owned;
    result
}

async fn send<S>(stream: &mut S, message: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(message)
        .await
        .map_err(|e| ApolloError::Write(Arc::new(e)))?;
    stream
        .flush()
        .await
        .map_err(|e| ApolloError::Write(Arc::new(e)))
}
