//! SCRAM mechanisms (RFC 5802).
//!
//! A mechanism turns credentials plus a client nonce into the client-first
//! message, answers the server-first challenge with the client-final
//! message, and checks the server-final signature. The handshake treats
//! every message as an opaque byte buffer, so any SCRAM variant can be
//! plugged in through [`ScramMechanism`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::config::Credentials;
use crate::error::{ApolloError, Result};

type HmacSha1 = Hmac<Sha1>;

const SHA1_LEN: usize = 20;

/// Base64 of the `n,,` GS2 header (no channel binding).
const CHANNEL_BINDING: &str = "biws";

/// Largest PBKDF2 iteration count accepted from a server-first message.
/// Key derivation cost grows linearly with it.
pub const MAX_ITERATIONS: u32 = 100_000;

/// Client side of a SCRAM exchange.
pub trait ScramMechanism: Send {
    /// Mechanism name, e.g. `SCRAM-SHA-1`.
    fn name(&self) -> &'static str;

    /// Produce the client-first message.
    fn client_first(&mut self, credentials: &Credentials, nonce: &str) -> Result<Vec<u8>>;

    /// Consume the server-first message and produce the client-final message.
    fn client_final(&mut self, credentials: &Credentials, server_first: &[u8]) -> Result<Vec<u8>>;

    /// Consume the server-final message. Fails unless the server proved
    /// knowledge of the password.
    fn verify_server_final(&mut self, server_final: &[u8]) -> Result<()>;
}

enum Stage {
    Initial,
    ClientFirstSent {
        client_first_bare: String,
        nonce: String,
    },
    ClientFinalSent {
        auth_message: String,
        salted_password: Zeroizing<[u8; SHA1_LEN]>,
    },
    Done,
}

/// SCRAM-SHA-1.
pub struct ScramSha1 {
    stage: Stage,
}

impl ScramSha1 {
    pub fn new() -> Self {
        Self {
            stage: Stage::Initial,
        }
    }
}

impl Default for ScramSha1 {
    fn default() -> Self {
        Self::new()
    }
}

impl ScramMechanism for ScramSha1 {
    fn name(&self) -> &'static str {
        "SCRAM-SHA-1"
    }

    fn client_first(&mut self, credentials: &Credentials, nonce: &str) -> Result<Vec<u8>> {
        if !matches!(self.stage, Stage::Initial) {
            return Err(handshake("client-first already produced"));
        }
        let client_first_bare = format!("n={},r={}", escape_username(&credentials.username), nonce);
        let message = format!("n,,{}", client_first_bare);
        self.stage = Stage::ClientFirstSent {
            client_first_bare,
            nonce: nonce.to_string(),
        };
        Ok(message.into_bytes())
    }

    fn client_final(&mut self, credentials: &Credentials, server_first: &[u8]) -> Result<Vec<u8>> {
        let (client_first_bare, nonce) = match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::ClientFirstSent {
                client_first_bare,
                nonce,
            } => (client_first_bare, nonce),
            _ => return Err(handshake("unexpected server-first")),
        };

        let server_first = std::str::from_utf8(server_first)
            .map_err(|_| handshake("server-first is not UTF-8"))?;
        let challenge = parse_server_first(server_first)?;

        if !challenge.nonce.starts_with(&nonce) || challenge.nonce.len() == nonce.len() {
            return Err(handshake("server nonce does not extend client nonce"));
        }

        let mut salted_password = Zeroizing::new([0u8; SHA1_LEN]);
        pbkdf2_hmac::<Sha1>(
            credentials.password.as_bytes(),
            &challenge.salt,
            challenge.iterations,
            &mut *salted_password,
        );

        let without_proof = format!("c={},r={}", CHANNEL_BINDING, challenge.nonce);
        let auth_message = format!("{},{},{}", client_first_bare, server_first, without_proof);

        let client_key = hmac_sha1(&*salted_password, b"Client Key")?;
        let stored_key: [u8; SHA1_LEN] = Sha1::digest(client_key).into();
        let client_signature = hmac_sha1(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        self.stage = Stage::ClientFinalSent {
            auth_message,
            salted_password,
        };
        Ok(format!("{},p={}", without_proof, BASE64.encode(proof)).into_bytes())
    }

    fn verify_server_final(&mut self, server_final: &[u8]) -> Result<()> {
        let (auth_message, salted_password) = match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::ClientFinalSent {
                auth_message,
                salted_password,
            } => (auth_message, salted_password),
            _ => return Err(handshake("unexpected server-final")),
        };

        let server_final = std::str::from_utf8(server_final)
            .map_err(|_| handshake("server-final is not UTF-8"))?;

        if let Some(reason) = server_final.strip_prefix("e=") {
            return Err(handshake(&format!("server rejected authentication: {}", reason)));
        }
        let signature = server_final
            .split(',')
            .find_map(|part| part.strip_prefix("v="))
            .ok_or_else(|| handshake("server-final carries no signature"))?;
        let received = BASE64
            .decode(signature)
            .map_err(|_| handshake("server signature is not base64"))?;

        let server_key = hmac_sha1(&*salted_password, b"Server Key")?;
        let expected = hmac_sha1(&server_key, auth_message.as_bytes())?;

        if received.ct_eq(&expected).into() {
            Ok(())
        } else {
            Err(handshake("server signature mismatch"))
        }
    }
}

fn handshake(reason: &str) -> ApolloError {
    ApolloError::Handshake(format!("SCRAM: {}", reason))
}

struct Challenge {
    nonce: String,
    salt: Vec<u8>,
    iterations: u32,
}

/// Parse `r=<nonce>,s=<salt>,i=<iterations>[,...]`.
fn parse_server_first(message: &str) -> Result<Challenge> {
    if message.starts_with("m=") {
        return Err(handshake("server requires an unsupported extension"));
    }
    if let Some(reason) = message.strip_prefix("e=") {
        return Err(handshake(&format!("server rejected authentication: {}", reason)));
    }

    let mut nonce = None;
    let mut salt = None;
    let mut iterations = None;
    for part in message.split(',') {
        if let Some(value) = part.strip_prefix("r=") {
            nonce = Some(value.to_string());
        } else if let Some(value) = part.strip_prefix("s=") {
            salt = Some(BASE64.decode(value).map_err(|_| handshake("salt is not base64"))?);
        } else if let Some(value) = part.strip_prefix("i=") {
            iterations = Some(
                value
                    .parse::<u32>()
                    .map_err(|_| handshake("iteration count is not a number"))?,
            );
        }
    }

    match (nonce, salt, iterations) {
        (Some(_), Some(_), Some(0)) => Err(handshake("iteration count is zero")),
        (Some(_), Some(_), Some(i)) if i > MAX_ITERATIONS => Err(handshake(&format!(
            "iteration count {} exceeds maximum of {}",
            i, MAX_ITERATIONS
        ))),
        (Some(nonce), Some(salt), Some(iterations)) => Ok(Challenge {
            nonce,
            salt,
            iterations,
        }),
        _ => Err(handshake("server-first is missing r, s or i")),
    }
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> Result<[u8; SHA1_LEN]> {
    let mut mac =
        <HmacSha1 as Mac>::new_from_slice(key).map_err(|_| handshake("invalid HMAC key"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// `,` and `=` are reserved in SCRAM attribute values.
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}
