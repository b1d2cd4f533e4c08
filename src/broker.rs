//! Correlation broker: matches response frames to waiting requests.
//!
//! Every request gets the next value of a wrapping 16-bit counter as its
//! correlation id. A pending entry (waiter + deadline) is registered
//! before the frame is written, and is removed exactly once: by the
//! matching response, by the deadline, or by the connection closing.
//! Whichever removes it settles the waiter; the others find nothing.
//!
//! Frames whose id has no pending entry (late or unsolicited) and frames
//! that do not decode are logged and dropped. Outbound payloads larger than
//! the configured maximum are rejected before an id is allocated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::codec::PduCodec;
use crate::error::{ApolloError, Result};
use crate::pdu::{ApolloPdu, Response};
use crate::protocol::{Frame, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::transport::{FrameHandler, Transport};

struct PendingEntry {
    tx: oneshot::Sender<Result<Response>>,
    deadline: Instant,
}

/// Pending-request table for one connection.
pub struct Broker {
    next_id: AtomicU16,
    pending: Mutex<HashMap<u16, PendingEntry>>,
    max_payload_size: u32,
}

impl Broker {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Broker refusing to send payloads above `max_payload_size` bytes.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            next_id: AtomicU16::new(0),
            pending: Mutex::new(HashMap::new()),
            max_payload_size,
        }
    }

    /// Allocate the next correlation id. Wraps after 65535.
    #[inline]
    pub fn next_correlation_id(&self) -> u16 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn register(&self, correlation_id: u16, deadline: Instant) -> oneshot::Receiver<Result<Response>> {
        let (tx, rx) = oneshot::channel();
        let displaced = self
            .pending
            .lock()
            .insert(correlation_id, PendingEntry { tx, deadline });
        if let Some(old) = displaced {
            warn!(correlation_id, "Correlation id reused while still pending, replacing");
            let _ = old.tx.send(Err(ApolloError::Timeout { correlation_id }));
        }
        rx
    }

    /// Validate and serialize `pdu`, enforcing the payload limit.
    fn encode(&self, pdu: &ApolloPdu) -> Result<Bytes> {
        let payload = PduCodec::encode(pdu)?;
        if payload.len() > self.max_payload_size as usize {
            return Err(ApolloError::Validation(format!(
                "payload of {} bytes exceeds maximum of {}",
                payload.len(),
                self.max_payload_size
            )));
        }
        Ok(payload)
    }

    /// Send `pdu` over `transport` and wait for its response.
    ///
    /// # Errors
    ///
    /// - `Validation` / `Encode`: the message was not sent (incomplete, or
    ///   larger than the payload limit)
    /// - `Write` / `ConnectionClosed`: the connection failed
    /// - `Timeout`: no response before `timeout`
    /// - `Server`: the response was an error payload
    pub async fn send(&self, transport: &Transport, pdu: &ApolloPdu, timeout: Duration) -> Result<Response> {
        let payload = self.encode(pdu)?;
        let correlation_id = self.next_correlation_id();
        let deadline = Instant::now() + timeout;
        let mut rx = self.register(correlation_id, deadline);

        trace!(correlation_id, procedure = pdu.procedure.name(), "Sending request");
        if let Err(e) = transport.send(correlation_id, payload).await {
            self.pending.lock().remove(&correlation_id);
            return Err(e);
        }

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(result)) => result?.into_result(),
            Ok(Err(_)) => Err(ApolloError::ConnectionClosed),
            Err(_) => {
                if self.pending.lock().remove(&correlation_id).is_some() {
                    debug!(correlation_id, ?timeout, "Request timed out");
                    return Err(ApolloError::Timeout { correlation_id });
                }
                // settled between the timer firing and the removal
                match rx.try_recv() {
                    Ok(result) => result?.into_result(),
                    Err(_) => Err(ApolloError::Timeout { correlation_id }),
                }
            }
        }
    }

    /// Settle the waiter for `frame`, if any.
    pub fn dispatch(&self, frame: Frame) {
        let correlation_id = frame.correlation_id();
        let response = match PduCodec::decode_response(frame.payload()) {
            Ok(response) => response,
            Err(e) => {
                warn!(correlation_id, error = %e, "Dropping undecodable frame");
                return;
            }
        };

        let entry = self.pending.lock().remove(&correlation_id);
        match entry {
            Some(entry) => {
                trace!(
                    correlation_id,
                    response = response.variant_name(),
                    remaining = ?entry.deadline.saturating_duration_since(Instant::now()),
                    "Response matched"
                );
                let _ = entry.tx.send(Ok(response));
            }
            None => {
                warn!(correlation_id, "Discarding response with no pending request");
            }
        }
    }

    /// Reject every pending request with `ConnectionClosed`.
    pub fn fail_all(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Failing pending requests");
        }
        for (_, entry) in drained {
            let _ = entry.tx.send(Err(ApolloError::ConnectionClosed));
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for Broker {
    fn on_frame(&self, frame: Frame) {
        self.dispatch(frame);
    }

    fn on_close(&self) {
        self.fail_all();
    }
}
