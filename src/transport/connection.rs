//! Authenticated connection: socket lifecycle, inbound reassembly and
//! outbound frames.
//!
//! Lifecycle:
//! 1. Open the socket (TCP + TLS) or accept a caller-supplied stream
//! 2. Run the authentication handshake with exclusive use of the stream
//! 3. Split the stream: write half to the writer task, read half to the
//!    read loop
//! 4. Read loop reassembles frames and hands each complete one to the
//!    [`FrameHandler`]
//! 5. `disconnect` (or EOF / read error) stops both tasks and notifies
//!    the handler once

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::tls::TlsConnector;
use crate::auth::{authenticate, Handshake, ScramMechanism};
use crate::config::ClientConfig;
use crate::error::{ApolloError, Result};
use crate::protocol::{Frame, FrameBuffer};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Read buffer size for the socket read loop.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Receives what the read loop produces.
pub trait FrameHandler: Send + Sync + 'static {
    /// A complete inbound frame.
    fn on_frame(&self, frame: Frame);

    /// The connection is gone. Called at most once.
    fn on_close(&self);
}

struct Shared {
    closed: AtomicBool,
    writer: WriterHandle,
    handler: Arc<dyn FrameHandler>,
}

impl Shared {
    /// Returns false if the connection was already closed.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.writer.shutdown();
        self.handler.on_close();
        true
    }
}

/// An authenticated connection to the server.
pub struct Transport {
    shared: Arc<Shared>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Transport {
    /// Open a TLS socket to `config.connect` and authenticate on it.
    ///
    /// # Errors
    ///
    /// `Connect` / `Tls` for socket failures, `Handshake` / `AuthTimeout`
    /// if authentication does not complete.
    pub async fn connect(
        config: &ClientConfig,
        mechanism: Box<dyn ScramMechanism>,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<Self> {
        debug!(host = %config.connect.host, port = config.connect.port, "Accessing server");
        let connector = TlsConnector::new(config.connect.reject_unauthorized)?;
        let stream = connector.connect(&config.connect).await?;
        debug!("Socket is opened successfully");
        Self::establish(stream, config, mechanism, handler).await
    }

    /// Authenticate over an already open stream and start the read loop.
    ///
    /// No byte from `stream` reaches `handler` before authentication has
    /// succeeded. On failure the stream is shut down and dropped.
    pub async fn establish<S>(
        mut stream: S,
        config: &ClientConfig,
        mechanism: Box<dyn ScramMechanism>,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut handshake = Handshake::new(mechanism, config.credentials.clone(), config.nonce_length);
        if let Err(e) = authenticate(&mut stream, &mut handshake, config.auth_timeout()).await {
            let _ = stream.shutdown().await;
            return Err(e);
        }
        debug!("Authenticated");

        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, DEFAULT_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            writer,
            handler,
        });

        let buffer = FrameBuffer::with_max_payload(config.max_payload_size);
        let reader_task = tokio::spawn(read_loop(read_half, buffer, shared.clone()));

        Ok(Self {
            shared,
            reader_task: Mutex::new(Some(reader_task)),
            writer_task: Mutex::new(Some(writer_task)),
        })
    }

    /// Frame `payload` under `correlation_id` and write it.
    ///
    /// Resolves once the frame has been flushed to the socket.
    pub async fn send(&self, correlation_id: u16, payload: Bytes) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(ApolloError::ConnectionClosed);
        }
        self.shared
            .writer
            .send(OutboundFrame::new(correlation_id, payload))
            .await
    }

    /// Whether the connection is still usable.
    pub fn is_connected(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire) && !self.shared.writer.is_closed()
    }

    /// Close the connection. Safe to call more than once.
    pub async fn disconnect(&self) {
        if self.shared.close() {
            debug!("Disconnecting");
        }
        if let Some(reader) = self.reader_task.lock().take() {
            reader.abort();
        }
        let writer = self.writer_task.lock().take();
        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Writer stopped with error"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "Writer task panicked"),
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shared.close();
        if let Some(reader) = self.reader_task.get_mut().take() {
            reader.abort();
        }
    }
}

async fn read_loop<R>(mut reader: R, mut buffer: FrameBuffer, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("Server closed the connection");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Read loop error");
                break;
            }
        };

        for frame in buffer.push(&buf[..n]) {
            shared.handler.on_frame(frame);
        }
    }

    if buffer.dropped() > 0 {
        debug!(dropped = buffer.dropped(), "Malformed frames dropped on this connection");
    }
    shared.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{HandshakeAction, ScramMechanism};
    use crate::config::{ConnectOptions, Credentials};
    use crate::protocol::frame;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::sync::mpsc;

    /// Mechanism that accepts any server message.
    struct Plain;

    impl ScramMechanism for Plain {
        fn name(&self) -> &'static str {
            "PLAIN-TEST"
        }
        fn client_first(&mut self, _: &Credentials, _: &str) -> Result<Vec<u8>> {
            Ok(b"first".to_vec())
        }
        fn client_final(&mut self, _: &Credentials, _: &[u8]) -> Result<Vec<u8>> {
            Ok(b"final".to_vec())
        }
        fn verify_server_final(&mut self, message: &[u8]) -> Result<()> {
            if message == b"ok" {
                Ok(())
            } else {
                Err(ApolloError::Handshake("rejected".into()))
            }
        }
    }

    struct Collect {
        frames: mpsc::UnboundedSender<Frame>,
        closes: AtomicUsize,
    }

    impl FrameHandler for Collect {
        fn on_frame(&self, frame: Frame) {
            let _ = self.frames.send(frame);
        }
        fn on_close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::new(
            ConnectOptions::new("localhost", 1),
            Credentials::new("admin", "admin"),
        )
    }

    async fn server_auth(server: &mut DuplexStream, final_message: &[u8]) {
        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"first");
        server.write_all(b"challenge").await.unwrap();
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"final");
        server.write_all(final_message).await.unwrap();
    }

    fn collector() -> (Arc<Collect>, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Collect {
                frames: tx,
                closes: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    #[tokio::test]
    async fn test_frames_reach_handler_after_auth() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (handler, mut frames) = collector();

        let server_task = tokio::spawn(async move {
            server_auth(&mut server, b"ok").await;
            let mut request = [0u8; 8];
            server.read_exact(&mut request).await.unwrap();
            // two frames in one write, then half of a third
            let mut bytes = frame(1, b"one");
            bytes.extend(frame(2, b"two"));
            let third = frame(3, b"three");
            bytes.extend_from_slice(&third[..4]);
            server.write_all(&bytes).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(&third[4..]).await.unwrap();
            server
        });

        let transport = Transport::establish(client, &config(), Box::new(Plain), handler.clone())
            .await
            .unwrap();
        assert!(transport.is_connected());
        transport.send(9, Bytes::from_static(b"go")).await.unwrap();

        for (cid, payload) in [(1u16, &b"one"[..]), (2, b"two"), (3, b"three")] {
            let frame = frames.recv().await.unwrap();
            assert_eq!(frame.correlation_id(), cid);
            assert_eq!(frame.payload(), payload);
        }
        let _server = server_task.await.unwrap();
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_send_writes_frame() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (handler, _frames) = collector();

        let server_task = tokio::spawn(async move {
            server_auth(&mut server, b"ok").await;
            let mut buf = [0u8; 9];
            server.read_exact(&mut buf).await.unwrap();
            buf
        });

        let transport = Transport::establish(client, &config(), Box::new(Plain), handler)
            .await
            .unwrap();
        transport.send(7, Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(server_task.await.unwrap(), [0, 0, 0, 5, 0, 7, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_rejected_auth_fails_establish() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (handler, _frames) = collector();

        tokio::spawn(async move {
            server_auth(&mut server, b"no").await;
            server
        });

        let result = Transport::establish(client, &config(), Box::new(Plain), handler.clone()).await;
        assert!(matches!(result, Err(ApolloError::Handshake(_))));
        assert_eq!(handler.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (handler, _frames) = collector();

        let server_task = tokio::spawn(async move {
            server_auth(&mut server, b"ok").await;
            let mut rest = Vec::new();
            server.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let transport = Transport::establish(client, &config(), Box::new(Plain), handler.clone())
            .await
            .unwrap();
        transport.disconnect().await;
        transport.disconnect().await;

        assert!(!transport.is_connected());
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
        assert!(server_task.await.unwrap().is_empty());
        assert!(matches!(
            transport.send(1, Bytes::from_static(b"x")).await,
            Err(ApolloError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_server_close_notifies_handler() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (handler, _frames) = collector();

        let server_task = tokio::spawn(async move {
            server_auth(&mut server, b"ok").await;
            server
        });

        let transport = Transport::establish(client, &config(), Box::new(Plain), handler.clone())
            .await
            .unwrap();
        drop(server_task.await.unwrap());

        for _ in 0..50 {
            if !transport.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!transport.is_connected());
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_plain_mechanism_drives_handshake() {
        let mut hs = Handshake::with_nonce(Box::new(Plain), Credentials::new("a", "b"), "n");
        assert_eq!(hs.start().unwrap(), b"first".to_vec());
        assert_eq!(
            hs.on_message(b"x").unwrap(),
            HandshakeAction::Send(b"final".to_vec())
        );
        assert_eq!(hs.on_message(b"ok").unwrap(), HandshakeAction::Complete);
    }
}
