//! Dedicated writer task: the only owner of the socket's write half.
//!
//! Callers hand frames to the task over an mpsc channel and await a
//! per-frame completion. Frames are written in the order they were queued,
//! so requests reach the socket in call order no matter how many tasks
//! issue them.
//!
//! # Architecture
//!
//! ```text
//! request 1 ─┐
//! request 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► socket
//! request N ─┘        ◄── oneshot completion ──┘
//! ```
//!
//! Frames that are ready together are batched into one vectored write.

use std::io::IoSlice;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::error::{ApolloError, Result};
use crate::protocol::{Header, HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded 6-byte header.
    pub header: [u8; HEADER_SIZE],
    /// Serialized protocol message.
    pub payload: Bytes,
    done: Option<oneshot::Sender<Result<()>>>,
}

impl OutboundFrame {
    /// Frame `payload` under `correlation_id`.
    #[inline]
    pub fn new(correlation_id: u16, payload: Bytes) -> Self {
        Self {
            header: Header::new(correlation_id, payload.len() as u32).encode(),
            payload,
            done: None,
        }
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    fn complete(&mut self, result: Result<()>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(result);
        }
    }
}

/// Handle for queueing frames on the writer task. Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl WriterHandle {
    /// Queue a frame and wait until it has been written and flushed.
    ///
    /// # Errors
    ///
    /// [`ApolloError::Write`] if the socket write failed,
    /// [`ApolloError::ConnectionClosed`] if the writer has stopped.
    pub async fn send(&self, mut frame: OutboundFrame) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        frame.done = Some(done_tx);
        self.tx
            .send(frame)
            .await
            .map_err(|_| ApolloError::ConnectionClosed)?;
        done_rx.await.map_err(|_| ApolloError::ConnectionClosed)?
    }

    /// Ask the writer to flush, close the write half and stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether the writer task has stopped accepting frames.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task over `writer`.
///
/// The JoinHandle resolves when the task stops: after [`WriterHandle::shutdown`],
/// after every handle is dropped, or on the first write error.
pub fn spawn_writer_task<W>(writer: W, channel_capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = WriterHandle {
        tx,
        shutdown: Arc::new(shutdown_tx),
    };
    let task = tokio::spawn(writer_loop(rx, shutdown_rx, writer));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut shutdown: watch::Receiver<bool>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        trace!(frames = batch.len(), "Writing batch");
        match write_batch(&mut writer, &batch).await {
            Ok(()) => {
                for frame in &mut batch {
                    frame.complete(Ok(()));
                }
            }
            Err(e) => {
                error!(error = %e, "Socket write failed");
                let shared = Arc::new(e);
                for frame in &mut batch {
                    frame.complete(Err(ApolloError::Write(shared.clone())));
                }
                return Err(ApolloError::Write(shared));
            }
        }
    }

    rx.close();
    debug!("Writer stopping");
    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of frames with scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            ));
        }
        total_written += written;
    }

    writer.flush().await
}

/// IoSlices for the bytes of `batch` after the first `skip_bytes`.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.header[..], &frame.payload[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(offset)..]));
            }
            offset = end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt};

    use crate::protocol::{unframe, Unframe};

    #[test]
    fn test_outbound_frame_header() {
        let frame = OutboundFrame::new(513, Bytes::from_static(b"hello"));
        assert_eq!(frame.header, [0, 0, 0, 7, 0x02, 0x01]);
        assert_eq!(frame.size(), HEADER_SIZE + 5);
    }

    #[tokio::test]
    async fn test_send_resolves_after_write() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        handle
            .send(OutboundFrame::new(42, Bytes::from_static(b"hello")))
            .await
            .unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        match unframe(&buf[..n]) {
            Unframe::Complete {
                correlation_id,
                payload,
                ..
            } => {
                assert_eq!(correlation_id, 42);
                assert_eq!(payload, b"hello");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_frames_written_in_queue_order() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        for i in 0..10u16 {
            let payload = Bytes::copy_from_slice(&i.to_be_bytes());
            handle.send(OutboundFrame::new(i, payload)).await.unwrap();
        }

        let mut buf = vec![0u8; 10 * (HEADER_SIZE + 2)];
        server.read_exact(&mut buf).await.unwrap();
        for (i, chunk) in buf.chunks(HEADER_SIZE + 2).enumerate() {
            assert_eq!(u16::from_be_bytes([chunk[4], chunk[5]]), i as u16);
        }
    }

    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")))
        }
        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_error_reported_to_sender() {
        let (handle, task) = spawn_writer_task(BrokenWriter, 8);
        let err = handle
            .send(OutboundFrame::new(1, Bytes::from_static(b"x")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApolloError::Write(_)));
        assert!(task.await.unwrap().is_err());

        let err = handle
            .send(OutboundFrame::new(2, Bytes::from_static(b"y")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApolloError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_shutdown_closes_write_half() {
        let (client, mut server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, 8);

        handle.shutdown();
        task.await.unwrap().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
        assert!(handle.is_closed());
        assert!(matches!(
            handle
                .send(OutboundFrame::new(1, Bytes::from_static(b"x")))
                .await,
            Err(ApolloError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_writer_stops_when_handles_dropped() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, 8);
        drop(handle);
        assert!(task.await.unwrap().is_ok());
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![OutboundFrame::new(42, Bytes::from_static(b"hello"))];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_build_remaining_slices_partial_header() {
        let batch = vec![OutboundFrame::new(42, Bytes::from_static(b"hello"))];
        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), HEADER_SIZE - 5);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn test_build_remaining_slices_into_second_frame() {
        let batch = vec![
            OutboundFrame::new(1, Bytes::from_static(b"abc")),
            OutboundFrame::new(2, Bytes::from_static(b"defg")),
        ];
        let slices = build_remaining_slices(&batch, HEADER_SIZE + 3 + 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), HEADER_SIZE - 2);
        assert_eq!(&*slices[1], b"defg");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5)
            .map(|i| OutboundFrame::new(i, Bytes::from_static(b"abc")))
            .collect();

        write_batch(&mut buf, &batch).await.unwrap();
        assert_eq!(buf.into_inner().len(), 5 * (HEADER_SIZE + 3));
    }
}
