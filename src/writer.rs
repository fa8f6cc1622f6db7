//! Dedicated writer task for a mux session.
//!
//! Every channel of a session writes through one task that owns the write
//! half of the underlying stream. Frames arrive over a bounded mpsc queue,
//! which is also the session's backpressure: a full queue parks writers.
//!
//! ```text
//! Channel 1 ─┐
//! Channel 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► stream
//! Channel N ─┘
//! ```
//!
//! Frames that are ready together are coalesced into a single write.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, PollSender};

use crate::error::{DuplexError, Result};
use crate::protocol::{Header, HEADER_SIZE};

/// Default capacity of the outbound frame queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to coalesce in a single write.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the stream.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header.
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes (empty for control frames).
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    #[inline]
    pub fn new(header: &Header, payload: Bytes) -> Self {
        Self {
            header: header.encode(),
            payload,
        }
    }

    /// Create a control frame (no payload).
    #[inline]
    pub fn control(header: &Header) -> Self {
        Self::new(header, Bytes::new())
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Capacity of the outbound frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable; every channel of a session holds one.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame, waiting for room in the queue.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| DuplexError::ConnectionClosed)
    }

    /// Queue a frame from synchronous code (e.g. `Drop`).
    ///
    /// When the queue is full the send is moved onto a spawned task.
    pub fn send_detached(&self, frame: OutboundFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(frame)) => {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let tx = self.tx.clone();
                    runtime.spawn(async move {
                        let _ = tx.send(frame).await;
                    });
                }
            }
        }
    }

    /// A poll-based sender for use inside `AsyncWrite` implementations.
    pub fn poll_sender(&self) -> PollSender<OutboundFrame> {
        PollSender::new(self.tx.clone())
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends when every handle is dropped or `shutdown` is cancelled;
/// either way the underlying writer is shut down on exit.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    shutdown: CancellationToken,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer, shutdown));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();

    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        buf.clear();
        encode_frame(&mut buf, &first);
        let mut batched = 1;
        while batched < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => {
                    encode_frame(&mut buf, &frame);
                    batched += 1;
                }
                Err(_) => break,
            }
        }

        writer.write_all(&buf).await?;
        writer.flush().await?;
    }

    writer.shutdown().await?;
    Ok(())
}

fn encode_frame(buf: &mut BytesMut, frame: &OutboundFrame) {
    buf.reserve(frame.size());
    buf.put_slice(&frame.header);
    buf.put_slice(&frame.payload);
}
