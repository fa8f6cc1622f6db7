//! Session over a single byte stream.
//!
//! Lifecycle:
//! 1. Split the stream into read and write halves
//! 2. Spawn the writer task for the write half
//! 3. Spawn the read loop, which routes frames to channels
//! 4. On end of stream or `close()`, tear down every channel

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::stream::{ChannelShared, MuxReader, MuxWriter};
use super::{Channel, Session};
use crate::error::{DuplexError, Result};
use crate::protocol::{flags, Frame, FrameBuffer, Header, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default size of the data frames a channel write is split into (32 KB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 32 * 1024;

/// Default limit on bytes buffered for one channel's reader (16 MB).
pub const DEFAULT_MAX_CHANNEL_BUFFER: usize = 16 * 1024 * 1024;

/// Size of the read buffer for the underlying stream.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for a [`MuxSession`].
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Largest data frame this side sends.
    pub max_frame_size: u32,
    /// Largest frame payload accepted from the remote side.
    pub max_payload_size: u32,
    /// Bytes a channel may hold for its reader before the channel is reset.
    pub max_channel_buffer: usize,
    /// Writer task configuration.
    pub writer: WriterConfig,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_channel_buffer: DEFAULT_MAX_CHANNEL_BUFFER,
            writer: WriterConfig::default(),
        }
    }
}

/// Which side opened a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum Origin {
    Local,
    Remote,
}

/// Identifies a channel within a session.
///
/// Each side allocates IDs independently, so the ID alone is ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct ChannelKey {
    pub(super) origin: Origin,
    pub(super) id: u32,
}

impl ChannelKey {
    /// Flags marking frames this side sends on the channel.
    pub(super) fn origin_flag(&self) -> u8 {
        match self.origin {
            Origin::Local => flags::FROM_OPENER,
            Origin::Remote => 0,
        }
    }

    pub(super) fn header(&self, control: u8, payload_length: u32) -> Header {
        Header::new(self.id, self.origin_flag() | control, payload_length)
    }
}

/// Channel state shared between the routing entry and the channel halves.
#[derive(Debug, Default)]
pub(super) struct ChannelState {
    /// Set when the remote side fully closed the channel.
    pub(super) remote_closed: AtomicBool,
    /// Set when the channel was dropped for overrunning its buffer.
    pub(super) reset: AtomicBool,
    /// Bytes routed to the reader and not yet taken by it.
    pub(super) buffered: AtomicUsize,
}

/// Routing entry for an open channel.
struct ChannelSlot {
    /// Feeds the channel's reader. `None` after the remote side sent EOF.
    inbound: Option<mpsc::UnboundedSender<Bytes>>,
    state: Arc<ChannelState>,
}

/// State shared by the session, its tasks, and its channels.
pub(super) struct SessionShared {
    pub(super) writer: WriterHandle,
    channels: Mutex<HashMap<ChannelKey, ChannelSlot>>,
    next_id: AtomicU32,
    pub(super) max_frame_size: usize,
    max_channel_buffer: usize,
    pub(super) shutdown: CancellationToken,
}

impl SessionShared {
    /// Register a channel and build its halves.
    fn register(self: &Arc<Self>, key: ChannelKey) -> Channel {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(ChannelState::default());
        self.channels.lock().insert(
            key,
            ChannelSlot {
                inbound: Some(tx),
                state: state.clone(),
            },
        );

        let shared = Arc::new(ChannelShared::new(self.clone(), key));
        let reader = MuxReader::new(shared.clone(), rx, state.clone());
        let writer = MuxWriter::new(shared, state);
        Channel::new(reader, writer)
    }

    /// Remove a channel's routing entry. Returns true if it was still present.
    pub(super) fn forget(&self, key: &ChannelKey) -> bool {
        self.channels.lock().remove(key).is_some()
    }

    /// Route one inbound frame.
    fn route(self: &Arc<Self>, frame: Frame, incoming: &mpsc::UnboundedSender<Channel>) {
        let header = frame.header;
        // Frames from the opener address channels the remote side opened.
        let origin = if header.is_from_opener() {
            Origin::Remote
        } else {
            Origin::Local
        };
        let key = ChannelKey {
            origin,
            id: header.channel_id,
        };

        if header.is_open() {
            if origin != Origin::Remote || self.channels.lock().contains_key(&key) {
                tracing::warn!("Ignoring invalid OPEN for channel {}", key.id);
                return;
            }
            let channel = self.register(key);
            if incoming.send(channel).is_err() {
                tracing::debug!("Session not accepting, closing channel {}", key.id);
            }
            return;
        }

        let mut channels = self.channels.lock();
        if header.is_eof() {
            if let Some(slot) = channels.get_mut(&key) {
                slot.inbound = None;
            }
        } else if header.is_close() {
            if let Some(slot) = channels.remove(&key) {
                slot.state.remote_closed.store(true, Ordering::Release);
            }
        } else if frame.payload.is_empty() {
            // Nothing to deliver.
        } else {
            let len = frame.payload.len();
            let overrun = match channels.get(&key) {
                Some(ChannelSlot {
                    inbound: Some(inbound),
                    state,
                }) => {
                    let buffered = state.buffered.fetch_add(len, Ordering::AcqRel) + len;
                    if buffered > self.max_channel_buffer {
                        true
                    } else {
                        let _ = inbound.send(frame.payload);
                        false
                    }
                }
                _ => {
                    tracing::debug!("Dropping data for closed channel {}", key.id);
                    false
                }
            };

            if overrun {
                tracing::warn!(
                    "Channel {} exceeded its {} byte buffer, resetting",
                    key.id,
                    self.max_channel_buffer
                );
                if let Some(slot) = channels.remove(&key) {
                    slot.state.reset.store(true, Ordering::Release);
                    slot.state.remote_closed.store(true, Ordering::Release);
                }
                let close = key.header(flags::CLOSE, 0);
                self.writer.send_detached(OutboundFrame::control(&close));
            }
        }
    }

    /// End the session: stop both tasks and close every channel.
    fn teardown(&self) {
        self.shutdown.cancel();
        let slots: Vec<ChannelSlot> = self.channels.lock().drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            slot.state.remote_closed.store(true, Ordering::Release);
        }
    }
}

/// A [`Session`] multiplexing channels over one `AsyncRead + AsyncWrite` stream.
///
/// Dropping the session closes it.
pub struct MuxSession {
    shared: Arc<SessionShared>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Channel>>,
    _reader_task: JoinHandle<()>,
    _writer_task: JoinHandle<Result<()>>,
}

impl MuxSession {
    /// Start a session over a full-duplex stream with the default config.
    pub fn new<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_config(io, MuxConfig::default())
    }

    /// Start a session over a full-duplex stream.
    pub fn with_config<T>(io: T, config: MuxConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::from_parts(reader, writer, config)
    }

    /// Start a session over separate read and write halves.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_parts<R, W>(reader: R, writer: W, config: MuxConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let max_payload_size = config.max_payload_size;
        let shutdown = CancellationToken::new();
        let (writer, writer_task) = spawn_writer_task(writer, config.writer, shutdown.clone());

        let shared = Arc::new(SessionShared {
            writer,
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            max_frame_size: config.max_frame_size.max(1) as usize,
            max_channel_buffer: config.max_channel_buffer,
            shutdown,
        });

        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let loop_shared = shared.clone();
        let reader_task = tokio::spawn(async move {
            if let Err(e) =
                read_loop(reader, loop_shared.clone(), incoming_tx, max_payload_size).await
            {
                tracing::error!("Mux read loop error: {}", e);
            }
            loop_shared.teardown();
        });

        Self {
            shared,
            incoming: tokio::sync::Mutex::new(incoming_rx),
            _reader_task: reader_task,
            _writer_task: writer_task,
        }
    }

    /// Check whether the session has ended.
    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl Session for MuxSession {
    fn open(&self) -> BoxFuture<'_, Result<Channel>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(DuplexError::ConnectionClosed);
            }

            let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
            let key = ChannelKey {
                origin: Origin::Local,
                id,
            };
            // Register before OPEN goes out so replies always find the channel.
            let channel = self.shared.register(key);
            let open = key.header(flags::OPEN, 0);
            self.shared.writer.send(OutboundFrame::control(&open)).await?;
            Ok(channel)
        })
    }

    fn accept(&self) -> BoxFuture<'_, Result<Option<Channel>>> {
        Box::pin(async move { Ok(self.incoming.lock().await.recv().await) })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.shared.teardown();
            Ok(())
        })
    }
}

impl Drop for MuxSession {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

/// Read frames from the stream and route them until end of stream or shutdown.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    shared: Arc<SessionShared>,
    incoming: mpsc::UnboundedSender<Channel>,
    max_payload_size: u32,
) -> Result<()> {
    let mut frame_buffer = FrameBuffer::with_max_payload(max_payload_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            _ = shared.shutdown.cancelled() => return Ok(()),
            read = reader.read(&mut buf) => match read {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) => return Err(DuplexError::Io(e)),
            },
        };

        for frame in frame_buffer.push(&buf[..n])? {
            shared.route(frame, &incoming);
        }
    }
}
