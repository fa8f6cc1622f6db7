//! Mux module - multiplexed channels over a single byte stream.
//!
//! A [`Session`] opens and accepts [`Channel`]s. Each channel is an
//! independent, ordered, full-duplex byte stream with half-close:
//! shutting down the write half signals end of stream to the remote reader,
//! dropping both halves closes the channel.
//!
//! [`MuxSession`] is the bundled implementation. It frames channel traffic
//! with the binary format in [`crate::protocol`] and runs one reader task and
//! one writer task per session.
//!
//! # Example
//!
//! ```ignore
//! use duplex_rpc::mux::{MuxSession, Session};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! let (a, b) = tokio::io::duplex(64 * 1024);
//! let (client, server) = (MuxSession::new(a), MuxSession::new(b));
//!
//! let mut channel = client.open().await?;
//! channel.writer.write_all(b"ping").await?;
//! channel.writer.shutdown().await?;
//!
//! let mut accepted = server.accept().await?.unwrap();
//! let mut buf = Vec::new();
//! accepted.reader.read_to_end(&mut buf).await?;
//! ```

mod session;
mod stream;

use futures::future::BoxFuture;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};

use crate::error::Result;

pub use session::{MuxConfig, MuxSession, DEFAULT_MAX_CHANNEL_BUFFER, DEFAULT_MAX_FRAME_SIZE};

/// Read half of a channel.
pub type ChannelReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Write half of a channel. `shutdown` half-closes the channel.
pub type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A bidirectional byte stream multiplexed over a session.
pub struct Channel {
    /// Bytes written by the remote side.
    pub reader: ChannelReader,
    /// Bytes sent to the remote side.
    pub writer: ChannelWriter,
}

impl Channel {
    /// Create a channel from its two halves.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Adapt a single full-duplex stream into a channel.
    pub fn from_io<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::new(BufReader::new(reader), writer)
    }

    /// Split the channel into its read and write halves.
    pub fn into_split(self) -> (ChannelReader, ChannelWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

/// A multiplexed connection able to open and accept channels.
///
/// Both sides of a connection may open channels at any time.
pub trait Session: Send + Sync + 'static {
    /// Open a new channel to the remote side.
    fn open(&self) -> BoxFuture<'_, Result<Channel>>;

    /// Wait for the next channel opened by the remote side.
    ///
    /// Returns `None` once the session has ended.
    fn accept(&self) -> BoxFuture<'_, Result<Option<Channel>>>;

    /// Close the session and every channel on it.
    fn close(&self) -> BoxFuture<'_, Result<()>>;
}
