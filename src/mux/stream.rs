//! Channel halves for [`MuxSession`](super::MuxSession).

use std::io;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use super::session::{ChannelKey, ChannelState, SessionShared};
use crate::protocol::flags;
use crate::writer::OutboundFrame;

/// State shared by the two halves of one channel.
///
/// Dropping the last half closes the channel.
pub(super) struct ChannelShared {
    session: Arc<SessionShared>,
    key: ChannelKey,
}

impl ChannelShared {
    pub(super) fn new(session: Arc<SessionShared>, key: ChannelKey) -> Self {
        Self { session, key }
    }
}

impl Drop for ChannelShared {
    fn drop(&mut self) {
        // Skip CLOSE if the remote side already closed the channel.
        if self.session.forget(&self.key) && !self.session.shutdown.is_cancelled() {
            let close = self.key.header(flags::CLOSE, 0);
            self.session
                .writer
                .send_detached(OutboundFrame::control(&close));
        }
    }
}

/// Read half of a mux channel.
///
/// Fails with `ConnectionReset` once the channel overran its buffer.
pub(super) struct MuxReader {
    _channel: Arc<ChannelShared>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    state: Arc<ChannelState>,
    chunk: Bytes,
}

impl MuxReader {
    pub(super) fn new(
        channel: Arc<ChannelShared>,
        inbound: mpsc::UnboundedReceiver<Bytes>,
        state: Arc<ChannelState>,
    ) -> Self {
        Self {
            _channel: channel,
            inbound,
            state,
            chunk: Bytes::new(),
        }
    }
}

fn channel_reset() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, "channel buffer overrun")
}

impl AsyncBufRead for MuxReader {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        let this = self.get_mut();
        if this.state.reset.load(Ordering::Acquire) {
            return Poll::Ready(Err(channel_reset()));
        }
        while this.chunk.is_empty() {
            match ready!(this.inbound.poll_recv(cx)) {
                Some(bytes) => {
                    this.state.buffered.fetch_sub(bytes.len(), Ordering::AcqRel);
                    this.chunk = bytes;
                }
                None if this.state.reset.load(Ordering::Acquire) => {
                    return Poll::Ready(Err(channel_reset()));
                }
                None => return Poll::Ready(Ok(&[])),
            }
        }
        Poll::Ready(Ok(&this.chunk[..]))
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        let amt = amt.min(self.chunk.len());
        self.chunk.advance(amt);
    }
}

impl AsyncRead for MuxReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let available = ready!(self.as_mut().poll_fill_buf(cx))?;
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        self.consume(n);
        Poll::Ready(Ok(()))
    }
}

/// Write half of a mux channel.
///
/// Each write becomes at most one data frame; `shutdown` sends EOF.
pub(super) struct MuxWriter {
    channel: Arc<ChannelShared>,
    sender: PollSender<OutboundFrame>,
    state: Arc<ChannelState>,
    shut_down: bool,
}

impl MuxWriter {
    pub(super) fn new(channel: Arc<ChannelShared>, state: Arc<ChannelState>) -> Self {
        let sender = channel.session.writer.poll_sender();
        Self {
            channel,
            sender,
            state,
            shut_down: false,
        }
    }

    fn remote_closed(&self) -> bool {
        self.state.remote_closed.load(Ordering::Acquire)
    }

    fn reserve(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.sender.poll_reserve(cx)).map_err(|_| session_closed())?;
        Poll::Ready(Ok(()))
    }

    fn send(&mut self, frame: OutboundFrame) -> io::Result<()> {
        self.sender.send_item(frame).map_err(|_| session_closed())
    }
}

fn session_closed() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "session closed")
}

impl AsyncWrite for MuxWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.shut_down || self.remote_closed() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "channel closed for writing",
            )));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        ready!(self.reserve(cx))?;
        let n = buf.len().min(self.channel.session.max_frame_size);
        let header = self.channel.key.header(0, n as u32);
        self.send(OutboundFrame::new(&header, Bytes::copy_from_slice(&buf[..n])))?;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // The writer task flushes after every batch.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.shut_down {
            return Poll::Ready(Ok(()));
        }
        if self.remote_closed() {
            self.shut_down = true;
            return Poll::Ready(Ok(()));
        }

        ready!(self.reserve(cx))?;
        let eof = self.channel.key.header(flags::EOF, 0);
        self.send(OutboundFrame::control(&eof))?;
        self.shut_down = true;
        Poll::Ready(Ok(()))
    }
}
