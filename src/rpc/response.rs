//! Caller-side view of a call's outcome.

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tokio::task::JoinHandle;

use super::{Replies, ResponseHeader};
use crate::codec::{Codec, Decoder, Encoder};
use crate::error::{DuplexError, RemoteError, Result};

/// The response to a call.
///
/// Holds the response header and the decoded reply values. When the handler
/// continued the call, the response also owns both halves of the channel
/// and can keep exchanging values with the handler.
pub struct Response<C, R> {
    header: ResponseHeader,
    replies: Option<R>,
    channel: Option<(Decoder<C>, Outbound<C>)>,
}

/// Write half of a call's channel.
pub(super) enum Outbound<C> {
    Ready(Encoder<C>),
    /// An argument stream is still being sent.
    Pumping(PumpTask<C>),
    /// The argument task died and took the write half with it.
    Lost,
}

/// Task sending a stream of arguments; yields the encoder once the stream ends.
///
/// Aborted when dropped.
pub(super) struct PumpTask<C>(pub(super) JoinHandle<Encoder<C>>);

impl<C> Drop for PumpTask<C> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Read a response header and the reply values that follow it.
///
/// An error response carries a single placeholder value, which is skipped.
pub(super) async fn read_reply<C: Codec, R: Replies>(
    decoder: &mut Decoder<C>,
) -> Result<(ResponseHeader, Option<R>)> {
    let header: ResponseHeader = decoder.receive().await?;
    if header.error.is_some() {
        decoder.try_receive::<IgnoredAny>().await?;
        return Ok((header, None));
    }
    let replies = R::receive(decoder).await?;
    Ok((header, Some(replies)))
}

impl<C: Codec, R> Response<C, R> {
    /// Assemble a response; the channel is kept only if the call was continued.
    pub(super) fn new(
        header: ResponseHeader,
        replies: Option<R>,
        decoder: Decoder<C>,
        outbound: Outbound<C>,
    ) -> Self {
        let channel = if header.continued {
            Some((decoder, outbound))
        } else {
            None
        };
        Self {
            header,
            replies,
            channel,
        }
    }

    /// The error sent by the handler, if any.
    pub fn err(&self) -> Option<RemoteError> {
        self.header.error.as_deref().map(RemoteError::new)
    }

    /// Check whether the handler kept the channel open.
    pub fn is_continued(&self) -> bool {
        self.header.continued
    }

    /// The response header.
    pub fn header(&self) -> &ResponseHeader {
        &self.header
    }

    /// The reply values. `None` for an error response.
    pub fn replies(&self) -> Option<&R> {
        self.replies.as_ref()
    }

    /// Take the reply values, leaving the channel in place.
    pub fn take_replies(&mut self) -> Option<R> {
        self.replies.take()
    }

    /// Convert into the reply values, or the handler's error.
    ///
    /// Drops the channel of a continued response.
    pub fn into_result(self) -> Result<R> {
        if let Some(err) = self.err() {
            return Err(err.into());
        }
        self.replies
            .ok_or_else(|| DuplexError::Protocol("Reply values already taken".to_string()))
    }

    fn decoder(&mut self) -> Result<&mut Decoder<C>> {
        match self.channel.as_mut() {
            Some((decoder, _)) => Ok(decoder),
            None => Err(DuplexError::NotContinued),
        }
    }

    /// Borrow both halves, first waiting for any argument stream to end.
    async fn halves(&mut self) -> Result<(&mut Decoder<C>, &mut Encoder<C>)> {
        let (decoder, outbound) = self.channel.as_mut().ok_or(DuplexError::NotContinued)?;
        if let Outbound::Pumping(task) = outbound {
            *outbound = match (&mut task.0).await {
                Ok(encoder) => Outbound::Ready(encoder),
                Err(e) => {
                    tracing::debug!("Argument stream task failed: {}", e);
                    Outbound::Lost
                }
            };
        }
        match outbound {
            Outbound::Ready(encoder) => Ok((decoder, encoder)),
            _ => Err(DuplexError::ChannelClosed),
        }
    }

    /// Send a value to the handler of a continued call.
    ///
    /// Waits for the argument stream of [`Caller::call_stream`](super::Caller::call_stream)
    /// to end first.
    pub async fn send<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.halves().await?.1.send(value).await
    }

    /// Decode the next value from a continued call.
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.decoder()?.receive().await
    }

    /// Decode the next value, or `None` once the handler closed its side.
    pub async fn try_receive<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        self.decoder()?.try_receive().await
    }

    /// Consume the next value without keeping it.
    pub async fn receive_discard(&mut self) -> Result<()> {
        self.decoder()?.receive_discard().await
    }

    /// Half-close a continued call. The handler sees end of stream.
    pub async fn close_write(&mut self) -> Result<()> {
        self.halves().await?.1.close_write().await
    }

    /// Close the channel of a continued call. Does nothing otherwise.
    ///
    /// A still running argument stream is stopped.
    pub async fn close(&mut self) -> Result<()> {
        match self.channel.take() {
            Some((_, Outbound::Ready(mut encoder))) => encoder.close_write().await,
            _ => Ok(()),
        }
    }

    /// Borrow both halves of a continued call at once.
    pub async fn split_mut(&mut self) -> Result<(&mut Decoder<C>, &mut Encoder<C>)> {
        self.halves().await
    }
}

impl<C, R> std::fmt::Debug for Response<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("header", &self.header)
            .field("open", &self.channel.is_some())
            .finish_non_exhaustive()
    }
}
