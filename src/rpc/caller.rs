//! Placing calls over a session.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Serialize;

use super::response::{read_reply, Outbound, PumpTask};
use super::{CallHeader, Replies, Response};
use crate::codec::{Codec, Decoder, Encoder};
use crate::error::Result;
use crate::mux::Session;

/// Makes calls to the remote side of a session.
///
/// Cheap to clone. Every call opens its own channel, so one caller can be
/// used from many tasks at once.
///
/// # Example
///
/// ```ignore
/// let caller = Caller::new(session, MsgPackCodec);
///
/// let (greeting,): (String,) = caller.call("hello", &"world").await?.into_result()?;
/// ```
#[derive(Clone)]
pub struct Caller<C> {
    session: Arc<dyn Session>,
    codec: C,
}

impl<C: Codec> Caller<C> {
    /// Create a caller over a session.
    pub fn new(session: Arc<dyn Session>, codec: C) -> Self {
        Self { session, codec }
    }

    /// The codec used for every value.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Call `selector` with one argument value and wait for the response.
    ///
    /// `R` is the tuple of reply values to decode. A handler error is not an
    /// `Err` here; check [`Response::err`] or use [`Response::into_result`].
    ///
    /// # Errors
    ///
    /// Returns error if the channel can't be opened or fails mid-call, or the
    /// reply doesn't decode as `R`.
    pub async fn call<P, R>(&self, selector: &str, params: &P) -> Result<Response<C, R>>
    where
        P: Serialize + ?Sized + Sync,
        R: Replies,
    {
        let (mut decoder, mut encoder) = self.open().await?;
        encoder.send(&CallHeader::new(selector)).await?;
        encoder.send(params).await?;

        let (header, replies) = read_reply::<C, R>(&mut decoder).await?;
        Ok(Response::new(header, replies, decoder, Outbound::Ready(encoder)))
    }

    /// Call `selector` with a stream of argument values.
    ///
    /// Values are sent from a background task and the write side is closed
    /// once the stream ends. Resolves as soon as the reply has been read,
    /// whether or not the stream has ended.
    ///
    /// The task is stopped when the response is dropped or closed, or when
    /// the call was not continued. On a continued response,
    /// [`Response::send`] waits for the stream to end.
    pub async fn call_stream<S, R>(&self, selector: &str, params: S) -> Result<Response<C, R>>
    where
        S: Stream + Send + 'static,
        S::Item: Serialize + Send + Sync + 'static,
        R: Replies,
    {
        let (mut decoder, mut encoder) = self.open().await?;
        encoder.send(&CallHeader::new(selector)).await?;

        let selector_name = selector.to_string();
        let pump = PumpTask(tokio::spawn(async move {
            let mut params = Box::pin(params);
            let sent = async {
                while let Some(value) = params.next().await {
                    encoder.send(&value).await?;
                }
                encoder.close_write().await
            }
            .await;
            if let Err(e) = sent {
                tracing::debug!("Argument stream for {} ended early: {}", selector_name, e);
            }
            encoder
        }));

        let (header, replies) = read_reply::<C, R>(&mut decoder).await?;
        Ok(Response::new(header, replies, decoder, Outbound::Pumping(pump)))
    }

    async fn open(&self) -> Result<(Decoder<C>, Encoder<C>)> {
        let (reader, writer) = self.session.open().await?.into_split();
        Ok((
            Decoder::new(reader, self.codec.clone()),
            Encoder::new(writer, self.codec.clone()),
        ))
    }
}
