//! One-shot response state machine.
//!
//! ```text
//! unresponded ──return_*──►  responded, write side closed
//!      │
//!      └──────continue_*──►  responded, write half handed to the handler
//! ```

use serde::Serialize;

use super::{Reply, ReplyValues, ResponseHeader};
use crate::codec::{Codec, Encoder};
use crate::error::{DuplexError, Result};

/// Sends the response to a call.
///
/// Owns the write half of the call's channel until the handler responds.
/// Exactly one response may be sent; further attempts fail with
/// [`DuplexError::AlreadyResponded`].
///
/// # Example
///
/// ```ignore
/// peer.handle("divide", |mut resp: Responder<MsgPackCodec>, mut call: Call<MsgPackCodec>| async move {
///     let (a, b): (i64, i64) = call.receive().await?;
///     if b == 0 {
///         return resp.return_error("division by zero").await;
///     }
///     resp.return_value(a / b).await
/// });
/// ```
pub struct Responder<C> {
    responded: bool,
    header: ResponseHeader,
    encoder: Option<Encoder<C>>,
    selector: String,
}

impl<C: Codec> Responder<C> {
    pub(crate) fn new(encoder: Encoder<C>, selector: impl Into<String>) -> Self {
        Self {
            responded: false,
            header: ResponseHeader::default(),
            encoder: Some(encoder),
            selector: selector.into(),
        }
    }

    /// Check whether a response has been sent.
    pub fn has_responded(&self) -> bool {
        self.responded
    }

    /// Reply and close the write side.
    pub async fn return_reply<V: ReplyValues>(&mut self, reply: Reply<V>) -> Result<()> {
        self.respond(reply, false).await
    }

    /// Reply with values and close the write side.
    pub async fn return_with<V: ReplyValues>(&mut self, values: V) -> Result<()> {
        self.respond(Reply::Values(values), false).await
    }

    /// Reply with a single value and close the write side.
    pub async fn return_value<T: Serialize + Send + Sync>(&mut self, value: T) -> Result<()> {
        self.respond(Reply::Values((value,)), false).await
    }

    /// Reply with an error and close the write side.
    pub async fn return_error(&mut self, message: impl Into<String>) -> Result<()> {
        self.respond(Reply::<()>::error(message), false).await
    }

    /// Reply, keep the channel open, and take over its write half.
    ///
    /// The caller sees `continued` set and may keep exchanging values or raw
    /// bytes. The returned encoder closes the channel's write side when
    /// [`close_write`](Encoder::close_write) is called or it is dropped.
    pub async fn continue_reply<V: ReplyValues>(&mut self, reply: Reply<V>) -> Result<Encoder<C>> {
        self.respond(reply, true).await?;
        self.encoder.take().ok_or(DuplexError::AlreadyResponded)
    }

    /// Reply with values, keep the channel open, and take over its write half.
    pub async fn continue_with<V: ReplyValues>(&mut self, values: V) -> Result<Encoder<C>> {
        self.continue_reply(Reply::Values(values)).await
    }

    /// Reply with a single value, keep the channel open, and take over its write half.
    pub async fn continue_value<T: Serialize + Send + Sync>(
        &mut self,
        value: T,
    ) -> Result<Encoder<C>> {
        self.continue_reply(Reply::Values((value,))).await
    }

    async fn respond<V: ReplyValues>(&mut self, reply: Reply<V>, continued: bool) -> Result<()> {
        if self.responded {
            return Err(DuplexError::AlreadyResponded);
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or(DuplexError::AlreadyResponded)?;

        let values = match reply {
            Reply::Values(values) => values.encode_values(encoder.codec())?,
            Reply::Error(message) => {
                self.header.error = Some(message);
                Vec::new()
            }
        };

        self.responded = true;
        self.header.continued = continued;
        encoder.send(&self.header).await?;

        // Callers always read at least one value.
        if values.is_empty() {
            encoder.send(&()).await?;
        }
        for value in &values {
            encoder.send_encoded(value).await?;
        }

        if !continued {
            encoder.close_write().await?;
            self.encoder = None;
        }
        Ok(())
    }
}

impl<C> Drop for Responder<C> {
    fn drop(&mut self) {
        if !self.responded {
            tracing::warn!("Handler for {} finished without responding", self.selector);
        }
    }
}
