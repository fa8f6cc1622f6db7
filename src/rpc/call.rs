//! Handler-side view of an incoming call.

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::{CallHeader, Caller};
use crate::codec::{Codec, Decoder};
use crate::error::Result;
use crate::mux::ChannelReader;

/// An incoming call, passed to the handler together with its
/// [`Responder`](super::Responder).
///
/// Owns the read half of the call's channel. Arguments are read with
/// [`receive`](Call::receive), usually exactly once. The [`Caller`] makes
/// calls back to the side that placed this call.
pub struct Call<C> {
    header: CallHeader,
    caller: Caller<C>,
    decoder: Decoder<C>,
    token: CancellationToken,
}

impl<C: Codec> Call<C> {
    pub(crate) fn new(
        header: CallHeader,
        caller: Caller<C>,
        decoder: Decoder<C>,
        token: CancellationToken,
    ) -> Self {
        Self {
            header,
            caller,
            decoder,
            token,
        }
    }

    /// The selector this call was addressed to.
    pub fn selector(&self) -> &str {
        &self.header.selector
    }

    /// The decoded call header.
    pub fn header(&self) -> &CallHeader {
        &self.header
    }

    /// Decode the next value sent by the caller.
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.decoder.receive().await
    }

    /// Decode the next value, or `None` once the caller closed its side.
    pub async fn try_receive<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        self.decoder.try_receive().await
    }

    /// Consume the next value without keeping it.
    pub async fn receive_discard(&mut self) -> Result<()> {
        self.decoder.receive_discard().await
    }

    /// Makes calls back to the calling side.
    pub fn caller(&self) -> &Caller<C> {
        &self.caller
    }

    /// Cancelled once the call has been handled or the peer shuts down.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The call's decoder.
    pub fn decoder_mut(&mut self) -> &mut Decoder<C> {
        &mut self.decoder
    }

    /// Raw access to the read half, for byte-stream use.
    pub fn reader_mut(&mut self) -> &mut ChannelReader {
        self.decoder.reader_mut()
    }
}
