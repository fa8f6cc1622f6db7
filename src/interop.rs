//! Interop services for exercising an implementation end to end.
//!
//! Each service calls back to the calling side, which must register the
//! matching callback:
//!
//! | Service  | Callback         | Behaviour                                            |
//! |----------|------------------|------------------------------------------------------|
//! | `Unary`  | `UnaryCallback`  | returns the callback's reply                         |
//! | `Stream` | `StreamCallback` | continues, then pumps values both ways               |
//! | `Bytes`  | `BytesCallback`  | continues, then pumps raw bytes both ways            |
//! | `Error`  | -                | replies with the received text as an error           |
//!
//! Values are relayed as [`serde_json::Value`], so any codec works.

use serde_json::Value;

use crate::codec::Codec;
use crate::error::{DuplexError, Result};
use crate::handler::HandlerResult;
use crate::peer::Peer;
use crate::rpc::{Call, Caller, Responder, Response};

/// Selector of the unary service.
pub const UNARY: &str = "Unary";
/// Selector of the value streaming service.
pub const STREAM: &str = "Stream";
/// Selector of the byte streaming service.
pub const BYTES: &str = "Bytes";
/// Selector of the error service.
pub const ERROR: &str = "Error";

/// Callback selector used by [`UNARY`].
pub const UNARY_CALLBACK: &str = "UnaryCallback";
/// Callback selector used by [`STREAM`].
pub const STREAM_CALLBACK: &str = "StreamCallback";
/// Callback selector used by [`BYTES`].
pub const BYTES_CALLBACK: &str = "BytesCallback";

/// The interop services.
pub struct InteropService;

impl InteropService {
    /// Register every service on a peer.
    pub fn register<C: Codec>(peer: &Peer<C>) {
        peer.handle(UNARY, unary::<C>);
        peer.handle(STREAM, stream::<C>);
        peer.handle(BYTES, bytes::<C>);
        peer.handle(ERROR, error::<C>);
    }
}

/// Call back with the received value and return the callback's reply.
async fn unary<C: Codec>(mut resp: Responder<C>, mut call: Call<C>) -> HandlerResult {
    let params: Value = call.receive().await?;
    let caller = call.caller().clone();
    let reply = caller.call::<_, (Value,)>(UNARY_CALLBACK, &params).await?;

    match reply.into_result() {
        Ok(values) => resp.return_with(values).await,
        Err(DuplexError::Remote(e)) => resp.return_error(e.message()).await,
        Err(e) => Err(e),
    }
}

/// Open the callback and relay values between it and the caller.
async fn stream<C: Codec>(mut resp: Responder<C>, mut call: Call<C>) -> HandlerResult {
    let params: Value = call.receive().await?;
    let caller = call.caller().clone();
    let Some((mut callback, values)) =
        open_callback(&mut resp, &caller, STREAM_CALLBACK, &params).await?
    else {
        return Ok(());
    };
    let mut encoder = resp.continue_with(values).await?;

    let (callback_decoder, callback_encoder) = callback.split_mut().await?;
    let upstream = async {
        while let Some(value) = call.try_receive::<Value>().await? {
            callback_encoder.send(&value).await?;
        }
        callback_encoder.close_write().await
    };
    let downstream = async {
        while let Some(value) = callback_decoder.try_receive::<Value>().await? {
            encoder.send(&value).await?;
        }
        encoder.close_write().await
    };
    tokio::try_join!(upstream, downstream)?;

    callback.close().await
}

/// Open the callback and relay raw bytes between it and the caller.
async fn bytes<C: Codec>(mut resp: Responder<C>, mut call: Call<C>) -> HandlerResult {
    let params: Value = call.receive().await?;
    let caller = call.caller().clone();
    let Some((mut callback, values)) =
        open_callback(&mut resp, &caller, BYTES_CALLBACK, &params).await?
    else {
        return Ok(());
    };
    let mut encoder = resp.continue_with(values).await?;

    let (callback_decoder, callback_encoder) = callback.split_mut().await?;
    let upstream = async {
        tokio::io::copy_buf(call.reader_mut(), callback_encoder.writer_mut()).await?;
        callback_encoder.close_write().await
    };
    let downstream = async {
        tokio::io::copy_buf(callback_decoder.reader_mut(), encoder.writer_mut()).await?;
        encoder.close_write().await
    };
    tokio::try_join!(upstream, downstream)?;

    callback.close().await
}

/// Reply with the received text as an error.
async fn error<C: Codec>(mut resp: Responder<C>, mut call: Call<C>) -> HandlerResult {
    let text: String = call.receive().await?;
    resp.return_error(text).await
}

/// Call a streaming callback and check that it was continued.
///
/// A callback error is forwarded to the caller, in which case `None` is
/// returned and the call has been answered.
async fn open_callback<C: Codec>(
    resp: &mut Responder<C>,
    caller: &Caller<C>,
    selector: &str,
    params: &Value,
) -> Result<Option<(Response<C, (Value,)>, (Value,))>> {
    let mut callback = caller.call::<_, (Value,)>(selector, params).await?;

    if let Some(err) = callback.err() {
        resp.return_error(err.message()).await?;
        return Ok(None);
    }
    if !callback.is_continued() {
        return Err(DuplexError::Protocol(format!(
            "{} returned without continuing",
            selector
        )));
    }

    let values = callback
        .take_replies()
        .ok_or_else(|| DuplexError::Protocol(format!("{} sent no reply value", selector)))?;
    Ok(Some((callback, values)))
}
