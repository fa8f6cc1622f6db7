//! Draining a continued response into a channel.

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Response;
use crate::codec::Codec;
use crate::error::Result;

/// Forward every value of a continued response to `tx`.
///
/// Stops at the end of the response stream, when `token` is cancelled, or
/// when the receiving side of `tx` is gone; all of these return `Ok`. A
/// decode failure is returned as the error. On every exit the response is
/// closed and `tx` is dropped, so the receiver sees the channel end.
///
/// Cancellation is checked after each value is decoded; a value decoded
/// after cancellation is dropped.
///
/// # Example
///
/// ```ignore
/// let resp = caller.call::<_, ()>("subscribe", &topic).await?;
/// let (tx, mut rx) = mpsc::channel(16);
/// tokio::spawn(async move { receive_notify::<_, _, Event>(&token, resp, tx).await });
/// while let Some(event) = rx.recv().await { /* ... */ }
/// ```
pub async fn receive_notify<C, R, T>(
    token: &CancellationToken,
    mut response: Response<C, R>,
    tx: mpsc::Sender<T>,
) -> Result<()>
where
    C: Codec,
    T: DeserializeOwned + Send,
{
    let result = forward(token, &mut response, &tx).await;

    if let Err(e) = response.close().await {
        tracing::debug!("Failed to close notify response: {}", e);
    }
    drop(tx);
    result
}

async fn forward<C: Codec, R, T: DeserializeOwned>(
    token: &CancellationToken,
    response: &mut Response<C, R>,
    tx: &mpsc::Sender<T>,
) -> Result<()> {
    while let Some(value) = response.try_receive::<T>().await? {
        if token.is_cancelled() {
            return Ok(());
        }
        if tx.send(value).await.is_err() {
            return Ok(());
        }
    }
    Ok(())
}
