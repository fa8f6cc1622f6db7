//! Integration tests for duplex-rpc.
//!
//! These tests run two peers against each other over an in-memory stream.

use std::time::Duration;

use duplex_rpc::codec::{Codec, MsgPackCodec};
use duplex_rpc::mux::{MuxSession, Session, DEFAULT_MAX_FRAME_SIZE};
use duplex_rpc::protocol::{build_frame, flags, FrameBuffer, Header};
use duplex_rpc::rpc::ResponseHeader;
use duplex_rpc::{receive_notify, DuplexError, JsonCodec, Peer};
use futures::StreamExt;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn peers<C: Codec>(codec: C) -> (Peer<C>, Peer<C>) {
    let (a, b) = duplex(64 * 1024);
    (
        Peer::new(MuxSession::new(a), codec.clone()),
        Peer::new(MuxSession::new(b), codec),
    )
}

fn serve<C: Codec>(peer: &Peer<C>) {
    let peer = peer.clone();
    tokio::spawn(async move { peer.respond().await });
}

/// Both sides answer and place calls over the same session.
#[tokio::test]
async fn test_peer_bidirectional() {
    let (a, b) = peers(JsonCodec);

    a.handle("hello", |mut resp, _call| async move {
        resp.return_value("A").await
    });
    b.handle("hello", |mut resp, _call| async move {
        resp.return_value("B").await
    });
    serve(&a);
    serve(&b);

    let (from_b,): (String,) = a.call("hello", &()).await.unwrap().into_result().unwrap();
    assert_eq!(from_b, "B");

    let (from_a,): (String,) = b.call("hello", &()).await.unwrap().into_result().unwrap();
    assert_eq!(from_a, "A");
}

/// Multiple reply values arrive in order.
#[tokio::test]
async fn test_multi_value_return() {
    let (a, b) = peers(MsgPackCodec);

    b.handle("divmod", |mut resp, mut call| async move {
        let (n, d): (u32, u32) = call.receive().await?;
        resp.return_with((n / d, n % d)).await
    });
    serve(&b);

    let resp = a.call::<_, (u32, u32)>("divmod", &(17u32, 5u32)).await.unwrap();
    assert!(resp.err().is_none());
    assert!(!resp.is_continued());
    assert_eq!(resp.into_result().unwrap(), (3, 2));
}

/// A handler error reaches the caller as a remote error with the same message.
#[tokio::test]
async fn test_error_return() {
    let (a, b) = peers(MsgPackCodec);

    b.handle("fail", |mut resp, mut call| async move {
        let reason: String = call.receive().await?;
        resp.return_error(reason).await
    });
    serve(&b);

    let resp = a.call::<_, (String,)>("fail", &"disk full").await.unwrap();
    assert_eq!(resp.err().unwrap().message(), "disk full");

    match resp.into_result() {
        Err(DuplexError::Remote(err)) => assert_eq!(err.to_string(), "disk full"),
        other => panic!("expected remote error, got {:?}", other.map(|_| ())),
    }
}

/// A continued call keeps the channel open for more values in both directions.
#[tokio::test]
async fn test_continue_exchanges_values() {
    let (a, b) = peers(JsonCodec);

    b.handle("double", |mut resp, mut call| async move {
        call.receive_discard().await?;
        let mut encoder = resp.continue_value("ready").await?;
        while let Some(n) = call.try_receive::<i64>().await? {
            encoder.send(&(n * 2)).await?;
        }
        encoder.close_write().await
    });
    serve(&b);

    let mut resp = a.call::<_, (String,)>("double", &()).await.unwrap();
    assert!(resp.is_continued());
    assert_eq!(resp.take_replies(), Some(("ready".to_string(),)));

    for n in [1i64, 2, 3] {
        resp.send(&n).await.unwrap();
        assert_eq!(resp.receive::<i64>().await.unwrap(), n * 2);
    }
    resp.close_write().await.unwrap();
    assert!(resp.try_receive::<i64>().await.unwrap().is_none());
}

/// Channel operations on a response that was not continued fail.
#[tokio::test]
async fn test_not_continued_has_no_channel() {
    let (a, b) = peers(JsonCodec);
    b.handle("plain", |mut resp, _call| async move { resp.return_with(()).await });
    serve(&b);

    let mut resp = a.call::<_, ()>("plain", &()).await.unwrap();
    assert!(matches!(
        resp.send(&1u8).await,
        Err(DuplexError::NotContinued)
    ));
    assert!(resp.close().await.is_ok());
}

/// Every value of a continued response is delivered, then the channel closes.
#[tokio::test]
async fn test_receive_notify_delivers_all_values() {
    let (a, b) = peers(MsgPackCodec);

    b.handle("count", |mut resp, mut call| async move {
        let n: u32 = call.receive().await?;
        let mut encoder = resp.continue_with(()).await?;
        for i in 0..n {
            encoder.send(&i).await?;
        }
        encoder.close_write().await
    });
    serve(&b);

    let resp = a.call::<_, ()>("count", &5u32).await.unwrap();
    let (tx, mut rx) = mpsc::channel(2);
    let token = CancellationToken::new();
    let notify = tokio::spawn(async move { receive_notify::<_, _, u32>(&token, resp, tx).await });

    let mut received = Vec::new();
    while let Some(value) = rx.recv().await {
        received.push(value);
    }
    assert_eq!(received, vec![0, 1, 2, 3, 4]);
    assert!(notify.await.unwrap().is_ok());
}

/// A cancelled token stops delivery and closes the output.
#[tokio::test]
async fn test_receive_notify_stops_on_cancel() {
    let (a, b) = peers(MsgPackCodec);

    b.handle("forever", |mut resp, _call| async move {
        let mut encoder = resp.continue_with(()).await?;
        let mut i = 0u64;
        while encoder.send(&i).await.is_ok() {
            i += 1;
            tokio::task::yield_now().await;
        }
        Ok(())
    });
    serve(&b);

    let resp = a.call::<_, ()>("forever", &()).await.unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let token = CancellationToken::new();
    token.cancel();

    receive_notify::<_, _, u64>(&token, resp, tx).await.unwrap();
    assert!(rx.recv().await.is_none());
}

/// Cancelling part way through stops delivery after the values already in hand.
#[tokio::test]
async fn test_receive_notify_cancel_mid_stream() {
    let (a, b) = peers(MsgPackCodec);

    b.handle("ticks", |mut resp, _call| async move {
        let mut encoder = resp.continue_with(()).await?;
        let mut i = 0u64;
        while encoder.send(&i).await.is_ok() {
            i += 1;
            tokio::task::yield_now().await;
        }
        Ok(())
    });
    serve(&b);

    let resp = a.call::<_, ()>("ticks", &()).await.unwrap();
    let (tx, mut rx) = mpsc::channel(1);
    let token = CancellationToken::new();
    let notify = tokio::spawn({
        let token = token.clone();
        async move { receive_notify::<_, _, u64>(&token, resp, tx).await }
    });

    for expected in 0..3u64 {
        assert_eq!(rx.recv().await, Some(expected));
    }
    token.cancel();

    let mut rest = Vec::new();
    while let Some(value) = rx.recv().await {
        rest.push(value);
    }
    assert!(notify.await.unwrap().is_ok());

    // One value queued in the channel, one waiting on the send.
    assert!(rest.len() <= 2);
    assert!(rest.iter().copied().eq(3..3 + rest.len() as u64));
}

/// A value that doesn't decode as the target type ends the stream with an error.
#[tokio::test]
async fn test_receive_notify_decode_error() {
    let (a, b) = peers(JsonCodec);

    b.handle("mixed", |mut resp, _call| async move {
        let mut encoder = resp.continue_with(()).await?;
        encoder.send(&1u32).await?;
        encoder.send(&"not a number").await?;
        encoder.close_write().await
    });
    serve(&b);

    let resp = a.call::<_, ()>("mixed", &()).await.unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let result = receive_notify::<_, _, u32>(&CancellationToken::new(), resp, tx).await;

    assert!(result.is_err());
    assert_eq!(rx.recv().await, Some(1));
    assert_eq!(rx.recv().await, None);
}

/// Streamed arguments are all seen by the handler before it replies.
#[tokio::test]
async fn test_call_stream_arguments() {
    let (a, b) = peers(MsgPackCodec);

    b.handle("sum", |mut resp, mut call| async move {
        let mut total = 0u64;
        while let Some(n) = call.try_receive::<u64>().await? {
            total += n;
        }
        resp.return_value(total).await
    });
    serve(&b);

    let values = futures::stream::iter(1u64..=10);
    let (total,): (u64,) = a
        .caller()
        .call_stream("sum", values)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(total, 55);
}

/// The response arrives while the argument stream is still open.
#[tokio::test]
async fn test_call_stream_returns_before_arguments_end() {
    let (a, b) = peers(MsgPackCodec);

    b.handle("echo_stream", |mut resp, mut call| async move {
        let first: u32 = call.receive().await?;
        let mut encoder = resp.continue_value(first).await?;
        while let Some(n) = call.try_receive::<u32>().await? {
            encoder.send(&n).await?;
        }
        encoder.close_write().await
    });
    serve(&b);

    let (tx, rx) = futures::channel::mpsc::unbounded::<u32>();
    tx.unbounded_send(1).unwrap();

    let call = a.caller().call_stream::<_, (u32,)>("echo_stream", rx);
    let mut resp = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("response while arguments are still open")
        .unwrap();
    assert!(resp.is_continued());
    assert_eq!(resp.take_replies(), Some((1,)));

    for n in [2u32, 3] {
        tx.unbounded_send(n).unwrap();
        assert_eq!(resp.receive::<u32>().await.unwrap(), n);
    }

    // Ending the stream half-closes the call.
    drop(tx);
    assert!(resp.try_receive::<u32>().await.unwrap().is_none());
}

/// A stream that never ends is stopped along with its response.
#[tokio::test]
async fn test_call_stream_pending_arguments_stopped_on_drop() {
    let (a, b) = peers(JsonCodec);

    b.handle("first", |mut resp, mut call| async move {
        let first: u32 = call.receive().await?;
        resp.return_value(first).await
    });
    serve(&b);

    let args = futures::stream::iter([7u32]).chain(futures::stream::pending());
    let call = a.caller().call_stream::<_, (u32,)>("first", args);
    let resp = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("response while arguments are still open")
        .unwrap();
    assert!(!resp.is_continued());
    assert_eq!(resp.into_result().unwrap(), (7,));
}

/// A value filling a whole frame pushes its newline into the next frame.
#[tokio::test]
async fn test_value_filling_frame_then_end_of_stream() {
    let (a, b) = peers(JsonCodec);
    let text = "x".repeat(DEFAULT_MAX_FRAME_SIZE as usize - 2);
    let expected = text.clone();

    b.handle("fill", move |mut resp, mut call| {
        let text = text.clone();
        async move {
            call.receive_discard().await?;
            let mut encoder = resp.continue_with(()).await?;
            encoder.send(&text).await?;
            encoder.close_write().await
        }
    });
    serve(&b);

    let mut resp = a.call::<_, ()>("fill", &()).await.unwrap();
    assert_eq!(resp.receive::<String>().await.unwrap(), expected);
    assert!(resp.try_receive::<String>().await.unwrap().is_none());
}

/// Many calls can be in flight on one session at once.
#[tokio::test]
async fn test_concurrent_calls() {
    let (a, b) = peers(MsgPackCodec);

    b.handle("square", |mut resp, mut call| async move {
        let n: u64 = call.receive().await?;
        tokio::task::yield_now().await;
        resp.return_value(n * n).await
    });
    serve(&b);

    let mut tasks = Vec::new();
    for n in 0..50u64 {
        let caller = a.caller().clone();
        tasks.push(tokio::spawn(async move {
            let (sq,): (u64,) = caller.call("square", &n).await?.into_result()?;
            Ok::<_, DuplexError>((n, sq))
        }));
    }

    for task in tasks {
        let (n, sq) = task.await.unwrap().unwrap();
        assert_eq!(sq, n * n);
    }
}

/// The exact bytes of a call and its response on the channel.
#[tokio::test]
async fn test_wire_sequence() {
    let (x, y) = duplex(64 * 1024);
    let client = MuxSession::new(x);
    let server = Peer::new(MuxSession::new(y), JsonCodec);
    server.handle("echo", |mut resp, mut call| async move {
        let value: String = call.receive().await?;
        resp.return_value(value).await
    });
    serve(&server);

    let mut channel = client.open().await.unwrap();
    channel
        .writer
        .write_all(b"{\"S\":\"echo\"}\n\"hi\"\n")
        .await
        .unwrap();

    let mut reply = Vec::new();
    channel.reader.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, b"{\"E\":null,\"C\":false}\n\"hi\"\n");
}

/// Response header and reply value decode from consecutive mux frames.
#[test]
fn test_response_in_mux_frames() {
    let header_bytes = MsgPackCodec.encode(&ResponseHeader::default()).unwrap();
    let value_bytes = MsgPackCodec.encode(&"ok").unwrap();

    let mut wire = build_frame(
        &Header::new(1, 0, header_bytes.len() as u32),
        &header_bytes,
    );
    wire.extend(build_frame(
        &Header::new(1, 0, value_bytes.len() as u32),
        &value_bytes,
    ));
    wire.extend(build_frame(&Header::control(1, 0, flags::EOF), &[]));

    let frames = FrameBuffer::new().push(&wire).unwrap();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.channel_id() == 1 && !f.header.is_from_opener()));
    assert!(frames[2].header.is_eof());

    let mut payload = frames[0].payload().to_vec();
    payload.extend_from_slice(frames[1].payload());
    match MsgPackCodec.decode::<ResponseHeader>(&payload).unwrap() {
        duplex_rpc::codec::Decoded::Complete { value, consumed } => {
            assert_eq!(value, ResponseHeader::default());
            assert_eq!(consumed, header_bytes.len());
        }
        duplex_rpc::codec::Decoded::Incomplete => panic!("header should be complete"),
    }
}
