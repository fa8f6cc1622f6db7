//! # duplex-rpc
//!
//! Selector-addressed RPC over a multiplexed, bidirectional connection.
//!
//! Both ends of a connection run a [`Peer`]. Either side can call handlers
//! registered on the other; every call gets its own channel on the session,
//! carries a call header and argument values, and is answered with a
//! response header and one or more reply values. A handler can instead
//! *continue* a call, keeping the channel open as a full-duplex stream of
//! values or raw bytes.
//!
//! ## Layers
//!
//! - [`mux`] - channels over one byte stream ([`MuxSession`]), frames in [`protocol`]
//! - [`codec`] - value encoding ([`MsgPackCodec`], [`JsonCodec`])
//! - [`rpc`] - call/response protocol ([`Caller`], [`Call`], [`Responder`], [`Response`])
//! - [`handler`] / [`Peer`] - handler registry and accept loop
//! - [`interop`] - services for cross-implementation testing
//!
//! ## Example
//!
//! ```ignore
//! use duplex_rpc::{JsonCodec, MuxSession, Peer};
//!
//! #[tokio::main]
//! async fn main() -> duplex_rpc::Result<()> {
//!     let (a, b) = tokio::io::duplex(64 * 1024);
//!     let left = Peer::new(MuxSession::new(a), JsonCodec);
//!     let right = Peer::new(MuxSession::new(b), JsonCodec);
//!
//!     right.handle("hello", |mut resp, mut call| async move {
//!         let name: String = call.receive().await?;
//!         resp.return_value(format!("hello, {}", name)).await
//!     });
//!     tokio::spawn(async move { right.respond().await });
//!
//!     let (greeting,): (String,) = left.call("hello", &"world").await?.into_result()?;
//!     assert_eq!(greeting, "hello, world");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod interop;
pub mod mux;
pub mod protocol;
pub mod rpc;

mod peer;
mod writer;

pub use codec::{Codec, JsonCodec, MsgPackCodec};
pub use error::{DuplexError, RemoteError, Result};
pub use mux::{Channel, MuxSession, Session};
pub use peer::{Peer, PeerBuilder, DEFAULT_MAX_CONCURRENT_HANDLERS, PEER_BUSY};
pub use rpc::{receive_notify, Call, Caller, Reply, Responder, Response};
pub use writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY};
