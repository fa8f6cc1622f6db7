//! Peer builder and accept loop.
//!
//! A [`Peer`] is one end of a duplex connection: it answers calls opened by
//! the remote side and places calls of its own over the same session.
//!
//! For every accepted channel, the peer:
//! 1. Decodes the call header
//! 2. Looks up the handler for the selector
//! 3. Spawns the handler with a fresh [`Call`] and [`Responder`]
//!
//! # Example
//!
//! ```ignore
//! use duplex_rpc::{MsgPackCodec, MuxSession, Peer};
//!
//! #[tokio::main]
//! async fn main() -> duplex_rpc::Result<()> {
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:9000").await?;
//!     let peer = Peer::builder(MsgPackCodec)
//!         .handle("hello", |mut resp, _call| async move {
//!             resp.return_value("hi").await
//!         })
//!         .build(MuxSession::new(stream));
//!
//!     tokio::spawn({
//!         let peer = peer.clone();
//!         async move { peer.respond().await }
//!     });
//!
//!     let (name,): (String,) = peer.call("whoami", &()).await?.into_result()?;
//!     println!("connected to {}", name);
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::codec::{Codec, Decoder, Encoder};
use crate::error::{DuplexError, Result};
use crate::handler::{Handler, HandlerRegistry, HandlerResult};
use crate::mux::{Channel, Session};
use crate::rpc::{Call, CallHeader, Caller, Replies, Responder, Response};

/// Default maximum concurrent handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Error message sent when the handler limit is reached.
pub const PEER_BUSY: &str = "peer busy";

/// Builder for configuring and creating a [`Peer`].
pub struct PeerBuilder<C> {
    codec: C,
    registry: HandlerRegistry<C>,
    max_concurrent_handlers: usize,
}

impl<C: Codec> PeerBuilder<C> {
    /// Create a new peer builder using `codec` for every value.
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            registry: HandlerRegistry::new(),
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
        }
    }

    /// Register a handler for a selector.
    pub fn handle<F, Fut>(mut self, selector: &str, handler: F) -> Self
    where
        F: Fn(Responder<C>, Call<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register(selector, handler);
        self
    }

    /// Set the maximum number of concurrent handlers.
    ///
    /// When this limit is reached, new calls are answered with a
    /// [`PEER_BUSY`] error.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit;
        self
    }

    /// Build the peer over a session.
    ///
    /// Nothing is answered until [`Peer::respond`] runs.
    pub fn build<S: Session>(self, session: S) -> Peer<C> {
        self.build_shared(Arc::new(session))
    }

    /// Build the peer over a shared session.
    pub fn build_shared(self, session: Arc<dyn Session>) -> Peer<C> {
        Peer {
            caller: Caller::new(session.clone(), self.codec),
            session,
            registry: Arc::new(RwLock::new(self.registry)),
            semaphore: Arc::new(Semaphore::new(self.max_concurrent_handlers)),
            shutdown: CancellationToken::new(),
        }
    }
}

/// One end of a duplex RPC connection.
///
/// Cheap to clone; clones share the session, handlers and limits.
#[derive(Clone)]
pub struct Peer<C> {
    session: Arc<dyn Session>,
    caller: Caller<C>,
    registry: Arc<RwLock<HandlerRegistry<C>>>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl<C: Codec> Peer<C> {
    /// Create a new peer builder.
    pub fn builder(codec: C) -> PeerBuilder<C> {
        PeerBuilder::new(codec)
    }

    /// Create a peer over a session with default settings.
    pub fn new<S: Session>(session: S, codec: C) -> Self {
        PeerBuilder::new(codec).build(session)
    }

    /// Register a handler for a selector, replacing any previous handler.
    ///
    /// Takes effect for calls accepted after it returns.
    pub fn handle<F, Fut>(&self, selector: &str, handler: F)
    where
        F: Fn(Responder<C>, Call<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.write().register(selector, handler);
    }

    /// Register a [`Handler`] for a selector, replacing any previous handler.
    pub fn handle_with<H: Handler<C>>(&self, selector: &str, handler: H) {
        self.registry.write().register_handler(selector, handler);
    }

    /// The caller for placing calls to the remote side.
    pub fn caller(&self) -> &Caller<C> {
        &self.caller
    }

    /// Call `selector` on the remote side. See [`Caller::call`].
    pub async fn call<P, R>(&self, selector: &str, params: &P) -> Result<Response<C, R>>
    where
        P: Serialize + ?Sized + Sync,
        R: Replies,
    {
        self.caller.call(selector, params).await
    }

    /// Answer calls from the remote side until the session ends.
    ///
    /// Each call runs on its own task. Handler errors are logged.
    pub async fn respond(&self) -> Result<()> {
        while let Some(channel) = self.session.accept().await? {
            let permit = self.semaphore.clone().try_acquire_owned().ok();
            let peer = self.clone();

            tokio::spawn(async move {
                if let Err(e) = peer.dispatch(channel, permit).await {
                    tracing::error!("Call failed: {}", e);
                }
            });
        }
        Ok(())
    }

    /// Close the session and cancel every running call.
    pub async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        self.session.close().await
    }

    /// Run one call. `permit` is `None` when the handler limit was reached.
    async fn dispatch(&self, channel: Channel, permit: Option<OwnedSemaphorePermit>) -> Result<()> {
        let codec = self.caller.codec().clone();
        let (reader, writer) = channel.into_split();
        let mut decoder = Decoder::new(reader, codec.clone());
        let header: CallHeader = decoder.receive().await?;
        let mut responder = Responder::new(Encoder::new(writer, codec), header.selector.clone());

        let Some(_permit) = permit else {
            tracing::warn!(
                "Handler capacity reached, rejecting call to {}",
                header.selector
            );
            return responder.return_error(PEER_BUSY).await;
        };

        let handler = self.registry.read().get(&header.selector);
        let Some(handler) = handler else {
            let err = DuplexError::HandlerNotFound(header.selector);
            responder.return_error(err.to_string()).await?;
            return Err(err);
        };

        let token = self.shutdown.child_token();
        let _guard = token.clone().drop_guard();
        let call = Call::new(header, self.caller.clone(), decoder, token);
        handler.handle(responder, call).await
    }
}
