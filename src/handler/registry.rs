//! Handler registry for dispatching calls by selector.
//!
//! # Example
//!
//! ```ignore
//! use duplex_rpc::handler::HandlerRegistry;
//! use duplex_rpc::codec::MsgPackCodec;
//!
//! let mut registry = HandlerRegistry::<MsgPackCodec>::new();
//!
//! registry.register("echo", |mut resp, mut call| async move {
//!     let value: String = call.receive().await?;
//!     resp.return_value(value).await
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::codec::Codec;
use crate::error::Result;
use crate::rpc::{Call, Responder};

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Trait for call handlers.
///
/// A handler must respond through the [`Responder`] it is given; an `Err`
/// returned before responding leaves the caller with a closed channel.
pub trait Handler<C>: Send + Sync + 'static {
    /// Handle one call.
    fn handle(&self, responder: Responder<C>, call: Call<C>) -> BoxFuture<'static, HandlerResult>;
}

/// Adapts an async function into a [`Handler`].
pub struct FnHandler<F, Fut> {
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut> {
    /// Wrap an async function.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<C, F, Fut> Handler<C> for FnHandler<F, Fut>
where
    C: Codec,
    F: Fn(Responder<C>, Call<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, responder: Responder<C>, call: Call<C>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(responder, call))
    }
}

/// Registry mapping selectors to handlers.
pub struct HandlerRegistry<C> {
    handlers: HashMap<String, Arc<dyn Handler<C>>>,
}

impl<C: Codec> HandlerRegistry<C> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register an async function for a selector, replacing any previous handler.
    pub fn register<F, Fut>(&mut self, selector: &str, handler: F)
    where
        F: Fn(Responder<C>, Call<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(selector, FnHandler::new(handler));
    }

    /// Register a [`Handler`] for a selector, replacing any previous handler.
    pub fn register_handler<H: Handler<C>>(&mut self, selector: &str, handler: H) {
        self.handlers.insert(selector.to_string(), Arc::new(handler));
    }

    /// Get the handler for a selector.
    pub fn get(&self, selector: &str) -> Option<Arc<dyn Handler<C>>> {
        self.handlers.get(selector).cloned()
    }

    /// Remove the handler for a selector.
    pub fn remove(&mut self, selector: &str) -> bool {
        self.handlers.remove(selector).is_some()
    }

    /// Registered selectors, in no particular order.
    pub fn selectors(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C: Codec> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
