//! Handler module - selector-addressed call handlers.
//!
//! Provides:
//! - [`Handler`] - the trait a [`Peer`](crate::Peer) dispatches calls to
//! - [`HandlerRegistry`] - maps selectors to handlers
//!
//! Handlers receive a [`Responder`](crate::rpc::Responder) and a
//! [`Call`](crate::rpc::Call). They read arguments from the call and must
//! respond exactly once.

mod registry;

pub use registry::{FnHandler, Handler, HandlerRegistry, HandlerResult};
