//! Reply values on both sides of a call.
//!
//! A handler replies with zero or more values, or with an error message.
//! Multiple values are written as consecutive codec values and read back
//! positionally, so both sides use tuples: `(A,)`, `(A, B)`, and so on.

use std::fmt;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, Decoder};
use crate::error::Result;

/// What a handler sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<V> {
    /// Reply values, written in order.
    Values(V),
    /// An error; only the message reaches the caller.
    Error(String),
}

impl<V> Reply<V> {
    /// Reply with an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }
}

impl<V, E: fmt::Display> From<std::result::Result<V, E>> for Reply<V> {
    fn from(result: std::result::Result<V, E>) -> Self {
        match result {
            Ok(values) => Reply::Values(values),
            Err(e) => Reply::Error(e.to_string()),
        }
    }
}

/// Values a handler can reply with.
///
/// Implemented for `()` (no values) and tuples of up to four values.
pub trait ReplyValues: Send + Sync {
    /// Encode each value separately, in order.
    fn encode_values<C: Codec>(&self, codec: &C) -> Result<Vec<Vec<u8>>>;
}

/// Values a caller can read back from a reply.
///
/// `()` consumes one value and discards it, which matches the single null
/// sent for an empty reply.
pub trait Replies: Sized + Send + 'static {
    /// Decode one value per element.
    fn receive<C: Codec>(decoder: &mut Decoder<C>) -> BoxFuture<'_, Result<Self>>;
}

impl ReplyValues for () {
    fn encode_values<C: Codec>(&self, _codec: &C) -> Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }
}

impl Replies for () {
    fn receive<C: Codec>(decoder: &mut Decoder<C>) -> BoxFuture<'_, Result<Self>> {
        Box::pin(decoder.receive_discard())
    }
}

macro_rules! tuple_replies {
    ($($name:ident . $idx:tt),+) => {
        impl<$($name),+> ReplyValues for ($($name,)+)
        where
            $($name: Serialize + Send + Sync),+
        {
            fn encode_values<C: Codec>(&self, codec: &C) -> Result<Vec<Vec<u8>>> {
                Ok(vec![$(codec.encode(&self.$idx)?),+])
            }
        }

        impl<$($name),+> Replies for ($($name,)+)
        where
            $($name: DeserializeOwned + Send + 'static),+
        {
            fn receive<C: Codec>(decoder: &mut Decoder<C>) -> BoxFuture<'_, Result<Self>> {
                Box::pin(async move { Ok(($(decoder.receive::<$name>().await?,)+)) })
            }
        }
    };
}

tuple_replies!(A.0);
tuple_replies!(A.0, B.1);
tuple_replies!(A.0, B.1, C2.2);
tuple_replies!(A.0, B.1, C2.2, D.3);
