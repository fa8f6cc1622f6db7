//! RPC module - the call/response protocol over channels.
//!
//! Every call gets its own channel:
//!
//! ```text
//! caller                                    handler
//!   │── CallHeader { S: selector } ──────────►│
//!   │── argument value(s) ───────────────────►│
//!   │◄──────────── ResponseHeader { E, C } ───│
//!   │◄──────────── reply value(s), at least 1 │
//!   │◄──────────── close write side           │  (C = false)
//!   │◄══════════ free-form traffic ═════════► │  (C = true)
//! ```
//!
//! - [`Caller`] / [`Response`] - the calling side
//! - [`Call`] / [`Responder`] - the handling side
//! - [`receive_notify`] - turns a continued response into a stream of values

mod call;
mod caller;
mod header;
mod notify;
mod reply;
mod responder;
mod response;

pub use call::Call;
pub use caller::Caller;
pub use header::{CallHeader, ResponseHeader};
pub use notify::receive_notify;
pub use reply::{Replies, Reply, ReplyValues};
pub use responder::Responder;
pub use response::Response;
