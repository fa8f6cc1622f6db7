//! Codec module - value serialization over channels.
//!
//! A [`Codec`] turns values into bytes and parses them back out of a byte
//! stream. Values are written back to back with no extra framing, so a
//! codec must be able to tell where one value ends:
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`, struct-as-map)
//! - [`JsonCodec`] - newline-terminated JSON using `serde_json`
//!
//! [`Encoder`] and [`Decoder`] bind a codec to the write and read halves of a
//! channel. The decoder never reads past the end of the value it returns, so
//! a channel can switch from values to raw bytes at any value boundary.
//!
//! # Example
//!
//! ```
//! use duplex_rpc::codec::{Codec, Decoded, JsonCodec};
//!
//! let codec = JsonCodec;
//! let bytes = codec.encode(&"hello").unwrap();
//! assert_eq!(bytes, b"\"hello\"\n");
//!
//! match codec.decode::<String>(&bytes).unwrap() {
//!     Decoded::Complete { value, consumed } => {
//!         assert_eq!(value, "hello");
//!         assert_eq!(consumed, bytes.len());
//!     }
//!     Decoded::Incomplete => unreachable!(),
//! }
//! ```

mod json;
mod msgpack;
mod stream;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DuplexError, Result};

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use stream::{Decoder, Encoder};

/// Outcome of decoding from the front of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// A value was decoded from the first `consumed` bytes.
    Complete {
        /// The decoded value.
        value: T,
        /// Number of bytes the value occupied.
        consumed: usize,
    },
    /// The buffer holds only the beginning of a value.
    Incomplete,
}

/// Serialization format used for every value on a channel.
pub trait Codec: Clone + Send + Sync + 'static {
    /// Encode one value.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode one value from the front of `bytes`.
    ///
    /// Returns [`Decoded::Incomplete`] when more bytes are needed; any other
    /// malformed input is an error.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Decoded<T>>;

    /// Decode what is left in `bytes` once the stream has ended.
    ///
    /// Returns `None` when `bytes` holds no value, only padding between values.
    fn decode_last<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Option<T>> {
        match self.decode(bytes)? {
            Decoded::Complete { value, .. } => Ok(Some(value)),
            Decoded::Incomplete => Err(truncated()),
        }
    }

    /// Check whether a value already partly buffered could end within `chunk`.
    ///
    /// A decoder skips re-parsing its buffer for chunks where this is false.
    fn may_end_in(&self, chunk: &[u8]) -> bool {
        let _ = chunk;
        true
    }
}

/// Error for a stream that ended partway through a value.
pub(crate) fn truncated() -> DuplexError {
    DuplexError::Protocol("Channel ended in the middle of a value".to_string())
}
