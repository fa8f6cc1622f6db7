//! MsgPack codec using `rmp-serde`.
//!
//! Always encodes with `to_vec_named`: structs go on the wire as maps keyed
//! by field name, so peers in other languages see `{"S": "hello"}` rather
//! than a positional array.
//!
//! # Example
//!
//! ```
//! use duplex_rpc::codec::{Codec, Decoded, MsgPackCodec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = MsgPackCodec.encode(&msg).unwrap();
//! let decoded = MsgPackCodec.decode::<Message>(&encoded).unwrap();
//! assert_eq!(decoded, Decoded::Complete { value: msg, consumed: encoded.len() });
//! ```

use std::io::{Cursor, ErrorKind};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Codec, Decoded};
use crate::error::Result;

/// MessagePack codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    #[inline]
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Decoded<T>> {
        if bytes.is_empty() {
            return Ok(Decoded::Incomplete);
        }

        let mut cursor = Cursor::new(bytes);
        let result = {
            let mut de = rmp_serde::Deserializer::new(&mut cursor);
            <T as Deserialize>::deserialize(&mut de)
        };

        match result {
            Ok(value) => Ok(Decoded::Complete {
                value,
                consumed: cursor.position() as usize,
            }),
            Err(e) if is_truncated(&e) => Ok(Decoded::Incomplete),
            Err(e) => Err(e.into()),
        }
    }
}

/// Check whether a decode failed only because the input ran out.
fn is_truncated(err: &rmp_serde::decode::Error) -> bool {
    use rmp_serde::decode::Error;

    match err {
        Error::InvalidMarkerRead(e) | Error::InvalidDataRead(e) => {
            e.kind() == ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}
