//! JSON codec using `serde_json`.
//!
//! Every value is followed by a newline, so a stream of values reads as
//! newline-delimited JSON. A value counts as complete only once the byte
//! after it has arrived; the newline is consumed with the value.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{truncated, Codec, Decoded};
use crate::error::Result;

/// Newline-terminated JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(value)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Decoded<T>> {
        let mut values = serde_json::Deserializer::from_slice(bytes).into_iter::<T>();

        let value = match values.next() {
            None => return Ok(Decoded::Incomplete),
            Some(Err(e)) if e.is_eof() => return Ok(Decoded::Incomplete),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(value)) => value,
        };

        let end = values.byte_offset();
        // The terminator is still to come, and a number may have more digits.
        if end == bytes.len() {
            return Ok(Decoded::Incomplete);
        }

        let consumed = if bytes.get(end) == Some(&b'\n') {
            end + 1
        } else {
            end
        };
        Ok(Decoded::Complete { value, consumed })
    }

    fn decode_last<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Option<T>> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        match serde_json::from_slice(bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_eof() => Err(truncated()),
            Err(e) => Err(e.into()),
        }
    }

    fn may_end_in(&self, chunk: &[u8]) -> bool {
        chunk.contains(&b'\n')
    }
}
