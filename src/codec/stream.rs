//! Codec-bound channel halves.

use bytes::BytesMut;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use super::{Codec, Decoded};
use crate::error::{DuplexError, Result};
use crate::mux::{ChannelReader, ChannelWriter};

/// Writes encoded values to the write half of a channel.
pub struct Encoder<C> {
    writer: ChannelWriter,
    codec: C,
}

impl<C: Codec> Encoder<C> {
    /// Create an encoder over a channel's write half.
    pub fn new(writer: ChannelWriter, codec: C) -> Self {
        Self { writer, codec }
    }

    /// Encode and send one value.
    pub async fn send<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        self.send_encoded(&bytes).await
    }

    /// Send bytes produced by this encoder's codec.
    pub async fn send_encoded(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    /// Half-close the channel. The remote reader sees end of stream.
    pub async fn close_write(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// The codec values are encoded with.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Raw access to the write half, for byte-stream use after a continuation.
    pub fn writer_mut(&mut self) -> &mut ChannelWriter {
        &mut self.writer
    }
}

/// Reads decoded values from the read half of a channel.
///
/// Bytes are taken from the reader only as far as the end of the value
/// being decoded, so [`reader_mut`](Decoder::reader_mut) picks up exactly
/// where the last value ended.
pub struct Decoder<C> {
    reader: ChannelReader,
    codec: C,
    /// Bytes of a value that spans more than one read.
    scratch: BytesMut,
}

impl<C: Codec> Decoder<C> {
    /// Create a decoder over a channel's read half.
    pub fn new(reader: ChannelReader, codec: C) -> Self {
        Self {
            reader,
            codec,
            scratch: BytesMut::new(),
        }
    }

    /// Decode the next value, or `None` at a clean end of stream.
    ///
    /// A failed decode leaves the stream where it was, so the same value can
    /// be read again, for example as a different type.
    ///
    /// # Errors
    ///
    /// Returns error if the stream ends partway through a value, the bytes
    /// are malformed, or they don't match `T`.
    pub async fn try_receive<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        loop {
            let chunk = self.reader.fill_buf().await?;
            let chunk_len = chunk.len();

            if chunk_len == 0 {
                if self.scratch.is_empty() {
                    return Ok(None);
                }
                let value = self.codec.decode_last::<T>(&self.scratch)?;
                self.scratch.clear();
                return Ok(value);
            }

            if self.scratch.is_empty() {
                match self.codec.decode::<T>(chunk)? {
                    Decoded::Complete { value, consumed } => {
                        self.reader.consume(consumed);
                        return Ok(Some(value));
                    }
                    Decoded::Incomplete => {
                        self.scratch.extend_from_slice(chunk);
                        self.reader.consume(chunk_len);
                    }
                }
                continue;
            }

            let buffered = self.scratch.len();
            self.scratch.extend_from_slice(chunk);
            if !self.codec.may_end_in(chunk) {
                self.reader.consume(chunk_len);
                continue;
            }

            match self.codec.decode::<T>(&self.scratch) {
                Ok(Decoded::Complete { value, consumed }) => {
                    self.scratch.clear();
                    self.reader.consume(consumed.saturating_sub(buffered));
                    return Ok(Some(value));
                }
                Ok(Decoded::Incomplete) => {
                    self.reader.consume(chunk_len);
                }
                Err(e) => {
                    // The chunk stays unread; the scratch keeps the earlier part.
                    self.scratch.truncate(buffered);
                    return Err(e);
                }
            }
        }
    }

    /// Decode the next value; end of stream is an error.
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.try_receive().await?.ok_or(DuplexError::ChannelClosed)
    }

    /// Consume the next value without keeping it.
    pub async fn receive_discard(&mut self) -> Result<()> {
        self.receive::<IgnoredAny>().await.map(|_| ())
    }

    /// The codec values are decoded with.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Raw access to the read half, for byte-stream use after a continuation.
    pub fn reader_mut(&mut self) -> &mut ChannelReader {
        &mut self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{JsonCodec, MsgPackCodec};
    use crate::mux::{Channel, MuxConfig, MuxSession, Session};
    use serde::Deserialize;
    use tokio::io::{duplex, AsyncReadExt};

    fn pipe<C: Codec>(codec: C) -> (Encoder<C>, Decoder<C>) {
        let (a, b) = duplex(64);
        let (_, writer) = Channel::from_io(a).into_split();
        let (reader, _) = Channel::from_io(b).into_split();
        (Encoder::new(writer, codec.clone()), Decoder::new(reader, codec))
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Record {
        name: String,
        values: Vec<u32>,
    }

    #[tokio::test]
    async fn test_values_in_order_then_end() {
        let (mut encoder, mut decoder) = pipe(MsgPackCodec);

        tokio::spawn(async move {
            encoder.send(&"header").await.unwrap();
            encoder.send(&42u32).await.unwrap();
            encoder.close_write().await.unwrap();
        });

        assert_eq!(decoder.receive::<String>().await.unwrap(), "header");
        assert_eq!(decoder.receive::<u32>().await.unwrap(), 42);
        assert!(decoder.try_receive::<u32>().await.unwrap().is_none());
        assert!(matches!(
            decoder.receive::<u32>().await,
            Err(DuplexError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_value_larger_than_pipe_buffer() {
        let (mut encoder, mut decoder) = pipe(JsonCodec);
        let record = Record {
            name: "spread across many reads".to_string(),
            values: (0..200).collect(),
        };

        let sent = Record {
            name: record.name.clone(),
            values: record.values.clone(),
        };
        tokio::spawn(async move {
            encoder.send(&sent).await.unwrap();
        });

        assert_eq!(decoder.receive::<Record>().await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_raw_bytes_follow_value() {
        let (mut encoder, mut decoder) = pipe(MsgPackCodec);

        tokio::spawn(async move {
            encoder.send(&"switch").await.unwrap();
            encoder.writer_mut().write_all(b"raw tail").await.unwrap();
            encoder.close_write().await.unwrap();
        });

        assert_eq!(decoder.receive::<String>().await.unwrap(), "switch");
        let mut tail = Vec::new();
        decoder.reader_mut().read_to_end(&mut tail).await.unwrap();
        assert_eq!(tail, b"raw tail");
    }

    #[tokio::test]
    async fn test_receive_discard_skips_one_value() {
        let (mut encoder, mut decoder) = pipe(JsonCodec);

        tokio::spawn(async move {
            encoder.send(&Record { name: "skip".into(), values: vec![1] }).await.unwrap();
            encoder.send(&"keep").await.unwrap();
        });

        decoder.receive_discard().await.unwrap();
        assert_eq!(decoder.receive::<String>().await.unwrap(), "keep");
    }

    #[tokio::test]
    async fn test_truncated_value_is_protocol_error() {
        let (mut encoder, mut decoder) = pipe(MsgPackCodec);

        tokio::spawn(async move {
            let bytes = MsgPackCodec.encode(&"truncated string").unwrap();
            encoder.send_encoded(&bytes[..4]).await.unwrap();
            encoder.close_write().await.unwrap();
        });

        let err = decoder.receive::<String>().await.unwrap_err();
        assert!(matches!(err, DuplexError::Protocol(_)));
    }

    /// A session whose writes are split into frames of `frame_size` bytes.
    async fn framed(frame_size: u32) -> (Encoder<JsonCodec>, Decoder<JsonCodec>, [MuxSession; 2]) {
        let (a, b) = duplex(1024);
        let config = MuxConfig {
            max_frame_size: frame_size,
            ..MuxConfig::default()
        };
        let client = MuxSession::with_config(a, config);
        let server = MuxSession::new(b);

        let (_, writer) = client.open().await.unwrap().into_split();
        let (reader, _) = server.accept().await.unwrap().unwrap().into_split();
        (
            Encoder::new(writer, JsonCodec),
            Decoder::new(reader, JsonCodec),
            [client, server],
        )
    }

    #[tokio::test]
    async fn test_terminator_in_own_frame_then_end() {
        // "\"abc\"\n" is six bytes, so the newline travels alone.
        let (mut encoder, mut decoder, _sessions) = framed(5).await;
        encoder.send(&"abc").await.unwrap();
        encoder.close_write().await.unwrap();

        assert_eq!(decoder.receive::<String>().await.unwrap(), "abc");
        assert!(decoder.try_receive::<String>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminator_in_own_frame_then_raw_bytes() {
        let (mut encoder, mut decoder, _sessions) = framed(5).await;
        encoder.send(&"abc").await.unwrap();
        encoder.writer_mut().write_all(b"tail").await.unwrap();
        encoder.close_write().await.unwrap();

        assert_eq!(decoder.receive::<String>().await.unwrap(), "abc");
        let mut tail = Vec::new();
        decoder.reader_mut().read_to_end(&mut tail).await.unwrap();
        assert_eq!(tail, b"tail");
    }

    #[tokio::test]
    async fn test_unterminated_value_at_end_of_stream() {
        let (mut encoder, mut decoder) = pipe(JsonCodec);

        tokio::spawn(async move {
            encoder.send_encoded(b"\"last\"").await.unwrap();
            encoder.close_write().await.unwrap();
        });

        assert_eq!(decoder.receive::<String>().await.unwrap(), "last");
        assert!(decoder.try_receive::<String>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_decode_keeps_value() {
        let (mut encoder, mut decoder, _sessions) = framed(16).await;
        let record = Record {
            name: "split over several frames".to_string(),
            values: vec![1, 2, 3],
        };
        encoder.send(&record).await.unwrap();
        encoder.send(&"next").await.unwrap();
        encoder.close_write().await.unwrap();

        assert!(decoder.receive::<Vec<u32>>().await.is_err());
        assert_eq!(decoder.receive::<Record>().await.unwrap(), record);
        assert_eq!(decoder.receive::<String>().await.unwrap(), "next");
    }
}
