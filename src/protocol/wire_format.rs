//! Wire format encoding and decoding.
//!
//! Implements the 9-byte mux frame header:
//! ```text
//! ┌────────────┬───────┬────────────┐
//! │ Channel ID │ Flags │ Length     │
//! │ 4 bytes    │ 1 byte│ 4 bytes    │
//! │ uint32 BE  │       │ uint32 BE  │
//! └────────────┴───────┴────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{DuplexError, Result};

/// Header size in bytes (fixed, exactly 9).
pub const HEADER_SIZE: usize = 9;

/// Default maximum payload size of a single frame (256 KB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 256 * 1024;

/// Flag constants for the protocol.
pub mod flags {
    /// Sender is the side that opened the channel.
    pub const FROM_OPENER: u8 = 0b0000_0001;
    /// Opens a new channel.
    pub const OPEN: u8 = 0b0000_0010;
    /// Sender will write no more data on the channel (half close).
    pub const EOF: u8 = 0b0000_0100;
    /// Sender is done with the channel in both directions.
    pub const CLOSE: u8 = 0b0000_1000;

    /// Control bits; a frame with none of them set carries data.
    pub const CONTROL_MASK: u8 = OPEN | EOF | CLOSE;

    /// Reserved bits mask (bits 4-7).
    pub const RESERVED_MASK: u8 = 0b1111_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Channel identifier, scoped to the side that opened the channel.
    pub channel_id: u32,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(channel_id: u32, flags: u8, payload_length: u32) -> Self {
        Self {
            channel_id,
            flags,
            payload_length,
        }
    }

    /// Header of a control frame (no payload).
    pub fn control(channel_id: u32, origin: u8, control: u8) -> Self {
        Self::new(channel_id, origin | control, 0)
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use duplex_rpc::protocol::{Header, flags};
    ///
    /// let header = Header::new(7, flags::FROM_OPENER, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 9);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (9 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.channel_id.to_be_bytes());
        buf[4] = self.flags;
        buf[5..9].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            channel_id: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            flags: buf[4],
            payload_length: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Reserved flag bits are 0
    /// - At most one control flag is set
    /// - Control frames carry no payload
    /// - Payload length doesn't exceed max
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(DuplexError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        let control = self.flags & flags::CONTROL_MASK;
        if control.count_ones() > 1 {
            return Err(DuplexError::Protocol(format!(
                "Conflicting control flags {:#04x}",
                control
            )));
        }

        if control != 0 && self.payload_length != 0 {
            return Err(DuplexError::Protocol(
                "Control frames must not carry a payload".to_string(),
            ));
        }

        if self.payload_length > max_payload_size {
            return Err(DuplexError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        Ok(())
    }

    /// Check if the sender opened this channel.
    #[inline]
    pub fn is_from_opener(&self) -> bool {
        flags::has_flag(self.flags, flags::FROM_OPENER)
    }

    /// Check if this opens a channel.
    #[inline]
    pub fn is_open(&self) -> bool {
        flags::has_flag(self.flags, flags::OPEN)
    }

    /// Check if this half-closes a channel.
    #[inline]
    pub fn is_eof(&self) -> bool {
        flags::has_flag(self.flags, flags::EOF)
    }

    /// Check if this fully closes a channel.
    #[inline]
    pub fn is_close(&self) -> bool {
        flags::has_flag(self.flags, flags::CLOSE)
    }

    /// Check if this is a data frame.
    #[inline]
    pub fn is_data(&self) -> bool {
        self.flags & flags::CONTROL_MASK == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(1, flags::FROM_OPENER, 100);
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(0x01020304, 0x05, 0x06070809);
        let bytes = header.encode();

        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_validate_reserved_bits_must_be_zero() {
        let header = Header::new(1, 0b1000_0000, 0);
        let result = header.validate(DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Reserved flag bits"));
    }

    #[test]
    fn test_validate_conflicting_control_flags() {
        let header = Header::new(1, flags::OPEN | flags::CLOSE, 0);
        assert!(header.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_err());
    }

    #[test]
    fn test_validate_control_frame_with_payload() {
        let header = Header::new(1, flags::EOF, 4);
        let err = header.validate(DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert!(err.to_string().contains("must not carry a payload"));
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header::new(1, 0, 1_000);
        let err = header.validate(100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_header_accessors() {
        let open = Header::control(3, flags::FROM_OPENER, flags::OPEN);
        assert!(open.is_open());
        assert!(open.is_from_opener());
        assert!(!open.is_data());
        assert!(open.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_ok());

        let data = Header::new(3, 0, 12);
        assert!(data.is_data());
        assert!(!data.is_from_opener());
        assert!(!data.is_eof());
        assert!(!data.is_close());
    }
}
