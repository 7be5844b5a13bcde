//! Wire format encoding and decoding.
//!
//! Implements the 19-byte frame header:
//! ```text
//! ┌─────────┬───────┬──────────┬──────────┬──────────┬──────────┐
//! │ API     │ Flags │ Req ID   │ Status   │ Body len │ Capt len │
//! │ 2 bytes │ 1 byte│ 4 bytes  │ 4 bytes  │ 4 bytes  │ 4 bytes  │
//! │ u16 BE  │       │ u32 BE   │ u32 BE   │ u32 BE   │ u32 BE   │
//! └─────────┴───────┴──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! The header is followed by `body_length` bytes of MsgPack body and then
//! `capture_length` bytes of capture region.

use super::status::Status;
use crate::error::{ConwireError, Result};

/// Header size in bytes (fixed, exactly 19).
pub const HEADER_SIZE: usize = 19;

/// Default inline payload carried by one request frame (16 KiB).
pub const DEFAULT_MAX_FRAME_PAYLOAD: usize = 16 * 1024;

/// Smallest message the allocator hands out, whatever the payload.
pub const MIN_MESSAGE_SIZE: usize = 256;

/// Default maximum MsgPack body size accepted from the server (64 KiB).
pub const DEFAULT_MAX_BODY_SIZE: u32 = 64 * 1024;

/// Default maximum capture region per frame (16 MiB).
pub const DEFAULT_MAX_CAPTURE_SIZE: u32 = 16 * 1024 * 1024;

/// Reserved API number (never valid).
pub const RESERVED_API: u16 = 0;

/// API number of the connect handshake frame.
pub const CONNECT_API: u16 = 0xFFFE;

/// API number of server-to-client unpause events.
///
/// On these frames `request_id` carries the event id.
pub const UNPAUSE_API: u16 = 0xFFFF;

/// Flag constants for the protocol.
pub mod flags {
    /// Frame travels server to client as a reply.
    pub const IS_REPLY: u8 = 0b0000_0001;
    /// Server deferred the reply; body is a pending notice.
    pub const PENDING: u8 = 0b0000_0010;
    /// A capture region follows the body.
    pub const HAS_CAPTURE: u8 = 0b0000_0100;
    /// Unsolicited server event (not a reply).
    pub const IS_EVENT: u8 = 0b0000_1000;

    /// Reserved bits mask (bits 4-7).
    pub const RESERVED_MASK: u8 = 0b1111_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Pending reply flags: is_reply + pending = 0x03
    pub const PENDING_REPLY: u8 = IS_REPLY | PENDING;
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Operation identifier (see [`ApiNumber`](super::ApiNumber)).
    pub api: u16,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Request identifier, echoed by the reply. Event id on unpause frames.
    pub request_id: u32,
    /// Application status (replies only, zero on requests).
    pub status: Status,
    /// MsgPack body length in bytes.
    pub body_length: u32,
    /// Capture region length in bytes.
    pub capture_length: u32,
}

impl Header {
    /// Create a request header.
    pub fn request(api: u16, body_length: u32, capture_length: u32) -> Self {
        let flags = if capture_length > 0 {
            flags::HAS_CAPTURE
        } else {
            0
        };
        Self {
            api,
            flags,
            request_id: 0,
            status: Status::SUCCESS,
            body_length,
            capture_length,
        }
    }

    /// Create a reply header for the given request id.
    pub fn reply(
        api: u16,
        request_id: u32,
        status: Status,
        body_length: u32,
        capture_length: u32,
    ) -> Self {
        let mut flags = flags::IS_REPLY;
        if capture_length > 0 {
            flags |= flags::HAS_CAPTURE;
        }
        if status.is_pending() {
            flags |= flags::PENDING;
        }
        Self {
            api,
            flags,
            request_id,
            status,
            body_length,
            capture_length,
        }
    }

    /// Create an unpause event header.
    pub fn unpause(event: u32) -> Self {
        Self {
            api: UNPAUSE_API,
            flags: flags::IS_EVENT,
            request_id: event,
            status: Status::SUCCESS,
            body_length: 0,
            capture_length: 0,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use conwire_client::protocol::{Header, HEADER_SIZE};
    ///
    /// let header = Header::request(5, 40, 0);
    /// assert_eq!(header.encode().len(), HEADER_SIZE);
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
    /// Panics if buffer is smaller than `HEADER_SIZE` (19 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.api.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.request_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.status.0.to_be_bytes());
        buf[11..15].copy_from_slice(&self.body_length.to_be_bytes());
        buf[15..19].copy_from_slice(&self.capture_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let be32 = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Some(Self {
            api: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            request_id: be32(3),
            status: Status(be32(7)),
            body_length: be32(11),
            capture_length: be32(15),
        })
    }

    /// Validate the header against negotiated limits.
    pub fn validate(&self, max_body: u32, max_capture: u32) -> Result<()> {
        if self.api == RESERVED_API {
            return Err(ConwireError::Protocol("API number 0 is reserved".to_string()));
        }

        if self.body_length > max_body {
            return Err(ConwireError::Protocol(format!(
                "Body size {} exceeds maximum {}",
                self.body_length, max_body
            )));
        }

        if self.capture_length > max_capture {
            return Err(ConwireError::Protocol(format!(
                "Capture size {} exceeds maximum {}",
                self.capture_length, max_capture
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(ConwireError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Total frame size on the wire.
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.body_length as usize + self.capture_length as usize
    }

    #[inline]
    pub fn is_reply(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_REPLY)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        flags::has_flag(self.flags, flags::PENDING)
    }

    #[inline]
    pub fn has_capture(&self) -> bool {
        flags::has_flag(self.flags, flags::HAS_CAPTURE)
    }

    #[inline]
    pub fn is_event(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_EVENT)
    }

    /// Check if this is an unpause event.
    #[inline]
    pub fn is_unpause(&self) -> bool {
        self.api == UNPAUSE_API && self.is_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header {
            api: 0x0102,
            flags: 0x05,
            request_id: 0x0304_0506,
            status: Status(0xC000_0008),
            body_length: 0x0000_0A0B,
            capture_length: 0x0C0D_0E0F,
        };
        let bytes = header.encode();

        assert_eq!(&bytes[0..2], &[0x01, 0x02]);
        assert_eq!(bytes[2], 0x05);
        assert_eq!(&bytes[3..7], &[0x03, 0x04, 0x05, 0x06]);
        assert_eq!(&bytes[7..11], &[0xC0, 0x00, 0x00, 0x08]);
        assert_eq!(&bytes[11..15], &[0x00, 0x00, 0x0A, 0x0B]);
        assert_eq!(&bytes[15..19], &[0x0C, 0x0D, 0x0E, 0x0F]);

        assert_eq!(Header::decode(&bytes), Some(header));
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_request_sets_capture_flag() {
        assert!(!Header::request(1, 10, 0).has_capture());
        assert!(Header::request(1, 10, 64).has_capture());
    }

    #[test]
    fn test_reply_pending_flag_follows_status() {
        let pending = Header::reply(5, 9, Status::PENDING, 4, 0);
        assert!(pending.is_reply());
        assert!(pending.is_pending());
        assert_eq!(pending.flags, flags::PENDING_REPLY);

        let done = Header::reply(5, 9, Status::SUCCESS, 4, 0);
        assert!(!done.is_pending());
    }

    #[test]
    fn test_unpause_header() {
        let header = Header::unpause(77);
        assert!(header.is_unpause());
        assert!(!header.is_reply());
        assert_eq!(header.request_id, 77);
    }

    #[test]
    fn test_validate_rejects_reserved_api() {
        let header = Header::request(RESERVED_API, 0, 0);
        let err = header.validate(DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_CAPTURE_SIZE);
        assert!(err.unwrap_err().to_string().contains("reserved"));
    }

    #[test]
    fn test_validate_limits() {
        let header = Header::request(1, 200, 0);
        assert!(header.validate(100, 100).is_err());

        let header = Header::request(1, 10, 5000);
        let err = header.validate(100, 100).unwrap_err();
        assert!(err.to_string().contains("Capture size"));

        let header = Header::request(1, 100, 100);
        assert!(header.validate(100, 100).is_ok());
    }

    #[test]
    fn test_validate_reserved_bits() {
        let mut header = Header::request(1, 0, 0);
        header.flags = 0b1000_0000;
        assert!(header.validate(100, 100).is_err());
    }

    #[test]
    fn test_frame_len() {
        let header = Header::request(1, 30, 70);
        assert_eq!(header.frame_len(), HEADER_SIZE + 100);
    }
}
