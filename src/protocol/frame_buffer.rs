//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 19 bytes
//! - `WaitingForSections`: Header parsed, need body + capture bytes
//!
//! # Example
//!
//! ```
//! use conwire_client::protocol::{build_frame, FrameBuffer, Header};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = build_frame(&Header::unpause(3), b"", b"");
//!
//! let frames = buffer.push(&bytes).unwrap();
//! assert!(frames[0].is_unpause());
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_CAPTURE_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 19 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for body and capture bytes.
    WaitingForSections { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// All data is stored in a single `BytesMut` buffer to minimize allocations.
pub struct FrameBuffer {
    /// Accumulated bytes from pipe reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    max_body_size: u32,
    max_capture_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_CAPTURE_SIZE)
    }

    /// Create a new frame buffer with custom section limits.
    pub fn with_limits(max_body_size: u32, max_capture_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_body_size,
            max_capture_size,
        }
    }

    /// Tighten the capture limit after the handshake.
    pub fn set_max_capture_size(&mut self, max_capture_size: u32) {
        self.max_capture_size = max_capture_size;
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// If data is fragmented, partial data is buffered internally for the
    /// next push.
    ///
    /// # Errors
    ///
    /// Returns error if a header fails validation (reserved API, reserved
    /// flag bits, or a section over its limit).
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    let Some(header) = Header::decode(&self.buffer) else {
                        return Ok(None);
                    };
                    header.validate(self.max_body_size, self.max_capture_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForSections { header };
                }

                State::WaitingForSections { header } => {
                    let body_len = header.body_length as usize;
                    let capture_len = header.capture_length as usize;

                    if self.buffer.len() < body_len + capture_len {
                        return Ok(None);
                    }

                    let header = *header;
                    let body = self.buffer.split_to(body_len).freeze();
                    let capture = self.buffer.split_to(capture_len).freeze();

                    self.state = State::WaitingForHeader;
                    return Ok(Some(Frame::new(header, body, capture)));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForSections { .. } => "WaitingForSections",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
