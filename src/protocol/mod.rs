//! Protocol module - wire format, framing, and message bodies.
//!
//! This module implements the binary protocol spoken with the console server:
//! - 19-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct carrying body and capture sections
//! - Typed request and reply bodies keyed by [`ApiNumber`]

mod api;
mod frame;
mod frame_buffer;
pub mod message;
mod status;
mod wire_format;

pub use api::ApiNumber;
pub use frame::{build_frame, build_frame_parts, Frame};
pub use frame_buffer::FrameBuffer;
pub use message::{CaptureSlot, PendingNotice, Reply, Request};
pub use status::Status;
pub use wire_format::{
    flags, Header, CONNECT_API, DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_CAPTURE_SIZE,
    DEFAULT_MAX_FRAME_PAYLOAD, HEADER_SIZE, MIN_MESSAGE_SIZE, RESERVED_API, UNPAUSE_API,
};
