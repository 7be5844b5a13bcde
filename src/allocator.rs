//! Message allocation.
//!
//! A message is one staging block sized for the fixed request fields of an
//! operation plus one inline payload chunk. The chunk is clamped to the
//! frame payload limit, so payloads larger than that are split by the
//! chunking driver into several calls sharing one message.
//!
//! Requests are encoded into the message itself. The body a call sends is
//! the staged body, so it never outgrows the message it was sized for.

use bytes::Bytes;

use crate::codec::MsgPackCodec;
use crate::error::{ConwireError, Result};
use crate::protocol::{ApiNumber, Request, MIN_MESSAGE_SIZE};
use crate::staging::{StagingArena, StagingLease};

/// Hands out [`MessageBuffer`]s from a staging arena.
#[derive(Debug, Clone)]
pub struct MessageAllocator {
    arena: StagingArena,
    max_frame_payload: usize,
}

impl MessageAllocator {
    pub fn new(arena: StagingArena, max_frame_payload: usize) -> Self {
        Self {
            arena,
            max_frame_payload,
        }
    }

    /// Total message size for a request of `requested_payload` bytes.
    ///
    /// `max(MIN_MESSAGE_SIZE, header_size + min(requested_payload, max_frame_payload))`
    pub fn frame_size(&self, header_size: usize, requested_payload: usize) -> usize {
        let payload = requested_payload.min(self.max_frame_payload);
        (header_size + payload).max(MIN_MESSAGE_SIZE)
    }

    /// Allocate a message for `api` with room for up to `requested_payload`
    /// inline bytes.
    ///
    /// Fails with `OutOfMemory` before any call is attempted.
    pub fn allocate(&self, api: ApiNumber, requested_payload: usize) -> Result<MessageBuffer> {
        let header_size = api.fixed_header_size();
        let total = self.frame_size(header_size, requested_payload);
        let payload_capacity = requested_payload.min(self.max_frame_payload);

        let (buf, lease) = self.arena.alloc_zeroed(total)?;
        tracing::trace!(?api, total, payload_capacity, "Allocated message");

        Ok(MessageBuffer {
            api,
            buf,
            payload_capacity,
            body_len: 0,
            _lease: lease,
        })
    }

    /// Inline payload limit per frame.
    #[inline]
    pub fn max_frame_payload(&self) -> usize {
        self.max_frame_payload
    }

    #[inline]
    pub fn arena(&self) -> &StagingArena {
        &self.arena
    }
}

/// A staged request message.
///
/// Holds its staging lease until dropped.
#[derive(Debug)]
pub struct MessageBuffer {
    api: ApiNumber,
    buf: Vec<u8>,
    payload_capacity: usize,
    body_len: usize,
    _lease: StagingLease,
}

impl MessageBuffer {
    #[inline]
    pub fn api(&self) -> ApiNumber {
        self.api
    }

    /// Total staged size, header included.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.buf.len()
    }

    /// Inline bytes this message can carry per call.
    #[inline]
    pub fn payload_capacity(&self) -> usize {
        self.payload_capacity
    }

    /// Whole elements of `element_size` bytes that fit in one call.
    #[inline]
    pub fn elements_per_frame(&self, element_size: usize) -> usize {
        self.payload_capacity / element_size.max(1)
    }

    /// Encode `request` into the message, replacing the previous one.
    pub fn stage(&mut self, request: &Request) -> Result<StagedRequest> {
        if request.api() != self.api {
            return Err(ConwireError::Protocol(format!(
                "{:?} request staged in a {:?} message",
                request.api(),
                self.api
            )));
        }
        if request.inline_len() > self.payload_capacity {
            return Err(ConwireError::InvalidParameter(
                "chunk exceeds message payload capacity",
            ));
        }

        let total = self.buf.len();
        self.body_len = 0;
        let len = match MsgPackCodec::encode_into(&mut self.buf, request) {
            Ok(len) => len,
            Err(ConwireError::MsgPackEncode(_)) => {
                return Err(ConwireError::Protocol(format!(
                    "{:?} request does not fit its {} byte message",
                    self.api, total
                )))
            }
            Err(e) => return Err(e),
        };
        self.body_len = len;

        Ok(StagedRequest {
            api: self.api,
            body: Bytes::copy_from_slice(self.body()),
        })
    }

    /// The encoded body currently staged.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.buf[..self.body_len]
    }
}

/// An encoded request body, ready to be issued.
///
/// Only [`MessageBuffer::stage`] creates one, so every issued body has been
/// checked against the message it was sized for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRequest {
    api: ApiNumber,
    body: Bytes,
}

impl StagedRequest {
    #[inline]
    pub fn api(&self) -> ApiNumber {
        self.api
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}
