//! Frame struct with typed accessors.
//!
//! A frame is a header followed by two sections: the MsgPack body and the
//! capture region. Both use `bytes::Bytes` so that replies can be handed to
//! the caller without copying.
//!
//! # Example
//!
//! ```
//! use conwire_client::protocol::{Frame, Header, Status};
//! use bytes::Bytes;
//!
//! let header = Header::reply(5, 42, Status::SUCCESS, 5, 0);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"), Bytes::new());
//!
//! assert_eq!(frame.request_id(), 42);
//! assert_eq!(frame.body(), b"hello");
//! ```

use bytes::Bytes;

use super::api::ApiNumber;
use super::message::{PendingNotice, Reply, Request};
use super::status::Status;
use super::wire_format::{Header, HEADER_SIZE};
use crate::codec::MsgPackCodec;
use crate::error::{ConwireError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// MsgPack body.
    pub body: Bytes,
    /// Capture region.
    pub capture: Bytes,
}

fn section_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| ConwireError::Protocol(format!("{} too large: {}", what, len)))
}

impl Frame {
    /// Create a new frame from header and sections.
    pub fn new(header: Header, body: Bytes, capture: Bytes) -> Self {
        Self {
            header,
            body,
            capture,
        }
    }

    /// Encode a request body and attach the capture region.
    ///
    /// The request id is left at zero; the connection assigns it.
    pub fn request(request: &Request, capture: Bytes) -> Result<Self> {
        let body = MsgPackCodec::encode(request)?;
        Self::request_body(request.api(), Bytes::from(body), capture)
    }

    /// Request frame around an already-encoded body.
    pub fn request_body(api: ApiNumber, body: Bytes, capture: Bytes) -> Result<Self> {
        let header = Header::request(
            api.as_u16(),
            section_len(body.len(), "Body")?,
            section_len(capture.len(), "Capture")?,
        );
        Ok(Self::new(header, body, capture))
    }

    /// Encode a completed reply.
    pub fn reply(request_id: u32, status: Status, reply: &Reply, capture: Bytes) -> Result<Self> {
        let body = MsgPackCodec::encode(reply)?;
        let header = Header::reply(
            reply.api().as_u16(),
            request_id,
            status,
            section_len(body.len(), "Body")?,
            section_len(capture.len(), "Capture")?,
        );
        Ok(Self::new(header, Bytes::from(body), capture))
    }

    /// Encode a failure reply with no body.
    pub fn failure(api: ApiNumber, request_id: u32, status: Status) -> Self {
        let header = Header::reply(api.as_u16(), request_id, status, 0, 0);
        Self::new(header, Bytes::new(), Bytes::new())
    }

    /// Encode a pending reply naming the event that will release the call.
    pub fn pending(api: ApiNumber, request_id: u32, event: u32) -> Result<Self> {
        let body = MsgPackCodec::encode(&PendingNotice { event })?;
        let header = Header::reply(
            api.as_u16(),
            request_id,
            Status::PENDING,
            section_len(body.len(), "Body")?,
            0,
        );
        Ok(Self::new(header, Bytes::from(body), Bytes::new()))
    }

    /// Unpause event frame.
    pub fn unpause(event: u32) -> Self {
        Self::new(Header::unpause(event), Bytes::new(), Bytes::new())
    }

    /// Operation named by the header.
    pub fn api(&self) -> Result<ApiNumber> {
        ApiNumber::try_from(self.header.api)
    }

    /// Decode the request body, checking it against the header's API number.
    pub fn decode_request(&self) -> Result<Request> {
        let api = self.api()?;
        let request: Request = MsgPackCodec::decode(&self.body)?;
        if request.api() != api {
            return Err(ConwireError::Protocol(format!(
                "Header names {:?} but body is {:?}",
                api,
                request.api()
            )));
        }
        Ok(request)
    }

    /// Decode the reply body, checking it against the header's API number.
    ///
    /// Returns `None` for a reply without a body (failures may omit it).
    pub fn decode_reply(&self) -> Result<Option<Reply>> {
        let api = self.api()?;
        if self.body.is_empty() {
            return Ok(None);
        }
        let reply: Reply = MsgPackCodec::decode(&self.body)?;
        if reply.api() != api {
            return Err(ConwireError::Protocol(format!(
                "Header names {:?} but body is {:?}",
                api,
                reply.api()
            )));
        }
        Ok(Some(reply))
    }

    /// Decode the body of a pending reply.
    pub fn decode_pending(&self) -> Result<PendingNotice> {
        if !self.header.is_pending() {
            return Err(ConwireError::Protocol(
                "Frame is not a pending reply".to_string(),
            ));
        }
        MsgPackCodec::decode(&self.body)
    }

    /// Set the request id, returning the frame.
    pub fn with_request_id(mut self, request_id: u32) -> Self {
        self.header.request_id = request_id;
        self
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get a reference to the capture region.
    #[inline]
    pub fn capture(&self) -> &[u8] {
        &self.capture
    }

    /// Get the request ID.
    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    /// Get the reply status.
    #[inline]
    pub fn status(&self) -> Status {
        self.header.status
    }

    #[inline]
    pub fn is_reply(&self) -> bool {
        self.header.is_reply()
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.header.is_pending()
    }

    #[inline]
    pub fn is_unpause(&self) -> bool {
        self.header.is_unpause()
    }

    /// Encode the whole frame into one contiguous buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        build_frame(&self.header, &self.body, &self.capture)
    }
}

/// Build a complete frame as a single byte vector.
///
/// Use `build_frame_parts` for scatter/gather I/O (writev).
///
/// # Example
///
/// ```
/// use conwire_client::protocol::{build_frame, Header, HEADER_SIZE};
///
/// let header = Header::request(5, 3, 2);
/// let bytes = build_frame(&header, b"abc", b"xy");
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// ```
pub fn build_frame(header: &Header, body: &[u8], capture: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len() + capture.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    buf.extend_from_slice(capture);
    buf
}

/// Build frame parts for scatter/gather I/O.
///
/// Returns the encoded header and references to both sections.
pub fn build_frame_parts<'a>(
    header: &Header,
    body: &'a [u8],
    capture: &'a [u8],
) -> ([u8; HEADER_SIZE], &'a [u8], &'a [u8]) {
    (header.encode(), body, capture)
}
