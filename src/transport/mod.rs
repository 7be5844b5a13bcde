//! Transport module - the seam between calls and the server.
//!
//! [`Transport`] is what the call layer talks to: one request frame in, one
//! reply frame out, plus a way to wait for the server's unpause events.
//! [`Connection`] implements it over a pipe. Tests implement it in memory.
//!
//! Provides pipe handling for:
//! - Unix Domain Sockets (Linux/macOS)
//! - Named Pipes (Windows)

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{
    Frame, DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_CAPTURE_SIZE, DEFAULT_MAX_FRAME_PAYLOAD,
};

mod connection;
mod pipe;

pub use connection::{Connection, ConnectionConfig};
pub use pipe::{generate_pipe_path, PipeListener, PipeStream};

/// Boxed future type for transport calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Size limits in force on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Inline payload bytes per request frame.
    pub max_frame_payload: usize,
    /// MsgPack body bytes accepted per frame.
    pub max_body: u32,
    /// Capture region bytes per frame.
    pub max_capture: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_payload: DEFAULT_MAX_FRAME_PAYLOAD,
            max_body: DEFAULT_MAX_BODY_SIZE,
            max_capture: DEFAULT_MAX_CAPTURE_SIZE,
        }
    }
}

/// One synchronous call to the console server.
pub trait Transport: Send + Sync {
    /// Send a request frame and resolve to its reply.
    ///
    /// The reply may be a pending notice; the caller decides what to do
    /// with it.
    fn round_trip(&self, request: Frame) -> BoxFuture<'_, Result<Frame>>;

    /// Wait until the server signals `event`.
    ///
    /// A signal that arrived before the wait started still completes it.
    fn wait_event(&self, event: u32) -> BoxFuture<'_, Result<()>>;

    /// Limits negotiated for this transport.
    fn limits(&self) -> Limits;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn round_trip(&self, request: Frame) -> BoxFuture<'_, Result<Frame>> {
        (**self).round_trip(request)
    }

    fn wait_event(&self, event: u32) -> BoxFuture<'_, Result<()>> {
        (**self).wait_event(event)
    }

    fn limits(&self) -> Limits {
        (**self).limits()
    }
}
