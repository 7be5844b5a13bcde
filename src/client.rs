//! Client builder and the console client.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring limits and
//! staging, then either connects to a server pipe or wraps any
//! [`Transport`]. The resulting [`ConsoleClient`] exposes the console
//! operations (see [`crate::ops`]).
//!
//! # Example
//!
//! ```ignore
//! use conwire_client::{ClientBuilder, Handle, Text};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new()
//!         .max_frame_payload(8 * 1024)
//!         .staging_limit(4 * 1024 * 1024)
//!         .connect("/tmp/conwire.sock")
//!         .await?;
//!
//!     let written = client.write_console(Handle(1), Text::from("hello")).await?;
//!     assert_eq!(written, 5);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::allocator::MessageAllocator;
use crate::call::CallTransport;
use crate::error::{ConwireError, Result};
use crate::protocol::ApiNumber;
use crate::staging::{StagingArena, DEFAULT_STAGING_LIMIT};
use crate::transport::{Connection, ConnectionConfig, Limits, Transport};
use crate::writer::WriterConfig;

/// Builder for configuring and creating a [`ConsoleClient`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    limits: Limits,
    staging_limit: usize,
    pending_timeout: Option<Duration>,
    writer_config: WriterConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            staging_limit: DEFAULT_STAGING_LIMIT,
            pending_timeout: None,
            writer_config: WriterConfig::default(),
        }
    }

    /// Set the inline payload limit per frame.
    ///
    /// Default: 16 KiB
    pub fn max_frame_payload(mut self, bytes: usize) -> Self {
        self.limits.max_frame_payload = bytes;
        self
    }

    /// Set the capture region limit per frame.
    ///
    /// Default: 16 MiB
    pub fn max_capture_size(mut self, bytes: u32) -> Self {
        self.limits.max_capture = bytes;
        self
    }

    /// Set the total staging budget shared by all in-flight operations.
    ///
    /// Default: 64 MiB
    pub fn staging_limit(mut self, bytes: usize) -> Self {
        self.staging_limit = bytes;
        self
    }

    /// Give up on pending calls after `timeout`.
    ///
    /// Default: wait forever
    pub fn pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = Some(timeout);
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 256
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Connect to the server pipe at `path`.
    pub async fn connect(self, path: &str) -> Result<ConsoleClient<Connection>> {
        let connection = Connection::connect(path, self.connection_config()).await?;
        self.build(connection)
    }

    /// Run the handshake over an already-connected stream.
    pub async fn connect_stream<S>(self, stream: S) -> Result<ConsoleClient<Connection>>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let connection = Connection::from_stream(stream, self.connection_config()).await?;
        self.build(connection)
    }

    /// Wrap an existing transport.
    ///
    /// Limits are the smaller of the builder's and the transport's. The
    /// inline payload is further capped so a full chunk plus the fixed
    /// request fields stays within the body limit.
    pub fn build<T: Transport>(self, transport: T) -> Result<ConsoleClient<T>> {
        let offered = transport.limits();
        let mut limits = Limits {
            max_frame_payload: self.limits.max_frame_payload.min(offered.max_frame_payload),
            max_body: self.limits.max_body.min(offered.max_body),
            max_capture: self.limits.max_capture.min(offered.max_capture),
        };
        let fixed = ApiNumber::max_fixed_header_size();
        if limits.max_body as usize <= fixed {
            return Err(ConwireError::InvalidParameter(
                "body limit leaves no room for a payload",
            ));
        }
        limits.max_frame_payload = limits
            .max_frame_payload
            .min(limits.max_body as usize - fixed);
        if limits.max_frame_payload == 0 {
            return Err(ConwireError::InvalidParameter(
                "max frame payload must be non-zero",
            ));
        }

        let arena = StagingArena::with_limit(self.staging_limit);
        tracing::debug!(
            max_frame_payload = limits.max_frame_payload,
            max_capture = limits.max_capture,
            staging_limit = self.staging_limit,
            "Console client ready"
        );

        Ok(ConsoleClient {
            calls: CallTransport::with_pending_timeout(transport, self.pending_timeout),
            allocator: MessageAllocator::new(arena.clone(), limits.max_frame_payload),
            arena,
            limits,
        })
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            limits: self.limits,
            writer: self.writer_config.clone(),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Console operations over a [`Transport`].
///
/// Operations take `&self`, so one client can be shared between tasks.
/// Each operation awaits one round trip at a time.
pub struct ConsoleClient<T> {
    pub(crate) calls: CallTransport<T>,
    pub(crate) allocator: MessageAllocator,
    pub(crate) arena: StagingArena,
    pub(crate) limits: Limits,
}

impl<T: Transport> ConsoleClient<T> {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    #[inline]
    pub fn transport(&self) -> &T {
        self.calls.transport()
    }

    /// Staging arena backing messages and capture buffers.
    #[inline]
    pub fn arena(&self) -> &StagingArena {
        &self.arena
    }

    /// Limits in force after negotiation.
    #[inline]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Reject capture regions larger than the negotiated limit.
    pub(crate) fn check_capture(&self, bytes: usize) -> Result<()> {
        if bytes > self.limits.max_capture as usize {
            return Err(ConwireError::InvalidParameter(
                "buffer exceeds the capture size limit",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::WriteConsoleOutputCharacterRequest;
    use crate::protocol::{Frame, Request};
    use crate::transport::BoxFuture;
    use crate::types::{Coord, Encoding, Handle};

    struct Offline(Limits);

    impl Transport for Offline {
        fn round_trip(&self, _request: Frame) -> BoxFuture<'_, Result<Frame>> {
            Box::pin(async { Err(ConwireError::ConnectionClosed) })
        }

        fn wait_event(&self, _event: u32) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn limits(&self) -> Limits {
            self.0
        }
    }

    #[test]
    fn test_builder_defaults() {
        let client = ClientBuilder::new().build(Offline(Limits::default())).unwrap();
        assert_eq!(client.limits(), Limits::default());
        assert_eq!(client.arena().limit(), DEFAULT_STAGING_LIMIT);
    }

    #[test]
    fn test_builder_takes_smaller_limits() {
        let offered = Limits {
            max_frame_payload: 1024,
            max_body: 4096,
            max_capture: 1 << 30,
        };
        let client = ClientBuilder::new()
            .max_frame_payload(4096)
            .max_capture_size(1 << 20)
            .staging_limit(1 << 16)
            .build(Offline(offered))
            .unwrap();

        assert_eq!(client.limits().max_frame_payload, 1024);
        assert_eq!(client.limits().max_capture, 1 << 20);
        assert_eq!(client.limits().max_body, 4096);
        assert_eq!(client.arena().limit(), 1 << 16);
    }

    #[test]
    fn test_payload_capped_by_body_limit() {
        let offered = Limits {
            max_frame_payload: 16 * 1024,
            max_body: 4096,
            max_capture: 1 << 20,
        };
        let client = ClientBuilder::new().build(Offline(offered)).unwrap();
        let payload = client.limits().max_frame_payload;
        assert_eq!(payload, 4096 - ApiNumber::max_fixed_header_size());

        // a full chunk of the widest inline write still fits the body limit
        let mut message = client
            .allocator
            .allocate(ApiNumber::WriteConsoleOutputCharacter, usize::MAX)
            .unwrap();
        let request = Request::WriteConsoleOutputCharacter(WriteConsoleOutputCharacterRequest {
            handle: Handle(u32::MAX),
            encoding: Encoding::Narrow,
            coord: Coord::new(i16::MIN, i16::MIN),
            length: u32::MAX,
            chars: vec![0; payload],
        });
        let staged = message.stage(&request).unwrap();
        assert!(staged.body().len() <= 4096);
    }

    #[test]
    fn test_builder_rejects_tiny_body_limit() {
        let offered = Limits {
            max_body: 100,
            ..Limits::default()
        };
        let result = ClientBuilder::new().build(Offline(offered));
        assert!(matches!(result, Err(ConwireError::InvalidParameter(_))));
    }

    #[test]
    fn test_builder_rejects_zero_payload() {
        let result = ClientBuilder::new()
            .max_frame_payload(0)
            .build(Offline(Limits::default()));
        assert!(matches!(result, Err(ConwireError::InvalidParameter(_))));
    }

    #[test]
    fn test_check_capture() {
        let client = ClientBuilder::new()
            .max_capture_size(64)
            .build(Offline(Limits::default()))
            .unwrap();
        assert!(client.check_capture(64).is_ok());
        assert!(client.check_capture(65).is_err());
    }
}
