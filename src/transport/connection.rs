//! Pipe connection to the console server.
//!
//! A [`Connection`] owns both halves of the pipe:
//! - a writer task (see [`crate::writer`]) that serializes request frames;
//! - a reader task that routes each reply to the call waiting on its
//!   request id, and each unpause event to the event table.
//!
//! When the reader stops, for any reason, every call still in flight fails
//! with `ConnectionClosed` and new calls are refused.
//!
//! A call or wait dropped before it finishes removes its own table slot.
//! Unpause events that arrive before their wait are kept in a short queue
//! that drops the oldest when full.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{BoxFuture, Limits, PipeStream, Transport};
use crate::control::{connect_request, ConnectInfo};
use crate::error::{ConwireError, Result};
use crate::protocol::{Frame, FrameBuffer, CONNECT_API};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Read buffer size for the reader task.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connection settings.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Limits the client is willing to use, before negotiation.
    pub limits: Limits,
    pub writer: WriterConfig,
}

/// Unpause events kept for a later wait, at most.
const MAX_EARLY_EVENTS: usize = 64;

struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

#[derive(Default)]
struct Tables {
    closed: bool,
    in_flight: HashMap<u32, oneshot::Sender<Frame>>,
    waiting: HashMap<u32, Waiter>,
    /// Events signaled before anyone waited, oldest first.
    early: VecDeque<u32>,
    next_waiter: u64,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
}

impl Shared {
    fn dispatch(&self, frame: Frame) {
        if frame.is_unpause() {
            self.signal(frame.request_id());
            return;
        }

        if !frame.is_reply() {
            tracing::warn!(api = frame.header.api, "Received unexpected non-reply frame");
            return;
        }

        let request_id = frame.request_id();
        let waiter = self.tables.lock().in_flight.remove(&request_id);
        match waiter {
            Some(tx) => {
                // caller may have been cancelled
                let _ = tx.send(frame);
            }
            None => tracing::warn!("Reply for unknown request {}", request_id),
        }
    }

    fn signal(&self, event: u32) {
        tracing::debug!("Unpause event {}", event);
        let mut tables = self.tables.lock();
        if let Some(waiter) = tables.waiting.remove(&event) {
            let _ = waiter.tx.send(());
            return;
        }
        if tables.early.contains(&event) {
            return;
        }
        if tables.early.len() == MAX_EARLY_EVENTS {
            if let Some(dropped) = tables.early.pop_front() {
                tracing::warn!(event = dropped, "Dropping unclaimed unpause event");
            }
        }
        tables.early.push_back(event);
    }

    fn close(&self) {
        let mut tables = self.tables.lock();
        tables.closed = true;
        let dropped = tables.in_flight.len();
        tables.in_flight.clear();
        tables.waiting.clear();
        tables.early.clear();
        if dropped > 0 {
            tracing::warn!("Connection closed with {} calls in flight", dropped);
        }
    }
}

/// Removes a call's reply slot when the call ends, answered or not.
struct InFlightGuard<'a> {
    shared: &'a Shared,
    request_id: u32,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.shared.tables.lock().in_flight.remove(&self.request_id);
    }
}

/// Removes a wait's slot when the wait ends, signaled or not.
struct WaitGuard<'a> {
    shared: &'a Shared,
    event: u32,
    id: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut tables = self.shared.tables.lock();
        // a later wait on the same event owns the slot now
        if tables.waiting.get(&self.event).is_some_and(|w| w.id == self.id) {
            tables.waiting.remove(&self.event);
        }
    }
}

/// Multiplexed connection to the console server.
pub struct Connection {
    writer: WriterHandle,
    shared: Arc<Shared>,
    next_request_id: AtomicU32,
    limits: Limits,
    server: ConnectInfo,
    _writer_task: JoinHandle<Result<()>>,
    reader_task: JoinHandle<()>,
}

impl Connection {
    /// Connect to the server pipe at `path` and run the handshake.
    pub async fn connect(path: &str, config: ConnectionConfig) -> Result<Self> {
        let stream = PipeStream::connect(path).await?;
        Self::from_stream(stream, config).await
    }

    /// Run the handshake over an already-connected stream.
    pub async fn from_stream<S>(stream: S, config: ConnectionConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut write_half) = tokio::io::split(stream);
        let mut frames =
            FrameBuffer::with_limits(config.limits.max_body, config.limits.max_capture);

        // 1. $connect
        write_half
            .write_all(&connect_request(std::process::id()).to_vec())
            .await?;
        write_half.flush().await?;

        // 2. Server answer, plus anything that arrived with it
        let mut early = read_frames(&mut reader, &mut frames).await?.into_iter();
        let reply = early.next().ok_or(ConwireError::ConnectionClosed)?;
        if !reply.is_reply() || reply.header.api != CONNECT_API {
            return Err(ConwireError::Protocol(
                "Expected $connect reply as first frame".to_string(),
            ));
        }
        if !reply.status().is_success() {
            return Err(ConwireError::Status(reply.status()));
        }
        let server = ConnectInfo::parse(reply.body())?;
        server.check_version()?;

        // 3. Negotiated limits
        let limits = server.negotiate(config.limits);
        frames.set_max_capture_size(limits.max_capture);
        tracing::debug!(
            version = %server.version,
            max_frame_payload = limits.max_frame_payload,
            max_capture = limits.max_capture,
            "Connected to console server"
        );

        // 4. Background tasks
        let shared = Arc::new(Shared::default());
        for frame in early {
            shared.dispatch(frame);
        }

        let (writer, writer_task) = spawn_writer_task(write_half, config.writer);
        let reader_shared = shared.clone();
        let reader_task = tokio::spawn(async move {
            if let Err(e) = read_loop(reader, frames, &reader_shared).await {
                tracing::error!("Read loop error: {}", e);
            }
            reader_shared.close();
        });

        Ok(Self {
            writer,
            shared,
            next_request_id: AtomicU32::new(1),
            limits,
            server,
            _writer_task: writer_task,
            reader_task,
        })
    }

    /// Handshake answer from the server.
    pub fn server_info(&self) -> &ConnectInfo {
        &self.server
    }

    /// Check if the reader has stopped.
    pub fn is_closed(&self) -> bool {
        self.shared.tables.lock().closed
    }

    /// Request frames waiting to be written.
    pub fn queued_frames(&self) -> usize {
        self.writer.queued()
    }

    fn next_id(&self) -> u32 {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    async fn call(&self, request: Frame) -> Result<Frame> {
        let request_id = self.next_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut tables = self.shared.tables.lock();
            if tables.closed {
                return Err(ConwireError::ConnectionClosed);
            }
            tables.in_flight.insert(request_id, tx);
        }
        let _slot = InFlightGuard {
            shared: &self.shared,
            request_id,
        };

        let frame = request.with_request_id(request_id);
        self.writer.send(frame).await?;

        rx.await.map_err(|_| ConwireError::ConnectionClosed)
    }

    async fn wait(&self, event: u32) -> Result<()> {
        let (rx, _slot) = {
            let mut tables = self.shared.tables.lock();
            if tables.closed {
                return Err(ConwireError::ConnectionClosed);
            }
            if let Some(at) = tables.early.iter().position(|e| *e == event) {
                tables.early.remove(at);
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            let id = tables.next_waiter;
            tables.next_waiter += 1;
            tables.waiting.insert(event, Waiter { id, tx });
            let slot = WaitGuard {
                shared: &self.shared,
                event,
                id,
            };
            (rx, slot)
        };

        rx.await.map_err(|_| ConwireError::ConnectionClosed)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl Transport for Connection {
    fn round_trip(&self, request: Frame) -> BoxFuture<'_, Result<Frame>> {
        Box::pin(self.call(request))
    }

    fn wait_event(&self, event: u32) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.wait(event))
    }

    fn limits(&self) -> Limits {
        self.limits
    }
}

/// Read until at least one complete frame is available.
async fn read_frames<R: AsyncRead + Unpin>(
    reader: &mut R,
    frames: &mut FrameBuffer,
) -> Result<Vec<Frame>> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(ConwireError::ConnectionClosed);
        }
        let ready = frames.push(&buf[..n])?;
        if !ready.is_empty() {
            return Ok(ready);
        }
    }
}

/// Main read loop - reads frames and routes them.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    mut frames: FrameBuffer,
    shared: &Shared,
) -> Result<()> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("Server closed the pipe");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) => return Err(ConwireError::Io(e)),
        };

        for frame in frames.push(&buf[..n])? {
            shared.dispatch(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{connect_reply, parse_connect_message, PROTOCOL_VERSION};
    use crate::protocol::message::{Request, WriteConsoleReply, WriteConsoleRequest};
    use crate::protocol::{
        ApiNumber, Header, Reply, Status, DEFAULT_MAX_CAPTURE_SIZE, DEFAULT_MAX_FRAME_PAYLOAD,
    };
    use crate::types::{Encoding, Handle};
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream, ReadHalf, WriteHalf};

    struct FakeServer {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
        frames: FrameBuffer,
        queue: VecDeque<Frame>,
    }

    impl FakeServer {
        fn new(stream: DuplexStream) -> Self {
            let (reader, writer) = tokio::io::split(stream);
            Self {
                reader,
                writer,
                frames: FrameBuffer::new(),
                queue: VecDeque::new(),
            }
        }

        async fn next(&mut self) -> Frame {
            loop {
                if let Some(frame) = self.queue.pop_front() {
                    return frame;
                }
                let ready = read_frames(&mut self.reader, &mut self.frames)
                    .await
                    .unwrap();
                self.queue.extend(ready);
            }
        }

        async fn send(&mut self, frame: &Frame) {
            self.writer.write_all(&frame.to_vec()).await.unwrap();
        }
    }

    fn server_info(max_frame_payload: usize) -> ConnectInfo {
        ConnectInfo {
            version: PROTOCOL_VERSION.to_string(),
            max_frame_payload,
            max_capture_size: DEFAULT_MAX_CAPTURE_SIZE,
        }
    }

    async fn connected(max_frame_payload: usize) -> (Connection, FakeServer) {
        let (client, server) = duplex(64 * 1024);
        let mut fake = FakeServer::new(server);

        let handshake = async {
            let hello = fake.next().await;
            assert_eq!(hello.header.api, CONNECT_API);
            let params = parse_connect_message(hello.body()).unwrap();
            assert_eq!(params.pid, std::process::id());
            fake.send(&connect_reply(&server_info(max_frame_payload)).unwrap())
                .await;
        };

        let (connection, ()) = tokio::join!(
            Connection::from_stream(client, ConnectionConfig::default()),
            handshake
        );
        (connection.unwrap(), fake)
    }

    fn write_request() -> Frame {
        let request = Request::WriteConsole(WriteConsoleRequest {
            handle: Handle(1),
            encoding: Encoding::Narrow,
            chars_to_write: 2,
            chars: b"hi".to_vec(),
        });
        Frame::request(&request, Bytes::new()).unwrap()
    }

    fn write_reply(request_id: u32, n: u32) -> Frame {
        let reply = Reply::WriteConsole(WriteConsoleReply { chars_written: n });
        Frame::reply(request_id, Status::SUCCESS, &reply, Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_negotiates_limits() {
        let (connection, _server) = connected(4096).await;

        assert_eq!(connection.limits().max_frame_payload, 4096);
        assert_eq!(connection.server_info().version, PROTOCOL_VERSION);
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn test_handshake_rejects_failure_status() {
        let (client, server) = duplex(4096);
        let mut fake = FakeServer::new(server);

        let refuse = async {
            let _ = fake.next().await;
            let header = Header::reply(CONNECT_API, 0, Status::UNSUCCESSFUL, 0, 0);
            fake.send(&Frame::new(header, Bytes::new(), Bytes::new())).await;
        };

        let (result, ()) = tokio::join!(
            Connection::from_stream(client, ConnectionConfig::default()),
            refuse
        );
        assert!(matches!(
            result,
            Err(ConwireError::Status(Status::UNSUCCESSFUL))
        ));
    }

    #[tokio::test]
    async fn test_replies_routed_by_request_id() {
        let (connection, mut server) = connected(DEFAULT_MAX_FRAME_PAYLOAD).await;
        let connection = Arc::new(connection);

        let first = tokio::spawn({
            let connection = connection.clone();
            async move { connection.round_trip(write_request()).await }
        });
        let second = tokio::spawn({
            let connection = connection.clone();
            async move { connection.round_trip(write_request()).await }
        });

        let a = server.next().await;
        let b = server.next().await;
        assert_ne!(a.request_id(), b.request_id());

        // answer out of order, each with its own request id as the count
        server.send(&write_reply(b.request_id(), b.request_id())).await;
        server.send(&write_reply(a.request_id(), a.request_id())).await;

        for handle in [first, second] {
            let reply = handle.await.unwrap().unwrap();
            let body = WriteConsoleReply::try_from(reply.decode_reply().unwrap().unwrap()).unwrap();
            assert_eq!(body.chars_written, reply.request_id());
        }
    }

    #[tokio::test]
    async fn test_unpause_before_wait_is_kept() {
        let (connection, mut server) = connected(DEFAULT_MAX_FRAME_PAYLOAD).await;

        server.send(&Frame::unpause(55)).await;
        // let the reader route it
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), connection.wait_event(55))
            .await
            .unwrap()
            .unwrap();
    }

    /// Poll the tables until `ready` holds, for up to a second.
    async fn settle(connection: &Connection, ready: impl Fn(&Tables) -> bool) {
        for _ in 0..100 {
            if ready(&*connection.shared.tables.lock()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("connection tables did not settle");
    }

    #[tokio::test]
    async fn test_cancelled_wait_leaves_no_slot() {
        let (connection, mut server) = connected(DEFAULT_MAX_FRAME_PAYLOAD).await;

        let result =
            tokio::time::timeout(Duration::from_millis(20), connection.wait_event(77)).await;
        assert!(result.is_err());
        assert!(connection.shared.tables.lock().waiting.is_empty());

        // the event still reaches a later wait
        server.send(&Frame::unpause(77)).await;
        tokio::time::timeout(Duration::from_secs(1), connection.wait_event(77))
            .await
            .unwrap()
            .unwrap();
        assert!(connection.shared.tables.lock().early.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_call_leaves_no_entry() {
        let (connection, mut server) = connected(DEFAULT_MAX_FRAME_PAYLOAD).await;

        let (result, request) = tokio::join!(
            tokio::time::timeout(
                Duration::from_millis(50),
                connection.round_trip(write_request())
            ),
            server.next()
        );
        assert!(result.is_err());
        assert!(connection.shared.tables.lock().in_flight.is_empty());

        // a late reply is dropped without closing the connection
        server.send(&write_reply(request.request_id(), 2)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!connection.is_closed());

        let (result, ()) = tokio::join!(connection.round_trip(write_request()), async {
            let next = server.next().await;
            server.send(&write_reply(next.request_id(), 2)).await;
        });
        assert!(result.unwrap().is_reply());
    }

    #[tokio::test]
    async fn test_unclaimed_unpause_events_are_bounded() {
        let (connection, mut server) = connected(DEFAULT_MAX_FRAME_PAYLOAD).await;
        let sent = MAX_EARLY_EVENTS as u32 + 10;

        for event in 1..=sent {
            server.send(&Frame::unpause(event)).await;
        }
        settle(&connection, |t| t.early.back() == Some(&sent)).await;

        {
            let tables = connection.shared.tables.lock();
            assert_eq!(tables.early.len(), MAX_EARLY_EVENTS);
            assert_eq!(tables.early.front(), Some(&11));
        }

        tokio::time::timeout(Duration::from_secs(1), connection.wait_event(sent))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            connection.shared.tables.lock().early.len(),
            MAX_EARLY_EVENTS - 1
        );
    }

    #[tokio::test]
    async fn test_wait_then_unpause() {
        let (connection, mut server) = connected(DEFAULT_MAX_FRAME_PAYLOAD).await;

        let (result, ()) = tokio::join!(connection.wait_event(9), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            server.send(&Frame::unpause(9)).await;
        });
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_in_flight_call_fails_when_server_closes() {
        let (connection, mut server) = connected(DEFAULT_MAX_FRAME_PAYLOAD).await;

        let (result, ()) = tokio::join!(connection.round_trip(write_request()), async {
            let _ = server.next().await;
            drop(server);
        });

        assert!(matches!(result, Err(ConwireError::ConnectionClosed)));
        assert!(connection.is_closed());
        assert!(matches!(
            connection.round_trip(write_request()).await,
            Err(ConwireError::ConnectionClosed)
        ));
        assert!(matches!(
            connection.wait_event(1).await,
            Err(ConwireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_pending_reply_is_returned_to_caller() {
        let (connection, mut server) = connected(DEFAULT_MAX_FRAME_PAYLOAD).await;

        let (result, ()) = tokio::join!(connection.round_trip(write_request()), async {
            let request = server.next().await;
            let pending = Frame::pending(ApiNumber::WriteConsole, request.request_id(), 3).unwrap();
            server.send(&pending).await;
        });

        let reply = result.unwrap();
        assert!(reply.is_pending());
        assert_eq!(reply.decode_pending().unwrap().event, 3);
    }
}
