//! In-memory console server for integration tests.
//!
//! [`MockConsole`] implements [`Transport`] directly, and [`serve`] runs it
//! behind a byte stream so the full connection stack can be exercised.
//! Faults are injected by call number (1-based).

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use conwire_client::codec::{decode_into, encode_slice, Element};
use conwire_client::control::{connect_reply, ConnectInfo, PROTOCOL_VERSION};
use conwire_client::protocol::message::{
    FillConsoleOutputAttributeReply, FillConsoleOutputCharacterReply, GetConsoleInputReply,
    ReadConsoleOutputCodeReply, ReadConsoleOutputReply, ReadConsoleReply,
    WriteConsoleInputReply, WriteConsoleOutputAttributeReply, WriteConsoleOutputCharacterReply,
    WriteConsoleOutputReply, WriteConsoleReply,
};
use conwire_client::protocol::{CaptureSlot, Frame, FrameBuffer, Reply, Request, CONNECT_API};
use conwire_client::transport::{BoxFuture, Limits, Transport};
use conwire_client::{
    CharInfo, CodeType, ConwireError, Coord, Encoding, Handle, InputMode, InputRecord, Result,
    SmallRect, Status,
};

/// Handle of the screen buffer.
pub const OUTPUT: Handle = Handle(1);
/// Handle of the input queue.
pub const INPUT: Handle = Handle(2);

#[derive(Default)]
struct Faults {
    fail_on: Option<(usize, Status)>,
    break_on: Option<usize>,
    pending_on: Vec<usize>,
    max_chunk: Option<usize>,
}

struct State {
    size: Coord,
    cells: Vec<CharInfo>,
    input: VecDeque<InputRecord>,
    typed: VecDeque<u16>,
    control_key_state: u32,
    written: Vec<u16>,
    faults: Faults,
    calls: usize,
    waits: usize,
    requests: Vec<Request>,
    next_event: u32,
}

/// Console server state plus fault injection.
pub struct MockConsole {
    state: Mutex<State>,
    limits: Limits,
}

impl MockConsole {
    pub fn new(width: i16, height: i16) -> Self {
        let size = Coord::new(width, height);
        Self {
            state: Mutex::new(State {
                size,
                cells: vec![CharInfo::new(u16::from(b' '), 0x07); size.area()],
                input: VecDeque::new(),
                typed: VecDeque::new(),
                control_key_state: 0,
                written: Vec::new(),
                faults: Faults::default(),
                calls: 0,
                waits: 0,
                requests: Vec::new(),
                next_event: 0,
            }),
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Fail call `n` with `status` and no reply body.
    pub fn fail_call(&self, n: usize, status: Status) {
        self.state.lock().faults.fail_on = Some((n, status));
    }

    /// Drop the connection on call `n`.
    pub fn break_call(&self, n: usize) {
        self.state.lock().faults.break_on = Some(n);
    }

    /// Defer call `n`.
    pub fn pend_call(&self, n: usize) {
        self.state.lock().faults.pending_on.push(n);
    }

    /// Accept at most `n` elements per inline write.
    pub fn limit_chunk(&self, n: usize) {
        self.state.lock().faults.max_chunk = Some(n);
    }

    pub fn push_input(&self, records: &[InputRecord]) {
        self.state.lock().input.extend(records.iter().copied());
    }

    pub fn type_text(&self, text: &str) {
        self.state.lock().typed.extend(text.encode_utf16());
    }

    pub fn set_control_key_state(&self, state: u32) {
        self.state.lock().control_key_state = state;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    pub fn waits(&self) -> usize {
        self.state.lock().waits
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    pub fn input_len(&self) -> usize {
        self.state.lock().input.len()
    }

    /// Characters received through `write_console`.
    pub fn written(&self) -> Vec<u16> {
        self.state.lock().written.clone()
    }

    pub fn cell(&self, at: Coord) -> CharInfo {
        let state = self.state.lock();
        state.cells[state.index(at)]
    }

    /// Serve one request frame.
    pub fn handle(&self, frame: &Frame) -> Result<Frame> {
        let request = frame.decode_request()?;
        let api = request.api();
        let request_id = frame.request_id();

        let mut state = self.state.lock();
        state.calls += 1;
        let call = state.calls;
        state.requests.push(request.clone());

        if state.faults.break_on == Some(call) {
            return Err(ConwireError::ConnectionClosed);
        }
        if state.faults.pending_on.contains(&call) {
            state.next_event += 1;
            return Frame::pending(api, request_id, state.next_event);
        }
        if let Some((n, status)) = state.faults.fail_on {
            if n == call {
                return Ok(Frame::failure(api, request_id, status));
            }
        }

        let mut capture = BytesMut::from(frame.capture());
        let (status, reply) = state.execute(request, &mut capture);
        Frame::reply(request_id, status, &reply, capture.freeze())
    }
}

impl Transport for MockConsole {
    fn round_trip(&self, request: Frame) -> BoxFuture<'_, Result<Frame>> {
        Box::pin(async move { self.handle(&request) })
    }

    fn wait_event(&self, _event: u32) -> BoxFuture<'_, Result<()>> {
        self.state.lock().waits += 1;
        Box::pin(async { Ok(()) })
    }

    fn limits(&self) -> Limits {
        self.limits
    }
}

/// Run `console` behind `stream`: answer the handshake, then every request.
///
/// Pending replies are followed at once by the matching unpause event.
pub async fn serve<S>(stream: S, console: Arc<MockConsole>) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        for frame in frames.push(&buf[..n])? {
            if frame.header.api == CONNECT_API {
                let info = ConnectInfo {
                    version: PROTOCOL_VERSION.to_string(),
                    max_frame_payload: console.limits.max_frame_payload,
                    max_capture_size: console.limits.max_capture,
                };
                writer.write_all(&connect_reply(&info)?.to_vec()).await?;
                continue;
            }

            let reply = console.handle(&frame)?;
            writer.write_all(&reply.to_vec()).await?;
            if reply.is_pending() {
                let notice = reply.decode_pending()?;
                writer
                    .write_all(&Frame::unpause(notice.event).to_vec())
                    .await?;
            }
        }
    }
}

fn put<E: Element>(capture: &mut [u8], slot: CaptureSlot, items: &[E]) {
    let bytes = encode_slice(items);
    let range = slot.range();
    let len = bytes.len().min(range.len());
    capture[range.start..range.start + len].copy_from_slice(&bytes[..len]);
}

fn take<E: Element + Default>(capture: &[u8], slot: CaptureSlot, count: usize) -> Vec<E> {
    let mut out = vec![E::default(); count];
    let n = decode_into(&capture[slot.range()], &mut out);
    out.truncate(n);
    out
}

fn decode_chars(encoding: Encoding, bytes: &[u8]) -> Vec<u16> {
    match encoding {
        Encoding::Narrow => bytes.iter().map(|b| u16::from(*b)).collect(),
        Encoding::Wide => {
            let mut out = vec![0u16; bytes.len() / 2];
            decode_into(bytes, &mut out);
            out
        }
    }
}

fn put_chars(capture: &mut [u8], slot: CaptureSlot, encoding: Encoding, chars: &[u16]) {
    match encoding {
        Encoding::Narrow => {
            let narrow: Vec<u8> = chars.iter().map(|c| *c as u8).collect();
            put(capture, slot, &narrow);
        }
        Encoding::Wide => put(capture, slot, chars),
    }
}

impl State {
    fn index(&self, at: Coord) -> usize {
        at.y as usize * self.size.x as usize + at.x as usize
    }

    fn next(&self, at: Coord) -> Coord {
        if at.x + 1 < self.size.x {
            Coord::new(at.x + 1, at.y)
        } else {
            Coord::new(0, at.y + 1)
        }
    }

    /// Visit up to `n` cells from `start`, wrapping rows.
    fn walk(
        &mut self,
        start: Coord,
        n: usize,
        mut visit: impl FnMut(usize, &mut CharInfo),
    ) -> (usize, Coord) {
        let mut at = start;
        let mut done = 0;
        while done < n && at.within(self.size) {
            let index = self.index(at);
            visit(done, &mut self.cells[index]);
            done += 1;
            at = self.next(at);
        }
        (done, at)
    }

    fn clip(&self, region: SmallRect) -> SmallRect {
        let clipped = SmallRect::new(
            region.left.max(0),
            region.top.max(0),
            region.right.min(self.size.x - 1),
            region.bottom.min(self.size.y - 1),
        );
        if clipped.area() == 0 {
            SmallRect::EMPTY
        } else {
            clipped
        }
    }

    fn accept(&self, requested: usize) -> usize {
        requested.min(self.faults.max_chunk.unwrap_or(usize::MAX))
    }

    fn execute(&mut self, request: Request, capture: &mut [u8]) -> (Status, Reply) {
        let handle = request.handle();
        if handle != OUTPUT && handle != INPUT {
            // out-parameters still travel with the failure
            let reply = match &request {
                Request::ReadConsole(_) => Reply::from(ReadConsoleReply {
                    chars_read: 0,
                    control_key_state: self.control_key_state,
                }),
                Request::ReadConsoleOutput(_) => Reply::from(ReadConsoleOutputReply {
                    read_region: SmallRect::EMPTY,
                }),
                Request::WriteConsoleOutput(_) => Reply::from(WriteConsoleOutputReply {
                    write_region: SmallRect::EMPTY,
                }),
                other => empty_reply(other),
            };
            return (Status::INVALID_HANDLE, reply);
        }

        let reply = match request {
            Request::ReadConsole(r) => {
                let initial = r.initial_chars as usize;
                let wanted = (r.chars_to_read as usize).saturating_sub(initial);
                let prefix_len = initial * r.encoding.char_size();
                let mut chars = decode_chars(r.encoding, &capture[r.buffer.range()][..prefix_len]);
                let n = wanted.min(self.typed.len());
                chars.extend(self.typed.drain(..n));
                put_chars(capture, r.buffer, r.encoding, &chars);
                Reply::from(ReadConsoleReply {
                    chars_read: chars.len() as u32,
                    control_key_state: self.control_key_state,
                })
            }
            Request::GetConsoleInput(r) => {
                let n = (r.length as usize).min(self.input.len());
                let records: Vec<InputRecord> = match r.mode {
                    InputMode::Read => self.input.drain(..n).collect(),
                    InputMode::Peek => self.input.iter().take(n).copied().collect(),
                };
                put(capture, r.records, &records);
                Reply::from(GetConsoleInputReply {
                    events_read: n as u32,
                })
            }
            Request::ReadConsoleOutput(r) => {
                let region = self.clip(r.read_region);
                let stride = r.buffer_size.x.max(0) as usize;
                let mut block = vec![CharInfo::default(); stride * r.buffer_size.y.max(0) as usize];
                for row in 0..region.height() {
                    for col in 0..region.width() {
                        let at = Coord::new(region.left + col as i16, region.top + row as i16);
                        block[row * stride + col] = self.cells[self.index(at)];
                    }
                }
                put(capture, r.cells, &block);
                Reply::from(ReadConsoleOutputReply {
                    read_region: region,
                })
            }
            Request::ReadConsoleOutputCode(r) => {
                let mut codes = Vec::new();
                let (n, end) = self.walk(r.read_coord, r.codes_to_read as usize, |_, cell| {
                    codes.push(*cell)
                });
                match r.code_type {
                    CodeType::Ascii => {
                        let ascii: Vec<u8> = codes.iter().map(|c| c.ch as u8).collect();
                        put(capture, r.codes, &ascii);
                    }
                    CodeType::Unicode => {
                        let chars: Vec<u16> = codes.iter().map(|c| c.ch).collect();
                        put(capture, r.codes, &chars);
                    }
                    CodeType::Attribute => {
                        let attrs: Vec<u16> = codes.iter().map(|c| c.attributes).collect();
                        put(capture, r.codes, &attrs);
                    }
                }
                Reply::from(ReadConsoleOutputCodeReply {
                    codes_read: n as u32,
                    end_coord: end,
                })
            }
            Request::WriteConsole(r) => {
                let chars = decode_chars(r.encoding, &r.chars);
                let n = self.accept(chars.len());
                self.written.extend_from_slice(&chars[..n]);
                Reply::from(WriteConsoleReply {
                    chars_written: n as u32,
                })
            }
            Request::WriteConsoleInput(r) => {
                let records: Vec<InputRecord> = take(capture, r.records, r.length as usize);
                self.input.extend(records.iter().copied());
                Reply::from(WriteConsoleInputReply {
                    events_written: records.len() as u32,
                })
            }
            Request::WriteConsoleOutput(r) => {
                let region = self.clip(r.write_region);
                let stride = r.buffer_size.x.max(0) as usize;
                let block: Vec<CharInfo> = take(capture, r.cells, r.buffer_size.area());
                for row in 0..region.height() {
                    for col in 0..region.width() {
                        let at = Coord::new(region.left + col as i16, region.top + row as i16);
                        let index = self.index(at);
                        self.cells[index] = block[row * stride + col];
                    }
                }
                Reply::from(WriteConsoleOutputReply {
                    write_region: region,
                })
            }
            Request::WriteConsoleOutputCharacter(r) => {
                let chars = decode_chars(r.encoding, &r.chars);
                let n = self.accept(chars.len());
                let (done, end) = self.walk(r.coord, n, |i, cell| cell.ch = chars[i]);
                Reply::from(WriteConsoleOutputCharacterReply {
                    chars_written: done as u32,
                    end_coord: end,
                })
            }
            Request::WriteConsoleOutputAttribute(r) => {
                let attrs = decode_chars(Encoding::Wide, &r.attributes);
                let n = self.accept(attrs.len());
                let (done, end) = self.walk(r.coord, n, |i, cell| cell.attributes = attrs[i]);
                Reply::from(WriteConsoleOutputAttributeReply {
                    attrs_written: done as u32,
                    end_coord: end,
                })
            }
            Request::FillConsoleOutputCharacter(r) => {
                let (done, _) = self.walk(r.coord, r.length as usize, |_, cell| cell.ch = r.ch);
                Reply::from(FillConsoleOutputCharacterReply {
                    chars_written: done as u32,
                })
            }
            Request::FillConsoleOutputAttribute(r) => {
                let (done, _) = self.walk(r.coord, r.length as usize, |_, cell| {
                    cell.attributes = r.attribute
                });
                Reply::from(FillConsoleOutputAttributeReply {
                    attrs_written: done as u32,
                })
            }
        };
        (Status::SUCCESS, reply)
    }
}

/// Zero-count reply body for `request`.
fn empty_reply(request: &Request) -> Reply {
    match request {
        Request::ReadConsole(_) => Reply::from(ReadConsoleReply::default()),
        Request::GetConsoleInput(_) => Reply::from(GetConsoleInputReply::default()),
        Request::ReadConsoleOutput(_) => Reply::from(ReadConsoleOutputReply::default()),
        Request::ReadConsoleOutputCode(_) => Reply::from(ReadConsoleOutputCodeReply::default()),
        Request::WriteConsole(_) => Reply::from(WriteConsoleReply::default()),
        Request::WriteConsoleInput(_) => Reply::from(WriteConsoleInputReply::default()),
        Request::WriteConsoleOutput(_) => Reply::from(WriteConsoleOutputReply::default()),
        Request::WriteConsoleOutputCharacter(_) => {
            Reply::from(WriteConsoleOutputCharacterReply::default())
        }
        Request::WriteConsoleOutputAttribute(_) => {
            Reply::from(WriteConsoleOutputAttributeReply::default())
        }
        Request::FillConsoleOutputCharacter(_) => {
            Reply::from(FillConsoleOutputCharacterReply::default())
        }
        Request::FillConsoleOutputAttribute(_) => {
            Reply::from(FillConsoleOutputAttributeReply::default())
        }
    }
}
