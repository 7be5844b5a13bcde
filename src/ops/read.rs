//! Read operations. Each is a single round trip.
//!
//! A failed read copies nothing into the caller's buffer. Out-parameters
//! the server reports alongside a failure (read region, control key state)
//! are still written back.

use crate::capture::CaptureBuffer;
use crate::client::ConsoleClient;
use crate::codec::Element;
use crate::error::{record, ConwireError, Result};
use crate::protocol::message::{
    GetConsoleInputReply, GetConsoleInputRequest, ReadConsoleOutputCodeReply,
    ReadConsoleOutputCodeRequest, ReadConsoleOutputReply, ReadConsoleOutputRequest,
    ReadConsoleReply, ReadConsoleRequest,
};
use crate::protocol::{ApiNumber, CaptureSlot, Request};
use crate::transport::Transport;
use crate::types::{CharInfo, Coord, Encoding, Handle, InputMode, InputRecord, SmallRect};
use crate::unmarshal::copy_out;

use super::{check_coord, wire_count, BlockLayout, CodeBufMut, ReadConsoleControl, TextBufMut};

impl<T: Transport> ConsoleClient<T> {
    /// Read characters typed at the console.
    ///
    /// `control.initial_chars` characters at the start of `buf` are sent
    /// along as already-typed input. `control.control_key_state` is
    /// updated from the reply even when the read fails.
    ///
    /// Returns the number of characters placed in `buf`.
    pub async fn read_console(
        &self,
        handle: Handle,
        mut buf: TextBufMut<'_>,
        control: &mut ReadConsoleControl,
    ) -> Result<usize> {
        record(self.read_console_inner(handle, &mut buf, control).await)
    }

    async fn read_console_inner(
        &self,
        handle: Handle,
        buf: &mut TextBufMut<'_>,
        control: &mut ReadConsoleControl,
    ) -> Result<usize> {
        let initial = control.initial_chars as usize;
        if initial > buf.len() {
            return Err(ConwireError::InvalidParameter(
                "initial characters exceed the buffer",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let size = buf.byte_len();
        self.check_capture(size)?;
        let mut message = self.allocator.allocate(ApiNumber::ReadConsole, 0)?;
        let mut capture = CaptureBuffer::acquire(&self.arena, 1, size)?;

        let mut staged = buf.encode_prefix(initial);
        staged.resize(size, 0);
        let slot = capture.capture(&staged)?;

        let request = Request::ReadConsole(ReadConsoleRequest {
            handle,
            encoding: buf.encoding(),
            chars_to_read: wire_count(buf.len())?,
            initial_chars: control.initial_chars,
            ctrl_wakeup_mask: control.ctrl_wakeup_mask,
            buffer: slot,
        });
        let request = message.stage(&request)?;
        let completion = self.calls.call(&request, &capture.to_bytes()).await?;

        if let Some(reply) = completion.body::<ReadConsoleReply>()? {
            control.control_key_state = reply.control_key_state;
        }
        let reply: ReadConsoleReply = completion.success()?;

        let count = reply.chars_read as usize;
        match buf {
            TextBufMut::Narrow(chars) => copy_out(&completion.capture, slot, count, &mut **chars),
            TextBufMut::Wide(chars) => copy_out(&completion.capture, slot, count, &mut **chars),
        }
    }

    /// Fetch queued input records, consuming or peeking per `mode`.
    ///
    /// Returns the number of records placed in `records`. Slots past that
    /// count are left untouched.
    pub async fn get_console_input(
        &self,
        handle: Handle,
        encoding: Encoding,
        mode: InputMode,
        records: &mut [InputRecord],
    ) -> Result<usize> {
        record(self.get_console_input_inner(handle, encoding, mode, records).await)
    }

    /// [`get_console_input`](Self::get_console_input) in `Read` mode.
    pub async fn read_console_input(
        &self,
        handle: Handle,
        encoding: Encoding,
        records: &mut [InputRecord],
    ) -> Result<usize> {
        self.get_console_input(handle, encoding, InputMode::Read, records)
            .await
    }

    /// [`get_console_input`](Self::get_console_input) in `Peek` mode.
    pub async fn peek_console_input(
        &self,
        handle: Handle,
        encoding: Encoding,
        records: &mut [InputRecord],
    ) -> Result<usize> {
        self.get_console_input(handle, encoding, InputMode::Peek, records)
            .await
    }

    async fn get_console_input_inner(
        &self,
        handle: Handle,
        encoding: Encoding,
        mode: InputMode,
        records: &mut [InputRecord],
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let size = records.len() * InputRecord::SIZE;
        self.check_capture(size)?;
        let mut message = self.allocator.allocate(ApiNumber::GetConsoleInput, 0)?;
        let mut capture = CaptureBuffer::acquire(&self.arena, 1, size)?;
        let slot = capture.allocate_pointer(size)?;

        let request = Request::GetConsoleInput(GetConsoleInputRequest {
            handle,
            encoding,
            mode,
            length: wire_count(records.len())?,
            records: slot,
        });
        let request = message.stage(&request)?;
        let completion = self.calls.call(&request, &capture.to_bytes()).await?;
        let reply: GetConsoleInputReply = completion.success()?;

        copy_out(&completion.capture, slot, reply.events_read as usize, records)
    }

    /// Read a rectangle of cells into a 2-D caller buffer.
    ///
    /// `cells` is a `buffer_size.x * buffer_size.y` grid and the rectangle
    /// lands at `buffer_coord`. On return, `region` holds the rectangle the
    /// server actually read, even when the read fails.
    pub async fn read_console_output(
        &self,
        handle: Handle,
        encoding: Encoding,
        cells: &mut [CharInfo],
        buffer_size: Coord,
        buffer_coord: Coord,
        region: &mut SmallRect,
    ) -> Result<()> {
        record(
            self.read_console_output_inner(handle, encoding, cells, buffer_size, buffer_coord, region)
                .await,
        )
    }

    async fn read_console_output_inner(
        &self,
        handle: Handle,
        encoding: Encoding,
        cells: &mut [CharInfo],
        buffer_size: Coord,
        buffer_coord: Coord,
        region: &mut SmallRect,
    ) -> Result<()> {
        let layout = BlockLayout::new(cells.len(), buffer_size, buffer_coord, *region)?;
        if layout.cells() == 0 {
            *region = SmallRect::EMPTY;
            return Ok(());
        }

        let size = layout.cells() * CharInfo::SIZE;
        self.check_capture(size)?;
        let mut message = self.allocator.allocate(ApiNumber::ReadConsoleOutput, 0)?;
        let mut capture = CaptureBuffer::acquire(&self.arena, 1, size)?;
        let slot = capture.allocate_pointer(size)?;

        let request = Request::ReadConsoleOutput(ReadConsoleOutputRequest {
            handle,
            encoding,
            buffer_size: Coord::new(layout.width as i16, layout.height as i16),
            buffer_coord: Coord::default(),
            read_region: layout.clip(*region),
            cells: slot,
        });
        let request = message.stage(&request)?;
        let completion = self.calls.call(&request, &capture.to_bytes()).await?;

        if let Some(reply) = completion.body::<ReadConsoleOutputReply>()? {
            *region = reply.read_region;
        }
        let reply: ReadConsoleOutputReply = completion.success()?;

        // rows arrive at the block's stride, placed at buffer_coord
        let width = reply.read_region.width().min(layout.width);
        let height = reply.read_region.height().min(layout.height);
        let stride = layout.width * CharInfo::SIZE;
        for row in 0..height {
            let row_slot = CaptureSlot {
                offset: slot.offset + (row * stride) as u32,
                length: (width * CharInfo::SIZE) as u32,
            };
            let start = layout.row_start(row);
            copy_out(
                &completion.capture,
                row_slot,
                width,
                &mut cells[start..start + width],
            )?;
        }

        tracing::trace!(width, height, "Read console output block");
        Ok(())
    }

    /// Read characters or attributes starting at `read_coord`.
    ///
    /// Returns the number of codes placed in `codes`.
    pub async fn read_console_output_code(
        &self,
        handle: Handle,
        mut codes: CodeBufMut<'_>,
        read_coord: Coord,
    ) -> Result<usize> {
        record(
            self.read_console_output_code_inner(handle, &mut codes, read_coord)
                .await,
        )
    }

    async fn read_console_output_code_inner(
        &self,
        handle: Handle,
        codes: &mut CodeBufMut<'_>,
        read_coord: Coord,
    ) -> Result<usize> {
        check_coord(read_coord)?;
        if codes.is_empty() {
            return Ok(0);
        }

        let code_type = codes.code_type();
        let size = codes.len() * code_type.element_size();
        self.check_capture(size)?;
        let mut message = self.allocator.allocate(ApiNumber::ReadConsoleOutputCode, 0)?;
        let mut capture = CaptureBuffer::acquire(&self.arena, 1, size)?;
        let slot = capture.allocate_pointer(size)?;

        let request = Request::ReadConsoleOutputCode(ReadConsoleOutputCodeRequest {
            handle,
            code_type,
            read_coord,
            codes_to_read: wire_count(codes.len())?,
            codes: slot,
        });
        let request = message.stage(&request)?;
        let completion = self.calls.call(&request, &capture.to_bytes()).await?;
        let reply: ReadConsoleOutputCodeReply = completion.success()?;

        let count = reply.codes_read as usize;
        match codes {
            CodeBufMut::Ascii(out) => copy_out(&completion.capture, slot, count, &mut **out),
            CodeBufMut::Unicode(out) | CodeBufMut::Attribute(out) => {
                copy_out(&completion.capture, slot, count, &mut **out)
            }
        }
    }
}
