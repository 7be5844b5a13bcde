//! Write operations.
//!
//! Character and attribute strings travel inline in the request body and
//! are split across calls by [`drive`]. Cell blocks and input records are
//! staged in a capture buffer and sent in one call.

use bytes::Bytes;

use crate::allocator::MessageBuffer;
use crate::call::CallTransport;
use crate::capture::CaptureBuffer;
use crate::client::ConsoleClient;
use crate::codec::Element;
use crate::driver::{drive, ChunkProgress, ChunkSink, ChunkStep};
use crate::error::{record, Result};
use crate::protocol::message::{
    FillConsoleOutputAttributeReply, FillConsoleOutputAttributeRequest,
    FillConsoleOutputCharacterReply, FillConsoleOutputCharacterRequest, WriteConsoleInputReply,
    WriteConsoleInputRequest, WriteConsoleOutputAttributeReply,
    WriteConsoleOutputAttributeRequest, WriteConsoleOutputCharacterReply,
    WriteConsoleOutputCharacterRequest, WriteConsoleOutputReply, WriteConsoleOutputRequest,
    WriteConsoleReply, WriteConsoleRequest,
};
use crate::protocol::{ApiNumber, Request};
use crate::transport::{BoxFuture, Transport};
use crate::types::{CharInfo, Coord, Encoding, Handle, InputRecord, SmallRect};

use super::{check_coord, wire_count, BlockLayout, FillChar, Text};

/// Operations whose payload travels inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InlineWrite {
    Console,
    OutputCharacter,
    OutputAttribute,
}

impl InlineWrite {
    fn api(self) -> ApiNumber {
        match self {
            InlineWrite::Console => ApiNumber::WriteConsole,
            InlineWrite::OutputCharacter => ApiNumber::WriteConsoleOutputCharacter,
            InlineWrite::OutputAttribute => ApiNumber::WriteConsoleOutputAttribute,
        }
    }
}

/// Stages one inline chunk per call in a shared message.
struct InlineSink<'a, T> {
    calls: &'a CallTransport<T>,
    message: MessageBuffer,
    handle: Handle,
    kind: InlineWrite,
    data: Text<'a>,
}

impl<'a, T: Transport> InlineSink<'a, T> {
    fn request(&self, step: ChunkStep, payload: Vec<u8>) -> Result<Request> {
        let length = wire_count(step.len)?;
        let coord = step.cursor.unwrap_or_default();
        let encoding = self.data.encoding();

        Ok(match self.kind {
            InlineWrite::Console => Request::WriteConsole(WriteConsoleRequest {
                handle: self.handle,
                encoding,
                chars_to_write: length,
                chars: payload,
            }),
            InlineWrite::OutputCharacter => {
                Request::WriteConsoleOutputCharacter(WriteConsoleOutputCharacterRequest {
                    handle: self.handle,
                    encoding,
                    coord,
                    length,
                    chars: payload,
                })
            }
            InlineWrite::OutputAttribute => {
                Request::WriteConsoleOutputAttribute(WriteConsoleOutputAttributeRequest {
                    handle: self.handle,
                    coord,
                    length,
                    attributes: payload,
                })
            }
        })
    }
}

impl<'a, T: Transport> ChunkSink for InlineSink<'a, T> {
    fn send(&mut self, step: ChunkStep) -> BoxFuture<'_, Result<ChunkProgress>> {
        Box::pin(async move {
            let chunk = self.data.encode_range(step.offset, step.len);
            let request = self.request(step, chunk)?;
            let request = self.message.stage(&request)?;

            let completion = self.calls.call(&request, &Bytes::new()).await?;
            let progress = match self.kind {
                InlineWrite::Console => {
                    let reply: WriteConsoleReply = completion.success()?;
                    ChunkProgress {
                        done: reply.chars_written as usize,
                        end_cursor: None,
                    }
                }
                InlineWrite::OutputCharacter => {
                    let reply: WriteConsoleOutputCharacterReply = completion.success()?;
                    ChunkProgress {
                        done: reply.chars_written as usize,
                        end_cursor: Some(reply.end_coord),
                    }
                }
                InlineWrite::OutputAttribute => {
                    let reply: WriteConsoleOutputAttributeReply = completion.success()?;
                    ChunkProgress {
                        done: reply.attrs_written as usize,
                        end_cursor: Some(reply.end_coord),
                    }
                }
            };
            Ok(progress)
        })
    }
}

impl<T: Transport> ConsoleClient<T> {
    /// Write characters at the console's current position.
    ///
    /// Returns the number of characters the server accepted. A failure
    /// after some chunks were accepted is a
    /// [`PartialTransfer`](crate::ConwireError::PartialTransfer).
    pub async fn write_console(&self, handle: Handle, text: Text<'_>) -> Result<usize> {
        record(self.write_inline(handle, InlineWrite::Console, text, None).await)
    }

    /// Write characters into the screen buffer starting at `coord`.
    ///
    /// Each chunk starts where the server reported the previous one ended.
    pub async fn write_console_output_character(
        &self,
        handle: Handle,
        text: Text<'_>,
        coord: Coord,
    ) -> Result<usize> {
        record(
            self.write_inline(handle, InlineWrite::OutputCharacter, text, Some(coord))
                .await,
        )
    }

    /// Write attribute words into the screen buffer starting at `coord`.
    pub async fn write_console_output_attribute(
        &self,
        handle: Handle,
        attributes: &[u16],
        coord: Coord,
    ) -> Result<usize> {
        record(
            self.write_inline(
                handle,
                InlineWrite::OutputAttribute,
                Text::Wide(attributes),
                Some(coord),
            )
            .await,
        )
    }

    async fn write_inline(
        &self,
        handle: Handle,
        kind: InlineWrite,
        data: Text<'_>,
        start: Option<Coord>,
    ) -> Result<usize> {
        if let Some(coord) = start {
            check_coord(coord)?;
        }
        if data.is_empty() {
            return Ok(0);
        }

        let element_size = data.encoding().char_size();
        let message = self
            .allocator
            .allocate(kind.api(), data.len() * element_size)?;
        let per_frame = message.elements_per_frame(element_size);

        let mut sink = InlineSink {
            calls: &self.calls,
            message,
            handle,
            kind,
            data,
        };
        let progress = drive(data.len(), per_frame, start, &mut sink).await?;

        tracing::trace!(
            api = ?kind.api(),
            requested = data.len(),
            done = progress.done,
            "Inline write finished"
        );
        Ok(progress.done)
    }

    /// Append input records to the console's input queue.
    ///
    /// Returns the number of records the server accepted.
    pub async fn write_console_input(
        &self,
        handle: Handle,
        encoding: Encoding,
        records: &[InputRecord],
    ) -> Result<usize> {
        record(self.write_console_input_inner(handle, encoding, records).await)
    }

    async fn write_console_input_inner(
        &self,
        handle: Handle,
        encoding: Encoding,
        records: &[InputRecord],
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let size = records.len() * InputRecord::SIZE;
        self.check_capture(size)?;
        let mut message = self.allocator.allocate(ApiNumber::WriteConsoleInput, 0)?;
        let mut capture = CaptureBuffer::acquire(&self.arena, 1, size)?;
        let slot = capture.capture_elements(records)?;

        let request = Request::WriteConsoleInput(WriteConsoleInputRequest {
            handle,
            encoding,
            length: wire_count(records.len())?,
            records: slot,
        });
        let request = message.stage(&request)?;
        let completion = self.calls.call(&request, &capture.to_bytes()).await?;
        let reply: WriteConsoleInputReply = completion.success()?;
        Ok(reply.events_written as usize)
    }

    /// Write a rectangle of cells from a 2-D caller buffer.
    ///
    /// The block at `buffer_coord` in the `buffer_size` grid is written to
    /// `region`. On return, `region` holds the rectangle the server
    /// actually wrote, even when the write fails.
    pub async fn write_console_output(
        &self,
        handle: Handle,
        encoding: Encoding,
        cells: &[CharInfo],
        buffer_size: Coord,
        buffer_coord: Coord,
        region: &mut SmallRect,
    ) -> Result<()> {
        record(
            self.write_console_output_inner(
                handle,
                encoding,
                cells,
                buffer_size,
                buffer_coord,
                region,
            )
            .await,
        )
    }

    async fn write_console_output_inner(
        &self,
        handle: Handle,
        encoding: Encoding,
        cells: &[CharInfo],
        buffer_size: Coord,
        buffer_coord: Coord,
        region: &mut SmallRect,
    ) -> Result<()> {
        let layout = BlockLayout::new(cells.len(), buffer_size, buffer_coord, *region)?;
        if layout.cells() == 0 {
            *region = SmallRect::EMPTY;
            return Ok(());
        }

        let block = layout.gather(cells);
        let size = block.len() * CharInfo::SIZE;
        self.check_capture(size)?;
        let mut message = self.allocator.allocate(ApiNumber::WriteConsoleOutput, 0)?;
        let mut capture = CaptureBuffer::acquire(&self.arena, 1, size)?;
        let slot = capture.capture_elements(&block)?;

        let request = Request::WriteConsoleOutput(WriteConsoleOutputRequest {
            handle,
            encoding,
            buffer_size: Coord::new(layout.width as i16, layout.height as i16),
            buffer_coord: Coord::default(),
            write_region: layout.clip(*region),
            cells: slot,
        });
        let request = message.stage(&request)?;
        let completion = self.calls.call(&request, &capture.to_bytes()).await?;

        if let Some(reply) = completion.body::<WriteConsoleOutputReply>()? {
            *region = reply.write_region;
        }
        completion.check()
    }

    /// Write `length` copies of `ch` starting at `coord`.
    ///
    /// Returns the number of cells the server reported written.
    pub async fn fill_console_output_character(
        &self,
        handle: Handle,
        ch: FillChar,
        length: usize,
        coord: Coord,
    ) -> Result<usize> {
        record(
            self.fill_console_output_character_inner(handle, ch, length, coord)
                .await,
        )
    }

    async fn fill_console_output_character_inner(
        &self,
        handle: Handle,
        ch: FillChar,
        length: usize,
        coord: Coord,
    ) -> Result<usize> {
        check_coord(coord)?;
        if length == 0 {
            return Ok(0);
        }

        let mut message = self
            .allocator
            .allocate(ApiNumber::FillConsoleOutputCharacter, 0)?;
        let request = Request::FillConsoleOutputCharacter(FillConsoleOutputCharacterRequest {
            handle,
            encoding: ch.encoding(),
            ch: ch.code(),
            coord,
            length: wire_count(length)?,
        });
        let request = message.stage(&request)?;
        let completion = self.calls.call(&request, &Bytes::new()).await?;
        let reply: FillConsoleOutputCharacterReply = completion.success()?;
        Ok(reply.chars_written as usize)
    }

    /// Write `length` copies of `attribute` starting at `coord`.
    pub async fn fill_console_output_attribute(
        &self,
        handle: Handle,
        attribute: u16,
        length: usize,
        coord: Coord,
    ) -> Result<usize> {
        record(
            self.fill_console_output_attribute_inner(handle, attribute, length, coord)
                .await,
        )
    }

    async fn fill_console_output_attribute_inner(
        &self,
        handle: Handle,
        attribute: u16,
        length: usize,
        coord: Coord,
    ) -> Result<usize> {
        check_coord(coord)?;
        if length == 0 {
            return Ok(0);
        }

        let mut message = self
            .allocator
            .allocate(ApiNumber::FillConsoleOutputAttribute, 0)?;
        let request = Request::FillConsoleOutputAttribute(FillConsoleOutputAttributeRequest {
            handle,
            attribute,
            coord,
            length: wire_count(length)?,
        });
        let request = message.stage(&request)?;
        let completion = self.calls.call(&request, &Bytes::new()).await?;
        let reply: FillConsoleOutputAttributeReply = completion.success()?;
        Ok(reply.attrs_written as usize)
    }
}
