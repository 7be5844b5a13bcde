//! Console operations.
//!
//! Every operation follows the same shape:
//! 1. validate arguments, before any staging is allocated;
//! 2. stage the message and, for array data, a capture buffer;
//! 3. make one call, or a chunked sequence of calls for inline writes;
//! 4. copy results and out-parameters back into the caller's buffers.
//!
//! Reads make a single round trip. Writes whose payload travels inline
//! (`write_console`, `write_console_output_character`,
//! `write_console_output_attribute`) are split by the chunking driver.

mod read;
mod write;

use crate::codec::{encode_slice, Element};
use crate::error::{ConwireError, Result};
use crate::types::{CodeType, Coord, Encoding, SmallRect};

/// Element count as carried in request fields.
pub(crate) fn wire_count(count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| ConwireError::InvalidParameter("element count too large"))
}

/// Reject screen positions with a negative component.
pub(crate) fn check_coord(coord: Coord) -> Result<()> {
    if coord.x < 0 || coord.y < 0 {
        return Err(ConwireError::InvalidParameter("negative screen coordinate"));
    }
    Ok(())
}

/// Borrowed characters, narrow or wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text<'a> {
    Narrow(&'a [u8]),
    Wide(&'a [u16]),
}

impl<'a> Text<'a> {
    #[inline]
    pub fn encoding(&self) -> Encoding {
        match self {
            Text::Narrow(_) => Encoding::Narrow,
            Text::Wide(_) => Encoding::Wide,
        }
    }

    /// Length in characters.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Text::Narrow(chars) => chars.len(),
            Text::Wide(chars) => chars.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode `len` characters starting at `offset`.
    pub(crate) fn encode_range(&self, offset: usize, len: usize) -> Vec<u8> {
        match self {
            Text::Narrow(chars) => chars[offset..offset + len].to_vec(),
            Text::Wide(chars) => encode_slice(&chars[offset..offset + len]),
        }
    }
}

impl<'a> From<&'a str> for Text<'a> {
    fn from(s: &'a str) -> Self {
        Text::Narrow(s.as_bytes())
    }
}

/// Caller buffer receiving characters.
#[derive(Debug, PartialEq, Eq)]
pub enum TextBufMut<'a> {
    Narrow(&'a mut [u8]),
    Wide(&'a mut [u16]),
}

impl<'a> TextBufMut<'a> {
    #[inline]
    pub fn encoding(&self) -> Encoding {
        match self {
            TextBufMut::Narrow(_) => Encoding::Narrow,
            TextBufMut::Wide(_) => Encoding::Wide,
        }
    }

    /// Capacity in characters.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            TextBufMut::Narrow(chars) => chars.len(),
            TextBufMut::Wide(chars) => chars.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded size of the whole buffer in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.len() * self.encoding().char_size()
    }

    pub(crate) fn encode_prefix(&self, len: usize) -> Vec<u8> {
        match self {
            TextBufMut::Narrow(chars) => chars[..len].to_vec(),
            TextBufMut::Wide(chars) => encode_slice(&chars[..len]),
        }
    }
}

/// Caller buffer receiving screen codes.
#[derive(Debug, PartialEq, Eq)]
pub enum CodeBufMut<'a> {
    Ascii(&'a mut [u8]),
    Unicode(&'a mut [u16]),
    Attribute(&'a mut [u16]),
}

impl<'a> CodeBufMut<'a> {
    #[inline]
    pub fn code_type(&self) -> CodeType {
        match self {
            CodeBufMut::Ascii(_) => CodeType::Ascii,
            CodeBufMut::Unicode(_) => CodeType::Unicode,
            CodeBufMut::Attribute(_) => CodeType::Attribute,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            CodeBufMut::Ascii(codes) => codes.len(),
            CodeBufMut::Unicode(codes) | CodeBufMut::Attribute(codes) => codes.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Character used by `fill_console_output_character`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillChar {
    Narrow(u8),
    Wide(u16),
}

impl FillChar {
    #[inline]
    pub fn encoding(self) -> Encoding {
        match self {
            FillChar::Narrow(_) => Encoding::Narrow,
            FillChar::Wide(_) => Encoding::Wide,
        }
    }

    #[inline]
    pub fn code(self) -> u16 {
        match self {
            FillChar::Narrow(ch) => u16::from(ch),
            FillChar::Wide(ch) => ch,
        }
    }
}

/// In/out parameters of `read_console`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadConsoleControl {
    /// Characters already present at the start of the buffer.
    pub initial_chars: u32,
    /// Control characters that end the read early, as a bit mask.
    pub ctrl_wakeup_mask: u32,
    /// Control key state reported by the server.
    pub control_key_state: u32,
}

/// Placement of a rectangular block inside a caller's 2-D cell buffer.
///
/// The block travels compactly, `width * height` cells in row-major order.
/// Rows are placed at `origin` in a buffer of `size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockLayout {
    pub size: Coord,
    pub origin: Coord,
    pub width: usize,
    pub height: usize,
}

impl BlockLayout {
    /// Validate the caller's buffer geometry and clip `region` to it.
    pub fn new(cells: usize, size: Coord, origin: Coord, region: SmallRect) -> Result<Self> {
        if size.area() == 0 || size.area() > cells {
            return Err(ConwireError::InvalidParameter(
                "buffer size does not fit the cell buffer",
            ));
        }
        if !origin.within(size) {
            return Err(ConwireError::InvalidParameter(
                "buffer coordinate outside the buffer",
            ));
        }

        let width = region.width().min((size.x - origin.x) as usize);
        let height = region.height().min((size.y - origin.y) as usize);
        Ok(Self {
            size,
            origin,
            width,
            height,
        })
    }

    #[inline]
    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    /// `region` shrunk to the block's extent.
    pub fn clip(&self, region: SmallRect) -> SmallRect {
        SmallRect::new(
            region.left,
            region.top,
            extent_end(region.left, self.width),
            extent_end(region.top, self.height),
        )
    }

    /// Index of the first cell of block row `row` in the caller's buffer.
    #[inline]
    pub fn row_start(&self, row: usize) -> usize {
        (self.origin.y as usize + row) * self.size.x as usize + self.origin.x as usize
    }

    /// Gather the block out of the caller's buffer.
    pub fn gather<E: Element>(&self, cells: &[E]) -> Vec<E> {
        let mut block = Vec::with_capacity(self.cells());
        for row in 0..self.height {
            let start = self.row_start(row);
            block.extend_from_slice(&cells[start..start + self.width]);
        }
        block
    }
}

/// Last coordinate of a run of `len` cells starting at `start`.
///
/// Computed wide so a block touching the edge of the coordinate range does
/// not wrap.
fn extent_end(start: i16, len: usize) -> i16 {
    let end = i64::from(start) + len as i64 - 1;
    end.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}
