//! Console value types shared by requests, replies and the operation layer.

use serde::{Deserialize, Serialize};

/// Server-issued console object handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

/// Character element width for one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// 8-bit code page characters.
    Narrow,
    /// UTF-16 code units.
    Wide,
}

impl Encoding {
    /// Bytes per character element.
    #[inline]
    pub fn char_size(self) -> usize {
        match self {
            Encoding::Narrow => 1,
            Encoding::Wide => 2,
        }
    }
}

/// Kind of cell data read by `read_console_output_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeType {
    Ascii,
    Unicode,
    Attribute,
}

impl CodeType {
    /// Bytes per code element.
    #[inline]
    pub fn element_size(self) -> usize {
        match self {
            CodeType::Ascii => 1,
            CodeType::Unicode | CodeType::Attribute => 2,
        }
    }
}

/// Whether `get_console_input` removes records from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Consume the returned records.
    Read,
    /// Leave the returned records queued.
    Peek,
}

/// Column/row position in a screen buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: i16,
    pub y: i16,
}

impl Coord {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    /// Number of cells in a buffer of this size, zero for negative extents.
    pub fn area(self) -> usize {
        if self.x <= 0 || self.y <= 0 {
            return 0;
        }
        self.x as usize * self.y as usize
    }

    /// Check if `self` lies inside a buffer of `size`.
    pub fn within(self, size: Coord) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < size.x && self.y < size.y
    }
}

/// Inclusive rectangle in screen-buffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SmallRect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

impl SmallRect {
    /// A rectangle that covers no cells.
    pub const EMPTY: SmallRect = SmallRect {
        left: 0,
        top: 0,
        right: -1,
        bottom: -1,
    };

    pub const fn new(left: i16, top: i16, right: i16, bottom: i16) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Columns covered, zero if inverted.
    pub fn width(&self) -> usize {
        (i32::from(self.right) - i32::from(self.left) + 1).max(0) as usize
    }

    /// Rows covered, zero if inverted.
    pub fn height(&self) -> usize {
        (i32::from(self.bottom) - i32::from(self.top) + 1).max(0) as usize
    }

    /// Cells covered.
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }
}

/// One screen cell: character plus attribute word.
///
/// For narrow operations only the low byte of `ch` is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CharInfo {
    pub ch: u16,
    pub attributes: u16,
}

impl CharInfo {
    pub const fn new(ch: u16, attributes: u16) -> Self {
        Self { ch, attributes }
    }
}

/// Input event type tags.
pub mod event_type {
    pub const KEY: u16 = 0x0001;
    pub const MOUSE: u16 = 0x0002;
    pub const WINDOW_BUFFER_SIZE: u16 = 0x0004;
    pub const MENU: u16 = 0x0008;
    pub const FOCUS: u16 = 0x0010;
}

/// Size of the event-specific part of an input record.
pub const INPUT_EVENT_DATA_SIZE: usize = 16;

/// One console input event, kept opaque apart from its type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InputRecord {
    pub event_type: u16,
    pub data: [u8; INPUT_EVENT_DATA_SIZE],
}

impl InputRecord {
    pub const fn new(event_type: u16, data: [u8; INPUT_EVENT_DATA_SIZE]) -> Self {
        Self { event_type, data }
    }

    /// Key-down event for a single character.
    ///
    /// Layout: key_down u32, repeat u16, virtual key u16, scan code u16,
    /// char u16, control key state u32.
    pub fn key_press(ch: u16) -> Self {
        let mut data = [0u8; INPUT_EVENT_DATA_SIZE];
        data[0..4].copy_from_slice(&1u32.to_le_bytes());
        data[4..6].copy_from_slice(&1u16.to_le_bytes());
        data[10..12].copy_from_slice(&ch.to_le_bytes());
        Self::new(event_type::KEY, data)
    }

    /// Character of a key event, `None` for other event types.
    pub fn key_char(&self) -> Option<u16> {
        if self.event_type != event_type::KEY {
            return None;
        }
        Some(u16::from_le_bytes([self.data[10], self.data[11]]))
    }
}
