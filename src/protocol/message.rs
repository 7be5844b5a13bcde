//! Request and reply bodies, one variant per operation.
//!
//! Each variant carries only the fields its operation needs. The variant is
//! keyed by [`ApiNumber`] and the frame layer rejects a body whose variant
//! disagrees with the header's API number.
//!
//! Variable-length data travels one of two ways:
//! - inline, as a `serde_bytes` field bounded by the frame payload limit
//!   (write paths that chunk);
//! - staged, as a [`CaptureSlot`] into the capture region that follows the
//!   body (read paths and record/cell writes).

use serde::{Deserialize, Serialize};

use super::api::ApiNumber;
use crate::error::{ConwireError, Result};
use crate::types::{CodeType, Coord, Encoding, Handle, InputMode, SmallRect};

/// Offset/length pair addressing one array inside a capture region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureSlot {
    pub offset: u32,
    pub length: u32,
}

impl CaptureSlot {
    /// Byte range of this slot inside the capture region.
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.length as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConsoleRequest {
    pub handle: Handle,
    pub encoding: Encoding,
    pub chars_to_read: u32,
    /// Characters already present at the start of `buffer`.
    pub initial_chars: u32,
    pub ctrl_wakeup_mask: u32,
    pub buffer: CaptureSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConsoleInputRequest {
    pub handle: Handle,
    pub encoding: Encoding,
    pub mode: InputMode,
    pub length: u32,
    pub records: CaptureSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConsoleOutputRequest {
    pub handle: Handle,
    pub encoding: Encoding,
    pub buffer_size: Coord,
    pub buffer_coord: Coord,
    pub read_region: SmallRect,
    pub cells: CaptureSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConsoleOutputCodeRequest {
    pub handle: Handle,
    pub code_type: CodeType,
    pub read_coord: Coord,
    pub codes_to_read: u32,
    pub codes: CaptureSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConsoleRequest {
    pub handle: Handle,
    pub encoding: Encoding,
    pub chars_to_write: u32,
    #[serde(with = "serde_bytes")]
    pub chars: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConsoleInputRequest {
    pub handle: Handle,
    pub encoding: Encoding,
    pub length: u32,
    pub records: CaptureSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConsoleOutputRequest {
    pub handle: Handle,
    pub encoding: Encoding,
    pub buffer_size: Coord,
    pub buffer_coord: Coord,
    pub write_region: SmallRect,
    pub cells: CaptureSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConsoleOutputCharacterRequest {
    pub handle: Handle,
    pub encoding: Encoding,
    pub coord: Coord,
    pub length: u32,
    #[serde(with = "serde_bytes")]
    pub chars: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConsoleOutputAttributeRequest {
    pub handle: Handle,
    pub coord: Coord,
    pub length: u32,
    #[serde(with = "serde_bytes")]
    pub attributes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillConsoleOutputCharacterRequest {
    pub handle: Handle,
    pub encoding: Encoding,
    pub ch: u16,
    pub coord: Coord,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillConsoleOutputAttributeRequest {
    pub handle: Handle,
    pub attribute: u16,
    pub coord: Coord,
    pub length: u32,
}

/// Request body, keyed by operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    ReadConsole(ReadConsoleRequest),
    GetConsoleInput(GetConsoleInputRequest),
    ReadConsoleOutput(ReadConsoleOutputRequest),
    ReadConsoleOutputCode(ReadConsoleOutputCodeRequest),
    WriteConsole(WriteConsoleRequest),
    WriteConsoleInput(WriteConsoleInputRequest),
    WriteConsoleOutput(WriteConsoleOutputRequest),
    WriteConsoleOutputCharacter(WriteConsoleOutputCharacterRequest),
    WriteConsoleOutputAttribute(WriteConsoleOutputAttributeRequest),
    FillConsoleOutputCharacter(FillConsoleOutputCharacterRequest),
    FillConsoleOutputAttribute(FillConsoleOutputAttributeRequest),
}

impl Request {
    /// Operation this body belongs to.
    pub fn api(&self) -> ApiNumber {
        match self {
            Request::ReadConsole(_) => ApiNumber::ReadConsole,
            Request::GetConsoleInput(_) => ApiNumber::GetConsoleInput,
            Request::ReadConsoleOutput(_) => ApiNumber::ReadConsoleOutput,
            Request::ReadConsoleOutputCode(_) => ApiNumber::ReadConsoleOutputCode,
            Request::WriteConsole(_) => ApiNumber::WriteConsole,
            Request::WriteConsoleInput(_) => ApiNumber::WriteConsoleInput,
            Request::WriteConsoleOutput(_) => ApiNumber::WriteConsoleOutput,
            Request::WriteConsoleOutputCharacter(_) => ApiNumber::WriteConsoleOutputCharacter,
            Request::WriteConsoleOutputAttribute(_) => ApiNumber::WriteConsoleOutputAttribute,
            Request::FillConsoleOutputCharacter(_) => ApiNumber::FillConsoleOutputCharacter,
            Request::FillConsoleOutputAttribute(_) => ApiNumber::FillConsoleOutputAttribute,
        }
    }

    /// Target handle.
    pub fn handle(&self) -> Handle {
        match self {
            Request::ReadConsole(r) => r.handle,
            Request::GetConsoleInput(r) => r.handle,
            Request::ReadConsoleOutput(r) => r.handle,
            Request::ReadConsoleOutputCode(r) => r.handle,
            Request::WriteConsole(r) => r.handle,
            Request::WriteConsoleInput(r) => r.handle,
            Request::WriteConsoleOutput(r) => r.handle,
            Request::WriteConsoleOutputCharacter(r) => r.handle,
            Request::WriteConsoleOutputAttribute(r) => r.handle,
            Request::FillConsoleOutputCharacter(r) => r.handle,
            Request::FillConsoleOutputAttribute(r) => r.handle,
        }
    }

    /// Bytes of inline payload carried in the body.
    pub fn inline_len(&self) -> usize {
        match self {
            Request::WriteConsole(r) => r.chars.len(),
            Request::WriteConsoleOutputCharacter(r) => r.chars.len(),
            Request::WriteConsoleOutputAttribute(r) => r.attributes.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadConsoleReply {
    pub chars_read: u32,
    pub control_key_state: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetConsoleInputReply {
    pub events_read: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadConsoleOutputReply {
    pub read_region: SmallRect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadConsoleOutputCodeReply {
    pub codes_read: u32,
    pub end_coord: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteConsoleReply {
    pub chars_written: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteConsoleInputReply {
    pub events_written: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteConsoleOutputReply {
    pub write_region: SmallRect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteConsoleOutputCharacterReply {
    pub chars_written: u32,
    pub end_coord: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteConsoleOutputAttributeReply {
    pub attrs_written: u32,
    pub end_coord: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FillConsoleOutputCharacterReply {
    pub chars_written: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FillConsoleOutputAttributeReply {
    pub attrs_written: u32,
}

/// Reply body, keyed by operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    ReadConsole(ReadConsoleReply),
    GetConsoleInput(GetConsoleInputReply),
    ReadConsoleOutput(ReadConsoleOutputReply),
    ReadConsoleOutputCode(ReadConsoleOutputCodeReply),
    WriteConsole(WriteConsoleReply),
    WriteConsoleInput(WriteConsoleInputReply),
    WriteConsoleOutput(WriteConsoleOutputReply),
    WriteConsoleOutputCharacter(WriteConsoleOutputCharacterReply),
    WriteConsoleOutputAttribute(WriteConsoleOutputAttributeReply),
    FillConsoleOutputCharacter(FillConsoleOutputCharacterReply),
    FillConsoleOutputAttribute(FillConsoleOutputAttributeReply),
}

impl Reply {
    /// Operation this body belongs to.
    pub fn api(&self) -> ApiNumber {
        match self {
            Reply::ReadConsole(_) => ApiNumber::ReadConsole,
            Reply::GetConsoleInput(_) => ApiNumber::GetConsoleInput,
            Reply::ReadConsoleOutput(_) => ApiNumber::ReadConsoleOutput,
            Reply::ReadConsoleOutputCode(_) => ApiNumber::ReadConsoleOutputCode,
            Reply::WriteConsole(_) => ApiNumber::WriteConsole,
            Reply::WriteConsoleInput(_) => ApiNumber::WriteConsoleInput,
            Reply::WriteConsoleOutput(_) => ApiNumber::WriteConsoleOutput,
            Reply::WriteConsoleOutputCharacter(_) => ApiNumber::WriteConsoleOutputCharacter,
            Reply::WriteConsoleOutputAttribute(_) => ApiNumber::WriteConsoleOutputAttribute,
            Reply::FillConsoleOutputCharacter(_) => ApiNumber::FillConsoleOutputCharacter,
            Reply::FillConsoleOutputAttribute(_) => ApiNumber::FillConsoleOutputAttribute,
        }
    }
}

macro_rules! reply_conversions {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Reply {
                fn from(reply: $ty) -> Self {
                    Reply::$variant(reply)
                }
            }

            impl TryFrom<Reply> for $ty {
                type Error = ConwireError;

                fn try_from(reply: Reply) -> Result<Self> {
                    match reply {
                        Reply::$variant(inner) => Ok(inner),
                        other => Err(ConwireError::Protocol(format!(
                            "Expected {} reply, got {:?}",
                            stringify!($variant),
                            other.api()
                        ))),
                    }
                }
            }
        )*
    };
}

reply_conversions! {
    ReadConsole => ReadConsoleReply,
    GetConsoleInput => GetConsoleInputReply,
    ReadConsoleOutput => ReadConsoleOutputReply,
    ReadConsoleOutputCode => ReadConsoleOutputCodeReply,
    WriteConsole => WriteConsoleReply,
    WriteConsoleInput => WriteConsoleInputReply,
    WriteConsoleOutput => WriteConsoleOutputReply,
    WriteConsoleOutputCharacter => WriteConsoleOutputCharacterReply,
    WriteConsoleOutputAttribute => WriteConsoleOutputAttributeReply,
    FillConsoleOutputCharacter => FillConsoleOutputCharacterReply,
    FillConsoleOutputAttribute => FillConsoleOutputAttributeReply,
}

/// Body of a pending reply: the event the server will signal when the
/// caller may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotice {
    pub event: u32,
}
