//! Operation identifiers understood by the console server.

use crate::error::{ConwireError, Result};

/// Operation carried by a request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ApiNumber {
    ReadConsole = 1,
    GetConsoleInput = 2,
    ReadConsoleOutput = 3,
    ReadConsoleOutputCode = 4,
    WriteConsole = 5,
    WriteConsoleInput = 6,
    WriteConsoleOutput = 7,
    WriteConsoleOutputCharacter = 8,
    WriteConsoleOutputAttribute = 9,
    FillConsoleOutputCharacter = 10,
    FillConsoleOutputAttribute = 11,
}

impl ApiNumber {
    /// All operations, in wire order.
    pub const ALL: [ApiNumber; 11] = [
        ApiNumber::ReadConsole,
        ApiNumber::GetConsoleInput,
        ApiNumber::ReadConsoleOutput,
        ApiNumber::ReadConsoleOutputCode,
        ApiNumber::WriteConsole,
        ApiNumber::WriteConsoleInput,
        ApiNumber::WriteConsoleOutput,
        ApiNumber::WriteConsoleOutputCharacter,
        ApiNumber::WriteConsoleOutputAttribute,
        ApiNumber::FillConsoleOutputCharacter,
        ApiNumber::FillConsoleOutputAttribute,
    ];

    /// Wire value.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Upper bound on the encoded request body without its inline payload
    /// bytes. Used by the message allocator to size messages.
    ///
    /// Counts the variant and field names of the MsgPack map, every integer
    /// at its widest encoding, and the widest `bin` header an inline payload
    /// can need.
    pub fn fixed_header_size(self) -> usize {
        match self {
            ApiNumber::ReadConsole => 144,
            ApiNumber::GetConsoleInput => 112,
            ApiNumber::ReadConsoleOutput | ApiNumber::WriteConsoleOutput => 184,
            ApiNumber::ReadConsoleOutputCode => 144,
            ApiNumber::WriteConsole => 80,
            ApiNumber::WriteConsoleInput => 104,
            ApiNumber::WriteConsoleOutputCharacter => 112,
            ApiNumber::WriteConsoleOutputAttribute => 96,
            ApiNumber::FillConsoleOutputCharacter => 104,
            ApiNumber::FillConsoleOutputAttribute => 96,
        }
    }

    /// Largest [`fixed_header_size`](Self::fixed_header_size) of any
    /// operation.
    pub fn max_fixed_header_size() -> usize {
        ApiNumber::ALL
            .iter()
            .map(|api| api.fixed_header_size())
            .max()
            .unwrap_or(0)
    }
}

impl TryFrom<u16> for ApiNumber {
    type Error = ConwireError;

    fn try_from(value: u16) -> Result<Self> {
        ApiNumber::ALL
            .iter()
            .copied()
            .find(|api| api.as_u16() == value)
            .ok_or_else(|| ConwireError::Protocol(format!("Unknown API number: {}", value)))
    }
}

impl From<ApiNumber> for u16 {
    fn from(api: ApiNumber) -> Self {
        api.as_u16()
    }
}
