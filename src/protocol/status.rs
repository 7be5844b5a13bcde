//! NT-style status codes carried in the reply header.
//!
//! A status is a success when its top bit is clear. `PENDING` is a success
//! code on the wire but is never surfaced as a completed reply; the call
//! layer turns it into a wait-and-retry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status word from the reply header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub u32);

impl Status {
    /// Call completed.
    pub const SUCCESS: Status = Status(0x0000_0000);
    /// Server deferred the reply; wait on the unpause event and retry.
    pub const PENDING: Status = Status(0x0000_0103);
    /// Generic failure.
    pub const UNSUCCESSFUL: Status = Status(0xC000_0001);
    /// The target handle does not name a console object.
    pub const INVALID_HANDLE: Status = Status(0xC000_0008);
    /// The server rejected one of the request fields.
    pub const INVALID_PARAMETER: Status = Status(0xC000_000D);
    /// The server ran out of memory.
    pub const NO_MEMORY: Status = Status(0xC000_0017);
    /// The staged buffer is too small for the request.
    pub const BUFFER_TOO_SMALL: Status = Status(0xC000_0023);

    /// `NT_SUCCESS`: top bit clear.
    #[inline]
    pub fn is_success(self) -> bool {
        (self.0 as i32) >= 0
    }

    /// Check if this is the pending code.
    #[inline]
    pub fn is_pending(self) -> bool {
        self == Status::PENDING
    }

    /// Map to the Win32 last-error value a caller would observe.
    pub fn to_last_error(self) -> u32 {
        match self {
            Status::SUCCESS => 0,
            Status::INVALID_HANDLE => 6,
            Status::NO_MEMORY => 8,
            Status::INVALID_PARAMETER => 87,
            Status::BUFFER_TOO_SMALL => 122,
            _ => 31,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::SUCCESS
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
