//! Error types for conwire-client.
//!
//! Every operation resolves to a [`Result`]. Failed [`ConsoleClient`]
//! operations additionally record a Win32-style code in a thread-local
//! slot, readable through [`last_error`].
//!
//! [`ConsoleClient`]: crate::ConsoleClient

use std::cell::Cell;

use thiserror::Error;

use crate::protocol::Status;

/// `ERROR_NOT_ENOUGH_MEMORY`.
pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
/// `ERROR_INVALID_PARAMETER`.
pub const ERROR_INVALID_PARAMETER: u32 = 87;
/// `ERROR_GEN_FAILURE`, used for transport-level failures.
pub const ERROR_GEN_FAILURE: u32 = 31;
/// `ERROR_TIMEOUT`.
pub const ERROR_TIMEOUT: u32 = 1460;

/// Main error type for all conwire operations.
#[derive(Debug, Error)]
pub enum ConwireError {
    /// I/O error on the server pipe.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (connect handshake only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Malformed frame, unexpected reply shape, or limit violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server went away before replying.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Message or capture staging could not be allocated.
    #[error("Out of memory: staging allocation of {requested} bytes failed")]
    OutOfMemory {
        /// Bytes that were requested from the arena.
        requested: usize,
    },

    /// Caller-supplied arguments were rejected before any call was made.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The server processed the call and reported a failure.
    #[error("Server returned status {0}")]
    Status(Status),

    /// A pending call was not released by the server in time.
    #[error("Pending call timed out waiting for unpause event {event}")]
    PendingTimeout {
        /// Server event id the call was waiting on.
        event: u32,
    },

    /// A chunked write failed after earlier chunks were accepted.
    #[error("Transfer interrupted after {transferred} elements: {source}")]
    PartialTransfer {
        /// Elements the server accepted before the failure.
        transferred: usize,
        /// The failure that ended the sequence.
        #[source]
        source: Box<ConwireError>,
    },
}

impl ConwireError {
    /// Elements transferred before this error, `0` unless the error is a
    /// [`ConwireError::PartialTransfer`].
    pub fn transferred(&self) -> usize {
        match self {
            ConwireError::PartialTransfer { transferred, .. } => *transferred,
            _ => 0,
        }
    }

    /// Application status carried by the error, if the server produced one.
    pub fn status(&self) -> Option<Status> {
        match self {
            ConwireError::Status(status) => Some(*status),
            ConwireError::PartialTransfer { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Win32-style last-error code for this failure.
    pub fn last_error_code(&self) -> u32 {
        match self {
            ConwireError::OutOfMemory { .. } => ERROR_NOT_ENOUGH_MEMORY,
            ConwireError::InvalidParameter(_) => ERROR_INVALID_PARAMETER,
            ConwireError::Status(status) => status.to_last_error(),
            ConwireError::PendingTimeout { .. } => ERROR_TIMEOUT,
            ConwireError::PartialTransfer { source, .. } => source.last_error_code(),
            _ => ERROR_GEN_FAILURE,
        }
    }
}

/// Result type alias using ConwireError.
pub type Result<T> = std::result::Result<T, ConwireError>;

thread_local! {
    static LAST_ERROR: Cell<u32> = const { Cell::new(0) };
}

/// Last-error code recorded by the most recent operation on this thread.
///
/// `0` means the last operation succeeded.
pub fn last_error() -> u32 {
    LAST_ERROR.with(|slot| slot.get())
}

/// Record the outcome of an operation in the thread-local last-error slot.
pub(crate) fn record<T>(result: Result<T>) -> Result<T> {
    let code = match &result {
        Ok(_) => 0,
        Err(e) => e.last_error_code(),
    };
    LAST_ERROR.with(|slot| slot.set(code));
    result
}
