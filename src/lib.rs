//! # conwire-client
//!
//! Client side of a console server's inter-process call protocol.
//!
//! Each console operation packs caller buffers into a request, makes one or
//! more bounded calls to the server process and copies the reply back.
//!
//! ## Architecture
//!
//! - **Control Plane**: JSON only, for the `$connect` handshake
//! - **Data Plane** (named pipe): binary frames with a MsgPack body and a
//!   capture region for array data
//!
//! Inside a call:
//! - [`allocator`] sizes the request message, clamped to the frame limit;
//! - [`capture`] stages variable-length arrays;
//! - [`call`] performs the round trip and retries deferred calls;
//! - [`driver`] splits oversized writes into chunks;
//! - [`unmarshal`] copies reply data into caller buffers.
//!
//! ## Example
//!
//! ```ignore
//! use conwire_client::{ClientBuilder, Coord, Handle, Text};
//!
//! #[tokio::main]
//! async fn main() -> conwire_client::Result<()> {
//!     let client = ClientBuilder::new().connect("/tmp/conwire.sock").await?;
//!
//!     let written = client
//!         .write_console_output_character(Handle(1), Text::from("ready"), Coord::new(0, 0))
//!         .await?;
//!     println!("wrote {written} characters");
//!     Ok(())
//! }
//! ```

pub mod allocator;
pub mod call;
pub mod capture;
pub mod codec;
pub mod control;
pub mod driver;
pub mod error;
pub mod ops;
pub mod protocol;
pub mod staging;
pub mod transport;
pub mod types;
pub mod unmarshal;

mod client;
mod writer;

pub use call::{CallOutcome, CallTransport, Completion};
pub use client::{ClientBuilder, ConsoleClient};
pub use error::{last_error, ConwireError, Result};
pub use ops::{CodeBufMut, FillChar, ReadConsoleControl, Text, TextBufMut};
pub use protocol::Status;
pub use staging::StagingArena;
pub use transport::{Connection, Limits, Transport};
pub use types::{
    CharInfo, CodeType, Coord, Encoding, Handle, InputMode, InputRecord, SmallRect,
};
pub use writer::WriterConfig;
