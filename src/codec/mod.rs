//! Codec module - body and element encoding.
//!
//! - [`MsgPackCodec`] - fixed request/reply fields via `rmp-serde`
//! - [`Element`] - packed fixed-size records for staged arrays
//!
//! # Example
//!
//! ```
//! use conwire_client::codec::{decode_into, encode_slice};
//!
//! let bytes = encode_slice(&[0x48u16, 0x69]);
//! let mut out = [0u16; 2];
//! assert_eq!(decode_into(&bytes, &mut out), 2);
//! assert_eq!(out, [0x48, 0x69]);
//! ```

mod element;
mod msgpack;

pub use element::{decode_into, encode_slice, Element};
pub use msgpack::MsgPackCodec;
