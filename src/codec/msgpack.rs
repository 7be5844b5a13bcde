//! MsgPack codec for request and reply bodies.
//!
//! Bodies are encoded with `rmp_serde::to_vec_named`: structs travel as maps
//! keyed by field name, and unknown fields are skipped on decode.
//!
//! # Example
//!
//! ```
//! use conwire_client::codec::MsgPackCodec;
//! use conwire_client::types::Coord;
//!
//! let encoded = MsgPackCodec::encode(&Coord::new(3, 4)).unwrap();
//! let decoded: Coord = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, Coord::new(3, 4));
//! ```

use crate::error::Result;

/// MessagePack codec for structured bodies.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Encode a value into `buf`, returning the encoded length.
    ///
    /// Fails if the encoding does not fit in `buf`.
    pub fn encode_into<T: serde::Serialize>(buf: &mut [u8], value: &T) -> Result<usize> {
        let capacity = buf.len();
        let mut cursor = buf;
        rmp_serde::encode::write_named(&mut cursor, value)?;
        Ok(capacity - cursor.len())
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
