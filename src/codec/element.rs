//! Fixed-size element codec for staged arrays.
//!
//! Characters, attributes, cells and input records cross the process
//! boundary as packed little-endian records so that every size and offset
//! is a plain multiple of [`Element::SIZE`].
//!
//! | Element       | Size | Layout                                  |
//! |---------------|------|-----------------------------------------|
//! | `u8`          | 1    | byte                                    |
//! | `u16`         | 2    | LE                                      |
//! | `CharInfo`    | 4    | ch LE, attributes LE                    |
//! | `InputRecord` | 20   | event type LE, 2 pad bytes, 16 data     |

use bytes::{Buf, BufMut};

use crate::types::{CharInfo, InputRecord, INPUT_EVENT_DATA_SIZE};

/// A value with a fixed wire size.
pub trait Element: Copy + Send + Sync + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the encoded element.
    fn put<B: BufMut>(&self, buf: &mut B);

    /// Decode one element. The caller guarantees `SIZE` bytes remain.
    fn get<B: Buf>(buf: &mut B) -> Self;
}

impl Element for u8 {
    const SIZE: usize = 1;

    #[inline]
    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(*self);
    }

    #[inline]
    fn get<B: Buf>(buf: &mut B) -> Self {
        buf.get_u8()
    }
}

impl Element for u16 {
    const SIZE: usize = 2;

    #[inline]
    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(*self);
    }

    #[inline]
    fn get<B: Buf>(buf: &mut B) -> Self {
        buf.get_u16_le()
    }
}

impl Element for CharInfo {
    const SIZE: usize = 4;

    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.ch);
        buf.put_u16_le(self.attributes);
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        let ch = buf.get_u16_le();
        let attributes = buf.get_u16_le();
        CharInfo { ch, attributes }
    }
}

impl Element for InputRecord {
    const SIZE: usize = 4 + INPUT_EVENT_DATA_SIZE;

    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.event_type);
        buf.put_u16_le(0);
        buf.put_slice(&self.data);
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        let event_type = buf.get_u16_le();
        buf.advance(2);
        let mut data = [0u8; INPUT_EVENT_DATA_SIZE];
        buf.copy_to_slice(&mut data);
        InputRecord { event_type, data }
    }
}

/// Encode a slice of elements into a new byte vector.
pub fn encode_slice<E: Element>(items: &[E]) -> Vec<u8> {
    let mut out = Vec::with_capacity(items.len() * E::SIZE);
    for item in items {
        item.put(&mut out);
    }
    out
}

/// Decode as many whole elements as fit in both `bytes` and `out`.
///
/// Returns the number of elements written to `out`. Slots past that count
/// are left untouched.
pub fn decode_into<E: Element>(mut bytes: &[u8], out: &mut [E]) -> usize {
    let count = (bytes.len() / E::SIZE).min(out.len());
    for slot in out.iter_mut().take(count) {
        *slot = E::get(&mut bytes);
    }
    count
}
