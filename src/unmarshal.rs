//! Copying reply data back into caller buffers.

use crate::codec::{decode_into, Element};
use crate::error::{ConwireError, Result};
use crate::protocol::CaptureSlot;

/// Copy up to `count` elements from `slot` of the reply capture into `out`.
///
/// The copy is clamped to `out`, to the slot and to the bytes the server
/// actually returned. Elements of `out` past the returned count are left
/// untouched.
pub fn copy_out<E: Element>(
    capture: &[u8],
    slot: CaptureSlot,
    count: usize,
    out: &mut [E],
) -> Result<usize> {
    let range = slot.range();
    if range.end > capture.len() {
        return Err(ConwireError::Protocol(format!(
            "Capture slot {}..{} outside reply capture of {} bytes",
            range.start,
            range.end,
            capture.len()
        )));
    }

    let bytes = &capture[range];
    let limit = count.min(out.len()).min(bytes.len() / E::SIZE);
    Ok(decode_into(&bytes[..limit * E::SIZE], &mut out[..limit]))
}
