//! Capture buffers.
//!
//! A capture buffer is the region sent after the request body that carries
//! variable-length arrays: caller data going in (`capture`) and space for
//! server output coming back (`allocate_pointer`). Request fields refer to it
//! through [`CaptureSlot`]s. The whole region is one staging lease, released
//! when the buffer drops.

use bytes::Bytes;

use crate::codec::{encode_slice, Element};
use crate::error::{ConwireError, Result};
use crate::protocol::CaptureSlot;
use crate::staging::{StagingArena, StagingLease};

/// Staged region of at most `count` slots and `total_size` bytes.
#[derive(Debug)]
pub struct CaptureBuffer {
    buf: Vec<u8>,
    used: usize,
    slots_left: usize,
    _lease: StagingLease,
}

impl CaptureBuffer {
    /// Reserve a region for `count` slots totalling `total_size` bytes.
    pub fn acquire(arena: &StagingArena, count: usize, total_size: usize) -> Result<Self> {
        let (buf, lease) = arena.alloc_zeroed(total_size)?;
        Ok(Self {
            buf,
            used: 0,
            slots_left: count,
            _lease: lease,
        })
    }

    fn reserve(&mut self, size: usize) -> Result<CaptureSlot> {
        if self.slots_left == 0 {
            return Err(ConwireError::InvalidParameter("capture slot count exceeded"));
        }
        if size > self.buf.len() - self.used {
            return Err(ConwireError::InvalidParameter("capture size exceeded"));
        }
        let offset = u32::try_from(self.used)
            .map_err(|_| ConwireError::InvalidParameter("capture offset too large"))?;
        let length = u32::try_from(size)
            .map_err(|_| ConwireError::InvalidParameter("capture slot too large"))?;

        self.used += size;
        self.slots_left -= 1;
        Ok(CaptureSlot { offset, length })
    }

    /// Reserve a zeroed slot for the server to fill.
    pub fn allocate_pointer(&mut self, size: usize) -> Result<CaptureSlot> {
        self.reserve(size)
    }

    /// Copy caller bytes into a new slot.
    pub fn capture(&mut self, data: &[u8]) -> Result<CaptureSlot> {
        let slot = self.reserve(data.len())?;
        self.buf[slot.range()].copy_from_slice(data);
        Ok(slot)
    }

    /// Encode elements into a new slot.
    pub fn capture_elements<E: Element>(&mut self, items: &[E]) -> Result<CaptureSlot> {
        self.capture(&encode_slice(items))
    }

    /// Bytes of the region in use.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.used]
    }

    /// Copy of the in-use region, ready to attach to a frame.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    /// Bytes still available.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.used
    }
}
