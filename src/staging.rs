//! Staging budget for messages and capture regions.
//!
//! Every message and capture buffer draws its bytes from a [`StagingArena`].
//! The arena is a lock-free byte counter with a ceiling, shared by all
//! clones. Reserving returns a [`StagingLease`] that gives the bytes back on
//! drop, so every exit path of a call releases exactly what it acquired.
//!
//! # Configuration
//!
//! - `limit`: Maximum bytes staged at once (default: 64 MiB)
//!
//! # Example
//!
//! ```
//! use conwire_client::StagingArena;
//!
//! let arena = StagingArena::with_limit(1024);
//! {
//!     let lease = arena.lease(600).unwrap();
//!     assert_eq!(lease.bytes(), 600);
//!     assert!(arena.lease(600).is_err());
//! }
//! assert_eq!(arena.outstanding(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{ConwireError, Result};

/// Default staging ceiling (64 MiB).
pub const DEFAULT_STAGING_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Debug)]
struct Counters {
    in_use: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    limit: usize,
}

/// Shared staging budget.
///
/// Cloning is cheap and every clone sees the same counters.
#[derive(Debug, Clone)]
pub struct StagingArena {
    counters: Arc<Counters>,
}

impl StagingArena {
    /// Create an arena with the default ceiling.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_STAGING_LIMIT)
    }

    /// Create an arena with a custom ceiling in bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            counters: Arc::new(Counters {
                in_use: AtomicUsize::new(0),
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                limit,
            }),
        }
    }

    /// Reserve `bytes` from the budget.
    ///
    /// Returns `OutOfMemory` if the reservation would cross the ceiling.
    pub fn lease(&self, bytes: usize) -> Result<StagingLease> {
        let counters = &self.counters;
        let mut current = counters.in_use.load(Ordering::Acquire);
        loop {
            let next = current
                .checked_add(bytes)
                .filter(|next| *next <= counters.limit)
                .ok_or(ConwireError::OutOfMemory { requested: bytes })?;

            match counters.in_use.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        counters.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(StagingLease {
            arena: self.clone(),
            bytes,
        })
    }

    /// Reserve `bytes` and allocate a zeroed buffer of that size.
    ///
    /// Allocation goes through `try_reserve_exact`, so a failing allocator
    /// surfaces as `OutOfMemory` rather than an abort.
    pub fn alloc_zeroed(&self, bytes: usize) -> Result<(Vec<u8>, StagingLease)> {
        let lease = self.lease(bytes)?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(bytes)
            .map_err(|_| ConwireError::OutOfMemory { requested: bytes })?;
        buf.resize(bytes, 0);
        Ok((buf, lease))
    }

    /// Bytes currently leased.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.counters.in_use.load(Ordering::Acquire)
    }

    /// Leases handed out since creation.
    #[inline]
    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::Acquire)
    }

    /// Leases returned since creation.
    #[inline]
    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::Acquire)
    }

    /// Ceiling in bytes.
    #[inline]
    pub fn limit(&self) -> usize {
        self.counters.limit
    }

    fn release(&self, bytes: usize) {
        self.counters.in_use.fetch_sub(bytes, Ordering::AcqRel);
        self.counters.released.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for StagingArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes reserved from a [`StagingArena`], returned on drop.
#[derive(Debug)]
pub struct StagingLease {
    arena: StagingArena,
    bytes: usize,
}

impl StagingLease {
    /// Size of the reservation.
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for StagingLease {
    fn drop(&mut self) {
        self.arena.release(self.bytes);
    }
}
