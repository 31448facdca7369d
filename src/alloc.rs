// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! A hard byte-limit guard wrapping Arrow allocations.
//!
//! `arrow-rs` does not expose a pluggable per-allocation hook the way the
//! C++/Go Arrow implementations do, so this guard is driven explicitly: the
//! adaptive builder and stream producer/consumer call [`AllocGuard::reserve`]
//! after sizing a freshly built `RecordBatch` (via
//! `RecordBatch::get_array_memory_size`) and [`AllocGuard::release`] when that
//! memory is no longer referenced.

use crate::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps a byte budget shared by everything one producer (or consumer)
/// instance owns. Not safe for concurrent access across producers.
#[derive(Debug)]
pub struct AllocGuard {
    limit: usize,
    inuse: AtomicUsize,
}

impl AllocGuard {
    /// Creates a guard with the given byte limit. `usize::MAX` effectively
    /// disables the limit.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            inuse: AtomicUsize::new(0),
        }
    }

    /// Bytes currently tracked as in use.
    #[must_use]
    pub fn inuse(&self) -> usize {
        self.inuse.load(Ordering::Relaxed)
    }

    /// Configured limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reserves `request` additional bytes, failing with
    /// [`Error::AllocationLimitExceeded`] if `inuse + request > limit`. The
    /// counter is only incremented on success.
    pub fn reserve(&self, request: usize) -> Result<(), Error> {
        let inuse = self.inuse.load(Ordering::Relaxed);
        let new_inuse = inuse.checked_add(request).unwrap_or(usize::MAX);
        if new_inuse > self.limit {
            return Err(Error::AllocationLimitExceeded {
                request,
                inuse,
                limit: self.limit,
            });
        }
        self.inuse.store(new_inuse, Ordering::Relaxed);
        Ok(())
    }

    /// Reserves `new_size` bytes in place of a previous allocation of
    /// `old_size` bytes (mirrors the allocator's `reallocate`).
    pub fn reallocate(&self, new_size: usize, old_size: usize) -> Result<(), Error> {
        if new_size <= old_size {
            self.release(old_size - new_size);
            return Ok(());
        }
        self.reserve(new_size - old_size)
    }

    /// Releases `size` bytes previously reserved. Saturates at zero rather
    /// than underflowing on a mismatched release.
    pub fn release(&self, size: usize) {
        let _ = self
            .inuse
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |inuse| {
                Some(inuse.saturating_sub(size))
            });
    }
}

impl Default for AllocGuard {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_within_limit_succeeds() {
        let guard = AllocGuard::new(100);
        assert!(guard.reserve(40).is_ok());
        assert!(guard.reserve(40).is_ok());
        assert_eq!(guard.inuse(), 80);
    }

    #[test]
    fn reserve_over_limit_fails_and_leaves_counter_unchanged() {
        let guard = AllocGuard::new(100);
        guard.reserve(90).unwrap();
        let err = guard.reserve(20).unwrap_err();
        match err {
            Error::AllocationLimitExceeded {
                request,
                inuse,
                limit,
            } => {
                assert_eq!(request, 20);
                assert_eq!(inuse, 90);
                assert_eq!(limit, 100);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(guard.inuse(), 90);
    }

    #[test]
    fn release_then_teardown_reaches_zero() {
        let guard = AllocGuard::new(100);
        guard.reserve(64).unwrap();
        guard.release(64);
        assert_eq!(guard.inuse(), 0);
    }

    #[test]
    fn kind_survives_downstream_wrapping() {
        let guard = AllocGuard::new(1);
        let err = guard.reserve(2).unwrap_err();
        let wrapped = format!("arrow ipc write failed: {err}");
        assert_eq!(err.kind(), crate::error::ErrorKind::AllocationLimitExceeded);
        assert!(wrapped.contains("allocation of 2 bytes"));
    }
}
