//! Concurrency substrate for multithreaded drivers.
//!
//! The coherence engine is shared mutable state driven by parallel OS threads;
//! mutual exclusion is fine-grained. This module provides:
//! 1. **Set Gates:** Per-set priority bitmaps serializing transaction kinds.
//! 2. **Line Locks:** Manual per-line locks held from acquire until finish.
//! 3. **Pending Tables:** Per-port records of grants awaiting a finish.
//! 4. **Buffer Pools:** MSHR-deep staging buffers for evictions and fetches.
//! 5. **Lock Checking:** Optional per-thread stack-discipline verification.
//!
//! Under a single-threaded driver the same code paths run uncontended; no
//! separate single-thread implementations exist.

/// Per-set transaction priority gates.
pub mod gate;

/// Per-line protocol locks.
pub mod line;

/// Optional lock-order verification (`lock-check` feature).
#[cfg(feature = "lock-check")]
pub mod lockcheck;

/// Pending-transaction tables for the finish protocol.
pub mod pending;

/// Pre-allocated staging buffer pools.
pub mod pool;

pub use gate::{SetGate, XactPrio};
pub use line::LineLock;
pub use pending::PendingXact;
pub use pool::{BufferPool, PoolGuard};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the guard if a panicking thread poisoned it.
///
/// Invariant violations abort the whole process, so a poisoned mutex can only
/// be observed while the abort is already in flight; recovering keeps the
/// remaining threads from cascading into secondary panics.
#[inline]
pub fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
