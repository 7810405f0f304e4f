//! Per-set transaction priority gates.
//!
//! Every cache set carries a small bitmap of in-flight transaction kinds.
//! A transaction may claim the set only when no bit of equal or higher
//! priority is already held; clearing a bit wakes waiters. The ordering is
//! used solely to break simultaneity between conflicting transactions, never
//! to prioritize throughput.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Transaction priorities, one bit each, higher value wins.
///
/// The ascending order is: read < acquire < release < probe < evict < flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum XactPrio {
    /// Core-driver read/write lookup.
    Read = 0x01,
    /// Acquire from an inner cache.
    Acquire = 0x02,
    /// Release (writeback) from an inner cache.
    Release = 0x04,
    /// Probe from the outer cache.
    Probe = 0x08,
    /// Eviction staging.
    Evict = 0x10,
    /// Flush handling.
    Flush = 0x20,
}

impl XactPrio {
    /// Returns the raw priority bit.
    #[inline(always)]
    pub fn bit(self) -> u16 {
        self as u16
    }
}

/// A lock-free priority bitmap with condition-variable wakeups.
///
/// Waiters use a short timed wait: a wakeup between the load and the wait
/// would otherwise be lost, and the timeout bounds that window without a
/// heavier handshake.
#[derive(Debug, Default)]
pub struct SetGate {
    bits: AtomicU16,
    mtx: Mutex<()>,
    cv: Condvar,
}

/// Bound on a missed-wakeup stall.
const WAIT_SLICE: Duration = Duration::from_micros(100);

impl SetGate {
    /// Creates an idle gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the set at `prio`, blocking until no equal-or-higher bit is
    /// held by another transaction.
    pub fn set(&self, prio: XactPrio) {
        let bit = prio.bit();
        loop {
            let state = self.bits.load(Ordering::Acquire);
            if state >= bit {
                self.wait_slice();
                continue;
            }
            if self
                .bits
                .compare_exchange(state, state | bit, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Returns whether no strictly-higher priority is currently held.
    ///
    /// Used to decide whether speculative work below `prio` may continue.
    pub fn check(&self, prio: XactPrio) -> bool {
        let upper = (prio.bit() << 1) - 1;
        let state = self.bits.load(Ordering::Acquire);
        debug_assert!(state >= prio.bit(), "gate checked without holding {prio:?}");
        upper >= state
    }

    /// Blocks until no strictly-higher priority is held.
    pub fn wait(&self, prio: XactPrio) {
        while !self.check(prio) {
            self.wait_slice();
        }
    }

    /// Releases the set at `prio` and wakes waiters.
    pub fn reset(&self, prio: XactPrio) {
        let bit = prio.bit();
        loop {
            let state = self.bits.load(Ordering::Acquire);
            assert!(
                state & bit != 0,
                "set gate reset at {prio:?} without a matching set"
            );
            if self
                .bits
                .compare_exchange(state, state & !bit, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        let _unused = crate::sync::guard(&self.mtx);
        self.cv.notify_all();
    }

    /// Snapshot of the raw bitmap; test hook.
    pub fn bits(&self) -> u16 {
        self.bits.load(Ordering::Acquire)
    }

    fn wait_slice(&self) {
        let g = crate::sync::guard(&self.mtx);
        let _unused = self
            .cv
            .wait_timeout(g, WAIT_SLICE)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }
}
