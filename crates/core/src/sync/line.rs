//! Per-line protocol locks.
//!
//! A line lock is taken by an inner port when an acquire selects a line and is
//! released only when the matching finish arrives, which may be in a different
//! call stack (and, under a multithreaded driver, a different thread). RAII
//! guards cannot span that window, so the lock is a manual lock/unlock pair
//! over a condition variable.

use std::sync::{Condvar, Mutex};

/// A manual per-line lock.
#[derive(Debug, Default)]
pub struct LineLock {
    held: Mutex<bool>,
    cv: Condvar,
}

impl LineLock {
    /// Creates an unlocked line lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the line is free, then takes it.
    pub fn lock(&self) {
        let mut held = crate::sync::guard(&self.held);
        while *held {
            held = self
                .cv
                .wait(held)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        *held = true;
        #[cfg(feature = "lock-check")]
        crate::sync::lockcheck::push(self as *const Self as usize);
    }

    /// Releases the line and wakes one waiter.
    pub fn unlock(&self) {
        let mut held = crate::sync::guard(&self.held);
        assert!(*held, "line lock released while not held");
        *held = false;
        #[cfg(feature = "lock-check")]
        crate::sync::lockcheck::pop(self as *const Self as usize);
        drop(held);
        self.cv.notify_one();
    }

    /// Returns whether the line is currently held; test hook.
    pub fn is_held(&self) -> bool {
        *crate::sync::guard(&self.held)
    }
}
