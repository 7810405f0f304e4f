//! Per-set priority gate tests.
//!
//! A transaction claims a set only when no equal-or-higher bit is held;
//! `check` reports whether speculative work below a held priority may
//! continue; `reset` wakes waiters.

use cohsim_core::sync::{SetGate, XactPrio};
use std::sync::Arc;
use std::time::Duration;

/// A higher priority enters a set held at a lower one.
#[test]
fn higher_priority_enters_over_lower() {
    let gate = SetGate::new();
    gate.set(XactPrio::Acquire);
    // probe outranks acquire and proceeds immediately
    gate.set(XactPrio::Probe);
    assert_eq!(gate.bits(), XactPrio::Acquire.bit() | XactPrio::Probe.bit());
    gate.reset(XactPrio::Probe);
    gate.reset(XactPrio::Acquire);
    assert_eq!(gate.bits(), 0);
}

/// An equal priority blocks until the holder resets.
#[test]
fn equal_priority_blocks_until_reset() {
    let gate = Arc::new(SetGate::new());
    gate.set(XactPrio::Acquire);

    let g2 = Arc::clone(&gate);
    let waiter = std::thread::spawn(move || {
        g2.set(XactPrio::Acquire); // blocks on the held bit
        g2.reset(XactPrio::Acquire);
    });

    std::thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished(), "second acquire must wait");
    gate.reset(XactPrio::Acquire);
    waiter.join().expect("waiter completes after the reset");
}

/// `check` fails exactly while a strictly-higher bit is held.
#[test]
fn check_sees_strictly_higher_bits() {
    let gate = SetGate::new();
    gate.set(XactPrio::Acquire);
    assert!(gate.check(XactPrio::Acquire), "nothing above acquire");
    gate.set(XactPrio::Evict);
    assert!(!gate.check(XactPrio::Acquire), "evict outranks acquire");
    assert!(gate.check(XactPrio::Evict), "nothing above evict");
    gate.reset(XactPrio::Evict);
    assert!(gate.check(XactPrio::Acquire));
    gate.reset(XactPrio::Acquire);
}

/// `wait` returns once the higher-priority holder resets.
#[test]
fn wait_unblocks_on_reset() {
    let gate = Arc::new(SetGate::new());
    gate.set(XactPrio::Acquire);
    gate.set(XactPrio::Flush);

    let g2 = Arc::clone(&gate);
    let waiter = std::thread::spawn(move || {
        g2.wait(XactPrio::Acquire);
    });
    std::thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished());
    gate.reset(XactPrio::Flush);
    waiter.join().expect("wait returns after the flush clears");
    gate.reset(XactPrio::Acquire);
}

/// The priority order is read < acquire < release < probe < evict < flush.
#[test]
fn priority_order_is_ascending() {
    let order = [
        XactPrio::Read,
        XactPrio::Acquire,
        XactPrio::Release,
        XactPrio::Probe,
        XactPrio::Evict,
        XactPrio::Flush,
    ];
    for pair in order.windows(2) {
        assert!(pair[0].bit() < pair[1].bit());
    }
}
