//! Pending-transaction table tests.

use cohsim_core::sync::PendingXact;

/// Entries are keyed by (address, requester) and carry the forward flag and
/// granted line.
#[test]
fn insert_read_remove_round_trip() {
    let table = PendingXact::new("l2", 4);
    table.insert(0x1040, 2, true, Some((0, 1, 3)));
    assert_eq!(table.read(0x1040, 2), Some((true, Some((0, 1, 3)))));
    assert_eq!(table.read(0x1040, 1), None, "requester id is part of the key");
    assert_eq!(table.read(0x1080, 2), None);
    table.remove(0x1040, 2);
    assert_eq!(table.read(0x1040, 2), None);
}

/// The same address may be pending for different requesters.
#[test]
fn distinct_requesters_coexist() {
    let table = PendingXact::new("l2", 4);
    table.insert(0x2000, 0, false, Some((0, 0, 0)));
    table.insert(0x2000, 1, true, None);
    assert_eq!(table.read(0x2000, 0), Some((false, Some((0, 0, 0)))));
    assert_eq!(table.read(0x2000, 1), Some((true, None)));
}

/// Removing an absent entry is a no-op.
#[test]
fn remove_is_idempotent() {
    let table = PendingXact::new("l2", 2);
    table.remove(0x40, 0);
    table.insert(0x40, 0, false, None);
    table.remove(0x40, 0);
    table.remove(0x40, 0);
    assert_eq!(table.read(0x40, 0), None);
}

/// Overflowing the MSHR-bounded capacity aborts with a diagnostic.
#[test]
#[should_panic(expected = "pending transaction table overflow")]
fn overflow_aborts() {
    let table = PendingXact::new("l2", 2);
    table.insert(0x0040, 0, false, None);
    table.insert(0x0080, 1, false, None);
    table.insert(0x00C0, 2, false, None);
}
