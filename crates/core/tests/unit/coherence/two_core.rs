//! Multi-core MSI/MESI scenarios: write-invalidate, probe-downgrade on a
//! read-share, directory tracking, and Exclusive grants.

use crate::common;
use cohsim_core::cache::meta::{CohState, Meta};
use cohsim_core::coherence::node::CacheNode;
use cohsim_core::common::DataBlock;
use pretty_assertions::assert_eq;

fn peek(node: &CacheNode, addr: u64) -> Option<Meta> {
    node.cache()
        .hit(addr, None)
        .map(|loc| node.cache().meta(loc).get())
}

/// Write-invalidate: the second writer takes the line exclusively; the first
/// writer reads the new value back through the shared level.
#[test]
fn write_invalidate_propagates_the_last_write() {
    let h = common::msi_tree(2);
    let a = DataBlock::splat(0xA);
    let b = DataBlock::splat(0xB);

    h.cores[0].write(0x2000, &a, None);
    h.cores[1].write(0x2000, &b, None);

    // the first writer's copy was invalidated by the probe
    assert!(
        h.cores[0].peek_line(0x2000).is_none(),
        "core0's copy is gone after core1's write"
    );

    assert_eq!(h.cores[0].read(0x2000, None), b, "core0 sees core1's write");

    // after the read-share, core0 is tracked by the L2 and core1 lost write
    // permission
    let l2 = peek(&h.nodes[2], 0x2000).expect("L2 is inclusive");
    assert!(l2.is_sharer(0), "L2 tracks core0");
    let c1 = h.cores[1].peek_line(0x2000).expect("core1 keeps a shared copy");
    assert!(!c1.allow_write(), "no second writable copy exists");
}

/// Probe-downgrade on a read-share: the writer drops M→S and hands the dirty
/// data to the shared level, which then tracks both cores.
#[test]
fn read_share_downgrades_the_writer() {
    let h = common::msi_tree(2);
    let x = DataBlock::splat(0x77);

    h.cores[0].write(0x3000, &x, None);
    let before = h.cores[0].peek_line(0x3000).expect("writer holds the line");
    assert_eq!(before.state(), CohState::Modified);
    assert!(before.is_dirty());

    assert_eq!(h.cores[1].read(0x3000, None), x);

    let c0 = h.cores[0].peek_line(0x3000).expect("writer keeps a copy");
    assert_eq!(c0.state(), CohState::Shared);
    assert!(!c0.is_dirty(), "the dirty data moved to L2 during the probe");

    let c1 = h.cores[1].peek_line(0x3000).expect("reader holds a copy");
    assert_eq!(c1.state(), CohState::Shared);

    let l2 = peek(&h.nodes[2], 0x3000).expect("L2 is inclusive");
    assert!(l2.is_sharer(0) && l2.is_sharer(1), "both cores tracked");
    assert!(l2.is_dirty(), "the write lives in L2 until written back");
}

/// At most one writable copy exists at any point of a write ping-pong.
#[test]
fn writable_copies_are_exclusive() {
    let h = common::msi_tree(2);
    for i in 0..8u64 {
        let core = (i % 2) as usize;
        h.cores[core].write(0x4000, &DataBlock::splat(i), None);
        let writer = h.cores[core].peek_line(0x4000).expect("writer resident");
        assert!(writer.allow_write());
        let other = h.cores[1 - core].peek_line(0x4000);
        assert!(
            other.is_none_or(|m| !m.allow_write()),
            "two writable copies after write {i}"
        );
    }
    assert_eq!(h.cores[0].read(0x4000, None), DataBlock::splat(7));
}

/// MESI grants Exclusive to a sole reader, which then promotes to Modified
/// locally on write (no second fetch).
#[test]
fn mesi_grants_exclusive_to_sole_reader() {
    let h = common::mesi_tree(2);

    assert_eq!(h.cores[0].read(0x5000, None), DataBlock::new());
    let c0 = h.cores[0].peek_line(0x5000).expect("reader holds the line");
    assert_eq!(c0.outer().state, CohState::Exclusive, "sole sharer gets E");

    // the local promotion needs no outer round trip
    h.cores[0].write(0x5000, &DataBlock::splat(1), None);
    let c0 = h.cores[0].peek_line(0x5000).expect("still resident");
    assert_eq!(c0.state(), CohState::Modified);

    // a second reader demotes the grant to Shared
    assert_eq!(h.cores[1].read(0x5000, None), DataBlock::splat(1));
    let c1 = h.cores[1].peek_line(0x5000).expect("second reader resident");
    assert_eq!(c1.outer().state, CohState::Shared, "not a sole sharer");
}

/// The sharer bitmap stays a superset of the actual holders.
#[test]
fn sharer_bitmap_is_a_superset() {
    let h = common::mesi_tree(4);
    for core in 0..4 {
        let _ = h.cores[core].read(0x6000, None);
    }
    let l2 = peek(&h.nodes[4], 0x6000).expect("L2 is inclusive");
    for core in 0..4i16 {
        assert!(
            h.cores[core as usize].peek_line(0x6000).is_none() || l2.is_sharer(core),
            "core {core} holds the line but is not tracked"
        );
    }
}
