//! Exclusive-cache scenarios.
//!
//! The four-core tree pairs MSI L1s with a directory-exclusive L2 (extended
//! ways) under a MESI L3: a block lives either in the L2's normal ways or in
//! exactly one L1, while the extended directory keeps tracking it.

use crate::common::{self, Workload};
use cohsim_core::cache::meta::CohState;
use cohsim_core::common::DataBlock;
use cohsim_core::config::{CacheParams, Config, PolicyVariant};
use pretty_assertions::assert_eq;

/// Exclusive-migrate: a sole reader gets Exclusive, the L2 tracks the line
/// from an extended way, and a second reader shares it.
#[test]
fn exclusive_migrate_and_share() {
    let h = common::exclusive_tree();

    assert_eq!(h.cores[0].read(0x5000, None), DataBlock::new());
    let c0 = h.cores[0].peek_line(0x5000).expect("reader holds the line");
    assert_eq!(c0.outer().state, CohState::Exclusive, "sole sharer gets E");

    // the L2 tracks the line in an extended (directory-only) way
    let l2 = &h.nodes[4];
    let loc = l2.cache().hit(0x5000, None).expect("L2 directory tracks it");
    assert!(l2.cache().meta(loc).is_extend());
    assert!(l2.cache().meta(loc).get().is_sharer(0));

    // the L3 records its single child as the holder
    let l3 = &h.nodes[5];
    let l3_loc = l3.cache().hit(0x5000, None).expect("L3 is inclusive");
    assert!(l3.cache().meta(l3_loc).is_valid());

    // a second reader forces the downgrade; both end Shared
    assert_eq!(h.cores[1].read(0x5000, None), DataBlock::new());
    let c0 = h.cores[0].peek_line(0x5000).expect("core0 keeps a copy");
    let c1 = h.cores[1].peek_line(0x5000).expect("core1 holds a copy");
    assert_eq!(c0.outer().state, CohState::Shared);
    assert_eq!(c1.outer().state, CohState::Shared);
}

/// A write through the exclusive level keeps exactly one writable copy and
/// preserves the data across the migration dance.
#[test]
fn exclusive_write_round_trip() {
    let h = common::exclusive_tree();
    let v = DataBlock::splat(0xE1);

    h.cores[2].write(0x6000, &v, None);
    assert_eq!(h.cores[2].read(0x6000, None), v);

    // another core reads it through the directory
    assert_eq!(h.cores[3].read(0x6000, None), v);
    let c2 = h.cores[2].peek_line(0x6000).expect("writer keeps a share");
    assert!(!c2.allow_write(), "the write grant was withdrawn");
}

/// Flushing through an exclusive level retrieves the block from the owning
/// L1 and pushes it to memory.
#[test]
fn exclusive_flush_collects_from_the_owner() {
    let h = common::exclusive_tree();
    let v = DataBlock::splat(0xF10);
    h.cores[1].write(0x7000, &v, None);
    h.cores[1].flush(0x7000, None);
    assert_eq!(h.memory.peek_block(0x7000), v);
    assert!(h.cores[1].peek_line(0x7000).is_none());
    assert_eq!(h.cores[0].read(0x7000, None), v, "refetch after the flush");
}

/// A broadcast-exclusive LLC (no directory) behaves under a mixed workload.
#[test]
fn broadcast_exclusive_workload() {
    let l2 = CacheParams {
        index_width: 4,
        ways: 8,
        policy: PolicyVariant::ExclusiveMsi,
        ..CacheParams::default()
    };
    let config = Config {
        cores: 2,
        levels: vec![common::small_l1(), l2],
        ..Config::default()
    };
    let h = cohsim_core::hierarchy::build(&config).expect("broadcast-exclusive builds");
    let mut workload = Workload::new(0xE5C1, 48);
    workload.run(&h.cores, 2_000);
    workload.verify_all(&h.cores[0]);
}

/// A directory-exclusive tree stays correct under a mixed workload with
/// conflict evictions.
#[test]
fn directory_exclusive_workload() {
    let h = common::exclusive_tree();
    let mut workload = Workload::new(0xD1EC, 96);
    workload.run(&h.cores, 4_000);
    workload.verify_all(&h.cores[1]);
}
