//! Dynamic re-indexing tests.

use crate::common::{mix, Workload};
use cohsim_core::cache::remap::{RemapNode, SimpleEvRemapper, MAGIC_ID_REMAP};
use cohsim_core::coherence::node::CacheNode;
use cohsim_core::coherence::CohMaster;
use cohsim_core::common::DataBlock;
use cohsim_core::config::{CacheParams, DelayConfig};
use cohsim_core::memory::SimpleMemory;
use cohsim_core::monitor::Monitor;
use cohsim_core::CoreInterface;
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct RemapRig {
    core: CoreInterface,
    node: RemapNode,
    _l1: CacheNode,
    memory: Arc<SimpleMemory>,
}

/// One core over a remappable skewed LLC over memory.
fn remap_rig() -> RemapRig {
    let params = CacheParams {
        index_width: 4,
        ways: 4,
        partitions: 2,
        ..CacheParams::default()
    };
    let memory = Arc::new(SimpleMemory::new("mem", DelayConfig::None));
    let memory_master: Arc<dyn CohMaster> = Arc::clone(&memory) as Arc<dyn CohMaster>;
    let node = RemapNode::build("remap", &params, false, true, 0x5eed).expect("remap node builds");
    node.connect_to(&memory_master, false).expect("LLC connects");

    let l1 = CacheNode::build(
        "l1-0",
        &CacheParams {
            index_width: 3,
            ways: 4,
            ..CacheParams::default()
        },
        true,
        false,
    )
    .expect("L1 builds");
    let master = node.master();
    l1.connect_to(&master, false).expect("L1 connects");

    RemapRig {
        core: l1.core_interface(),
        node,
        _l1: l1,
        memory,
    }
}

/// A manually triggered epoch relocates every line and keeps all values
/// readable.
#[test]
fn manual_remap_preserves_contents() {
    let rig = remap_rig();
    let addrs: Vec<u64> = (0..24u64)
        .map(|i| mix(0x4e4e, i) & 0x0000_FFFF_FFFF_FFC0)
        .collect();
    for (i, addr) in addrs.iter().enumerate() {
        rig.core.write(*addr, &DataBlock::splat(i as u64), None);
    }

    rig.node.port().remap();
    assert!(!rig.node.cache().remapping(), "the epoch ran to completion");

    for (i, addr) in addrs.iter().enumerate() {
        assert_eq!(
            rig.core.read(*addr, None),
            DataBlock::splat(i as u64),
            "address {addr:#x} lost across the epoch"
        );
    }
}

/// Back-to-back epochs keep rotating seeds without losing lines.
#[test]
fn repeated_epochs_stay_consistent() {
    let rig = remap_rig();
    for round in 0..3u64 {
        rig.core
            .write(0x7000 + round * 0x40, &DataBlock::splat(round), None);
        rig.node.port().remap();
    }
    for round in 0..3u64 {
        assert_eq!(rig.core.read(0x7000 + round * 0x40, None), DataBlock::splat(round));
    }
}

/// The eviction-count monitor raises the remap flag through the magic
/// side-channel.
#[test]
fn remap_monitor_raises_the_flag() {
    let monitor = SimpleEvRemapper::new(2);
    let ev = cohsim_core::monitor::AccessEvent {
        cache_id: 1,
        addr: 0x40,
        ai: 0,
        s: 0,
        w: 0,
        rank: 0,
        hit: true,
        meta: None,
        data: None,
    };
    monitor.on_invalid(&ev);
    let mut flag = false;
    assert!(monitor.magic(1, 0x40, MAGIC_ID_REMAP, &mut flag));
    assert!(!flag, "below the period");
    monitor.on_invalid(&ev);
    monitor.magic(1, 0x40, MAGIC_ID_REMAP, &mut flag);
    assert!(flag, "period reached");
    flag = false;
    monitor.magic(1, 0x40, MAGIC_ID_REMAP, &mut flag);
    assert!(!flag, "the flag is consumed once raised");
}

/// A monitor-triggered workload remaps transparently: reads keep their
/// program-order values across epochs.
#[test]
fn triggered_remap_is_transparent() {
    let rig = remap_rig();
    let remapper: Arc<dyn Monitor> = Arc::new(SimpleEvRemapper::new(16));
    rig.node.attach_monitor(&remapper);

    let cores = [rig.core];
    let mut workload = Workload::new(0x4EAF, 96);
    workload.run(&cores, 2_000);
    workload.verify_all(&cores[0]);
    let _keep = rig.memory;
}
