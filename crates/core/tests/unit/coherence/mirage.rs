//! MIRAGE data-indirected LLC tests.

use crate::common::{mix, Workload};
use cohsim_core::cache::mirage::{MirageCache, MirageNode};
use cohsim_core::cache::CacheAccess;
use cohsim_core::coherence::node::CacheNode;
use cohsim_core::coherence::CohMaster;
use cohsim_core::common::DataBlock;
use cohsim_core::config::{CacheParams, DelayConfig};
use cohsim_core::memory::SimpleMemory;
use cohsim_core::CoreInterface;
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// One core over a MIRAGE LLC over memory.
struct MirageRig {
    core: CoreInterface,
    cache: Arc<MirageCache>,
    memory: Arc<SimpleMemory>,
    _l1: CacheNode,
    _llc: MirageNode,
}

/// Two skewed partitions, four data ways plus two extra tag ways per
/// partition, cuckoo bound 3.
fn mirage_rig() -> MirageRig {
    let params = CacheParams {
        index_width: 4,
        ways: 4,
        ext_ways: 2,
        partitions: 2,
        ..CacheParams::default()
    };
    let memory = Arc::new(SimpleMemory::new("mem", DelayConfig::None));
    let memory_master: Arc<dyn CohMaster> = Arc::clone(&memory) as Arc<dyn CohMaster>;
    let llc = MirageNode::build("mirage", &params, 3).expect("MIRAGE node builds");
    llc.connect_to(&memory_master, false).expect("LLC connects");

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
    let llc_master = llc.master();
    l1.connect_to(&llc_master, false).expect("L1 connects");

    MirageRig {
        core: l1.core_interface(),
        cache: Arc::clone(llc.cache()),
        memory,
        _l1: l1,
        _llc: llc,
    }
}

fn addr_for(i: u64) -> u64 {
    mix(0x3141, i) & 0x0000_FFFF_FFFF_FFC0
}

/// Data round-trips through the decoupled tag and data arrays.
#[test]
fn mirage_round_trip() {
    let rig = mirage_rig();
    for i in 0..32u64 {
        rig.core
            .write(0x2_0000 + i * 0x40, &DataBlock::splat(i), None);
    }
    for i in 0..32u64 {
        assert_eq!(rig.core.read(0x2_0000 + i * 0x40, None), DataBlock::splat(i));
    }
}

/// Tag and data back-pointers stay mutually consistent after relocations
/// and data-side evictions.
#[test]
fn mirage_pointers_stay_consistent() {
    let rig = mirage_rig();
    // overfill: more blocks than data slots to force data-side evictions
    for i in 0..256u64 {
        rig.core.write(addr_for(i), &DataBlock::splat(i), None);
    }
    let (partitions, sets, ways) = rig.cache.geometry();
    for ai in 0..partitions {
        for s in 0..sets {
            for w in 0..ways {
                let loc = (ai, s, w);
                if rig.cache.meta(loc).is_valid() {
                    let ptr = rig.cache.data_ptr(loc);
                    assert_eq!(
                        rig.cache.data_meta_at(ptr).owner(),
                        Some(loc),
                        "data slot back-pointer mismatch at {loc:?}"
                    );
                }
            }
        }
    }
}

/// A mixed workload over the MIRAGE LLC stays correct.
#[test]
fn mirage_workload() {
    let rig = mirage_rig();
    let cores = [rig.core];
    let mut workload = Workload::new(0x3A6E, 64);
    workload.run(&cores, 3_000);
    workload.verify_all(&cores[0]);
}

/// Flushing drops both the tag and its data slot.
#[test]
fn mirage_flush_frees_the_data_slot() {
    let rig = mirage_rig();
    let v = DataBlock::splat(0x717);
    rig.core.write(0x3_0000, &v, None);
    rig.core.flush(0x3_0000, None);
    assert!(rig.cache.hit(0x3_0000, None).is_none(), "tag dropped");
    assert_eq!(rig.memory.peek_block(0x3_0000), v, "value persisted");
    assert_eq!(rig.core.read(0x3_0000, None), v);
}
