//! Property tests over random operation sequences.
//!
//! For any sequence of driver operations, a read returns the last value the
//! program order wrote to that address; dirty data is never lost across
//! evictions, flushes, or core migrations.

use crate::common;
use cohsim_core::common::DataBlock;
use proptest::prelude::*;
use std::collections::HashMap;

/// One abstract driver operation.
#[derive(Clone, Debug)]
enum Op {
    Read { core: usize, slot: usize },
    Write { core: usize, slot: usize, value: u64 },
    Flush { core: usize, slot: usize },
    Writeback { core: usize, slot: usize },
}

fn op_strategy(cores: usize, slots: usize) -> impl Strategy<Value = Op> {
    let c = 0..cores;
    let s = 0..slots;
    prop_oneof![
        (c.clone(), s.clone()).prop_map(|(core, slot)| Op::Read { core, slot }),
        (c.clone(), s.clone(), any::<u64>())
            .prop_map(|(core, slot, value)| Op::Write { core, slot, value }),
        (c.clone(), s.clone()).prop_map(|(core, slot)| Op::Flush { core, slot }),
        (c, s).prop_map(|(core, slot)| Op::Writeback { core, slot }),
    ]
}

/// Slot addresses spread over several sets and tags, with deliberate set
/// conflicts.
fn slot_addr(slot: usize) -> u64 {
    0x1_0000 + (slot as u64) * 0x1C0
}

fn check_sequence(hierarchy: &cohsim_core::Hierarchy, ops: &[Op]) {
    let mut reference: HashMap<u64, DataBlock> = HashMap::new();
    for op in ops {
        match op {
            Op::Read { core, slot } => {
                let addr = slot_addr(*slot);
                let got = hierarchy.cores[*core].read(addr, None);
                let want = reference.get(&addr).copied().unwrap_or_default();
                assert_eq!(got, want, "read of {addr:#x} diverged");
            }
            Op::Write { core, slot, value } => {
                let addr = slot_addr(*slot);
                let block = DataBlock::splat(*value);
                hierarchy.cores[*core].write(addr, &block, None);
                let _prev = reference.insert(addr, block);
            }
            Op::Flush { core, slot } => {
                hierarchy.cores[*core].flush(slot_addr(*slot), None);
            }
            Op::Writeback { core, slot } => {
                hierarchy.cores[*core].writeback(slot_addr(*slot), None);
            }
        }
    }
    // quiesce: every address reads back its last program-order value
    for (addr, want) in &reference {
        let got = hierarchy.cores[0].read(*addr, None);
        assert_eq!(&got, want, "post-quiesce read of {addr:#x} diverged");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Read-your-writes on a single core over memory.
    #[test]
    fn single_core_sequences(ops in proptest::collection::vec(op_strategy(1, 12), 1..120)) {
        let h = common::single_core_l1();
        check_sequence(&h, &ops);
    }

    /// Program-order visibility across two cores of an MSI tree.
    #[test]
    fn two_core_msi_sequences(ops in proptest::collection::vec(op_strategy(2, 10), 1..100)) {
        let h = common::msi_tree(2);
        check_sequence(&h, &ops);
    }

    /// Program-order visibility across four cores of a MESI tree.
    #[test]
    fn four_core_mesi_sequences(ops in proptest::collection::vec(op_strategy(4, 8), 1..80)) {
        let h = common::mesi_tree(4);
        check_sequence(&h, &ops);
    }

    /// The exclusive tree honors the same sequences.
    #[test]
    fn exclusive_sequences(ops in proptest::collection::vec(op_strategy(4, 8), 1..60)) {
        let h = common::exclusive_tree();
        check_sequence(&h, &ops);
    }
}

/// After any sequence, at most one writable copy of a touched address exists
/// across the L1s.
#[test]
fn no_two_writable_copies_after_ping_pong() {
    let h = common::msi_tree(4);
    for i in 0..32u64 {
        let core = (i % 4) as usize;
        h.cores[core].write(0x9000, &DataBlock::splat(i), None);
        let writable = (0..4)
            .filter(|c| {
                h.cores[*c]
                    .peek_line(0x9000)
                    .is_some_and(|m| m.allow_write())
            })
            .count();
        assert!(writable <= 1, "{writable} writable copies after write {i}");
    }
}
