//! Shared test infrastructure: canonical topologies and checked workloads.

use std::collections::HashMap;

use cohsim_core::common::DataBlock;
use cohsim_core::config::{CacheParams, Config, PolicyVariant, SliceHashKind};
use cohsim_core::hierarchy::{self, Hierarchy};

/// A small L1: 8 sets, 4 ways, LRU.
pub fn small_l1() -> CacheParams {
    CacheParams {
        index_width: 3,
        ways: 4,
        ..CacheParams::default()
    }
}

/// A small shared level: 16 sets, 8 ways.
pub fn small_l2() -> CacheParams {
    CacheParams {
        index_width: 4,
        ways: 8,
        ..CacheParams::default()
    }
}

/// One core, one L1 directly over memory.
pub fn single_core_l1() -> Hierarchy {
    let config = Config {
        cores: 1,
        levels: vec![small_l1()],
        ..Config::default()
    };
    hierarchy::build(&config).expect("single-core hierarchy builds")
}

/// `cores` L1s over a shared MSI L2 over memory.
pub fn msi_tree(cores: usize) -> Hierarchy {
    let config = Config {
        cores,
        levels: vec![small_l1(), small_l2()],
        ..Config::default()
    };
    hierarchy::build(&config).expect("MSI hierarchy builds")
}

/// `cores` L1s over a shared MESI directory L2 over memory.
pub fn mesi_tree(cores: usize) -> Hierarchy {
    let mut l2 = small_l2();
    l2.policy = PolicyVariant::Mesi;
    let config = Config {
        cores,
        levels: vec![small_l1(), l2],
        ..Config::default()
    };
    hierarchy::build(&config).expect("MESI hierarchy builds")
}

/// Four cores, MSI L1s, directory-exclusive L2, MESI L3.
pub fn exclusive_tree() -> Hierarchy {
    let l2 = CacheParams {
        index_width: 4,
        ways: 4,
        ext_ways: 4,
        policy: PolicyVariant::ExclusiveMesi,
        ..CacheParams::default()
    };
    let mut l3 = small_l2();
    l3.index_width = 5;
    l3.policy = PolicyVariant::Mesi;
    let config = Config {
        cores: 4,
        levels: vec![small_l1(), l2, l3],
        ..Config::default()
    };
    hierarchy::build(&config).expect("exclusive hierarchy builds")
}

/// One core over a four-slice Intel-CAS LLC.
pub fn sliced_tree() -> Hierarchy {
    let config = Config {
        cores: 1,
        levels: vec![small_l1(), small_l2()],
        llc_slices: 4,
        slice_hash: SliceHashKind::IntelCas,
        ..Config::default()
    };
    hierarchy::build(&config).expect("sliced hierarchy builds")
}

/// Installs a compact tracing subscriber so failing scenarios can be rerun
/// with `RUST_LOG=cohsim=trace`; repeated calls are no-ops.
pub fn init_tracing() {
    let _unused = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic 64-bit mixer; the workload stream and address pools derive
/// from it.
pub fn mix(seed: u64, i: u64) -> u64 {
    let mut z = i.wrapping_add(seed).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// 48-bit block-aligned address derived from a seed.
pub fn addr_of(seed: u64, i: u64) -> u64 {
    mix(seed, i) & 0x0000_FFFF_FFFF_FFC0
}

/// A seeded random read/write/flush workload with a reference image.
///
/// Every read is checked against the last value the program order wrote to
/// that address; a mismatch panics with the offending address.
pub struct Workload {
    seed: u64,
    gi: u64,
    pool: Vec<u64>,
    reference: HashMap<u64, DataBlock>,
}

impl Workload {
    /// A workload over `addrs` distinct addresses.
    pub fn new(seed: u64, addrs: usize) -> Self {
        Self {
            seed,
            gi: seed.wrapping_mul(0x0703),
            pool: (0..addrs as u64).map(|i| addr_of(seed, i)).collect(),
            reference: HashMap::new(),
        }
    }

    fn next(&mut self) -> u64 {
        self.gi = self.gi.wrapping_add(1);
        mix(self.seed, self.gi)
    }

    /// Replays `ops` operations round-robin across the cores.
    pub fn run(&mut self, cores: &[cohsim_core::CoreInterface], ops: u64) {
        for op in 0..ops {
            let core = (op % cores.len() as u64) as usize;
            self.step(&cores[core]);
        }
    }

    /// Issues one operation on `core`.
    pub fn step(&mut self, core: &cohsim_core::CoreInterface) {
        let idx = self.next() as usize % self.pool.len();
        let addr = self.pool[idx];
        let roll = self.next() & 0xF;
        if roll < 5 || !self.reference.contains_key(&addr) {
            let block = DataBlock::splat(self.next());
            core.write(addr, &block, None);
            let _prev = self.reference.insert(addr, block);
        } else if roll == 5 {
            core.flush(addr, None);
        } else if roll == 6 {
            core.writeback(addr, None);
        } else {
            let got = core.read(addr, None);
            let want = self.reference[&addr];
            assert_eq!(got, want, "read of {addr:#x} diverged from program order");
        }
    }

    /// Verifies every written address through `core`.
    pub fn verify_all(&self, core: &cohsim_core::CoreInterface) {
        for (addr, want) in &self.reference {
            let got = core.read(*addr, None);
            assert_eq!(&got, want, "final read of {addr:#x} diverged");
        }
    }
}
