//! Coherent cache-hierarchy simulator library.
//!
//! This crate implements a cycle-accurate, multi-level, multi-core coherent
//! cache-hierarchy simulator with the following:
//! 1. **Data model:** Per-line coherence metadata (MI/MSI/MESI state, sharer
//!    bitmaps, parent-visible shadow records) and 64-byte data blocks.
//! 2. **Cache arrays:** Set-associative and skewed arrays with per-set
//!    transaction gates, extended directory ways, and staging buffer pools.
//! 3. **Coherence engine:** Inner/outer port state machines (acquire, release,
//!    probe, flush, finish) over pluggable policy objects, including exclusive
//!    and directory-extended variants, MIRAGE data indirection, and dynamic
//!    re-indexing.
//! 4. **Substrate:** Replacement policies (FIFO/LRU/SRRIP/Random), normal and
//!    skewed indexers, LLC slice hashing (Intel CAS), and the fine-grained
//!    concurrency primitives for multithreaded drivers.
//! 5. **Observation:** Monitor hooks, access tracers, and delay models feeding
//!    the driver-visible latency counter.

/// Cache arrays, metadata cells, indexers, and replacement policies.
pub mod cache;
/// Coherence commands, policies, ports, core interface, and slice dispatch.
pub mod coherence;
/// Common types and constants (addresses, data blocks, build errors).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Hierarchy builder: wire cores, cache levels, slices, and memory.
pub mod hierarchy;
/// Terminal memory node backing the hierarchy.
pub mod memory;
/// Monitor hooks, statistics, tracers, and delay models.
pub mod monitor;
/// LLC slice-address hashing.
pub mod slicehash;
/// Concurrency substrate: set gates, line locks, pending tables, pools.
pub mod sync;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Per-core driver interface (`read`/`write`/`flush`/`writeback`).
pub use crate::coherence::core::CoreInterface;
/// Pre-wired hierarchy; construct with `hierarchy::build`.
pub use crate::hierarchy::Hierarchy;
