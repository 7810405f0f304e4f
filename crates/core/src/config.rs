//! Configuration system for the cache-hierarchy simulator.
//!
//! This module defines all configuration structures and enums used to
//! parameterize a hierarchy. It provides:
//! 1. **Defaults:** Baseline geometry and latency constants.
//! 2. **Structures:** Per-level cache parameters and the root hierarchy
//!    description.
//! 3. **Enums:** Replacement, indexer, coherence-policy, delay-model, and
//!    slice-hash selectors.
//!
//! Configuration is a static description chosen at construction time — the
//! builder validates it once and nothing is mutated afterwards. Supply it as
//! JSON (CLI, tests) or build it programmatically.

use serde::Deserialize;

/// Default configuration constants.
mod defaults {
    /// Default L1 index width (64 sets).
    pub const L1_INDEX_WIDTH: u32 = 6;
    /// Default L1 associativity.
    pub const L1_WAYS: u32 = 4;
    /// Default shared-level index width (256 sets).
    pub const L2_INDEX_WIDTH: u32 = 8;
    /// Default shared-level associativity.
    pub const L2_WAYS: u32 = 8;
    /// Default MSHR depth (staging buffers per cache).
    pub const MSHR_DEPTH: usize = 4;
    /// Default core count.
    pub const CORES: usize = 1;
}

/// Replacement policy selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    /// First-In, First-Out.
    Fifo,
    /// Least Recently Used.
    #[default]
    Lru,
    /// Static RRIP with 2-bit re-reference prediction values.
    Srrip,
    /// Pseudo-random selection.
    Random,
}

/// Indexer selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerKind {
    /// Plain index bits above the block offset.
    #[default]
    Norm,
    /// Keyed hash per partition (skewed / remappable caches).
    Skewed,
}

/// Coherence policy variant for one cache level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyVariant {
    /// Two-state MI (always fetch for write).
    Mi,
    /// MSI, broadcast probing.
    #[default]
    Msi,
    /// MESI over directory metadata; grants Exclusive to a sole sharer.
    Mesi,
    /// Exclusive MSI, broadcast probing, buffer-staged fetches.
    ExclusiveMsi,
    /// Exclusive MESI with extended directory ways.
    ExclusiveMesi,
}

impl PolicyVariant {
    /// Whether this variant runs the exclusive inner-port algorithm.
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::ExclusiveMsi | Self::ExclusiveMesi)
    }

    /// Whether this variant filters probes through a sharer directory.
    pub fn is_directory(self) -> bool {
        matches!(self, Self::Mesi | Self::ExclusiveMesi)
    }
}

/// Delay model selector for one node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DelayConfig {
    /// No latency contribution.
    #[default]
    None,
    /// First-level cache latencies.
    L1 {
        /// Hit latency.
        hit: u64,
        /// Miss replay latency.
        replay: u64,
        /// Transfer latency to the parent.
        tran: u64,
    },
    /// Mid-level coherent cache latencies.
    Coherent {
        /// Hit latency.
        hit: u64,
        /// Transfer latency toward the core.
        up: u64,
        /// Transfer latency toward memory.
        down: u64,
    },
    /// Memory transfer latency.
    Memory {
        /// Transfer latency per block.
        tran: u64,
    },
}

/// LLC slice-hash selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceHashKind {
    /// Block number modulo slice count.
    #[default]
    Norm,
    /// Intel complex-addressing XOR fold (1, 2, 4, or 8 slices).
    IntelCas,
}

/// Static parameters of one cache level.
///
/// This is the construction tuple of the specification:
/// `(IW, NW, partitions, data?, replacement, indexer, multithread?,
/// mshr_depth, policy_variant, delay_model)` plus the replacement knobs and
/// the extended-way count used by directory-exclusive caches.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    /// Index width: the level has `2^index_width` sets per partition.
    pub index_width: u32,
    /// Number of ways per set.
    pub ways: u32,
    /// Extended (directory-only) ways per set; 0 unless directory-exclusive.
    pub ext_ways: u32,
    /// Number of skewed partitions (1 = plain set-associative).
    pub partitions: usize,
    /// Whether the level stores data blocks (false = coherence-only).
    pub data: bool,
    /// Replacement policy.
    pub replacement: ReplacePolicy,
    /// Prefer free ways before consulting replacement age.
    pub replace_empty_first: bool,
    /// Only demand accesses refresh replacement age.
    pub replace_demand_only: bool,
    /// Indexer shape.
    pub indexer: IndexerKind,
    /// Whether the level is driven by parallel OS threads.
    pub multithread: bool,
    /// Staging-buffer depth (≥ 2).
    pub mshr_depth: usize,
    /// Coherence policy variant.
    pub policy: PolicyVariant,
    /// Delay model.
    pub delay: DelayConfig,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            index_width: defaults::L1_INDEX_WIDTH,
            ways: defaults::L1_WAYS,
            ext_ways: 0,
            partitions: 1,
            data: true,
            replacement: ReplacePolicy::default(),
            replace_empty_first: true,
            replace_demand_only: true,
            indexer: IndexerKind::default(),
            multithread: false,
            mshr_depth: defaults::MSHR_DEPTH,
            policy: PolicyVariant::default(),
            delay: DelayConfig::default(),
        }
    }
}

impl CacheParams {
    /// Number of sets per partition.
    pub fn sets(&self) -> u32 {
        1 << self.index_width
    }
}

/// Root hierarchy description.
///
/// `levels[0]` describes the per-core L1 caches; the remaining levels are
/// shared by all cores, and the last level may be sliced.
///
/// # Examples
///
/// ```
/// use cohsim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.cores, 1);
/// assert_eq!(config.levels.len(), 2);
/// ```
///
/// ```
/// use cohsim_core::config::Config;
///
/// let json = r#"{
///     "cores": 2,
///     "levels": [
///         { "index_width": 3, "ways": 4 },
///         { "index_width": 4, "ways": 8, "policy": "mesi" }
///     ]
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.cores, 2);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of driver cores (one L1 each).
    pub cores: usize,
    /// Cache levels from L1 outward.
    pub levels: Vec<CacheParams>,
    /// Number of last-level slices (1 = unsliced).
    pub llc_slices: usize,
    /// Slice-hash function for a sliced last level.
    pub slice_hash: SliceHashKind,
    /// Delay model of the memory leaf.
    pub memory_delay: DelayConfig,
}

impl Default for Config {
    /// A single-core two-level MSI hierarchy with default geometry.
    fn default() -> Self {
        Self {
            cores: defaults::CORES,
            levels: vec![
                CacheParams::default(),
                CacheParams {
                    index_width: defaults::L2_INDEX_WIDTH,
                    ways: defaults::L2_WAYS,
                    ..CacheParams::default()
                },
            ],
            llc_slices: 1,
            slice_hash: SliceHashKind::default(),
            memory_delay: DelayConfig::default(),
        }
    }
}
