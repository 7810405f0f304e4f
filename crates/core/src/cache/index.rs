//! Set indexers.
//!
//! An indexer maps an address to a set index per partition. Two shapes exist:
//! 1. **`NormIndexer`:** The plain index bits above the block offset.
//! 2. **`SkewedIndexer`:** A keyed hash per partition, re-seedable; used by
//!    skewed and dynamically remapped caches.
//!
//! Indexers are pure and deterministic given their seeds; reseeding is only
//! permitted while a whole-cache remap epoch holds the cache quiescent.

use crate::common::addr::BLOCK_OFFSET;

/// Maps an address to a set index for a given partition.
pub trait Indexer: Send + Sync {
    /// Returns the set index of `addr` in `partition`.
    fn index(&self, addr: u64, partition: usize) -> u32;
}

/// Plain set-associative indexing: bits `[IW+5:6]` of the address.
#[derive(Clone, Copy, Debug)]
pub struct NormIndexer {
    mask: u32,
}

impl NormIndexer {
    /// Creates an indexer over `index_width` set bits.
    pub fn new(index_width: u32) -> Self {
        Self {
            mask: (1u32 << index_width) - 1,
        }
    }
}

impl Indexer for NormIndexer {
    fn index(&self, addr: u64, _partition: usize) -> u32 {
        ((addr >> BLOCK_OFFSET) as u32) & self.mask
    }
}

/// Mixes a block number under a 64-bit key.
///
/// A strong keyed finalizer in plain code; the indexer contract only needs
/// deterministic seeded mixing with good diffusion.
#[inline]
pub fn keyed_mix(seed: u64, value: u64) -> u64 {
    let mut z = value ^ seed;
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Skewed indexing: one keyed hash per partition.
#[derive(Clone, Debug)]
pub struct SkewedIndexer {
    seeds: Vec<u64>,
    mask: u32,
}

impl SkewedIndexer {
    /// Creates a skewed indexer over `index_width` set bits with one seed per
    /// partition.
    pub fn new(index_width: u32, seeds: Vec<u64>) -> Self {
        Self {
            seeds,
            mask: (1u32 << index_width) - 1,
        }
    }

    /// Replaces all partition seeds. Only legal during a remap epoch.
    pub fn reseed(&mut self, seeds: Vec<u64>) {
        assert_eq!(
            seeds.len(),
            self.seeds.len(),
            "reseed must cover every partition"
        );
        self.seeds = seeds;
    }

    /// Number of partitions covered.
    pub fn partitions(&self) -> usize {
        self.seeds.len()
    }
}

impl Indexer for SkewedIndexer {
    fn index(&self, addr: u64, partition: usize) -> u32 {
        let mixed = keyed_mix(self.seeds[partition], addr >> BLOCK_OFFSET);
        (mixed as u32) & self.mask
    }
}
