//! Pseudo-random replacement policy.
//!
//! Selects a victim uniformly: over the free ways when empty-first applies,
//! otherwise over all non-busy ways. Uses a xorshift generator so victim
//! streams are deterministic per seed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{Replacer, WayMasks};
use crate::sync::guard;

/// Random policy state.
pub struct RandomReplacer {
    sets: Vec<Mutex<WayMasks>>,
    empty_first: bool,
    state: AtomicU64,
}

impl RandomReplacer {
    /// Creates a random replacer for `sets`×`ways` with a fixed default seed.
    pub fn new(sets: u32, ways: u32, empty_first: bool) -> Self {
        Self::with_seed(sets, ways, empty_first, 0x1234_5678_9abc_def1)
    }

    /// Creates a random replacer with an explicit non-zero seed.
    pub fn with_seed(sets: u32, ways: u32, empty_first: bool, seed: u64) -> Self {
        assert!(seed != 0, "xorshift state must be non-zero");
        Self {
            sets: (0..sets).map(|_| Mutex::new(WayMasks::new(ways))).collect(),
            empty_first,
            state: AtomicU64::new(seed),
        }
    }

    fn next(&self) -> u64 {
        let mut x = self.state.load(Ordering::Relaxed);
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state.store(x, Ordering::Relaxed);
        x
    }

    /// Picks the `n`-th set bit of `mask` (uniform victim among candidates).
    fn pick_bit(mask: u64, mut n: u32) -> u32 {
        debug_assert!(mask != 0);
        let mut m = mask;
        loop {
            let bit = m.trailing_zeros();
            if n == 0 {
                return bit;
            }
            n -= 1;
            m &= m - 1;
        }
    }
}

impl Replacer for RandomReplacer {
    fn replace(&self, set: u32) -> (u32, u32) {
        let mut masks = guard(&self.sets[set as usize]);
        let pool = if self.empty_first && masks.free != 0 {
            masks.free
        } else {
            masks.all & !masks.busy
        };
        assert!(pool != 0, "no selectable way in set: every way is busy");
        let n = (self.next() % u64::from(pool.count_ones())) as u32;
        let way = Self::pick_bit(pool, n);
        masks.take(way);
        (way, masks.free_count())
    }

    fn access(&self, set: u32, way: u32, _demand: bool, _prefetch: bool) {
        guard(&self.sets[set as usize]).confirm(way);
    }

    fn invalidate(&self, set: u32, way: u32) {
        let mut masks = guard(&self.sets[set as usize]);
        if !masks.is_busy(way) {
            masks.release(way);
        }
    }

    fn rank(&self, _set: u32, _way: u32) -> i32 {
        -1
    }

    fn free_count(&self, set: u32) -> u32 {
        guard(&self.sets[set as usize]).free_count()
    }
}

impl std::fmt::Debug for RandomReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomReplacer")
            .field("sets", &self.sets.len())
            .field("empty_first", &self.empty_first)
            .finish()
    }
}
