//! Least Recently Used replacement policy.
//!
//! Shares the FIFO queue mechanics but additionally moves a way to the back
//! of the queue on access, so the front is the least recently used way. With
//! *demand-update-only* set, coherence-sourced accesses (release, probe) do
//! not refresh recency.

use std::sync::Mutex;

use super::fifo::SetState;
use super::Replacer;
use crate::sync::guard;

/// LRU policy state.
pub struct LruReplacer {
    sets: Vec<Mutex<SetState>>,
    empty_first: bool,
    demand_update_only: bool,
}

impl LruReplacer {
    /// Creates an LRU replacer for `sets`×`ways`.
    pub fn new(sets: u32, ways: u32, empty_first: bool, demand_update_only: bool) -> Self {
        Self {
            sets: (0..sets).map(|_| Mutex::new(SetState::new(ways))).collect(),
            empty_first,
            demand_update_only,
        }
    }
}

impl Replacer for LruReplacer {
    fn replace(&self, set: u32) -> (u32, u32) {
        guard(&self.sets[set as usize]).pick(self.empty_first)
    }

    fn access(&self, set: u32, way: u32, demand: bool, _prefetch: bool) {
        let mut state = guard(&self.sets[set as usize]);
        if state.confirm_if_busy(way) {
            return; // installation already appended it as youngest
        }
        if demand || !self.demand_update_only {
            state.order.retain(|&w| w != way);
            state.order.push(way);
        }
    }

    fn invalidate(&self, set: u32, way: u32) {
        guard(&self.sets[set as usize]).invalidate(way);
    }

    fn rank(&self, set: u32, way: u32) -> i32 {
        guard(&self.sets[set as usize]).rank(way)
    }

    fn free_count(&self, set: u32) -> u32 {
        guard(&self.sets[set as usize]).masks.free_count()
    }
}

impl std::fmt::Debug for LruReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruReplacer")
            .field("sets", &self.sets.len())
            .field("empty_first", &self.empty_first)
            .field("demand_update_only", &self.demand_update_only)
            .finish()
    }
}
