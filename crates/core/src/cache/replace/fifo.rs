//! First-In, First-Out replacement policy.
//!
//! Evicts the way that was installed earliest, regardless of later accesses.
//! Each set keeps an installation-order queue; the front of the queue is the
//! next victim. A way selected by `replace` stays busy (and out of the queue)
//! until the confirming access pushes it to the back.

use std::sync::Mutex;

use super::{Replacer, WayMasks};
use crate::sync::guard;

pub(crate) struct SetState {
    pub order: Vec<u32>,
    pub masks: WayMasks,
}

impl SetState {
    pub fn new(ways: u32) -> Self {
        Self {
            order: (0..ways).collect(),
            masks: WayMasks::new(ways),
        }
    }

    /// Picks a victim: a free way when `empty_first` allows, otherwise the
    /// oldest non-busy way in queue order. The pick is marked busy and leaves
    /// the queue until its confirming access.
    pub fn pick(&mut self, empty_first: bool) -> (u32, u32) {
        let way = if empty_first && self.masks.free != 0 {
            self.masks.lowest_free()
        } else {
            let Some(pos) = self.order.iter().position(|&w| !self.masks.is_busy(w)) else {
                panic!("no selectable way in set: every way is busy (raise associativity or mshr)")
            };
            self.order[pos]
        };
        self.order.retain(|&w| w != way);
        self.masks.take(way);
        (way, self.masks.free_count())
    }

    /// Confirms a pending installation, appending the way as youngest.
    /// Returns whether the access was the confirming one.
    pub fn confirm_if_busy(&mut self, way: u32) -> bool {
        if self.masks.is_busy(way) {
            self.masks.confirm(way);
            self.order.push(way);
            true
        } else {
            false
        }
    }

    pub fn invalidate(&mut self, way: u32) {
        if !self.masks.is_busy(way) {
            self.order.retain(|&w| w != way);
            self.masks.release(way);
        }
    }

    pub fn rank(&self, way: u32) -> i32 {
        self.order
            .iter()
            .position(|&w| w == way)
            .map_or(-1, |p| p as i32)
    }
}

/// FIFO policy state.
pub struct FifoReplacer {
    sets: Vec<Mutex<SetState>>,
    empty_first: bool,
}

impl FifoReplacer {
    /// Creates a FIFO replacer for `sets`×`ways`.
    pub fn new(sets: u32, ways: u32, empty_first: bool) -> Self {
        Self {
            sets: (0..sets).map(|_| Mutex::new(SetState::new(ways))).collect(),
            empty_first,
        }
    }
}

impl Replacer for FifoReplacer {
    fn replace(&self, set: u32) -> (u32, u32) {
        guard(&self.sets[set as usize]).pick(self.empty_first)
    }

    fn access(&self, set: u32, way: u32, _demand: bool, _prefetch: bool) {
        // FIFO only orders by installation; non-confirming accesses are
        // irrelevant to the queue.
        let _confirmed = guard(&self.sets[set as usize]).confirm_if_busy(way);
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

impl std::fmt::Debug for FifoReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoReplacer")
            .field("sets", &self.sets.len())
            .field("empty_first", &self.empty_first)
            .finish()
    }
}
