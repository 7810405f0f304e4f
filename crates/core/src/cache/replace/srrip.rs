//! Static RRIP replacement policy.
//!
//! Each way carries a 2-bit re-reference prediction value (RRPV). New lines
//! insert at RRPV 2; a demand hit promotes to 0; victim search picks the
//! maximal-RRPV way (ascending way index breaks ties) and ages the whole set
//! so the maximum reaches 3.

use std::sync::Mutex;

use super::{Replacer, WayMasks};
use crate::sync::guard;

/// RRPV assigned to a freshly inserted line.
const RRPV_INSERT: u8 = 2;
/// Maximal (evict-next) RRPV.
const RRPV_MAX: u8 = 3;

struct SetState {
    rrpv: Vec<u8>,
    masks: WayMasks,
}

/// SRRIP policy state.
pub struct SrripReplacer {
    sets: Vec<Mutex<SetState>>,
    empty_first: bool,
    demand_update_only: bool,
}

impl SrripReplacer {
    /// Creates an SRRIP replacer for `sets`×`ways`.
    pub fn new(sets: u32, ways: u32, empty_first: bool, demand_update_only: bool) -> Self {
        Self {
            sets: (0..sets)
                .map(|_| {
                    Mutex::new(SetState {
                        rrpv: vec![RRPV_MAX; ways as usize],
                        masks: WayMasks::new(ways),
                    })
                })
                .collect(),
            empty_first,
            demand_update_only,
        }
    }
}

impl SetState {
    /// Selects the first maximal-RRPV non-busy way and ages the set so the
    /// maximum hits `RRPV_MAX`.
    fn select(&mut self) -> u32 {
        let candidates: Vec<u32> = (0..self.rrpv.len() as u32)
            .filter(|&w| !self.masks.is_busy(w))
            .collect();
        let Some(&way) = candidates.iter().max_by_key(|&&w| {
            // max_by_key returns the last maximum; invert index for the
            // ascending tie-break.
            (self.rrpv[w as usize], std::cmp::Reverse(w))
        }) else {
            panic!("no selectable way in set: every way is busy (raise associativity or mshr)")
        };
        let gap = RRPV_MAX - self.rrpv[way as usize];
        if gap > 0 {
            for v in &mut self.rrpv {
                *v = v.saturating_add(gap).min(RRPV_MAX);
            }
        }
        way
    }
}

impl Replacer for SrripReplacer {
    fn replace(&self, set: u32) -> (u32, u32) {
        let mut state = guard(&self.sets[set as usize]);
        let way = if self.empty_first && state.masks.free != 0 {
            state.masks.lowest_free()
        } else {
            state.select()
        };
        state.masks.take(way);
        (way, state.masks.free_count())
    }

    fn access(&self, set: u32, way: u32, demand: bool, _prefetch: bool) {
        let mut state = guard(&self.sets[set as usize]);
        if state.masks.is_busy(way) || state.masks.is_free(way) {
            state.masks.confirm(way);
            state.rrpv[way as usize] = RRPV_INSERT;
        } else if demand || !self.demand_update_only {
            state.rrpv[way as usize] = 0;
        }
    }

    fn invalidate(&self, set: u32, way: u32) {
        let mut state = guard(&self.sets[set as usize]);
        if !state.masks.is_busy(way) {
            state.masks.release(way);
            state.rrpv[way as usize] = RRPV_MAX;
        }
    }

    fn rank(&self, set: u32, way: u32) -> i32 {
        i32::from(guard(&self.sets[set as usize]).rrpv[way as usize])
    }

    fn free_count(&self, set: u32) -> u32 {
        guard(&self.sets[set as usize]).masks.free_count()
    }
}

impl std::fmt::Debug for SrripReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrripReplacer")
            .field("sets", &self.sets.len())
            .field("empty_first", &self.empty_first)
            .field("demand_update_only", &self.demand_update_only)
            .finish()
    }
}
