//! Set-associative cache arrays.
//!
//! An array owns the metadata (and optionally data) cells of one partition,
//! laid out contiguously per set (`set * ways + way`), plus the per-set
//! transaction gates. Ways beyond the data-bearing count exist only in
//! directory-extended caches and carry no data.

use crate::cache::meta::MetaSlot;
use crate::common::DataSlot;
use crate::sync::SetGate;

/// One partition's worth of metadata, data, and gates.
#[derive(Debug)]
pub struct CacheArray {
    sets: u32,
    ways: u32,
    data_ways: u32,
    meta: Vec<MetaSlot>,
    data: Vec<DataSlot>,
    gates: Vec<SetGate>,
}

impl CacheArray {
    /// Creates an array of `sets`×`ways`.
    ///
    /// The first `data_ways` ways carry data when `with_data` is set; ways at
    /// or above `data_ways` are flagged as extended-directory slots.
    pub fn new(sets: u32, ways: u32, data_ways: u32, with_data: bool) -> Self {
        let meta = (0..sets * ways)
            .map(|i| {
                if i % ways >= data_ways {
                    MetaSlot::new_extend()
                } else {
                    MetaSlot::new()
                }
            })
            .collect();
        let data = if with_data {
            (0..sets * data_ways).map(|_| DataSlot::new()).collect()
        } else {
            Vec::new()
        };
        Self {
            sets,
            ways,
            data_ways,
            meta,
            data,
            gates: (0..sets).map(|_| SetGate::new()).collect(),
        }
    }

    /// Number of sets.
    pub fn sets(&self) -> u32 {
        self.sets
    }

    /// Total ways per set (including extended ways).
    pub fn ways(&self) -> u32 {
        self.ways
    }

    /// Scans set `s` for `addr`; returns the matching way.
    pub fn hit(&self, addr: u64, s: u32) -> Option<u32> {
        (0..self.ways).find(|&w| self.meta(s, w).match_addr(addr))
    }

    /// Stable reference to the metadata cell at `(s, w)`.
    #[inline]
    pub fn meta(&self, s: u32, w: u32) -> &MetaSlot {
        &self.meta[(s * self.ways + w) as usize]
    }

    /// Stable reference to the data cell at `(s, w)`; `None` for extended
    /// ways and data-less arrays.
    #[inline]
    pub fn data(&self, s: u32, w: u32) -> Option<&DataSlot> {
        if self.data.is_empty() || w >= self.data_ways {
            None
        } else {
            Some(&self.data[(s * self.data_ways + w) as usize])
        }
    }

    /// The transaction gate of set `s`.
    #[inline]
    pub fn gate(&self, s: u32) -> &SetGate {
        &self.gates[s as usize]
    }
}
