//! Cache arrays, metadata, indexers, and replacement.
//!
//! The central type is [`Cache`], a partitioned (possibly skewed) container
//! of [`array::CacheArray`]s together with an indexer, per-partition
//! replacement policies, staging buffer pools, and the monitor container.
//! Coherence ports drive caches exclusively through the [`CacheAccess`]
//! trait, so specialized containers (MIRAGE, dynamically remapped) can slot
//! in behind the same ports.

/// Set-associative array storage.
pub mod array;

/// Set indexers (normal and skewed).
pub mod index;

/// Per-line coherence metadata.
pub mod meta;

/// MIRAGE-style data-indirected cache.
pub mod mirage;

/// Dynamically re-indexed (remappable) cache.
pub mod remap;

/// Replacement policies.
pub mod replace;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::common::error::BuildError;
use crate::common::{DataBlock, DataSlot};
use crate::config::CacheParams;
use crate::monitor::{AccessEvent, MonitorContainer};
use crate::sync::{BufferPool, PoolGuard, XactPrio};
use array::CacheArray;
use index::{Indexer, NormIndexer, SkewedIndexer};
use meta::{Meta, MetaSlot};
use replace::{build_replacer, Replacer};

/// Location of a line inside a cache: (partition, set, way).
pub type LineLoc = (usize, u32, u32);

/// Victim-selection flavor passed to [`CacheAccess::replace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplaceGenre {
    /// Normal allocation in a data-bearing way.
    Normal,
    /// Allocation in an extended directory way.
    Extend,
    /// Allocation at the next indexer's position during a remap epoch.
    Relocate,
}

/// Eviction kind recorded by manage hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictKind {
    /// The line stays valid (writeback without invalidation).
    Keep,
    /// Invalidated by a coherence probe.
    Probe,
    /// Evicted by replacement or flush.
    Evict,
}

impl EvictKind {
    /// Whether the line is being dropped.
    pub fn is_evict(self) -> bool {
        !matches!(self, Self::Keep)
    }
}

static NEXT_CACHE_ID: AtomicU32 = AtomicU32::new(1);

/// Allocates a process-unique cache id.
pub fn next_cache_id() -> u32 {
    NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Interface between coherence ports and cache storage.
///
/// Lookup and replacement integrate the per-set transaction gates: a hit
/// leaves the hitting set gated at the caller's priority, and a replacement
/// leaves the chosen set gated. The caller owns the matching `gate_reset`.
pub trait CacheAccess: Send + Sync {
    /// Cache name for diagnostics.
    fn name(&self) -> &str;

    /// Unique cache id for monitors.
    fn id(&self) -> u32;

    /// `(partitions, sets, data-bearing ways)`.
    fn geometry(&self) -> (usize, u32, u32);

    /// Whether the cache stores data blocks.
    fn has_data(&self) -> bool;

    /// Looks up `addr`.
    ///
    /// With `prio` set, each partition's set is gated before its scan; on a
    /// hit the gate is kept and the location returned, on a miss it is
    /// released again. Without `prio` this is a pure query.
    fn hit(&self, addr: u64, prio: Option<XactPrio>) -> Option<LineLoc>;

    /// Selects a victim line for `addr`.
    ///
    /// With `prio` set, the chosen set is gated and the miss is re-checked
    /// under the gate: `None` means the address was installed concurrently
    /// and the caller restarts its hit path. Without `prio` the selection is
    /// bare (exclusive single-threaded paths manage gates themselves).
    fn replace(&self, addr: u64, prio: Option<XactPrio>, genre: ReplaceGenre) -> Option<LineLoc>;

    /// Stable reference to a metadata cell.
    fn meta(&self, loc: LineLoc) -> &MetaSlot;

    /// Stable reference to a data cell; `None` for extended ways and
    /// data-less caches.
    fn data(&self, loc: LineLoc) -> Option<&DataSlot>;

    /// Gates `(ai, s)` at `prio`, blocking as needed.
    fn gate_set(&self, ai: usize, s: u32, prio: XactPrio);

    /// Releases the `(ai, s)` gate at `prio`.
    fn gate_reset(&self, ai: usize, s: u32, prio: XactPrio);

    /// Whether no higher-priority transaction holds `(ai, s)`.
    fn gate_check(&self, ai: usize, s: u32, prio: XactPrio) -> bool;

    /// Takes a staging metadata buffer.
    fn meta_buffer(&self) -> PoolGuard<'_, MetaSlot>;

    /// Takes a staging data buffer when the cache carries data.
    fn data_buffer(&self) -> Option<PoolGuard<'_, DataSlot>>;

    /// Replacement-age update for a read-class access.
    fn replace_read(&self, loc: LineLoc, prefetch: bool);

    /// Replacement-age update for a write-class access.
    fn replace_write(&self, loc: LineLoc, demand: bool);

    /// Replacement-age release after an eviction.
    fn replace_manage(&self, loc: LineLoc, hit: bool, evict: EvictKind);

    /// Monitor + delay hook for a read-class access.
    fn hook_read(
        &self,
        addr: u64,
        loc: Option<LineLoc>,
        hit: bool,
        meta: Option<Meta>,
        data: Option<DataBlock>,
        delay: &mut u64,
    );

    /// Monitor + delay hook for a write-class access.
    fn hook_write(
        &self,
        addr: u64,
        loc: Option<LineLoc>,
        hit: bool,
        meta: Option<Meta>,
        data: Option<DataBlock>,
        delay: &mut u64,
    );

    /// Monitor + delay hook for probes, invalidations, and writebacks.
    fn hook_manage(
        &self,
        addr: u64,
        loc: Option<LineLoc>,
        hit: bool,
        evict: EvictKind,
        writeback: bool,
        meta: Option<Meta>,
        data: Option<DataBlock>,
        delay: &mut u64,
    );

    /// The monitor container (for attach/detach and magic messages).
    fn monitors(&self) -> &MonitorContainer;
}

/// Partitioned, possibly skewed cache container.
///
/// One array per partition; a single partition with a [`NormIndexer`] is a
/// plain set-associative cache. Extended ways (directory-exclusive caches)
/// get their own replacement policies.
pub struct Cache {
    name: String,
    id: u32,
    partitions: usize,
    sets: u32,
    ways: u32,
    arrays: Vec<CacheArray>,
    indexer: Box<dyn Indexer + Send + Sync>,
    replacers: Vec<Box<dyn Replacer + Send + Sync>>,
    ext_replacers: Vec<Box<dyn Replacer + Send + Sync>>,
    meta_pool: BufferPool<MetaSlot>,
    data_pool: Option<BufferPool<DataSlot>>,
    monitors: MonitorContainer,
    part_rand: AtomicU64,
}

impl Cache {
    /// Builds a cache from its static parameters.
    pub fn new(name: &str, params: &CacheParams) -> Result<Self, BuildError> {
        if params.ways == 0 || params.index_width == 0 {
            return Err(BuildError::EmptyGeometry {
                name: name.to_string(),
            });
        }
        if params.mshr_depth < 2 {
            return Err(BuildError::MshrTooSmall {
                name: name.to_string(),
                mshr: params.mshr_depth,
            });
        }
        let sets = params.sets();
        let total_ways = params.ways + params.ext_ways;
        let arrays = (0..params.partitions)
            .map(|_| CacheArray::new(sets, total_ways, params.ways, params.data))
            .collect();
        let indexer: Box<dyn Indexer + Send + Sync> = match params.indexer {
            crate::config::IndexerKind::Norm => Box::new(NormIndexer::new(params.index_width)),
            crate::config::IndexerKind::Skewed => Box::new(SkewedIndexer::new(
                params.index_width,
                (0..params.partitions as u64)
                    .map(|i| index::keyed_mix(0x5eed, i))
                    .collect(),
            )),
        };
        let mk_repl = || {
            build_replacer(
                params.replacement,
                sets,
                params.ways,
                params.replace_empty_first,
                params.replace_demand_only,
            )
        };
        let replacers = (0..params.partitions).map(|_| mk_repl()).collect();
        let ext_replacers = if params.ext_ways > 0 {
            (0..params.partitions)
                .map(|_| {
                    build_replacer(
                        params.replacement,
                        sets,
                        params.ext_ways,
                        params.replace_empty_first,
                        params.replace_demand_only,
                    )
                })
                .collect()
        } else {
            Vec::new()
        };
        let id = next_cache_id();
        Ok(Self {
            name: name.to_string(),
            id,
            partitions: params.partitions,
            sets,
            ways: params.ways,
            arrays,
            indexer,
            replacers,
            ext_replacers,
            meta_pool: BufferPool::new(name, params.mshr_depth, params.multithread, MetaSlot::new),
            data_pool: params
                .data
                .then(|| BufferPool::new(name, params.mshr_depth, params.multithread, DataSlot::new)),
            monitors: MonitorContainer::new(id, crate::monitor::delay::from_config(params.delay)),
            part_rand: AtomicU64::new(0x9E37_79B9_7F4A_7C15),
        })
    }

    /// Replaces the indexer; used by specialized containers built on top.
    pub(crate) fn set_indexer(&mut self, indexer: Box<dyn Indexer + Send + Sync>) {
        self.indexer = indexer;
    }

    /// The set index of `addr` in `partition`.
    pub fn index_of(&self, addr: u64, partition: usize) -> u32 {
        self.indexer.index(addr, partition)
    }

    /// Picks a partition for a new allocation (uniform when skewed).
    pub(crate) fn choose_partition(&self) -> usize {
        if self.partitions == 1 {
            0
        } else {
            let mut x = self.part_rand.load(Ordering::Relaxed);
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.part_rand.store(x, Ordering::Relaxed);
            (x % self.partitions as u64) as usize
        }
    }

    /// Per-partition replacer free-count probe; used by candidate-balancing
    /// containers (MIRAGE).
    pub(crate) fn replacer_replace(&self, ai: usize, s: u32) -> (u32, u32) {
        self.replacers[ai].replace(s)
    }

    fn rank(&self, (ai, s, w): LineLoc) -> i32 {
        if w >= self.ways {
            self.ext_replacers[ai].rank(s, w - self.ways)
        } else {
            self.replacers[ai].rank(s, w)
        }
    }

    fn event(
        &self,
        addr: u64,
        loc: Option<LineLoc>,
        hit: bool,
        meta: Option<Meta>,
        data: Option<DataBlock>,
    ) -> AccessEvent {
        AccessEvent {
            cache_id: self.id,
            addr,
            ai: loc.map_or(-1, |l| l.0 as i32),
            s: loc.map_or(-1, |l| l.1 as i32),
            w: loc.map_or(-1, |l| l.2 as i32),
            rank: loc.map_or(-1, |l| self.rank(l)),
            hit,
            meta,
            data,
        }
    }
}

impl CacheAccess for Cache {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn geometry(&self) -> (usize, u32, u32) {
        (self.partitions, self.sets, self.ways)
    }

    fn has_data(&self) -> bool {
        self.data_pool.is_some()
    }

    fn hit(&self, addr: u64, prio: Option<XactPrio>) -> Option<LineLoc> {
        for ai in 0..self.partitions {
            let s = self.indexer.index(addr, ai);
            if let Some(p) = prio {
                self.arrays[ai].gate(s).set(p);
            }
            if let Some(w) = self.arrays[ai].hit(addr, s) {
                return Some((ai, s, w));
            }
            if let Some(p) = prio {
                self.arrays[ai].gate(s).reset(p);
            }
        }
        None
    }

    fn replace(&self, addr: u64, prio: Option<XactPrio>, genre: ReplaceGenre) -> Option<LineLoc> {
        let ai = self.choose_partition();
        let s = self.indexer.index(addr, ai);
        if let Some(p) = prio {
            self.arrays[ai].gate(s).set(p);
            if self.hit(addr, None).is_some() {
                // The block was installed by a concurrent transaction after
                // the miss was observed; the caller restarts its hit path.
                self.arrays[ai].gate(s).reset(p);
                return None;
            }
        }
        let w = match genre {
            ReplaceGenre::Normal => self.replacers[ai].replace(s).0,
            ReplaceGenre::Extend => {
                assert!(
                    !self.ext_replacers.is_empty(),
                    "cache `{}`: extended allocation without extended ways",
                    self.name
                );
                self.ext_replacers[ai].replace(s).0 + self.ways
            }
            ReplaceGenre::Relocate => panic!(
                "cache `{}`: relocation allocation requires a remappable cache",
                self.name
            ),
        };
        Some((ai, s, w))
    }

    fn meta(&self, (ai, s, w): LineLoc) -> &MetaSlot {
        self.arrays[ai].meta(s, w)
    }

    fn data(&self, (ai, s, w): LineLoc) -> Option<&DataSlot> {
        self.arrays[ai].data(s, w)
    }

    fn gate_set(&self, ai: usize, s: u32, prio: XactPrio) {
        self.arrays[ai].gate(s).set(prio);
    }

    fn gate_reset(&self, ai: usize, s: u32, prio: XactPrio) {
        self.arrays[ai].gate(s).reset(prio);
    }

    fn gate_check(&self, ai: usize, s: u32, prio: XactPrio) -> bool {
        self.arrays[ai].gate(s).check(prio)
    }

    fn meta_buffer(&self) -> PoolGuard<'_, MetaSlot> {
        self.meta_pool.acquire()
    }

    fn data_buffer(&self) -> Option<PoolGuard<'_, DataSlot>> {
        self.data_pool.as_ref().map(BufferPool::acquire)
    }

    fn replace_read(&self, (ai, s, w): LineLoc, prefetch: bool) {
        if w >= self.ways {
            self.ext_replacers[ai].access(s, w - self.ways, true, prefetch);
        } else {
            self.replacers[ai].access(s, w, true, prefetch);
        }
    }

    fn replace_write(&self, (ai, s, w): LineLoc, demand: bool) {
        if w >= self.ways {
            self.ext_replacers[ai].access(s, w - self.ways, demand, false);
        } else {
            self.replacers[ai].access(s, w, demand, false);
        }
    }

    fn replace_manage(&self, (ai, s, w): LineLoc, hit: bool, evict: EvictKind) {
        if hit && evict.is_evict() {
            if w >= self.ways {
                self.ext_replacers[ai].invalidate(s, w - self.ways);
            } else {
                self.replacers[ai].invalidate(s, w);
            }
        }
    }

    fn hook_read(
        &self,
        addr: u64,
        loc: Option<LineLoc>,
        hit: bool,
        meta: Option<Meta>,
        data: Option<DataBlock>,
        delay: &mut u64,
    ) {
        let ev = self.event(addr, loc, hit, meta, data);
        self.monitors.hook_read(&ev, delay);
    }

    fn hook_write(
        &self,
        addr: u64,
        loc: Option<LineLoc>,
        hit: bool,
        meta: Option<Meta>,
        data: Option<DataBlock>,
        delay: &mut u64,
    ) {
        let ev = self.event(addr, loc, hit, meta, data);
        self.monitors.hook_write(&ev, delay);
    }

    fn hook_manage(
        &self,
        addr: u64,
        loc: Option<LineLoc>,
        hit: bool,
        evict: EvictKind,
        writeback: bool,
        meta: Option<Meta>,
        data: Option<DataBlock>,
        delay: &mut u64,
    ) {
        let ev = self.event(addr, loc, hit, meta, data);
        self.monitors.hook_manage(&ev, evict.is_evict(), writeback, delay);
    }

    fn monitors(&self) -> &MonitorContainer {
        &self.monitors
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("partitions", &self.partitions)
            .field("sets", &self.sets)
            .field("ways", &self.ways)
            .finish()
    }
}

/// Moves a line's identity from `src` to `dst`: `dst` takes `addr`, the
/// coherence state, and the data; `src` becomes invalid and clean.
pub fn relocate_line(
    addr: u64,
    src: &MetaSlot,
    dst: &MetaSlot,
    src_data: Option<&DataSlot>,
    dst_data: Option<&DataSlot>,
) {
    dst.init(addr);
    let state = src.get();
    dst.update(|d| d.copy_state_from(&state));
    src.to_clean();
    src.to_invalid();
    if let (Some(s), Some(d)) = (src_data, dst_data) {
        d.copy_from(s);
    }
}
