//! Dynamically re-indexed (remappable) skewed cache.
//!
//! A monitor may request a remap epoch through the magic side-channel (for
//! example every N evictions). While the epoch runs, the cache answers
//! lookups through both the current and the next indexer — a per-partition
//! remap pointer separates sets that still use the old position from sets
//! already relocated — and every line is moved to its next-indexer position.
//! On completion the indexers rotate and a fresh seed is drawn for the next
//! epoch. Remap under a multithreaded driver is not supported and aborts.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::cache::index::{keyed_mix, Indexer, SkewedIndexer};
use crate::cache::meta::{Meta, MetaSlot};
use crate::cache::{
    relocate_line, Cache, CacheAccess, EvictKind, LineLoc, ReplaceGenre,
};
use crate::coherence::cmd::CohCmd;
use crate::coherence::inner::{InclusiveFlavor, InnerPort};
use crate::coherence::node::CacheNode;
use crate::coherence::outer::OuterPort;
use crate::coherence::policy::CohPolicy;
use crate::coherence::{CohClient, CohMaster, InnerProbe};
use crate::common::error::BuildError;
use crate::common::{DataBlock, DataSlot};
use crate::config::{CacheParams, IndexerKind};
use crate::monitor::{AccessEvent, Monitor, MonitorContainer};
use crate::sync::{guard, PoolGuard, XactPrio};

/// Magic id of the remap trigger exchanged between the port and remap
/// monitors.
pub const MAGIC_ID_REMAP: u64 = 2024091300;

/// A skewed indexer shared between the cache container and its base arrays.
#[derive(Debug)]
struct SharedIndexer(Arc<RwLock<SkewedIndexer>>);

impl Indexer for SharedIndexer {
    fn index(&self, addr: u64, partition: usize) -> u32 {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index(addr, partition)
    }
}

/// The remappable cache container.
pub struct RemapCache {
    base: Cache,
    partitions: usize,
    sets: u32,
    ways: u32,
    cur: Arc<RwLock<SkewedIndexer>>,
    next: Arc<RwLock<SkewedIndexer>>,
    remap: AtomicBool,
    remap_pointer: Mutex<Vec<u32>>,
    seed_stream: AtomicU64,
}

impl RemapCache {
    /// Builds a remappable cache; the indexer is forced to the skewed shape.
    pub fn new(name: &str, params: &CacheParams, seed: u64) -> Result<Self, BuildError> {
        let mut params = *params;
        params.indexer = IndexerKind::Skewed;
        let seed_stream = AtomicU64::new(seed);
        let draw = |stream: &AtomicU64, n: usize| -> Vec<u64> {
            (0..n as u64)
                .map(|i| keyed_mix(stream.fetch_add(1, Ordering::Relaxed), i))
                .collect()
        };
        let cur = Arc::new(RwLock::new(SkewedIndexer::new(
            params.index_width,
            draw(&seed_stream, params.partitions),
        )));
        let next = Arc::new(RwLock::new(SkewedIndexer::new(
            params.index_width,
            draw(&seed_stream, params.partitions),
        )));
        let mut base = Cache::new(name, &params)?;
        base.set_indexer(Box::new(SharedIndexer(Arc::clone(&cur))));
        Ok(Self {
            base,
            partitions: params.partitions,
            sets: params.sets(),
            ways: params.ways,
            cur,
            next,
            remap: AtomicBool::new(false),
            remap_pointer: Mutex::new(vec![0; params.partitions]),
            seed_stream,
        })
    }

    /// Whether a remap epoch is running.
    pub fn remapping(&self) -> bool {
        self.remap.load(Ordering::Acquire)
    }

    /// Opens a remap epoch: lookups go through both indexers from here on.
    pub fn remap_start(&self) {
        self.remap.store(true, Ordering::Release);
    }

    /// Advances the relocation frontier of `partition` by one set.
    pub fn move_remap_pointer(&self, partition: usize) {
        guard(&self.remap_pointer)[partition] += 1;
    }

    /// Closes the epoch: rotates the indexers, draws the next seed, clears
    /// the per-line relocation marks.
    pub fn remap_end(&self) {
        self.remap.store(false, Ordering::Release);
        guard(&self.remap_pointer).fill(0);
        let next_seeds: Vec<u64> = (0..self.partitions as u64)
            .map(|i| keyed_mix(self.seed_stream.fetch_add(1, Ordering::Relaxed), i))
            .collect();
        {
            let next = self
                .next
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            *self.cur.write().unwrap_or_else(PoisonError::into_inner) = next;
        }
        self.next
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .reseed(next_seeds);
        for ai in 0..self.partitions {
            for s in 0..self.sets {
                for w in 0..self.ways {
                    self.meta((ai, s, w)).update(Meta::to_unrelocated);
                }
            }
        }
    }
}

impl CacheAccess for RemapCache {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn id(&self) -> u32 {
        self.base.id()
    }

    fn geometry(&self) -> (usize, u32, u32) {
        self.base.geometry()
    }

    fn has_data(&self) -> bool {
        self.base.has_data()
    }

    fn hit(&self, addr: u64, prio: Option<XactPrio>) -> Option<LineLoc> {
        if !self.remapping() {
            return self.base.hit(addr, prio);
        }
        // Mid-epoch: a line lives at its old position only if its set has
        // not been relocated yet; always check the new position.
        let pointers = guard(&self.remap_pointer).clone();
        for ai in 0..self.partitions {
            let s_cur = self
                .cur
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .index(addr, ai);
            if s_cur >= pointers[ai] {
                if let Some(loc) = self.scan_set(addr, ai, s_cur, prio) {
                    return Some(loc);
                }
            }
            let s_next = self
                .next
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .index(addr, ai);
            if let Some(loc) = self.scan_set(addr, ai, s_next, prio) {
                return Some(loc);
            }
        }
        None
    }

    fn replace(&self, addr: u64, prio: Option<XactPrio>, genre: ReplaceGenre) -> Option<LineLoc> {
        match genre {
            ReplaceGenre::Relocate => {
                let ai = if self.partitions == 1 {
                    0
                } else {
                    (keyed_mix(self.seed_stream.load(Ordering::Relaxed), addr)
                        % self.partitions as u64) as usize
                };
                let s = self
                    .next
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .index(addr, ai);
                let (w, _free) = self.base.replacer_replace(ai, s);
                Some((ai, s, w))
            }
            _ => {
                assert!(
                    !self.remapping(),
                    "cache `{}`: allocation during a remap epoch",
                    self.base.name()
                );
                self.base.replace(addr, prio, genre)
            }
        }
    }

    fn meta(&self, loc: LineLoc) -> &MetaSlot {
        self.base.meta(loc)
    }

    fn data(&self, loc: LineLoc) -> Option<&DataSlot> {
        self.base.data(loc)
    }

    fn gate_set(&self, ai: usize, s: u32, prio: XactPrio) {
        self.base.gate_set(ai, s, prio);
    }

    fn gate_reset(&self, ai: usize, s: u32, prio: XactPrio) {
        self.base.gate_reset(ai, s, prio);
    }

    fn gate_check(&self, ai: usize, s: u32, prio: XactPrio) -> bool {
        self.base.gate_check(ai, s, prio)
    }

    fn meta_buffer(&self) -> PoolGuard<'_, MetaSlot> {
        self.base.meta_buffer()
    }

    fn data_buffer(&self) -> Option<PoolGuard<'_, DataSlot>> {
        self.base.data_buffer()
    }

    fn replace_read(&self, loc: LineLoc, prefetch: bool) {
        self.base.replace_read(loc, prefetch);
    }

    fn replace_write(&self, loc: LineLoc, demand: bool) {
        self.base.replace_write(loc, demand);
    }

    fn replace_manage(&self, loc: LineLoc, hit: bool, evict: EvictKind) {
        self.base.replace_manage(loc, hit, evict);
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
        self.base.hook_read(addr, loc, hit, meta, data, delay);
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
        self.base.hook_write(addr, loc, hit, meta, data, delay);
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
        self.base
            .hook_manage(addr, loc, hit, evict, writeback, meta, data, delay);
    }

    fn monitors(&self) -> &MonitorContainer {
        self.base.monitors()
    }
}

impl RemapCache {
    fn scan_set(
        &self,
        addr: u64,
        ai: usize,
        s: u32,
        prio: Option<XactPrio>,
    ) -> Option<LineLoc> {
        if let Some(p) = prio {
            self.base.gate_set(ai, s, p);
        }
        for w in 0..self.ways {
            if self.base.meta((ai, s, w)).match_addr(addr) {
                return Some((ai, s, w));
            }
        }
        if let Some(p) = prio {
            self.base.gate_reset(ai, s, p);
        }
        None
    }
}

impl std::fmt::Debug for RemapCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemapCache")
            .field("name", &self.base.name())
            .field("remapping", &self.remapping())
            .finish()
    }
}

/// Inner port of a remappable cache: checks the remap trigger whenever an
/// acquire transaction closes and runs the relocation epoch inline.
pub struct RemapInnerPort {
    inner: Arc<InnerPort>,
    cache: Arc<RemapCache>,
    multithread: bool,
}

impl RemapInnerPort {
    /// Wraps the port pair of a remappable cache.
    pub fn new(inner: Arc<InnerPort>, cache: Arc<RemapCache>, multithread: bool) -> Self {
        Self {
            inner,
            cache,
            multithread,
        }
    }

    fn check_remap(&self, addr: u64) {
        let mut flag = false;
        self.cache.monitors().magic(addr, MAGIC_ID_REMAP, &mut flag);
        if flag {
            self.remap();
        }
    }

    /// Runs one full remap epoch.
    pub fn remap(&self) {
        assert!(
            !self.multithread,
            "cache `{}`: remap under a multithreaded driver is not supported",
            self.cache.name()
        );
        self.cache.monitors().pause();
        self.cache.remap_start();
        let (partitions, sets, ways) = self.cache.geometry();
        for ai in 0..partitions {
            for s in 0..sets {
                for w in 0..ways {
                    self.relocation_chain((ai, s, w));
                }
                self.cache.move_remap_pointer(ai);
            }
        }
        self.cache.remap_end();
        self.cache.monitors().resume();
    }

    /// Relocates one line and every line its new position displaces, until
    /// the chain ends in a free slot or an eviction.
    fn relocation_chain(&self, loc: LineLoc) {
        let meta = self.cache.meta(loc);
        if !meta.is_valid() || meta.get().is_relocated() {
            return;
        }
        let mut delay = 0u64;
        let carry_meta = self.cache.meta_buffer();
        let carry_data = self.cache.data_buffer();
        let mut carry_addr = meta.addr();
        relocate_line(
            carry_addr,
            meta,
            &carry_meta,
            self.cache.data(loc),
            carry_data.as_deref(),
        );
        meta.update(Meta::to_relocated);
        self.cache.replace_manage(loc, true, EvictKind::Evict);
        self.cache.hook_manage(
            carry_addr,
            Some(loc),
            true,
            EvictKind::Evict,
            false,
            Some(carry_meta.get()),
            carry_data.as_deref().map(DataSlot::get),
            &mut delay,
        );

        while carry_meta.is_valid() {
            let Some(new_loc) = self
                .cache
                .replace(carry_addr, None, ReplaceGenre::Relocate)
            else {
                panic!("cache `{}`: relocation selection failed", self.cache.name())
            };
            let m_meta = self.cache.meta(new_loc);
            let m_data = self.cache.data(new_loc);
            let m_addr = m_meta.addr();
            let m_valid = m_meta.is_valid();
            if m_valid {
                if m_meta.get().is_relocated() {
                    // second displacement this epoch: give the line up
                    self.inner
                        .ctx()
                        .evict(m_meta, m_data, new_loc, &mut delay);
                } else {
                    self.cache.replace_manage(new_loc, true, EvictKind::Evict);
                    self.cache.hook_manage(
                        m_addr,
                        Some(new_loc),
                        true,
                        EvictKind::Evict,
                        false,
                        Some(m_meta.get()),
                        None,
                        &mut delay,
                    );
                }
            }
            // swap the carried line into place
            let displaced_meta = self.cache.meta_buffer();
            let displaced_data = self.cache.data_buffer();
            let displaced_valid = m_meta.is_valid();
            if displaced_valid {
                relocate_line(
                    m_addr,
                    m_meta,
                    &displaced_meta,
                    m_data,
                    displaced_data.as_deref(),
                );
            }
            relocate_line(
                carry_addr,
                &carry_meta,
                m_meta,
                carry_data.as_deref(),
                m_data,
            );
            m_meta.update(Meta::to_relocated);
            self.cache.replace_read(new_loc, false);
            self.cache.hook_read(
                carry_addr,
                Some(new_loc),
                false,
                Some(m_meta.get()),
                None,
                &mut delay,
            );
            if displaced_valid {
                relocate_line(
                    m_addr,
                    &displaced_meta,
                    &carry_meta,
                    displaced_data.as_deref(),
                    carry_data.as_deref(),
                );
                carry_addr = m_addr;
            } else {
                carry_meta.to_invalid();
            }
        }
    }
}

impl CohMaster for RemapInnerPort {
    fn connect(
        &self,
        client: Arc<dyn CohClient>,
        uncached: bool,
    ) -> Result<(i16, Arc<dyn CohPolicy>), BuildError> {
        self.inner.connect(client, uncached)
    }

    fn acquire_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        cmd: CohCmd,
        delay: &mut u64,
    ) {
        self.inner
            .acquire_resp(addr, data_inner, meta_inner, cmd, delay);
        if cmd.id == -1 {
            // uncached requesters never send a finish; check the trigger now
            self.check_remap(addr);
        }
    }

    fn writeback_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        cmd: CohCmd,
        delay: &mut u64,
    ) {
        self.inner
            .writeback_resp(addr, data_inner, meta_inner, cmd, delay);
    }

    fn finish_resp(&self, addr: u64, cmd: CohCmd) {
        self.check_remap(addr);
        self.inner.finish_resp(addr, cmd);
    }
}

impl InnerProbe for RemapInnerPort {
    fn probe_req(
        &self,
        addr: u64,
        meta: Option<&MetaSlot>,
        data: Option<&DataSlot>,
        cmd: CohCmd,
        delay: &mut u64,
    ) -> (bool, bool) {
        self.inner.probe_req(addr, meta, data, cmd, delay)
    }
}

impl std::fmt::Debug for RemapInnerPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemapInnerPort")
            .field("cache", &self.cache.name())
            .finish()
    }
}

/// A remappable cache node: storage, ports, and the remap-aware master.
#[derive(Debug)]
pub struct RemapNode {
    /// The underlying node (storage plus port pair).
    node: CacheNode,
    cache: Arc<RemapCache>,
    master: Arc<RemapInnerPort>,
}

impl RemapNode {
    /// Builds a remappable node; see [`CacheNode::build`] for the position
    /// flags.
    pub fn build(
        name: &str,
        params: &CacheParams,
        is_l1: bool,
        uncached_outer: bool,
        seed: u64,
    ) -> Result<Self, BuildError> {
        let cache = Arc::new(RemapCache::new(name, params, seed)?);
        let storage: Arc<dyn CacheAccess> = Arc::clone(&cache) as Arc<dyn CacheAccess>;
        let node = CacheNode::assemble(
            name,
            storage,
            params,
            is_l1,
            uncached_outer,
            Box::new(InclusiveFlavor),
        )?;
        let master = Arc::new(RemapInnerPort::new(
            Arc::clone(node.inner()),
            Arc::clone(&cache),
            params.multithread,
        ));
        Ok(Self {
            node,
            cache,
            master,
        })
    }

    /// The remap-aware connect target for children.
    pub fn master(&self) -> Arc<dyn CohMaster> {
        Arc::clone(&self.master) as Arc<dyn CohMaster>
    }

    /// The remappable storage.
    pub fn cache(&self) -> &Arc<RemapCache> {
        &self.cache
    }

    /// The remap-aware inner port.
    pub fn port(&self) -> &Arc<RemapInnerPort> {
        &self.master
    }

    /// The outer port (for connecting to memory).
    pub fn outer(&self) -> &Arc<OuterPort> {
        self.node.outer()
    }

    /// Connects the node's outer port to a parent.
    pub fn connect_to(
        &self,
        parent: &Arc<dyn CohMaster>,
        uncached: bool,
    ) -> Result<(), BuildError> {
        self.node.connect_to(parent, uncached)
    }

    /// Attaches a monitor.
    pub fn attach_monitor(&self, monitor: &Arc<dyn Monitor>) {
        self.node.attach_monitor(monitor);
    }
}

/// Base remap-trigger monitor: counts invalidations and raises the remap
/// flag through the magic side-channel.
#[derive(Debug)]
pub struct SimpleEvRemapper {
    period: u64,
    invalids: AtomicU64,
    pending: AtomicBool,
    active: AtomicBool,
}

impl SimpleEvRemapper {
    /// Requests a remap epoch every `period` evictions.
    pub fn new(period: u64) -> Self {
        assert!(period > 0, "remap period must be non-zero");
        Self {
            period,
            invalids: AtomicU64::new(0),
            pending: AtomicBool::new(false),
            active: AtomicBool::new(true),
        }
    }
}

impl Monitor for SimpleEvRemapper {
    fn on_read(&self, _ev: &AccessEvent) {}

    fn on_write(&self, _ev: &AccessEvent) {}

    fn on_invalid(&self, _ev: &AccessEvent) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }
        let n = self.invalids.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.period == 0 {
            self.pending.store(true, Ordering::Relaxed);
        }
    }

    fn magic(&self, _cache_id: u32, _addr: u64, magic_id: u64, payload: &mut dyn std::any::Any) -> bool {
        if magic_id != MAGIC_ID_REMAP {
            return false;
        }
        if let Some(flag) = payload.downcast_mut::<bool>() {
            *flag |= self.pending.swap(false, Ordering::Relaxed);
        }
        true
    }

    fn start(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    fn pause(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.invalids.store(0, Ordering::Relaxed);
        self.pending.store(false, Ordering::Relaxed);
        self.active.store(false, Ordering::Relaxed);
    }
}
