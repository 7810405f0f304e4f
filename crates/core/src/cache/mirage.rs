//! MIRAGE-style data-indirected cache.
//!
//! Metadata and data live in separate arrays: metadata is partitioned and
//! skewed with extra tag ways, data is a single pool indexed by a keyed
//! random hash. Each metadata entry points at its data slot and each data
//! slot back-points at its owning metadata, so either side can evict the
//! other. Allocation relocates tags cuckoo-style across partitions (bounded
//! by `max_reloc`) before giving up and evicting.
//!
//! See: <https://www.usenix.org/system/files/sec21fall-saileshwar.pdf>

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::cache::array::CacheArray;
use crate::cache::index::{keyed_mix, Indexer, SkewedIndexer};
use crate::cache::meta::{Meta, MetaSlot};
use crate::cache::replace::{build_replacer, Replacer};
use crate::cache::{next_cache_id, CacheAccess, EvictKind, LineLoc, ReplaceGenre};
use crate::coherence::cmd::{self, CohCmd};
use crate::coherence::inner::{DataRef, InclusiveFlavor, InnerCtx, InnerFlavor, LineOutcome, MetaRef};
use crate::coherence::node::CacheNode;
use crate::coherence::policy::Promote;
use crate::coherence::CohMaster;
use crate::common::error::BuildError;
use crate::common::{DataBlock, DataSlot};
use crate::config::{CacheParams, PolicyVariant};
use crate::monitor::{AccessEvent, MonitorContainer};
use crate::sync::{guard, BufferPool, PoolGuard, XactPrio};

/// Back-pointer from a data slot to its owning metadata.
#[derive(Debug, Default)]
pub struct MirageDataMeta {
    owner: Mutex<Option<LineLoc>>,
}

impl MirageDataMeta {
    /// Binds this data slot to the metadata at `loc`.
    pub fn bind(&self, loc: LineLoc) {
        *guard(&self.owner) = Some(loc);
    }

    /// The owning metadata, if any.
    pub fn owner(&self) -> Option<LineLoc> {
        *guard(&self.owner)
    }

    /// Severs the binding.
    pub fn to_invalid(&self) {
        *guard(&self.owner) = None;
    }
}

/// Data-slot coordinate inside the pool.
pub type DataLoc = (u32, u32);

/// The MIRAGE cache container.
pub struct MirageCache {
    name: String,
    id: u32,
    partitions: usize,
    sets: u32,
    tag_ways: u32,
    data_ways: u32,
    max_reloc: u32,
    arrays: Vec<CacheArray>,
    indexer: SkewedIndexer,
    data_indexer: SkewedIndexer,
    replacers: Vec<Box<dyn Replacer + Send + Sync>>,
    data_replacer: Box<dyn Replacer + Send + Sync>,
    data: Vec<DataSlot>,
    data_meta: Vec<MirageDataMeta>,
    ptrs: Vec<Vec<Mutex<DataLoc>>>,
    meta_pool: BufferPool<MetaSlot>,
    data_pool: BufferPool<DataSlot>,
    monitors: MonitorContainer,
    rand: std::sync::atomic::AtomicU64,
}

impl MirageCache {
    /// Builds a MIRAGE cache.
    ///
    /// `params.ways` are the data-capable ways per partition; `params.ext_ways`
    /// are the extra tag ways that give the skewed tag store its headroom.
    /// The data pool holds `partitions × ways` slots per set.
    pub fn new(name: &str, params: &CacheParams, max_reloc: u32) -> Result<Self, BuildError> {
        if params.ways == 0 || params.index_width == 0 || params.partitions == 0 {
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
        let tag_ways = params.ways + params.ext_ways;
        let data_ways = params.partitions as u32 * params.ways;
        let arrays = (0..params.partitions)
            .map(|_| CacheArray::new(sets, tag_ways, tag_ways, false))
            .collect();
        let mk_repl = |ways: u32| {
            build_replacer(
                params.replacement,
                sets,
                ways,
                params.replace_empty_first,
                params.replace_demand_only,
            )
        };
        let id = next_cache_id();
        Ok(Self {
            name: name.to_string(),
            id,
            partitions: params.partitions,
            sets,
            tag_ways,
            data_ways,
            max_reloc,
            arrays,
            indexer: SkewedIndexer::new(
                params.index_width,
                (0..params.partitions as u64)
                    .map(|i| keyed_mix(0x717a_9e5d, i))
                    .collect(),
            ),
            data_indexer: SkewedIndexer::new(params.index_width, vec![keyed_mix(0x2b4d, 1)]),
            replacers: (0..params.partitions).map(|_| mk_repl(params.ways + params.ext_ways)).collect(),
            data_replacer: mk_repl(data_ways),
            data: (0..sets * data_ways).map(|_| DataSlot::new()).collect(),
            data_meta: (0..sets * data_ways).map(|_| MirageDataMeta::default()).collect(),
            ptrs: (0..params.partitions)
                .map(|_| {
                    (0..sets * tag_ways)
                        .map(|_| Mutex::new((0, 0)))
                        .collect()
                })
                .collect(),
            meta_pool: BufferPool::new(name, params.mshr_depth, false, MetaSlot::new),
            data_pool: BufferPool::new(name, params.mshr_depth, false, DataSlot::new),
            monitors: MonitorContainer::new(id, crate::monitor::delay::from_config(params.delay)),
            rand: std::sync::atomic::AtomicU64::new(0x6d69_7261_6765),
        })
    }

    fn next_rand(&self) -> u64 {
        use std::sync::atomic::Ordering;
        let mut x = self.rand.load(Ordering::Relaxed);
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rand.store(x, Ordering::Relaxed);
        x
    }

    /// The data pointer of the metadata at `loc`.
    pub fn data_ptr(&self, (ai, s, w): LineLoc) -> DataLoc {
        *guard(&self.ptrs[ai][(s * self.tag_ways + w) as usize])
    }

    /// Points the metadata at `loc` to data slot `d`.
    pub fn bind_ptr(&self, (ai, s, w): LineLoc, d: DataLoc) {
        *guard(&self.ptrs[ai][(s * self.tag_ways + w) as usize]) = d;
    }

    /// The data slot at `d`.
    pub fn data_at(&self, (ds, dw): DataLoc) -> &DataSlot {
        &self.data[(ds * self.data_ways + dw) as usize]
    }

    /// The back-pointer record of data slot `d`.
    pub fn data_meta_at(&self, (ds, dw): DataLoc) -> &MirageDataMeta {
        &self.data_meta[(ds * self.data_ways + dw) as usize]
    }

    /// Selects a data slot for `addr`: random-hash set, policy victim.
    pub fn replace_data(&self, addr: u64) -> DataLoc {
        let ds = self.data_indexer.index(addr, 0);
        let (dw, _free) = self.data_replacer.replace(ds);
        (ds, dw)
    }

    /// Confirms a data-slot installation with the data replacer.
    pub fn confirm_data(&self, (ds, dw): DataLoc) {
        self.data_replacer.access(ds, dw, true, false);
    }

    /// Frees a data slot and severs its binding.
    pub fn release_data(&self, d: DataLoc) {
        self.data_meta_at(d).to_invalid();
        self.data_replacer.invalidate(d.0, d.1);
    }

    /// Walks a cuckoo chain from the victim at `loc` toward a free tag slot,
    /// pushing the visited positions. On return `loc` is the deepest slot
    /// reached (free unless the walk hit the relocation bound or a cycle).
    pub fn cuckoo_search(&self, loc: &mut LineLoc, stack: &mut Vec<LineLoc>) {
        let mut relocations = 0;
        let mut visited: HashSet<u64> = HashSet::new();
        let mut addr = self.meta(*loc).addr();
        while self.meta(*loc).is_valid() && relocations < self.max_reloc {
            relocations += 1;
            let m_ai = (loc.0 + 1) % self.partitions;
            let m_s = self.indexer.index(addr, m_ai);
            let (m_w, _) = self.replacers[m_ai].replace(m_s);
            let m_loc = (m_ai, m_s, m_w);
            let m_addr = self.meta(m_loc).addr();
            if visited.contains(&m_addr) {
                break;
            }
            visited.insert(addr);
            stack.push(*loc);
            *loc = m_loc;
            addr = m_addr;
        }
    }

    /// Moves the tag at `src` into the free slot at `dst`, carrying the data
    /// pointer and rebinding the back-pointer; `src` becomes free.
    pub fn relocate_tag(&self, src: LineLoc, dst: LineLoc, delay: &mut u64) {
        let src_meta = self.meta(src);
        let dst_meta = self.meta(dst);
        let addr = src_meta.addr();
        dst_meta.init(addr);
        let state = src_meta.get();
        dst_meta.update(|m| m.copy_state_from(&state));
        let ptr = self.data_ptr(src);
        self.bind_ptr(dst, ptr);
        self.data_meta_at(ptr).bind(dst);
        src_meta.to_clean();
        src_meta.to_invalid();
        self.replace_manage(src, true, EvictKind::Evict);
        self.replace_read(dst, false);
        self.hook_manage(
            addr,
            Some(src),
            true,
            EvictKind::Evict,
            false,
            Some(dst_meta.get()),
            None,
            delay,
        );
        self.hook_read(addr, Some(dst), false, Some(dst_meta.get()), None, delay);
    }
}

impl CacheAccess for MirageCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn geometry(&self) -> (usize, u32, u32) {
        (self.partitions, self.sets, self.tag_ways)
    }

    fn has_data(&self) -> bool {
        true
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
        assert!(
            genre == ReplaceGenre::Normal,
            "cache `{}`: MIRAGE only allocates in its skewed tag store",
            self.name
        );
        // Balance the load: among the partitions with the most free tags,
        // pick one at random.
        let mut best_free = 0u32;
        let mut candidates: Vec<(usize, u32)> = Vec::with_capacity(self.partitions);
        for ai in 0..self.partitions {
            let s = self.indexer.index(addr, ai);
            let free = self.replacers[ai].free_count(s);
            if free > best_free {
                best_free = free;
                candidates.clear();
            }
            if free >= best_free {
                candidates.push((ai, s));
            }
        }
        let (ai, s) = candidates[(self.next_rand() % candidates.len() as u64) as usize];
        if let Some(p) = prio {
            self.arrays[ai].gate(s).set(p);
            if self.hit(addr, None).is_some() {
                self.arrays[ai].gate(s).reset(p);
                return None;
            }
        }
        let (w, _free) = self.replacers[ai].replace(s);
        Some((ai, s, w))
    }

    fn meta(&self, (ai, s, w): LineLoc) -> &MetaSlot {
        self.arrays[ai].meta(s, w)
    }

    fn data(&self, loc: LineLoc) -> Option<&DataSlot> {
        Some(self.data_at(self.data_ptr(loc)))
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
        Some(self.data_pool.acquire())
    }

    fn replace_read(&self, (ai, s, w): LineLoc, prefetch: bool) {
        self.replacers[ai].access(s, w, true, prefetch);
    }

    fn replace_write(&self, (ai, s, w): LineLoc, demand: bool) {
        self.replacers[ai].access(s, w, demand, false);
    }

    fn replace_manage(&self, (ai, s, w): LineLoc, hit: bool, evict: EvictKind) {
        if hit && evict.is_evict() {
            self.replacers[ai].invalidate(s, w);
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

impl MirageCache {
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
            rank: loc.map_or(-1, |(ai, s, w)| self.replacers[ai].rank(s, w)),
            hit,
            meta,
            data,
        }
    }
}

impl std::fmt::Debug for MirageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirageCache")
            .field("name", &self.name)
            .field("partitions", &self.partitions)
            .field("sets", &self.sets)
            .field("tag_ways", &self.tag_ways)
            .field("data_ways", &self.data_ways)
            .finish()
    }
}

/// The MIRAGE inner-port algorithm: the hit path is the inclusive one, the
/// miss path allocates a tag via cuckoo relocation and a data slot via the
/// random pool, evicting whichever prior owner either displaces.
pub struct MirageFlavor {
    cache: Arc<MirageCache>,
}

impl MirageFlavor {
    /// Creates the flavor over its concrete cache.
    pub fn new(cache: Arc<MirageCache>) -> Self {
        Self { cache }
    }
}

impl InnerFlavor for MirageFlavor {
    fn access_line<'a>(
        &self,
        ctx: &'a InnerCtx,
        addr: u64,
        acmd: CohCmd,
        prio: XactPrio,
        delay: &mut u64,
    ) -> LineOutcome<'a> {
        if let Some(loc) = ctx.cache().hit(addr, Some(prio)) {
            let meta = ctx.cache().meta(loc);
            let data = ctx.cache().data(loc);
            meta.lock();
            if let Some(sync) = ctx.policy().access_need_sync(acmd, &meta.get()) {
                let (_phit, pwb) = ctx.probe_req(addr, Some(meta), data, sync, delay);
                if pwb {
                    ctx.cache().hook_write(
                        addr,
                        Some(loc),
                        true,
                        Some(meta.get()),
                        data.map(DataSlot::get),
                        delay,
                    );
                }
            }
            let mut hit = true;
            match ctx.policy().access_need_promote(acmd, &meta.get()) {
                Promote::Outer(pcmd) => {
                    ctx.outer().acquire_req(addr, meta, data, pcmd, delay);
                    hit = false;
                }
                Promote::Local => meta.update(|m| m.to_modified(-1)),
                Promote::None => {}
            }
            return LineOutcome {
                meta: MetaRef::Line(meta),
                data: data.map(DataRef::Line),
                loc: Some(loc),
                hit,
            };
        }

        // miss: find a tag slot, relocating cuckoo-style when the pick is
        // occupied
        let Some(pick) = ctx.cache().replace(addr, Some(prio), ReplaceGenre::Normal) else {
            panic!(
                "cache `{}`: MIRAGE fill raced a concurrent install at {addr:#x}",
                self.cache.name()
            );
        };
        let mut loc = pick;
        let mut stack: Vec<LineLoc> = Vec::new();
        if self.cache.meta(loc).is_valid() {
            self.cache.cuckoo_search(&mut loc, &mut stack);
        }
        if self.cache.meta(loc).is_valid() {
            // the walk found no free slot: associative eviction
            let vmeta = self.cache.meta(loc);
            let vptr = self.cache.data_ptr(loc);
            ctx.evict(vmeta, Some(self.cache.data_at(vptr)), loc, delay);
            self.cache.release_data(vptr);
        }
        while let Some(prev) = stack.pop() {
            self.cache.relocate_tag(prev, loc, delay);
            loc = prev;
        }
        debug_assert_eq!(loc, pick);
        let meta = ctx.cache().meta(loc);
        meta.lock();

        // take a data slot, evicting its prior owner
        let dptr = self.cache.replace_data(addr);
        let dmeta = self.cache.data_meta_at(dptr);
        if let Some(owner) = dmeta.owner() {
            let ometa = self.cache.meta(owner);
            if ometa.is_valid() {
                ctx.evict(ometa, Some(self.cache.data_at(dptr)), owner, delay);
            }
            dmeta.to_invalid();
        }
        self.cache.bind_ptr(loc, dptr);
        dmeta.bind(loc);
        self.cache.confirm_data(dptr);
        let data = ctx.cache().data(loc);

        ctx.outer()
            .acquire_req(addr, meta, data, ctx.policy().cmd_for_outer_acquire(acmd), delay);
        LineOutcome {
            meta: MetaRef::Line(meta),
            data: data.map(DataRef::Line),
            loc: Some(loc),
            hit: false,
        }
    }

    fn write_line(
        &self,
        ctx: &InnerCtx,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        rcmd: CohCmd,
        delay: &mut u64,
    ) {
        InclusiveFlavor.write_line(ctx, addr, data_inner, meta_inner, rcmd, delay);
    }

    fn flush_line(&self, ctx: &InnerCtx, addr: u64, fcmd: CohCmd, delay: &mut u64) {
        let Some(loc) = ctx.cache().hit(addr, Some(XactPrio::Flush)) else {
            return; // MIRAGE sits at the LLC; an absent line is flushed
        };
        let meta = ctx.cache().meta(loc);
        let snapshot = meta.get();
        let check = ctx.policy().flush_need_sync(fcmd, Some(&snapshot));
        let data = ctx.cache().data(loc);

        if let Some(p) = check.probe {
            let (_phit, pwb) = ctx.probe_req(addr, Some(meta), data, p, delay);
            if pwb {
                ctx.cache().replace_write(loc, false);
                ctx.cache().hook_write(
                    addr,
                    Some(loc),
                    true,
                    Some(meta.get()),
                    data.map(DataSlot::get),
                    delay,
                );
            }
        }

        let wcmd = ctx.policy().writeback_need_writeback(&meta.get());
        let wrote_back = wcmd.is_some();
        if let Some(c) = wcmd {
            ctx.outer().writeback_req(addr, Some(meta), data, c, delay);
        }

        let dptr = self.cache.data_ptr(loc);
        ctx.policy().meta_after_flush(fcmd, meta);
        let ek = if cmd::is_evict(fcmd) {
            EvictKind::Evict
        } else {
            EvictKind::Keep
        };
        if ek.is_evict() {
            // the tag is gone; free its data slot with it
            self.cache.release_data(dptr);
        }
        ctx.cache().replace_manage(loc, true, ek);
        ctx.cache().hook_manage(
            addr,
            Some(loc),
            true,
            ek,
            wrote_back,
            Some(meta.get()),
            data.map(DataSlot::get),
            delay,
        );
        ctx.cache().gate_reset(loc.0, loc.1, XactPrio::Flush);
    }
}

impl std::fmt::Debug for MirageFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirageFlavor")
            .field("cache", &self.cache.name())
            .finish()
    }
}

/// A MIRAGE LLC node.
#[derive(Debug)]
pub struct MirageNode {
    node: CacheNode,
    cache: Arc<MirageCache>,
}

impl MirageNode {
    /// Builds a MIRAGE node at the LLC position (MSI, uncached parent).
    pub fn build(name: &str, params: &CacheParams, max_reloc: u32) -> Result<Self, BuildError> {
        let mut params = *params;
        params.policy = PolicyVariant::Msi;
        let cache = Arc::new(MirageCache::new(name, &params, max_reloc)?);
        let storage: Arc<dyn CacheAccess> = Arc::clone(&cache) as Arc<dyn CacheAccess>;
        let flavor = Box::new(MirageFlavor::new(Arc::clone(&cache)));
        let node = CacheNode::assemble(name, storage, &params, false, true, flavor)?;
        Ok(Self { node, cache })
    }

    /// The connect target for children.
    pub fn master(&self) -> Arc<dyn CohMaster> {
        self.node.master()
    }

    /// The MIRAGE storage.
    pub fn cache(&self) -> &Arc<MirageCache> {
        &self.cache
    }

    /// Connects the node's outer port to a parent (memory).
    pub fn connect_to(
        &self,
        parent: &Arc<dyn CohMaster>,
        uncached: bool,
    ) -> Result<(), BuildError> {
        self.node.connect_to(parent, uncached)
    }

    /// Attaches a monitor.
    pub fn attach_monitor(&self, monitor: &Arc<dyn crate::monitor::Monitor>) {
        self.node.attach_monitor(monitor);
    }
}
