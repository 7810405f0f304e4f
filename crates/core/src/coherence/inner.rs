//! Inner ports.
//!
//! The inner port of a cache faces its children (or the core at L1): it
//! serves acquires, releases, and flushes, fans probes out to qualifying
//! children, and tracks grants awaiting their finish. The algorithm variants
//! (inclusive here, exclusive and MIRAGE in sibling modules) differ only in
//! how a line is located and installed; everything else is shared through
//! [`InnerCtx`].

use std::ops::Deref;
use std::sync::{Arc, RwLock};

use crate::cache::meta::MetaSlot;
use crate::cache::{CacheAccess, EvictKind, LineLoc, ReplaceGenre};
use crate::coherence::cmd::{self, CohCmd};
use crate::coherence::outer::OuterPort;
use crate::coherence::policy::{CohPolicy, Promote};
use crate::coherence::{CohClient, CohMaster, InnerProbe};
use crate::common::error::BuildError;
use crate::common::DataSlot;
use crate::sync::{PendingXact, PoolGuard, XactPrio};

/// A metadata reference handed up from an access: either an array line or a
/// staging buffer (which returns to its pool when dropped).
pub enum MetaRef<'a> {
    /// An installed array line.
    Line(&'a MetaSlot),
    /// A staging buffer holding an uninstalled line.
    Buf(PoolGuard<'a, MetaSlot>),
}

impl Deref for MetaRef<'_> {
    type Target = MetaSlot;

    fn deref(&self) -> &MetaSlot {
        match self {
            MetaRef::Line(m) => m,
            MetaRef::Buf(g) => g,
        }
    }
}

/// A data reference handed up from an access; mirrors [`MetaRef`].
pub enum DataRef<'a> {
    /// An installed array cell.
    Line(&'a DataSlot),
    /// A staging buffer.
    Buf(PoolGuard<'a, DataSlot>),
}

impl Deref for DataRef<'_> {
    type Target = DataSlot;

    fn deref(&self) -> &DataSlot {
        match self {
            DataRef::Line(d) => d,
            DataRef::Buf(g) => g,
        }
    }
}

/// Result of locating (and possibly fetching) a line for an acquire.
///
/// When `loc` is set, the line is installed, its protocol lock is held, and
/// its set gate is held at the access priority; the matching finish releases
/// both. Buffered outcomes (`loc == None`) hold nothing.
pub struct LineOutcome<'a> {
    /// The line's metadata.
    pub meta: MetaRef<'a>,
    /// The line's data, when the cache carries data.
    pub data: Option<DataRef<'a>>,
    /// Array location; `None` when served from a staging buffer.
    pub loc: Option<LineLoc>,
    /// Whether the access hit without an outer fetch.
    pub hit: bool,
}

impl LineOutcome<'_> {
    /// Snapshot of the data block, if any.
    pub fn data_snapshot(&self) -> Option<crate::common::DataBlock> {
        self.data.as_deref().map(DataSlot::get)
    }
}

/// Shared state and helpers of an inner port.
pub struct InnerCtx {
    name: String,
    cache: Arc<dyn CacheAccess>,
    policy: Arc<dyn CohPolicy>,
    outer: Arc<OuterPort>,
    clients: RwLock<Vec<Arc<dyn CohClient>>>,
    pending: PendingXact,
}

impl InnerCtx {
    /// Cache name for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cache this port serves.
    pub fn cache(&self) -> &Arc<dyn CacheAccess> {
        &self.cache
    }

    /// This level's coherence policy.
    pub fn policy(&self) -> &Arc<dyn CohPolicy> {
        &self.policy
    }

    /// The co-located outer port.
    pub fn outer(&self) -> &Arc<OuterPort> {
        &self.outer
    }

    /// Fans `pcmd` out to every child the policy selects; aggregates
    /// `(any_hit, any_writeback)`.
    pub fn probe_req(
        &self,
        addr: u64,
        meta: Option<&MetaSlot>,
        data: Option<&DataSlot>,
        pcmd: CohCmd,
        delay: &mut u64,
    ) -> (bool, bool) {
        let snapshot = meta.map(MetaSlot::get);
        let clients = self
            .clients
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut hit = false;
        let mut writeback = false;
        for (i, client) in clients.iter().enumerate() {
            if let Some(c) = self
                .policy
                .probe_need_probe(pcmd, snapshot.as_ref(), i as i16)
            {
                let (ph, pwb) = client.probe_resp(addr, meta, data, c, delay);
                hit |= ph;
                writeback |= pwb;
            }
        }
        (hit, writeback)
    }

    /// Evicts a valid line: collects inner copies, writes dirty data back
    /// (before the local invalidation becomes visible), retires the line.
    pub fn evict(
        &self,
        meta: &MetaSlot,
        data: Option<&DataSlot>,
        loc: LineLoc,
        delay: &mut u64,
    ) {
        let addr = meta.addr();
        tracing::trace!(target: "cohsim::coh", cache = %self.name, addr, "evict");
        if let Some(sync) = self.policy.writeback_need_sync(&meta.get()) {
            let (_phit, pwb) = self.probe_req(addr, Some(meta), data, sync, delay);
            if pwb {
                self.cache.hook_write(
                    addr,
                    Some(loc),
                    true,
                    Some(meta.get()),
                    data.map(DataSlot::get),
                    delay,
                );
            }
        }
        let wcmd = self.policy.writeback_need_writeback(&meta.get()).or_else(|| {
            // Clean line: release it anyway if the parent reinstalls
            // evictions (exclusive parents).
            (meta.outer().is_valid())
                .then(|| self.outer.parent_wants_release())
                .flatten()
        });
        let wrote_back = wcmd.is_some_and(|c| cmd::is_writeback(c));
        if let Some(c) = wcmd {
            self.cache.gate_set(loc.0, loc.1, XactPrio::Evict);
            self.outer.writeback_req(addr, Some(meta), data, c, delay);
            self.cache.gate_reset(loc.0, loc.1, XactPrio::Evict);
        }
        self.policy.meta_after_evict(meta);
        self.cache.replace_manage(loc, true, EvictKind::Evict);
        self.cache.hook_manage(
            addr,
            Some(loc),
            true,
            EvictKind::Evict,
            wrote_back,
            Some(meta.get()),
            data.map(DataSlot::get),
            delay,
        );
    }

    /// Records a grant awaiting its finish.
    pub fn finish_record(&self, addr: u64, id: i16, forward: bool, loc: Option<LineLoc>) {
        self.pending.insert(addr, id, forward, loc);
    }
}

/// Algorithm variant of an inner port.
pub trait InnerFlavor: Send + Sync {
    /// Locates `addr` for an acquire, probing/fetching/evicting as needed.
    fn access_line<'a>(
        &self,
        ctx: &'a InnerCtx,
        addr: u64,
        acmd: CohCmd,
        prio: XactPrio,
        delay: &mut u64,
    ) -> LineOutcome<'a>;

    /// Handles a release from a child.
    fn write_line(
        &self,
        ctx: &InnerCtx,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        rcmd: CohCmd,
        delay: &mut u64,
    );

    /// Handles a flush at this level (or forwards it outward).
    fn flush_line(&self, ctx: &InnerCtx, addr: u64, fcmd: CohCmd, delay: &mut u64);
}

/// The inclusive inner-port algorithm.
#[derive(Debug, Default)]
pub struct InclusiveFlavor;

impl InnerFlavor for InclusiveFlavor {
    fn access_line<'a>(
        &self,
        ctx: &'a InnerCtx,
        addr: u64,
        acmd: CohCmd,
        prio: XactPrio,
        delay: &mut u64,
    ) -> LineOutcome<'a> {
        loop {
            if let Some(loc) = ctx.cache.hit(addr, Some(prio)) {
                let meta = ctx.cache.meta(loc);
                let data = ctx.cache.data(loc);
                meta.lock();
                if !meta.match_addr(addr) {
                    // The line was replaced while we waited on its lock.
                    meta.unlock();
                    ctx.cache.gate_reset(loc.0, loc.1, prio);
                    continue;
                }
                if let Some(sync) = ctx.policy.access_need_sync(acmd, &meta.get()) {
                    let (_phit, pwb) = ctx.probe_req(addr, Some(meta), data, sync, delay);
                    if pwb {
                        // a write landed here during the probe
                        ctx.cache.hook_write(
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
                match ctx.policy.access_need_promote(acmd, &meta.get()) {
                    Promote::Outer(pcmd) => {
                        ctx.outer.acquire_req(addr, meta, data, pcmd, delay);
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

            // miss: reserve a victim, re-checking the hit under the gate
            let Some(loc) = ctx.cache.replace(addr, Some(prio), ReplaceGenre::Normal) else {
                continue;
            };
            let meta = ctx.cache.meta(loc);
            let data = ctx.cache.data(loc);
            meta.lock();
            if meta.is_valid() {
                ctx.evict(meta, data, loc, delay);
            }
            ctx.outer
                .acquire_req(addr, meta, data, ctx.policy.cmd_for_outer_acquire(acmd), delay);
            return LineOutcome {
                meta: MetaRef::Line(meta),
                data: data.map(DataRef::Line),
                loc: Some(loc),
                hit: false,
            };
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
        let Some(loc) = ctx.cache.hit(addr, Some(XactPrio::Release)) else {
            panic!(
                "cache `{}`: release for {addr:#x} missed the cache (inclusion violated)",
                ctx.name
            );
        };
        let meta = ctx.cache.meta(loc);
        let data = ctx.cache.data(loc);
        if let (Some(d), Some(di)) = (data, data_inner) {
            d.copy_from(di);
        }
        ctx.policy.meta_after_release(rcmd, meta, meta_inner);
        ctx.cache.replace_write(loc, false);
        ctx.cache.hook_write(
            addr,
            Some(loc),
            true,
            Some(meta.get()),
            data.map(DataSlot::get),
            delay,
        );
        ctx.cache.gate_reset(loc.0, loc.1, XactPrio::Release);
    }

    fn flush_line(&self, ctx: &InnerCtx, addr: u64, fcmd: CohCmd, delay: &mut u64) {
        let hit_loc = ctx.cache.hit(addr, Some(XactPrio::Flush));
        let snapshot = hit_loc.map(|l| ctx.cache.meta(l).get());
        let check = ctx.policy.flush_need_sync(fcmd, snapshot.as_ref());

        if !check.local {
            // Not the flush-handling level: release the gate before the
            // forwarded flush probes back down through this set.
            if let Some(loc) = hit_loc {
                ctx.cache.gate_reset(loc.0, loc.1, XactPrio::Flush);
            }
            ctx.outer.writeback_req(addr, None, None, fcmd, delay);
            return;
        }

        let Some(loc) = hit_loc else {
            return;
        };
        let meta = ctx.cache.meta(loc);
        let data = ctx.cache.data(loc);

        if let Some(p) = check.probe {
            let (_phit, pwb) = ctx.probe_req(addr, Some(meta), data, p, delay);
            if pwb {
                ctx.cache.replace_write(loc, false);
                ctx.cache.hook_write(
                    addr,
                    Some(loc),
                    true,
                    Some(meta.get()),
                    data.map(DataSlot::get),
                    delay,
                );
            }
        }

        let wcmd = ctx.policy.writeback_need_writeback(&meta.get());
        let wrote_back = wcmd.is_some();
        if let Some(c) = wcmd {
            ctx.outer.writeback_req(addr, Some(meta), data, c, delay);
        }

        ctx.policy.meta_after_flush(fcmd, meta);
        let ek = if cmd::is_evict(fcmd) {
            EvictKind::Evict
        } else {
            EvictKind::Keep
        };
        ctx.cache.replace_manage(loc, true, ek);
        ctx.cache.hook_manage(
            addr,
            Some(loc),
            true,
            ek,
            wrote_back,
            Some(meta.get()),
            data.map(DataSlot::get),
            delay,
        );
        ctx.cache.gate_reset(loc.0, loc.1, XactPrio::Flush);
    }
}

/// An inner port: shared context plus the algorithm variant.
pub struct InnerPort {
    ctx: InnerCtx,
    flavor: Box<dyn InnerFlavor>,
}

impl InnerPort {
    /// Creates an inner port over `cache` with the given algorithm flavor.
    pub fn new(
        name: &str,
        cache: Arc<dyn CacheAccess>,
        policy: Arc<dyn CohPolicy>,
        outer: Arc<OuterPort>,
        mshr_depth: usize,
        flavor: Box<dyn InnerFlavor>,
    ) -> Self {
        Self {
            ctx: InnerCtx {
                name: name.to_string(),
                cache,
                policy,
                outer,
                clients: RwLock::new(Vec::new()),
                pending: PendingXact::new(name, mshr_depth),
            },
            flavor,
        }
    }

    /// The shared context (used by the core interface and specializations).
    pub fn ctx(&self) -> &InnerCtx {
        &self.ctx
    }

    /// The algorithm flavor.
    pub fn flavor(&self) -> &dyn InnerFlavor {
        &*self.flavor
    }
}

impl CohMaster for InnerPort {
    fn connect(
        &self,
        client: Arc<dyn CohClient>,
        uncached: bool,
    ) -> Result<(i16, Arc<dyn CohPolicy>), BuildError> {
        if uncached {
            return Ok((-1, Arc::clone(&self.ctx.policy)));
        }
        let mut clients = self
            .ctx
            .clients
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if clients.len() >= 63 {
            return Err(BuildError::TooManyChildren {
                name: self.ctx.name.clone(),
                count: clients.len() + 1,
            });
        }
        clients.push(client);
        Ok(((clients.len() - 1) as i16, Arc::clone(&self.ctx.policy)))
    }

    fn acquire_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        acmd: CohCmd,
        delay: &mut u64,
    ) {
        tracing::trace!(target: "cohsim::coh", cache = %self.ctx.name, addr, id = acmd.id, act = acmd.act, "acquire_resp");
        let out = self
            .flavor
            .access_line(&self.ctx, addr, acmd, XactPrio::Acquire, delay);
        if out.meta.is_valid() && out.meta.match_addr(addr) {
            self.ctx.policy.meta_after_grant(acmd, &out.meta, meta_inner);
            if let (Some(di), Some(d)) = (data_inner, out.data.as_deref()) {
                di.copy_from(d);
            }
            if let Some(loc) = out.loc {
                self.ctx.cache.replace_read(loc, cmd::is_prefetch(acmd));
            }
            self.ctx.cache.hook_read(
                addr,
                out.loc,
                out.hit,
                Some(out.meta.get()),
                out.data_snapshot(),
                delay,
            );
        }
        let forward = !out.hit;
        let loc = out.loc;
        drop(out); // buffers return to their pools before the grant closes
        self.ctx.finish_record(addr, acmd.id, forward, loc);
        if acmd.id == -1 {
            self.finish_resp(addr, cmd::cmd_for_finish(-1));
        }
    }

    fn writeback_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        wcmd: CohCmd,
        delay: &mut u64,
    ) {
        tracing::trace!(target: "cohsim::coh", cache = %self.ctx.name, addr, msg = wcmd.msg, act = wcmd.act, "writeback_resp");
        if cmd::is_flush(wcmd) {
            self.flavor.flush_line(&self.ctx, addr, wcmd, delay);
        } else {
            self.flavor
                .write_line(&self.ctx, addr, data_inner, meta_inner, wcmd, delay);
        }
    }

    fn finish_resp(&self, addr: u64, fcmd: CohCmd) {
        if let Some((forward, loc)) = self.ctx.pending.read(addr, fcmd.id) {
            if forward {
                self.ctx.outer.finish_req(addr);
            }
            if let Some(loc) = loc {
                self.ctx.cache.meta(loc).unlock();
                self.ctx.cache.gate_reset(loc.0, loc.1, XactPrio::Acquire);
            }
            self.ctx.pending.remove(addr, fcmd.id);
        }
    }
}

impl InnerProbe for InnerPort {
    fn probe_req(
        &self,
        addr: u64,
        meta: Option<&MetaSlot>,
        data: Option<&DataSlot>,
        pcmd: CohCmd,
        delay: &mut u64,
    ) -> (bool, bool) {
        self.ctx.probe_req(addr, meta, data, pcmd, delay)
    }
}

impl std::fmt::Debug for InnerPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerPort")
            .field("name", &self.ctx.name)
            .finish()
    }
}
