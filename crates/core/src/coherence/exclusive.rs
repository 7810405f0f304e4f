//! Exclusive-cache port algorithms.
//!
//! An exclusive cache stores a block *or* its inner hierarchy does, never
//! both (except transiently during a probe-release). Two shapes exist:
//!
//! - **Broadcast**: misses are staged entirely in buffers; a fetched line is
//!   installed locally only when the requester is uncached and no inner copy
//!   exists, otherwise it passes straight through to the requester.
//! - **Directory**: `DW` extended ways per set hold directory-only entries
//!   (no data) for lines living inside the inner hierarchy; a hit in a
//!   normal way for a cached requester migrates the line into an extended
//!   way, a hit in an extended way borrows the block back from a sharer or
//!   refetches it.
//!
//! These paths predate multithread support in the protocol and run under a
//! single-threaded driver; gates are still maintained so the accounting
//! matches the inclusive ports.

use crate::cache::meta::MetaSlot;
use crate::cache::{EvictKind, LineLoc, ReplaceGenre};
use crate::coherence::cmd::{self, CohCmd};
use crate::coherence::inner::{DataRef, InclusiveFlavor, InnerCtx, InnerFlavor, LineOutcome, MetaRef};
use crate::coherence::outer::OuterPort;
use crate::common::DataSlot;
use crate::sync::XactPrio;

/// Fetches a missing line into staged buffers: first from a peer via probes,
/// then from the parent when no peer wrote it back. Returns whether a peer
/// held the block.
fn fetch_line(
    ctx: &InnerCtx,
    addr: u64,
    meta: &MetaSlot,
    data: Option<&DataSlot>,
    acmd: CohCmd,
    delay: &mut u64,
) -> bool {
    let mut probe_hit = false;
    let mut probe_writeback = false;
    if let Some(sync) = ctx.policy().access_need_sync(acmd, &meta.get()) {
        (probe_hit, probe_writeback) = ctx.probe_req(addr, Some(meta), data, sync, delay);
        if probe_writeback {
            // the peer's copy was dirty; its writeback must not be lost
            assert!(
                meta.is_dirty(),
                "cache `{}`: probe writeback from a clean line at {addr:#x}",
                ctx.name()
            );
            ctx.outer()
                .writeback_req(addr, Some(meta), data, cmd::cmd_for_release_writeback(), delay);
        }
    }
    if !probe_writeback {
        let fetch = if cmd::is_prefetch(acmd) {
            acmd
        } else {
            ctx.policy().cmd_for_outer_acquire(acmd)
        };
        ctx.outer().acquire_req(addr, meta, data, fetch, delay);
    }
    if probe_hit && !cmd::is_write(acmd) {
        // other inner copies remain; the granted line must be Shared
        meta.update(|m| {
            let mut outer = m.outer();
            outer.state = crate::cache::meta::CohState::Shared;
            m.set_outer(outer);
        });
    }
    probe_hit
}

/// The broadcast-exclusive inner-port algorithm.
#[derive(Debug, Default)]
pub struct ExclusiveBroadcastFlavor;

impl InnerFlavor for ExclusiveBroadcastFlavor {
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
            let mut hit = true;
            match ctx.policy().access_need_promote(acmd, &meta.get()) {
                crate::coherence::policy::Promote::Outer(pcmd) => {
                    ctx.outer().acquire_req(addr, meta, data, pcmd, delay);
                    hit = false;
                }
                crate::coherence::policy::Promote::Local => meta.update(|m| m.to_modified(-1)),
                crate::coherence::policy::Promote::None => {}
            }
            if acmd.id != -1 && cmd::is_acquire(acmd) && meta.is_dirty() {
                // the line migrates into the inner cache; the dirty bit
                // would be lost with it
                ctx.outer().writeback_req(
                    addr,
                    Some(meta),
                    data,
                    cmd::cmd_for_release_writeback(),
                    delay,
                );
            }
            return LineOutcome {
                meta: MetaRef::Line(meta),
                data: data.map(DataRef::Line),
                loc: Some(loc),
                hit,
            };
        }

        // miss: fetch into buffers, not into a slot
        let meta_buf = ctx.cache().meta_buffer();
        meta_buf.init(addr);
        meta_buf.outer_to_invalid();
        let data_buf = ctx.cache().data_buffer();
        let probe_hit = fetch_line(ctx, addr, &meta_buf, data_buf.as_deref(), acmd, delay);

        if acmd.id == -1 && !probe_hit {
            // uncached requester and no inner copy: reserve a real way
            let Some(loc) = ctx
                .cache()
                .replace(addr, Some(prio), ReplaceGenre::Normal)
            else {
                panic!(
                    "cache `{}`: exclusive install raced a concurrent fill at {addr:#x}",
                    ctx.name()
                );
            };
            let meta = ctx.cache().meta(loc);
            let data = ctx.cache().data(loc);
            meta.lock();
            if meta.is_valid() {
                ctx.evict(meta, data, loc, delay);
            }
            meta.init(addr);
            let staged = meta_buf.get();
            meta.update(|m| m.copy_state_from(&staged));
            meta_buf.to_invalid();
            if let (Some(d), Some(db)) = (data, data_buf.as_deref()) {
                d.copy_from(db);
            }
            ctx.cache().replace_write(loc, true);
            ctx.cache().hook_write(
                addr,
                Some(loc),
                false,
                Some(meta.get()),
                data.map(DataSlot::get),
                delay,
            );
            return LineOutcome {
                meta: MetaRef::Line(meta),
                data: data.map(DataRef::Line),
                loc: Some(loc),
                hit: false,
            };
        }

        LineOutcome {
            meta: MetaRef::Buf(meta_buf),
            data: data_buf.map(DataRef::Buf),
            loc: None,
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
        if rcmd.id == -1 {
            // uncached inner behaves inclusively
            InclusiveFlavor.write_line(ctx, addr, data_inner, meta_inner, rcmd, delay);
            return;
        }

        assert!(
            ctx.cache().hit(addr, None).is_none(),
            "cache `{}`: release into an exclusive cache hit a resident line at {addr:#x}",
            ctx.name()
        );

        // a non-exclusive releaser may leave sharers behind; check first
        let mut probe_hit = false;
        if let Some(mi) = meta_inner {
            if let Some(sync) = ctx
                .policy()
                .release_need_sync(rcmd, None, &mi.get())
            {
                let meta_buf = ctx.cache().meta_buffer();
                meta_buf.init(addr);
                meta_buf.outer_to_invalid();
                let data_buf = ctx.cache().data_buffer();
                let (ph, pwb) =
                    ctx.probe_req(addr, Some(&meta_buf), data_buf.as_deref(), sync, delay);
                assert!(
                    !pwb,
                    "cache `{}`: sharer check for {addr:#x} returned a writeback",
                    ctx.name()
                );
                probe_hit = ph;
            }
        }

        if !probe_hit {
            // sole copy: install it
            let Some(loc) = ctx
                .cache()
                .replace(addr, Some(XactPrio::Release), ReplaceGenre::Normal)
            else {
                return; // installed concurrently; the release is stale
            };
            let meta = ctx.cache().meta(loc);
            let data = ctx.cache().data(loc);
            if meta.is_valid() {
                ctx.evict(meta, data, loc, delay);
            }
            if let (Some(d), Some(di)) = (data, data_inner) {
                d.copy_from(di);
            }
            meta.init(addr);
            ctx.policy().meta_after_release(rcmd, meta, meta_inner);
            ctx.cache().replace_write(loc, true);
            ctx.cache().hook_write(
                addr,
                Some(loc),
                false,
                Some(meta.get()),
                data.map(DataSlot::get),
                delay,
            );
            ctx.cache().gate_reset(loc.0, loc.1, XactPrio::Release);
        }
    }

    fn flush_line(&self, ctx: &InnerCtx, addr: u64, fcmd: CohCmd, delay: &mut u64) {
        if !ctx.policy().uncached_outer() {
            ctx.outer().writeback_req(addr, None, None, fcmd, delay);
            return;
        }
        let hit_loc = ctx.cache().hit(addr, Some(XactPrio::Flush));
        let snapshot = hit_loc.map(|l| ctx.cache().meta(l).get());
        let check = ctx.policy().flush_need_sync(fcmd, snapshot.as_ref());

        // the block may live only inside the inner hierarchy; stage buffers
        let meta_buf;
        let data_buf;
        let (meta, data): (&MetaSlot, Option<&DataSlot>) = if let Some(loc) = hit_loc {
            (ctx.cache().meta(loc), ctx.cache().data(loc))
        } else {
            meta_buf = ctx.cache().meta_buffer();
            meta_buf.init(addr);
            meta_buf.outer_to_invalid();
            data_buf = ctx.cache().data_buffer();
            (&meta_buf, data_buf.as_deref())
        };

        if let Some(p) = check.probe {
            let (_phit, pwb) = ctx.probe_req(addr, Some(meta), data, p, delay);
            if pwb {
                if let Some(loc) = hit_loc {
                    ctx.cache().replace_write(loc, false);
                }
                ctx.cache().hook_write(
                    addr,
                    hit_loc,
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

        ctx.policy().meta_after_flush(fcmd, meta);
        let ek = if cmd::is_evict(fcmd) {
            EvictKind::Evict
        } else {
            EvictKind::Keep
        };
        if let Some(loc) = hit_loc {
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
        } else {
            ctx.cache()
                .hook_manage(addr, None, false, ek, wrote_back, None, None, delay);
        }
    }
}

/// Reserves an extended (directory) way for `addr`, evicting its current
/// occupant through a staged data buffer.
fn replace_line_ext<'a>(
    ctx: &'a InnerCtx,
    addr: u64,
    delay: &mut u64,
) -> (LineLoc, &'a MetaSlot) {
    let Some(loc) = ctx.cache().replace(addr, None, ReplaceGenre::Extend) else {
        panic!("cache `{}`: extended-way selection failed", ctx.name())
    };
    let meta = ctx.cache().meta(loc);
    if meta.is_valid() {
        let data_buf = ctx.cache().data_buffer();
        ctx.evict(meta, data_buf.as_deref(), loc, delay);
    }
    (loc, meta)
}

/// The directory-exclusive inner-port algorithm.
#[derive(Debug, Default)]
pub struct ExclusiveDirectoryFlavor;

impl InnerFlavor for ExclusiveDirectoryFlavor {
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
            meta.lock();
            if !meta.is_extend() {
                // hit in a normal, data-bearing way
                let data = ctx.cache().data(loc);
                let mut hit = true;
                match ctx.policy().access_need_promote(acmd, &meta.get()) {
                    crate::coherence::policy::Promote::Outer(pcmd) => {
                        ctx.outer().acquire_req(addr, meta, data, pcmd, delay);
                        hit = false;
                    }
                    crate::coherence::policy::Promote::Local => {
                        meta.update(|m| m.to_modified(-1));
                    }
                    crate::coherence::policy::Promote::None => {}
                }
                if acmd.id == -1 {
                    return LineOutcome {
                        meta: MetaRef::Line(meta),
                        data: data.map(DataRef::Line),
                        loc: Some(loc),
                        hit,
                    };
                }
                // cached requester: the data migrates inward, the directory
                // keeps tracking it from an extended way
                if meta.is_dirty() {
                    ctx.outer().writeback_req(
                        addr,
                        Some(meta),
                        data,
                        cmd::cmd_for_release_writeback(),
                        delay,
                    );
                }
                let (mloc, mmeta) = replace_line_ext(ctx, addr, delay);
                mmeta.init(addr);
                let staged = meta.get();
                mmeta.update(|m| m.copy_state_from(&staged));
                meta.to_invalid();
                ctx.cache().replace_manage(loc, true, EvictKind::Evict);
                if (mloc.0, mloc.1) != (loc.0, loc.1) {
                    ctx.cache().gate_set(mloc.0, mloc.1, prio);
                    ctx.cache().gate_reset(loc.0, loc.1, prio);
                }
                meta.unlock();
                mmeta.lock();
                return LineOutcome {
                    meta: MetaRef::Line(mmeta),
                    data: data.map(DataRef::Line),
                    loc: Some(mloc),
                    hit,
                };
            }

            // hit in an extended way: the block lives inside the inner
            // hierarchy; borrow it from a sharer or refetch it
            let data_buf = ctx.cache().data_buffer();
            let mut hit = true;
            let mut probe_wb = false;
            if let Some(sync) = ctx.policy().access_need_sync(acmd, &meta.get()) {
                let (_ph, pwb) =
                    ctx.probe_req(addr, Some(meta), data_buf.as_deref(), sync, delay);
                probe_wb = pwb;
                if pwb {
                    assert!(
                        meta.is_dirty(),
                        "cache `{}`: probe writeback from a clean line at {addr:#x}",
                        ctx.name()
                    );
                    ctx.outer().writeback_req(
                        addr,
                        Some(meta),
                        data_buf.as_deref(),
                        cmd::cmd_for_release_writeback(),
                        delay,
                    );
                }
            }
            if probe_wb {
                match ctx.policy().access_need_promote(acmd, &meta.get()) {
                    crate::coherence::policy::Promote::Outer(pcmd) => {
                        ctx.outer()
                            .acquire_req(addr, meta, data_buf.as_deref(), pcmd, delay);
                        hit = false;
                    }
                    crate::coherence::policy::Promote::Local => {
                        meta.update(|m| m.to_modified(-1));
                    }
                    crate::coherence::policy::Promote::None => {}
                }
            } else {
                let fetch = if cmd::is_prefetch(acmd) {
                    acmd
                } else {
                    ctx.policy().cmd_for_outer_acquire(acmd)
                };
                ctx.outer()
                    .acquire_req(addr, meta, data_buf.as_deref(), fetch, delay);
                hit = false;
            }
            return LineOutcome {
                meta: MetaRef::Line(meta),
                data: data_buf.map(DataRef::Buf),
                loc: Some(loc),
                hit,
            };
        }

        // miss
        if acmd.id == -1 {
            // uncached requester: fetch into a normal way
            let Some(loc) = ctx
                .cache()
                .replace(addr, Some(prio), ReplaceGenre::Normal)
            else {
                panic!(
                    "cache `{}`: exclusive install raced a concurrent fill at {addr:#x}",
                    ctx.name()
                );
            };
            let meta = ctx.cache().meta(loc);
            let data = ctx.cache().data(loc);
            meta.lock();
            if meta.is_valid() {
                ctx.evict(meta, data, loc, delay);
            }
            ctx.outer()
                .acquire_req(addr, meta, data, ctx.policy().cmd_for_outer_acquire(acmd), delay);
            return LineOutcome {
                meta: MetaRef::Line(meta),
                data: data.map(DataRef::Line),
                loc: Some(loc),
                hit: false,
            };
        }
        // cached requester: fetch through an extended way
        let (loc, meta) = replace_line_ext(ctx, addr, delay);
        ctx.cache().gate_set(loc.0, loc.1, prio);
        meta.lock();
        let data_buf = ctx.cache().data_buffer();
        let fetch = if cmd::is_prefetch(acmd) {
            acmd
        } else {
            ctx.policy().cmd_for_outer_acquire(acmd)
        };
        ctx.outer()
            .acquire_req(addr, meta, data_buf.as_deref(), fetch, delay);
        LineOutcome {
            meta: MetaRef::Line(meta),
            data: data_buf.map(DataRef::Buf),
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
        if rcmd.id == -1 {
            let Some(loc) = ctx.cache().hit(addr, Some(XactPrio::Release)) else {
                return;
            };
            let meta = ctx.cache().meta(loc);
            assert!(
                !meta.is_extend(),
                "cache `{}`: uncached release reached a directory entry at {addr:#x}",
                ctx.name()
            );
            let data = ctx.cache().data(loc);
            if let (Some(d), Some(di)) = (data, data_inner) {
                d.copy_from(di);
            }
            ctx.policy().meta_after_release(rcmd, meta, meta_inner);
            ctx.cache().replace_write(loc, false);
            ctx.cache().hook_write(
                addr,
                Some(loc),
                true,
                Some(meta.get()),
                data.map(DataSlot::get),
                delay,
            );
            ctx.cache().gate_reset(loc.0, loc.1, XactPrio::Release);
            return;
        }

        // cached releaser: the directory must be tracking the line
        let Some(loc) = ctx.cache().hit(addr, Some(XactPrio::Release)) else {
            panic!(
                "cache `{}`: release for {addr:#x} missed the directory",
                ctx.name()
            );
        };
        let meta = ctx.cache().meta(loc);
        assert!(
            meta.is_extend(),
            "cache `{}`: cached release hit a resident line at {addr:#x}",
            ctx.name()
        );
        let data_buf = ctx.cache().data_buffer();
        let mut probe_hit = false;
        if let Some(mi) = meta_inner {
            if let Some(sync) =
                ctx.policy()
                    .release_need_sync(rcmd, Some(&meta.get()), &mi.get())
            {
                let (ph, pwb) =
                    ctx.probe_req(addr, Some(meta), data_buf.as_deref(), sync, delay);
                assert!(
                    !pwb,
                    "cache `{}`: sharer check for {addr:#x} returned a writeback",
                    ctx.name()
                );
                probe_hit = ph;
            }
        }
        if let (Some(db), Some(di)) = (data_buf.as_deref(), data_inner) {
            db.copy_from(di);
        }
        if !probe_hit {
            // sole copy: move it back into a normal way
            let Some(mloc) = ctx.cache().replace(addr, None, ReplaceGenre::Normal) else {
                panic!("cache `{}`: normal-way selection failed", ctx.name())
            };
            let mmeta = ctx.cache().meta(mloc);
            let mdata = ctx.cache().data(mloc);
            if mmeta.is_valid() {
                ctx.evict(mmeta, mdata, mloc, delay);
            }
            mmeta.init(addr);
            let staged = meta.get();
            mmeta.update(|m| m.copy_state_from(&staged));
            meta.to_invalid();
            ctx.cache().replace_manage(loc, true, EvictKind::Evict);
            if let (Some(d), Some(db)) = (mdata, data_buf.as_deref()) {
                d.copy_from(db);
            }
            ctx.policy().meta_after_release(rcmd, mmeta, meta_inner);
            ctx.cache().replace_write(mloc, true);
            ctx.cache().hook_write(
                addr,
                Some(mloc),
                true,
                Some(mmeta.get()),
                mdata.map(DataSlot::get),
                delay,
            );
        }
        ctx.cache().gate_reset(loc.0, loc.1, XactPrio::Release);
    }

    fn flush_line(&self, ctx: &InnerCtx, addr: u64, fcmd: CohCmd, delay: &mut u64) {
        if !ctx.policy().uncached_outer() {
            ctx.outer().writeback_req(addr, None, None, fcmd, delay);
            return;
        }
        let Some(loc) = ctx.cache().hit(addr, Some(XactPrio::Flush)) else {
            // untracked address: neither here nor in the inner hierarchy
            return;
        };
        let meta = ctx.cache().meta(loc);
        let snapshot = meta.get();
        let check = ctx.policy().flush_need_sync(fcmd, Some(&snapshot));

        let data_buf;
        let data: Option<&DataSlot> = if meta.is_extend() {
            data_buf = ctx.cache().data_buffer();
            data_buf.as_deref()
        } else {
            ctx.cache().data(loc)
        };

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

        ctx.policy().meta_after_flush(fcmd, meta);
        let ek = if cmd::is_evict(fcmd) {
            EvictKind::Evict
        } else {
            EvictKind::Keep
        };
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

/// Broadcast-exclusive probe handling: a missing line may still live inside
/// the inner hierarchy and is reconstructed through staging buffers.
pub(crate) fn probe_resp_broadcast(
    port: &OuterPort,
    addr: u64,
    meta_outer: Option<&MetaSlot>,
    data_outer: Option<&DataSlot>,
    pcmd: CohCmd,
    delay: &mut u64,
) -> (bool, bool) {
    let cache = port.cache();
    let policy = port.policy();
    let hit_loc = cache.hit(addr, Some(XactPrio::Probe));
    let mut writeback = false;

    if let Some(loc) = hit_loc {
        let meta = cache.meta(loc);
        let data = cache.data(loc);
        if policy.probe_need_writeback(pcmd, &meta.get()) {
            writeback = true;
            if let (Some(out), Some(d)) = (data_outer, data) {
                out.copy_from(d);
            }
            meta.to_clean();
        }
        policy.meta_after_probe(pcmd, Some(meta), meta_outer, port.coh_id(), writeback);
        let ek = if cmd::is_evict(pcmd) {
            EvictKind::Probe
        } else {
            EvictKind::Keep
        };
        cache.replace_manage(loc, true, ek);
        cache.hook_manage(
            addr,
            Some(loc),
            true,
            ek,
            writeback,
            Some(meta.get()),
            data.map(DataSlot::get),
            delay,
        );
        cache.gate_reset(loc.0, loc.1, XactPrio::Probe);
        return (true, writeback);
    }

    // reconstruct from the inner hierarchy
    let meta_buf = cache.meta_buffer();
    meta_buf.init(addr);
    meta_buf.outer_to_invalid();
    let data_buf = cache.data_buffer();
    let mut probe_hit = false;
    let mut probe_wb = false;
    if let Some(sync) = policy.probe_need_sync(pcmd, None) {
        (probe_hit, probe_wb) = port.inner_port().probe_req(
            addr,
            Some(&meta_buf),
            data_buf.as_deref(),
            sync,
            delay,
        );
        if probe_wb {
            cache.hook_write(
                addr,
                None,
                true,
                Some(meta_buf.get()),
                data_buf.as_deref().map(DataSlot::get),
                delay,
            );
        }
    }
    if probe_wb && policy.probe_need_writeback(pcmd, &meta_buf.get()) {
        writeback = true;
        if let (Some(out), Some(db)) = (data_outer, data_buf.as_deref()) {
            out.copy_from(db);
        }
        meta_buf.to_clean();
    }
    policy.meta_after_probe(pcmd, Some(&meta_buf), meta_outer, port.coh_id(), writeback);
    cache.hook_manage(addr, None, false, EvictKind::Keep, writeback, None, None, delay);
    (probe_hit, writeback)
}

/// Directory-exclusive probe handling: extended ways know exactly which
/// inner caches hold the block.
pub(crate) fn probe_resp_directory(
    port: &OuterPort,
    addr: u64,
    meta_outer: Option<&MetaSlot>,
    data_outer: Option<&DataSlot>,
    pcmd: CohCmd,
    delay: &mut u64,
) -> (bool, bool) {
    let cache = port.cache();
    let policy = port.policy();
    let hit_loc = cache.hit(addr, Some(XactPrio::Probe));
    let mut writeback = false;
    let mut probe_hit = false;

    if let Some(loc) = hit_loc {
        let meta = cache.meta(loc);
        let data_buf;
        let data: Option<&DataSlot> = if meta.is_extend() {
            data_buf = cache.data_buffer();
            if let Some(sync) = policy.probe_need_sync(pcmd, Some(&meta.get())) {
                let (ph, pwb) =
                    port.inner_port()
                        .probe_req(addr, Some(meta), data_buf.as_deref(), sync, delay);
                probe_hit = ph;
                if pwb {
                    cache.replace_write(loc, false);
                    cache.hook_write(
                        addr,
                        Some(loc),
                        true,
                        Some(meta.get()),
                        data_buf.as_deref().map(DataSlot::get),
                        delay,
                    );
                }
            }
            data_buf.as_deref()
        } else {
            cache.data(loc)
        };

        if policy.probe_need_writeback(pcmd, &meta.get()) {
            writeback = true;
            if let (Some(out), Some(d)) = (data_outer, data) {
                out.copy_from(d);
            }
            meta.to_clean();
        }

        policy.meta_after_probe(pcmd, Some(meta), meta_outer, port.coh_id(), writeback);
        let ek = if cmd::is_evict(pcmd) {
            EvictKind::Probe
        } else {
            EvictKind::Keep
        };
        cache.replace_manage(loc, true, ek);
        cache.hook_manage(
            addr,
            Some(loc),
            true,
            ek,
            writeback,
            Some(meta.get()),
            data.map(DataSlot::get),
            delay,
        );
        cache.gate_reset(loc.0, loc.1, XactPrio::Probe);
    } else {
        policy.meta_after_probe(pcmd, None, meta_outer, port.coh_id(), false);
        cache.hook_manage(addr, None, false, EvictKind::Keep, false, None, None, delay);
    }

    (hit_loc.is_some() || probe_hit, writeback)
}
