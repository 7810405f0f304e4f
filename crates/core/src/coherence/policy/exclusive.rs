//! Exclusive-cache policies.
//!
//! An exclusive cache holds a block *or* its inner hierarchy does, never
//! both. The decision set differs from the inclusive family in four ways:
//! acquires always probe peers (the block may only exist inside a peer),
//! grants to cached requesters surrender the local copy, clean inner
//! evictions are released back for reinstallation, and a release installs
//! only after a probe verified no other sharer remains.

use super::{CohPolicy, FlushCheck, MsiPolicy, Promote};
use crate::cache::meta::{CohState, Meta, MetaSlot};
use crate::coherence::cmd::{self, CohCmd};

/// Exclusive MSI policy; `directory` selects the extended-way variant.
#[derive(Clone, Copy, Debug)]
pub struct ExclusiveMsiPolicy {
    base: MsiPolicy,
    directory: bool,
}

impl ExclusiveMsiPolicy {
    /// Creates an exclusive MSI policy (never L1).
    pub fn new(directory: bool, uncached_outer: bool) -> Self {
        Self {
            base: MsiPolicy::new(false, uncached_outer),
            directory,
        }
    }
}

impl CohPolicy for ExclusiveMsiPolicy {
    fn is_l1(&self) -> bool {
        false
    }

    fn uncached_outer(&self) -> bool {
        self.base.uncached_outer()
    }

    fn is_directory(&self) -> bool {
        self.directory
    }

    fn cmd_for_outer_acquire(&self, acmd: CohCmd) -> CohCmd {
        self.base.cmd_for_outer_acquire(acmd)
    }

    fn access_need_sync(&self, acmd: CohCmd, _meta: &Meta) -> Option<CohCmd> {
        // The block may live only inside a peer; always ask.
        if cmd::is_fetch_write(acmd) {
            Some(cmd::cmd_for_probe_release(acmd.id))
        } else {
            Some(cmd::cmd_for_probe_downgrade(acmd.id))
        }
    }

    fn access_need_promote(&self, acmd: CohCmd, meta: &Meta) -> Promote {
        self.base.access_need_promote(acmd, meta)
    }

    fn meta_after_fetch(&self, outer_cmd: CohCmd, meta: &MetaSlot, addr: u64) {
        self.base.meta_after_fetch(outer_cmd, meta, addr);
    }

    fn meta_after_grant(&self, acmd: CohCmd, meta: &MetaSlot, meta_inner: Option<&MetaSlot>) {
        debug_assert!(
            meta_inner.is_none_or(|mi| !mi.outer().dirty),
            "grant must never carry dirtiness"
        );
        let id = acmd.id;
        let read = cmd::is_fetch_read(acmd) || cmd::is_prefetch(acmd);
        if self.directory {
            meta.update(|m| {
                if read {
                    m.to_shared(id);
                } else {
                    m.to_modified(id);
                }
            });
        } else if id >= 0 {
            // Broadcast exclusive: the line migrates into the inner cache.
            meta.to_invalid();
        } else {
            // No cached inner exists; the locally installed copy is Shared.
            meta.update(|m| m.to_shared(-1));
        }
        if let Some(mi) = meta_inner {
            mi.grant(if read { CohState::Shared } else { CohState::Modified });
        }
    }

    fn probe_need_sync(&self, outer_cmd: CohCmd, meta: Option<&Meta>) -> Option<CohCmd> {
        self.base.probe_need_sync(outer_cmd, meta)
    }

    fn meta_after_probe(
        &self,
        outer_cmd: CohCmd,
        meta: Option<&MetaSlot>,
        meta_outer: Option<&MetaSlot>,
        inner_id: i16,
        writeback: bool,
    ) {
        self.base
            .meta_after_probe(outer_cmd, meta, meta_outer, inner_id, writeback);
    }

    fn writeback_need_sync(&self, meta: &Meta) -> Option<CohCmd> {
        // Normal ways are exclusive of the inner hierarchy; only extended
        // directory ways shadow inner copies that must be collected.
        if meta.is_extend() {
            Some(cmd::cmd_for_probe_release(-1))
        } else {
            None
        }
    }

    fn release_need_sync(
        &self,
        rcmd: CohCmd,
        _meta: Option<&Meta>,
        meta_inner: &Meta,
    ) -> Option<CohCmd> {
        // A non-writable releaser may have peers with copies; check first.
        if meta_inner.outer().allow_write() {
            None
        } else {
            Some(cmd::cmd_for_probe_writeback(rcmd.id))
        }
    }

    fn meta_after_release(&self, rcmd: CohCmd, meta: &MetaSlot, meta_inner: Option<&MetaSlot>) {
        if rcmd.id == -1 {
            self.base.meta_after_release(rcmd, meta, meta_inner);
            return;
        }
        if let Some(mi) = meta_inner {
            let inner_outer = mi.outer();
            meta.update(|m| m.set_outer(inner_outer));
            mi.outer_to_invalid();
        }
        if !self.directory {
            // Snooping form must re-validate the local record.
            meta.update(|m| m.to_shared(-1));
        }
    }

    fn flush_need_sync(&self, fcmd: CohCmd, meta: Option<&Meta>) -> FlushCheck {
        assert!(
            self.uncached_outer(),
            "exclusive flush handling expects the LLC position"
        );
        let probe = if cmd::is_evict(fcmd) {
            Some(cmd::cmd_for_probe_release(-1))
        } else if meta.is_some_and(Meta::is_shared) {
            None
        } else {
            Some(cmd::cmd_for_probe_writeback(-1))
        };
        FlushCheck { local: true, probe }
    }

    fn inner_need_release(&self) -> Option<CohCmd> {
        Some(cmd::cmd_for_release())
    }
}

/// Exclusive MESI policy: the directory-exclusive grant adds the Exclusive
/// state for sole sharers.
#[derive(Clone, Copy, Debug)]
pub struct ExclusiveMesiPolicy {
    base: ExclusiveMsiPolicy,
}

impl ExclusiveMesiPolicy {
    /// Creates a directory-backed exclusive MESI policy.
    pub fn new(uncached_outer: bool) -> Self {
        Self {
            base: ExclusiveMsiPolicy::new(true, uncached_outer),
        }
    }
}

impl CohPolicy for ExclusiveMesiPolicy {
    fn is_l1(&self) -> bool {
        false
    }

    fn uncached_outer(&self) -> bool {
        self.base.uncached_outer()
    }

    fn is_directory(&self) -> bool {
        true
    }

    fn cmd_for_outer_acquire(&self, acmd: CohCmd) -> CohCmd {
        self.base.cmd_for_outer_acquire(acmd)
    }

    fn access_need_sync(&self, acmd: CohCmd, meta: &Meta) -> Option<CohCmd> {
        self.base.access_need_sync(acmd, meta)
    }

    fn access_need_promote(&self, acmd: CohCmd, meta: &Meta) -> Promote {
        self.base.access_need_promote(acmd, meta)
    }

    fn meta_after_fetch(&self, outer_cmd: CohCmd, meta: &MetaSlot, addr: u64) {
        self.base.meta_after_fetch(outer_cmd, meta, addr);
    }

    fn meta_after_grant(&self, acmd: CohCmd, meta: &MetaSlot, meta_inner: Option<&MetaSlot>) {
        debug_assert!(
            meta_inner.is_none_or(|mi| !mi.outer().dirty),
            "grant must never carry dirtiness"
        );
        let id = acmd.id;
        if id >= 0 {
            if cmd::is_fetch_read(acmd) || cmd::is_prefetch(acmd) {
                let sole = meta.update(|m| {
                    m.to_shared(id);
                    if m.is_exclusive_sharer(id) {
                        m.to_exclusive(id);
                        true
                    } else {
                        false
                    }
                });
                if let Some(mi) = meta_inner {
                    mi.grant(if sole { CohState::Exclusive } else { CohState::Shared });
                }
            } else {
                debug_assert!(cmd::is_fetch_write(acmd));
                meta.update(|m| m.to_modified(id));
                if let Some(mi) = meta_inner {
                    mi.grant(CohState::Modified);
                }
            }
        } else {
            // Uncached requester: keep the copy locally in a normal way.
            meta.update(|m| m.to_shared(-1));
            if let Some(mi) = meta_inner {
                mi.grant(if cmd::is_fetch_write(acmd) {
                    CohState::Modified
                } else {
                    CohState::Shared
                });
            }
        }
    }

    fn probe_need_sync(&self, outer_cmd: CohCmd, meta: Option<&Meta>) -> Option<CohCmd> {
        self.base.probe_need_sync(outer_cmd, meta)
    }

    fn meta_after_probe(
        &self,
        outer_cmd: CohCmd,
        meta: Option<&MetaSlot>,
        meta_outer: Option<&MetaSlot>,
        inner_id: i16,
        writeback: bool,
    ) {
        self.base
            .meta_after_probe(outer_cmd, meta, meta_outer, inner_id, writeback);
    }

    fn writeback_need_sync(&self, meta: &Meta) -> Option<CohCmd> {
        self.base.writeback_need_sync(meta)
    }

    fn release_need_sync(
        &self,
        rcmd: CohCmd,
        meta: Option<&Meta>,
        meta_inner: &Meta,
    ) -> Option<CohCmd> {
        self.base.release_need_sync(rcmd, meta, meta_inner)
    }

    fn meta_after_release(&self, rcmd: CohCmd, meta: &MetaSlot, meta_inner: Option<&MetaSlot>) {
        self.base.meta_after_release(rcmd, meta, meta_inner);
    }

    fn flush_need_sync(&self, fcmd: CohCmd, meta: Option<&Meta>) -> FlushCheck {
        self.base.flush_need_sync(fcmd, meta)
    }

    fn inner_need_release(&self) -> Option<CohCmd> {
        self.base.inner_need_release()
    }
}
