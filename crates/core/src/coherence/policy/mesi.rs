//! MESI directory policy.
//!
//! Extends MSI with the Exclusive state: when a read acquire leaves the
//! requester as the sole recorded sharer, the grant is Exclusive and a later
//! write self-promotes without another round trip. Probes are filtered
//! through the sharer directory, so MESI only exists above directory
//! metadata and never at L1.

use super::{CohPolicy, FlushCheck, MsiPolicy, Promote};
use crate::cache::meta::{CohState, Meta, MetaSlot};
use crate::coherence::cmd::{self, CohCmd};

/// MESI policy state; delegates everything but the grant to MSI.
#[derive(Clone, Copy, Debug)]
pub struct MesiPolicy {
    base: MsiPolicy,
}

impl MesiPolicy {
    /// Creates a MESI policy for a non-L1 level.
    pub fn new(uncached_outer: bool) -> Self {
        Self {
            base: MsiPolicy::new(false, uncached_outer),
        }
    }
}

impl CohPolicy for MesiPolicy {
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
        if cmd::is_fetch_read(acmd) || cmd::is_prefetch(acmd) {
            let sole = meta.update(|m| {
                m.to_shared(id);
                if id >= 0 && m.is_exclusive_sharer(id) {
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

    fn flush_need_sync(&self, fcmd: CohCmd, meta: Option<&Meta>) -> FlushCheck {
        self.base.flush_need_sync(fcmd, meta)
    }
}
