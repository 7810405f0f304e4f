//! MSI coherence policy with broadcast probing.

use super::{meta_after_probe_base, probe_downgrade_to_shared, CohPolicy, FlushCheck, Promote};
use crate::cache::meta::{CohState, Meta, MetaSlot};
use crate::coherence::cmd::{self, CohCmd};

/// MSI policy state: only the tree position.
#[derive(Clone, Copy, Debug)]
pub struct MsiPolicy {
    is_l1: bool,
    uncached_outer: bool,
}

impl MsiPolicy {
    /// Creates an MSI policy for a level at the given tree position.
    pub fn new(is_l1: bool, uncached_outer: bool) -> Self {
        Self {
            is_l1,
            uncached_outer,
        }
    }
}

impl CohPolicy for MsiPolicy {
    fn is_l1(&self) -> bool {
        self.is_l1
    }

    fn uncached_outer(&self) -> bool {
        self.uncached_outer
    }

    fn cmd_for_outer_acquire(&self, acmd: CohCmd) -> CohCmd {
        if cmd::is_fetch_write(acmd) {
            cmd::cmd_for_write()
        } else if cmd::is_prefetch(acmd) {
            cmd::cmd_for_prefetch()
        } else {
            cmd::cmd_for_read()
        }
    }

    fn access_need_sync(&self, acmd: CohCmd, meta: &Meta) -> Option<CohCmd> {
        if self.is_l1 {
            return None;
        }
        if cmd::is_fetch_write(acmd) {
            // A write acquire invalidates every other inner copy.
            Some(cmd::cmd_for_probe_release(acmd.id))
        } else if !meta.is_shared() {
            // A read acquire downgrades a writable inner copy to Shared.
            Some(cmd::cmd_for_probe_writeback(acmd.id))
        } else {
            None
        }
    }

    fn access_need_promote(&self, acmd: CohCmd, meta: &Meta) -> Promote {
        if cmd::is_fetch_write(acmd) {
            if !meta.allow_write() {
                Promote::Outer(cmd::cmd_for_write())
            } else if !meta.is_modified() {
                Promote::Local
            } else {
                Promote::None
            }
        } else {
            Promote::None
        }
    }

    fn meta_after_fetch(&self, outer_cmd: CohCmd, meta: &MetaSlot, addr: u64) {
        meta.init(addr);
        if cmd::is_fetch_read(outer_cmd) || cmd::is_prefetch(outer_cmd) {
            meta.update(|m| m.to_shared(-1));
        } else {
            debug_assert!(cmd::is_fetch_write(outer_cmd));
            meta.update(|m| m.to_modified(-1));
        }
    }

    fn meta_after_grant(&self, acmd: CohCmd, meta: &MetaSlot, meta_inner: Option<&MetaSlot>) {
        debug_assert!(
            meta_inner.is_none_or(|mi| !mi.outer().dirty),
            "grant must never carry dirtiness"
        );
        if cmd::is_fetch_read(acmd) || cmd::is_prefetch(acmd) {
            meta.update(|m| m.to_shared(acmd.id));
            if let Some(mi) = meta_inner {
                mi.grant(CohState::Shared);
            }
        } else {
            debug_assert!(cmd::is_fetch_write(acmd));
            meta.update(|m| m.to_modified(acmd.id));
            if let Some(mi) = meta_inner {
                mi.grant(CohState::Modified);
            }
        }
    }

    fn probe_need_sync(&self, outer_cmd: CohCmd, meta: Option<&Meta>) -> Option<CohCmd> {
        if self.is_l1 {
            return None;
        }
        debug_assert!(cmd::is_probe(outer_cmd));
        if cmd::is_evict(outer_cmd) {
            Some(cmd::cmd_for_probe_release(-1))
        } else if meta.is_some_and(Meta::is_shared) {
            None
        } else {
            Some(cmd::cmd_for_probe_writeback(-1))
        }
    }

    fn meta_after_probe(
        &self,
        outer_cmd: CohCmd,
        meta: Option<&MetaSlot>,
        meta_outer: Option<&MetaSlot>,
        inner_id: i16,
        writeback: bool,
    ) {
        meta_after_probe_base(outer_cmd, meta, meta_outer, inner_id, writeback);
        if let Some(m) = meta {
            if cmd::is_evict(outer_cmd) {
                m.to_invalid();
            } else {
                probe_downgrade_to_shared(m);
            }
        }
    }

    fn writeback_need_sync(&self, _meta: &Meta) -> Option<CohCmd> {
        if self.is_l1 {
            None
        } else {
            // Inclusive eviction: children holding the line must give it up.
            Some(cmd::cmd_for_probe_release(-1))
        }
    }

    fn release_need_sync(
        &self,
        _rcmd: CohCmd,
        _meta: Option<&Meta>,
        _meta_inner: &Meta,
    ) -> Option<CohCmd> {
        None
    }

    fn flush_need_sync(&self, fcmd: CohCmd, meta: Option<&Meta>) -> FlushCheck {
        if !self.uncached_outer {
            return FlushCheck {
                local: false,
                probe: None,
            };
        }
        let probe = match meta {
            Some(_) if cmd::is_evict(fcmd) => Some(cmd::cmd_for_probe_release(-1)),
            Some(m) if m.is_shared() => None,
            Some(_) => Some(cmd::cmd_for_probe_writeback(-1)),
            None => None,
        };
        FlushCheck { local: true, probe }
    }
}
