//! MI coherence policy.
//!
//! The minimal protocol: a line is either Modified here or absent, so every
//! fetch requests write permission and every acquire hit invalidates all
//! peer copies first.

use super::{meta_after_probe_base, CohPolicy, FlushCheck, Promote};
use crate::cache::meta::{CohState, Meta, MetaSlot};
use crate::coherence::cmd::{self, CohCmd};

/// MI policy state.
#[derive(Clone, Copy, Debug)]
pub struct MiPolicy {
    is_l1: bool,
    uncached_outer: bool,
}

impl MiPolicy {
    /// Creates an MI policy for a level at the given tree position.
    pub fn new(is_l1: bool, uncached_outer: bool) -> Self {
        Self {
            is_l1,
            uncached_outer,
        }
    }
}

impl CohPolicy for MiPolicy {
    fn is_l1(&self) -> bool {
        self.is_l1
    }

    fn uncached_outer(&self) -> bool {
        self.uncached_outer
    }

    fn cmd_for_outer_acquire(&self, _acmd: CohCmd) -> CohCmd {
        cmd::cmd_for_write()
    }

    fn access_need_sync(&self, acmd: CohCmd, _meta: &Meta) -> Option<CohCmd> {
        if self.is_l1 {
            None
        } else {
            Some(cmd::cmd_for_probe_release(acmd.id))
        }
    }

    fn access_need_promote(&self, _acmd: CohCmd, _meta: &Meta) -> Promote {
        // Lines are always fetched writable; nothing to promote.
        Promote::None
    }

    fn meta_after_fetch(&self, outer_cmd: CohCmd, meta: &MetaSlot, addr: u64) {
        debug_assert!(cmd::is_fetch_write(outer_cmd));
        meta.init(addr);
        meta.update(|m| m.to_modified(-1));
    }

    fn meta_after_grant(&self, acmd: CohCmd, meta: &MetaSlot, meta_inner: Option<&MetaSlot>) {
        meta.update(|m| m.to_modified(acmd.id));
        if let Some(mi) = meta_inner {
            mi.grant(CohState::Modified);
        }
    }

    fn probe_need_sync(&self, outer_cmd: CohCmd, _meta: Option<&Meta>) -> Option<CohCmd> {
        if self.is_l1 {
            return None;
        }
        debug_assert!(cmd::is_probe(outer_cmd));
        if cmd::is_evict(outer_cmd) || cmd::is_downgrade(outer_cmd) {
            Some(cmd::cmd_for_probe_release(-1))
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
            // MI has no Shared state to downgrade into.
            if cmd::is_evict(outer_cmd) || cmd::is_downgrade(outer_cmd) {
                m.to_invalid();
            }
        }
    }

    fn writeback_need_sync(&self, _meta: &Meta) -> Option<CohCmd> {
        if self.is_l1 {
            None
        } else {
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
        let probe = meta.map(|_| {
            if cmd::is_evict(fcmd) {
                cmd::cmd_for_probe_release(-1)
            } else {
                cmd::cmd_for_probe_writeback(-1)
            }
        });
        FlushCheck { local: true, probe }
    }
}
