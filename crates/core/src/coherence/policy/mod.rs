//! Coherence policies.
//!
//! A policy is a bundle of pure decision functions plus the metadata
//! transitions for every protocol event, parameterized by the cache's
//! position in the tree (`is_l1`, `uncached_outer`). Ports consult the
//! policy at every step; the policy never talks to ports itself.
//!
//! # Variants
//!
//! - `Mi`: two-state MI; every fetch requests write permission.
//! - `Msi`: MSI with broadcast probing.
//! - `Mesi`: MESI over directory metadata; a sole sharer is granted
//!   Exclusive on a read.
//! - `ExclusiveMsi` / `ExclusiveMesi`: the exclusive-cache decision set used
//!   by the buffer-staged inner ports.

/// Exclusive-cache policies.
pub mod exclusive;

/// MESI directory policy.
pub mod mesi;

/// MI policy.
pub mod mi;

/// MSI policy.
pub mod msi;

pub use exclusive::{ExclusiveMesiPolicy, ExclusiveMsiPolicy};
pub use mesi::MesiPolicy;
pub use mi::MiPolicy;
pub use msi::MsiPolicy;

use std::sync::Arc;

use crate::cache::meta::{CohState, Meta, MetaSlot};
use crate::coherence::cmd::{self, CohCmd};
use crate::common::error::BuildError;
use crate::config::PolicyVariant;

/// Outcome of a permission-promotion check on an acquire hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Promote {
    /// The held permission suffices.
    None,
    /// The parent must be asked with this command.
    Outer(CohCmd),
    /// The line may self-promote to Modified locally.
    Local,
}

/// Outcome of a flush routing check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushCheck {
    /// Whether this level handles the flush (else it is forwarded outward).
    pub local: bool,
    /// Probe to synchronize the inner hierarchy first, if any.
    pub probe: Option<CohCmd>,
}

/// The coherence policy interface.
///
/// "need" functions are pure; "meta_after" functions apply the transition for
/// an event that already happened. Collectively the implementations maintain:
/// no two writable copies, writer exclusivity after a write acquire, reader
/// visibility after a read acquire, and no silent loss of dirty data.
pub trait CohPolicy: Send + Sync {
    /// Whether this cache is an L1 (its requester is the core).
    fn is_l1(&self) -> bool;

    /// Whether the parent is the uncached memory (this level is the LLC).
    fn uncached_outer(&self) -> bool;

    /// Whether probes are filtered through a sharer directory.
    fn is_directory(&self) -> bool {
        false
    }

    /// Translates an inner acquire into the acquire sent to the parent.
    fn cmd_for_outer_acquire(&self, cmd: CohCmd) -> CohCmd;

    /// On an acquire hit: must peers be probed first, and how?
    fn access_need_sync(&self, cmd: CohCmd, meta: &Meta) -> Option<CohCmd>;

    /// On an acquire hit: is a permission promotion needed?
    fn access_need_promote(&self, cmd: CohCmd, meta: &Meta) -> Promote;

    /// Transition after fetching a line from the parent.
    fn meta_after_fetch(&self, outer_cmd: CohCmd, meta: &MetaSlot, addr: u64);

    /// Transition after granting a line to an inner requester.
    ///
    /// Writes the granted permission into the requester's parent-visible
    /// record (`meta_inner`).
    fn meta_after_grant(&self, cmd: CohCmd, meta: &MetaSlot, meta_inner: Option<&MetaSlot>);

    /// On a probe from the parent: must the inner hierarchy be probed first?
    fn probe_need_sync(&self, outer_cmd: CohCmd, meta: Option<&Meta>) -> Option<CohCmd>;

    /// Filters which children a probe reaches.
    fn probe_need_probe(&self, pcmd: CohCmd, meta: Option<&Meta>, target: i16) -> Option<CohCmd> {
        debug_assert!(cmd::is_probe(pcmd));
        let need = match meta {
            Some(m) if self.is_directory() => m.is_sharer(target) && target != pcmd.id,
            Some(_) => target != pcmd.id,
            None => true,
        };
        need.then_some(CohCmd { id: -1, ..pcmd })
    }

    /// Whether a probe response must carry the data.
    fn probe_need_writeback(&self, outer_cmd: CohCmd, meta: &Meta) -> bool {
        let _unused = outer_cmd;
        meta.is_dirty()
    }

    /// Transition after a probe: updates this level's line (`meta`) and the
    /// probing parent's record (`meta_outer`).
    fn meta_after_probe(
        &self,
        outer_cmd: CohCmd,
        meta: Option<&MetaSlot>,
        meta_outer: Option<&MetaSlot>,
        inner_id: i16,
        writeback: bool,
    );

    /// On an eviction: must the inner hierarchy give the line up first?
    fn writeback_need_sync(&self, meta: &Meta) -> Option<CohCmd>;

    /// On an eviction: must the data travel to the parent?
    ///
    /// Clean-eviction notification to a parent that wants releases is decided
    /// separately through [`CohPolicy::inner_need_release`] of the parent.
    fn writeback_need_writeback(&self, meta: &Meta) -> Option<CohCmd> {
        meta.is_dirty().then_some(cmd::cmd_for_release_writeback())
    }

    /// Transition after a writeback reached the parent.
    fn meta_after_writeback(&self, outer_cmd: CohCmd, meta: Option<&MetaSlot>) {
        let _unused = outer_cmd;
        if let Some(m) = meta {
            m.to_clean();
        }
    }

    /// Transition after an eviction completed.
    fn meta_after_evict(&self, meta: &MetaSlot) {
        assert!(
            !meta.is_dirty(),
            "invariant violated: dirty line at {:#x} evicted without writeback",
            meta.addr()
        );
        meta.to_invalid();
    }

    /// On a release from a child: must peers be checked first?
    fn release_need_sync(&self, cmd: CohCmd, meta: Option<&Meta>, meta_inner: &Meta)
        -> Option<CohCmd>;

    /// Transition after a release from a child landed in this line.
    fn meta_after_release(&self, rcmd: CohCmd, meta: &MetaSlot, meta_inner: Option<&MetaSlot>) {
        if cmd::is_writeback(rcmd) {
            meta.to_dirty();
        }
        if cmd::is_evict(rcmd) {
            meta.update(|m| m.sync(rcmd.id));
            if let Some(mi) = meta_inner {
                mi.outer_to_invalid();
            }
        }
    }

    /// Routes a flush: handled here or forwarded outward, with an optional
    /// synchronizing probe.
    fn flush_need_sync(&self, cmd: CohCmd, meta: Option<&Meta>) -> FlushCheck;

    /// Transition after a flush completed at this level.
    fn meta_after_flush(&self, fcmd: CohCmd, meta: &MetaSlot) {
        if cmd::is_evict(fcmd) {
            meta.to_invalid();
        }
    }

    /// Whether this cache wants clean evictions in its inner hierarchy
    /// released to it (exclusive caches reinstall them).
    fn inner_need_release(&self) -> Option<CohCmd> {
        None
    }
}

/// Shared parent-record part of `meta_after_probe`.
///
/// When the probe response carried data, the parent's line inherits the
/// probed copy (becoming valid if it was not) and turns dirty; an evicting
/// probe clears the probed child from the parent's sharer record.
pub(crate) fn meta_after_probe_base(
    outer_cmd: CohCmd,
    meta: Option<&MetaSlot>,
    meta_outer: Option<&MetaSlot>,
    inner_id: i16,
    writeback: bool,
) {
    let Some(mo) = meta_outer else { return };
    if writeback {
        if !mo.is_valid() {
            let probed = meta.map(MetaSlot::get);
            mo.update(|m| {
                m.to_shared(-1);
                if let Some(p) = probed {
                    m.set_outer(p.outer());
                }
            });
        }
        mo.to_dirty();
    }
    if cmd::is_evict(outer_cmd) || meta.is_none() {
        mo.update(|m| m.sync(inner_id));
    }
}

/// Downgrade-to-Shared transition shared by the MSI-family probes.
pub(crate) fn probe_downgrade_to_shared(meta: &MetaSlot) {
    meta.update(|m| {
        m.to_shared(-1);
        let mut outer = m.outer();
        outer.state = CohState::Shared;
        m.set_outer(outer);
    });
}

/// Builds the policy for a level, given its variant and tree position.
pub fn build_policy(
    name: &str,
    variant: PolicyVariant,
    is_l1: bool,
    uncached_outer: bool,
) -> Result<Arc<dyn CohPolicy>, BuildError> {
    match variant {
        PolicyVariant::Mi => Ok(Arc::new(MiPolicy::new(is_l1, uncached_outer))),
        PolicyVariant::Msi => Ok(Arc::new(MsiPolicy::new(is_l1, uncached_outer))),
        PolicyVariant::Mesi => {
            if is_l1 {
                return Err(BuildError::PolicyNeedsDirectory {
                    name: name.to_string(),
                    policy: "mesi".to_string(),
                });
            }
            Ok(Arc::new(MesiPolicy::new(uncached_outer)))
        }
        PolicyVariant::ExclusiveMsi => {
            Ok(Arc::new(ExclusiveMsiPolicy::new(false, uncached_outer)))
        }
        PolicyVariant::ExclusiveMesi => Ok(Arc::new(ExclusiveMesiPolicy::new(uncached_outer))),
    }
}
