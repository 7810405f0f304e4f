//! Outer ports.
//!
//! The outer port of a cache faces its parent: it issues acquires and
//! writebacks upward, forwards finishes, and answers probes coming down.
//! Probe handling depends on the cache's containment flavor; the exclusive
//! flavors reconstruct lines from the inner hierarchy through staging
//! buffers.

use std::sync::{Arc, OnceLock, Weak};

use crate::cache::meta::MetaSlot;
use crate::cache::{CacheAccess, EvictKind};
use crate::coherence::cmd::{self, CohCmd};
use crate::coherence::policy::CohPolicy;
use crate::coherence::{CohClient, CohMaster, InnerProbe};
use crate::common::error::BuildError;
use crate::common::DataSlot;
use crate::sync::XactPrio;

/// Probe-handling flavor of an outer port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeHandling {
    /// Probes are not supported (uncached client or last level under
    /// memory).
    None,
    /// Inclusive handling: the probed line is local, inner levels are
    /// synchronized first.
    Inclusive,
    /// Broadcast-exclusive handling: a missing line may still live in the
    /// inner hierarchy and is reconstructed through a buffer.
    ExclusiveBroadcast,
    /// Directory-exclusive handling: extended ways track inner copies.
    ExclusiveDirectory,
}

struct Link {
    master: Arc<dyn CohMaster>,
    id: i16,
    parent_policy: Arc<dyn CohPolicy>,
}

/// The outer port of one cache.
pub struct OuterPort {
    name: String,
    cache: Arc<dyn CacheAccess>,
    policy: Arc<dyn CohPolicy>,
    probe: ProbeHandling,
    inner: OnceLock<Weak<dyn InnerProbe>>,
    link: OnceLock<Link>,
}

impl OuterPort {
    /// Creates an unconnected outer port.
    pub fn new(
        name: &str,
        cache: Arc<dyn CacheAccess>,
        policy: Arc<dyn CohPolicy>,
        probe: ProbeHandling,
    ) -> Self {
        Self {
            name: name.to_string(),
            cache,
            policy,
            probe,
            inner: OnceLock::new(),
            link: OnceLock::new(),
        }
    }

    /// Wires the co-located inner port (deferred, the two reference each
    /// other).
    pub fn set_inner(&self, inner: Weak<dyn InnerProbe>) {
        if self.inner.set(inner).is_err() {
            panic!("cache `{}`: inner port wired twice", self.name);
        }
    }

    /// Connects this port to its parent.
    pub fn connect_to(
        self: &Arc<Self>,
        master: &Arc<dyn CohMaster>,
        uncached: bool,
    ) -> Result<(), BuildError> {
        let client: Arc<dyn CohClient> = Arc::clone(self) as Arc<dyn CohClient>;
        let (id, parent_policy) = master.connect(client, uncached)?;
        let link = Link {
            master: Arc::clone(master),
            id,
            parent_policy,
        };
        self.link
            .set(link)
            .map_err(|_| BuildError::AlreadyConnected {
                name: self.name.clone(),
            })
    }

    fn link(&self) -> &Link {
        match self.link.get() {
            Some(l) => l,
            None => panic!("cache `{}`: outer port used before connect", self.name),
        }
    }

    fn inner(&self) -> Arc<dyn InnerProbe> {
        match self.inner.get().and_then(Weak::upgrade) {
            Some(i) => i,
            None => panic!("cache `{}`: inner port dropped or unwired", self.name),
        }
    }

    /// This port's child id at the parent.
    pub fn coh_id(&self) -> i16 {
        self.link().id
    }

    /// Whether the parent treats this cache as an uncached client.
    pub fn is_uncached_client(&self) -> bool {
        self.link().id == -1
    }

    /// Release command the parent wants for clean inner evictions, if any.
    pub fn parent_wants_release(&self) -> Option<CohCmd> {
        self.link().parent_policy.inner_need_release()
    }

    /// Fetches `addr` from the parent into `meta`/`data`.
    ///
    /// The parent writes the granted permission into `meta`'s shadow record;
    /// the local state transition follows through `meta_after_fetch`.
    pub fn acquire_req(
        &self,
        addr: u64,
        meta: &MetaSlot,
        data: Option<&DataSlot>,
        acmd: CohCmd,
        delay: &mut u64,
    ) {
        let link = self.link();
        let c = CohCmd { id: link.id, ..acmd };
        tracing::trace!(target: "cohsim::coh", cache = %self.name, addr, act = c.act, "acquire");
        link.master.acquire_resp(addr, data, Some(meta), c, delay);
        self.policy.meta_after_fetch(c, meta, addr);
    }

    /// Sends a release or flush to the parent.
    pub fn writeback_req(
        &self,
        addr: u64,
        meta: Option<&MetaSlot>,
        data: Option<&DataSlot>,
        wcmd: CohCmd,
        delay: &mut u64,
    ) {
        let link = self.link();
        let c = CohCmd { id: link.id, ..wcmd };
        tracing::trace!(target: "cohsim::coh", cache = %self.name, addr, msg = c.msg, act = c.act, "writeback");
        link.master.writeback_resp(addr, data, meta, c, delay);
        self.policy.meta_after_writeback(c, meta);
    }

    /// Closes an acquire at the parent, unlocking the granted line there.
    pub fn finish_req(&self, addr: u64) {
        let link = self.link();
        link.master.finish_resp(addr, cmd::cmd_for_finish(link.id));
    }

    fn probe_resp_inclusive(
        &self,
        addr: u64,
        meta_outer: Option<&MetaSlot>,
        data_outer: Option<&DataSlot>,
        pcmd: CohCmd,
        delay: &mut u64,
    ) -> (bool, bool) {
        let hit_loc = self.cache.hit(addr, Some(XactPrio::Probe));
        let mut writeback = false;
        if let Some(loc) = hit_loc {
            let meta = self.cache.meta(loc);
            let data = self.cache.data(loc);

            // sync the inner levels if necessary
            if let Some(sync) = self.policy.probe_need_sync(pcmd, Some(&meta.get())) {
                let (_phit, pwb) = self.inner().probe_req(addr, Some(meta), data, sync, delay);
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

            // hand the dirty copy to the parent
            if self.policy.probe_need_writeback(pcmd, &meta.get()) {
                writeback = true;
                if let (Some(out), Some(d)) = (data_outer, data) {
                    out.copy_from(d);
                }
                meta.to_clean();
            }

            self.policy
                .meta_after_probe(pcmd, Some(meta), meta_outer, self.coh_id(), writeback);
            let ek = if cmd::is_evict(pcmd) {
                EvictKind::Probe
            } else {
                EvictKind::Keep
            };
            self.cache.replace_manage(loc, true, ek);
            self.cache.hook_manage(
                addr,
                Some(loc),
                true,
                ek,
                writeback,
                Some(meta.get()),
                data.map(DataSlot::get),
                delay,
            );
            self.cache.gate_reset(loc.0, loc.1, XactPrio::Probe);
        } else {
            // still clear this child from the parent's sharer record
            self.policy
                .meta_after_probe(pcmd, None, meta_outer, self.coh_id(), false);
            self.cache
                .hook_manage(addr, None, false, EvictKind::Keep, false, None, None, delay);
        }
        (hit_loc.is_some(), writeback)
    }
}

impl CohClient for OuterPort {
    fn probe_resp(
        &self,
        addr: u64,
        meta_outer: Option<&MetaSlot>,
        data_outer: Option<&DataSlot>,
        pcmd: CohCmd,
        delay: &mut u64,
    ) -> (bool, bool) {
        tracing::trace!(target: "cohsim::coh", cache = %self.name, addr, act = pcmd.act, "probe");
        match self.probe {
            ProbeHandling::None => (false, false),
            ProbeHandling::Inclusive => {
                self.probe_resp_inclusive(addr, meta_outer, data_outer, pcmd, delay)
            }
            ProbeHandling::ExclusiveBroadcast => crate::coherence::exclusive::probe_resp_broadcast(
                self, addr, meta_outer, data_outer, pcmd, delay,
            ),
            ProbeHandling::ExclusiveDirectory => crate::coherence::exclusive::probe_resp_directory(
                self, addr, meta_outer, data_outer, pcmd, delay,
            ),
        }
    }
}

impl OuterPort {
    /// The owning cache; exclusive probe handlers live in a sibling module.
    pub(crate) fn cache(&self) -> &Arc<dyn CacheAccess> {
        &self.cache
    }

    /// The owning cache's policy.
    pub(crate) fn policy(&self) -> &Arc<dyn CohPolicy> {
        &self.policy
    }

    /// The co-located inner port.
    pub(crate) fn inner_port(&self) -> Arc<dyn InnerProbe> {
        self.inner()
    }
}

impl std::fmt::Debug for OuterPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OuterPort")
            .field("name", &self.name)
            .field("probe", &self.probe)
            .field("connected", &self.link.get().is_some())
            .finish()
    }
}
