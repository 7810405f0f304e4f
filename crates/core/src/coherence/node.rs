//! Cache node assembly.
//!
//! A node owns its cache storage, inner port, and outer port, and wires the
//! port back-references (the two ports reach each other through the node's
//! deferred assignment, not through back-pointers into the cache).

use std::sync::{Arc, Weak};

use crate::cache::{Cache, CacheAccess};
use crate::coherence::inner::{InclusiveFlavor, InnerFlavor, InnerPort};
use crate::coherence::outer::{OuterPort, ProbeHandling};
use crate::coherence::policy::build_policy;
use crate::coherence::{CohMaster, InnerProbe};
use crate::common::error::BuildError;
use crate::config::{CacheParams, PolicyVariant};
use crate::coherence::core::CoreInterface;
use crate::monitor::Monitor;

/// One coherent cache node.
pub struct CacheNode {
    name: String,
    cache: Arc<dyn CacheAccess>,
    inner: Arc<InnerPort>,
    outer: Arc<OuterPort>,
}

impl std::fmt::Debug for CacheNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheNode").field("name", &self.name).finish()
    }
}

impl CacheNode {
    /// Builds a node with standard (array-backed) storage.
    ///
    /// `is_l1` marks the level driven by cores; `uncached_outer` marks the
    /// level whose parent is the memory leaf.
    pub fn build(
        name: &str,
        params: &CacheParams,
        is_l1: bool,
        uncached_outer: bool,
    ) -> Result<Self, BuildError> {
        if params.policy == PolicyVariant::ExclusiveMesi && params.ext_ways == 0 {
            return Err(BuildError::PolicyNeedsDirectory {
                name: name.to_string(),
                policy: "exclusive_mesi".to_string(),
            });
        }
        let cache: Arc<dyn CacheAccess> = Arc::new(Cache::new(name, params)?);
        let flavor: Box<dyn InnerFlavor> = match params.policy {
            PolicyVariant::ExclusiveMsi => {
                Box::new(crate::coherence::exclusive::ExclusiveBroadcastFlavor)
            }
            PolicyVariant::ExclusiveMesi => {
                Box::new(crate::coherence::exclusive::ExclusiveDirectoryFlavor)
            }
            _ => Box::new(InclusiveFlavor),
        };
        Self::assemble(name, cache, params, is_l1, uncached_outer, flavor)
    }

    /// Assembles a node from pre-built storage and algorithm flavor
    /// (specialized containers use this entry).
    pub fn assemble(
        name: &str,
        cache: Arc<dyn CacheAccess>,
        params: &CacheParams,
        is_l1: bool,
        uncached_outer: bool,
        flavor: Box<dyn InnerFlavor>,
    ) -> Result<Self, BuildError> {
        let policy = build_policy(name, params.policy, is_l1, uncached_outer)?;
        let probe = if uncached_outer {
            // The memory leaf never probes downward.
            ProbeHandling::None
        } else {
            match params.policy {
                PolicyVariant::ExclusiveMsi => ProbeHandling::ExclusiveBroadcast,
                PolicyVariant::ExclusiveMesi => ProbeHandling::ExclusiveDirectory,
                _ => ProbeHandling::Inclusive,
            }
        };
        let outer = Arc::new(OuterPort::new(
            name,
            Arc::clone(&cache),
            Arc::clone(&policy),
            probe,
        ));
        let inner = Arc::new(InnerPort::new(
            name,
            Arc::clone(&cache),
            policy,
            Arc::clone(&outer),
            params.mshr_depth,
            flavor,
        ));
        let weak: Weak<dyn InnerProbe> = {
            let w: Weak<InnerPort> = Arc::downgrade(&inner);
            w
        };
        outer.set_inner(weak);
        Ok(Self {
            name: name.to_string(),
            cache,
            inner,
            outer,
        })
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cache storage.
    pub fn cache(&self) -> &Arc<dyn CacheAccess> {
        &self.cache
    }

    /// The inner port as a connect target for children.
    pub fn master(&self) -> Arc<dyn CohMaster> {
        Arc::clone(&self.inner) as Arc<dyn CohMaster>
    }

    /// The inner port itself.
    pub fn inner(&self) -> &Arc<InnerPort> {
        &self.inner
    }

    /// The outer port.
    pub fn outer(&self) -> &Arc<OuterPort> {
        &self.outer
    }

    /// Connects this node's outer port to a parent.
    pub fn connect_to(
        &self,
        parent: &Arc<dyn CohMaster>,
        uncached: bool,
    ) -> Result<(), BuildError> {
        self.outer.connect_to(parent, uncached)
    }

    /// A core driver handle on this node (meaningful for L1 nodes).
    pub fn core_interface(&self) -> CoreInterface {
        CoreInterface::new(Arc::clone(&self.inner))
    }

    /// Attaches a monitor to this node's cache.
    pub fn attach_monitor(&self, monitor: &Arc<dyn Monitor>) {
        self.cache.monitors().attach(monitor);
    }

    /// Detaches all monitors.
    pub fn detach_monitors(&self) {
        self.cache.monitors().detach_all();
    }
}
