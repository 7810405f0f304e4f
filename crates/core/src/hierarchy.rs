//! Hierarchy builder.
//!
//! Wires a validated tree from a [`Config`]: one L1 per core, shared mid
//! levels, an optionally sliced last level, and the memory leaf. Nodes are
//! built bottom-up and connected through the bidirectional `connect`
//! protocol; nothing is mutated after construction.

use std::sync::Arc;

use crate::coherence::core::CoreInterface;
use crate::coherence::dispatcher::SliceDispatcher;
use crate::coherence::node::CacheNode;
use crate::coherence::CohMaster;
use crate::common::error::BuildError;
use crate::config::Config;
use crate::memory::SimpleMemory;
use crate::monitor::Monitor;
use crate::slicehash::build_slice_hash;

/// A fully wired hierarchy.
#[derive(Debug)]
pub struct Hierarchy {
    /// Driver interfaces, one per core.
    pub cores: Vec<CoreInterface>,
    /// All cache nodes, L1s first, then outward levels (slices in order).
    pub nodes: Vec<CacheNode>,
    /// The memory leaf.
    pub memory: Arc<SimpleMemory>,
    dispatcher: Option<Arc<SliceDispatcher>>,
}

impl Hierarchy {
    /// Attaches a monitor to every node and the memory.
    pub fn attach_monitor(&self, monitor: &Arc<dyn Monitor>) {
        for node in &self.nodes {
            node.attach_monitor(monitor);
        }
        self.memory.attach_monitor(monitor);
    }

    /// The slice dispatcher, when the last level is sliced.
    pub fn dispatcher(&self) -> Option<&Arc<SliceDispatcher>> {
        self.dispatcher.as_ref()
    }
}

/// Builds the configured hierarchy.
pub fn build(config: &Config) -> Result<Hierarchy, BuildError> {
    if config.cores == 0 {
        return Err(BuildError::Config("at least one core is required".into()));
    }
    if config.levels.is_empty() {
        return Err(BuildError::Config(
            "at least one cache level is required".into(),
        ));
    }
    if config.llc_slices == 0 {
        return Err(BuildError::Config("llc_slices must be non-zero".into()));
    }

    let memory = Arc::new(SimpleMemory::new("mem", config.memory_delay));
    let memory_master: Arc<dyn CohMaster> = Arc::clone(&memory) as Arc<dyn CohMaster>;

    let last = config.levels.len() - 1;
    let mut nodes: Vec<CacheNode> = Vec::new();
    let mut dispatcher = None;

    // Build outward-in: the parent master of each level.
    let mut parent: Arc<dyn CohMaster> = memory_master;

    // Last level (possibly sliced) down to level 1 are shared.
    let mut shared_levels: Vec<Vec<CacheNode>> = Vec::new();
    for (li, params) in config.levels.iter().enumerate().skip(1).rev() {
        let uncached_outer = li == last;
        let sliced = li == last && config.llc_slices > 1;
        let count = if sliced { config.llc_slices } else { 1 };
        let mut level_nodes = Vec::with_capacity(count);
        for slice in 0..count {
            let name = if sliced {
                format!("l{}s{slice}", li + 1)
            } else {
                format!("l{}", li + 1)
            };
            let node = CacheNode::build(&name, params, false, uncached_outer)?;
            node.connect_to(&parent, false)?;
            level_nodes.push(node);
        }
        parent = if sliced {
            let hasher = build_slice_hash(config.slice_hash, config.llc_slices)?;
            let disp = Arc::new(SliceDispatcher::new("llc", hasher));
            for node in &level_nodes {
                disp.connect_slice(node.master());
            }
            dispatcher = Some(Arc::clone(&disp));
            Arc::clone(&disp) as Arc<dyn CohMaster>
        } else {
            level_nodes[0].master()
        };
        shared_levels.push(level_nodes);
    }

    // L1s, one per core, over the innermost shared level (or memory).
    let mut cores = Vec::with_capacity(config.cores);
    let l1_uncached_outer = config.levels.len() == 1;
    for c in 0..config.cores {
        let name = format!("l1-{c}");
        let node = CacheNode::build(&name, &config.levels[0], true, l1_uncached_outer)?;
        node.connect_to(&parent, false)?;
        cores.push(node.core_interface());
        nodes.push(node);
    }

    // Keep the shared levels inner-first in the node list.
    for level in shared_levels.into_iter().rev() {
        nodes.extend(level);
    }

    Ok(Hierarchy {
        cores,
        nodes,
        memory,
        dispatcher,
    })
}
