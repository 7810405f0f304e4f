//! The coherence engine.
//!
//! A hierarchy is a tree of cache nodes rooted at memory. Each node exposes
//! an **inner port** toward the cores and an **outer port** toward memory;
//! cross-node communication happens exclusively through the two port traits:
//! 1. **[`CohMaster`]:** The parent-facing side of an inner port (or the
//!    memory leaf, or a slice dispatcher): serves acquire, release/flush,
//!    and finish.
//! 2. **[`CohClient`]:** The child-facing side of an outer port: serves
//!    probes.
//!
//! A driver operation enters at an L1's [`core::CoreInterface`], recurses
//! outward until memory terminates it, and unwinds with data and updated
//! coherence state.

/// Coherence message encoding.
pub mod cmd;

/// The per-core driver interface.
pub mod core;

/// Address-hashed routing to sliced last-level caches.
pub mod dispatcher;

/// Exclusive-cache port algorithms.
pub mod exclusive;

/// Inner ports: acquire, release, probe fan-out, flush, finish.
pub mod inner;

/// Cache node assembly and wiring.
pub mod node;

/// Outer ports: requests to the parent and probe handling.
pub mod outer;

/// Coherence policies.
pub mod policy;

use std::sync::Arc;

use crate::cache::meta::MetaSlot;
use crate::common::error::BuildError;
use crate::common::DataSlot;
use cmd::CohCmd;
use policy::CohPolicy;

/// Parent-facing interface of an inner port, the memory leaf, or a slice
/// dispatcher.
pub trait CohMaster: Send + Sync {
    /// Registers a child and returns its identifier together with this
    /// level's policy (consulted by the child on clean evictions).
    ///
    /// Uncached clients are not registered and receive the id -1: they are
    /// never probed, never tracked as sharers, and their acquires unlock
    /// immediately without a finish.
    fn connect(
        &self,
        client: Arc<dyn CohClient>,
        uncached: bool,
    ) -> Result<(i16, Arc<dyn CohPolicy>), BuildError>;

    /// Serves an acquire: fills `data_inner` and records the granted
    /// permission in `meta_inner`.
    fn acquire_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        cmd: CohCmd,
        delay: &mut u64,
    );

    /// Serves a release or a forwarded flush.
    fn writeback_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        cmd: CohCmd,
        delay: &mut u64,
    );

    /// Closes an acquire transaction: unlocks the granted line.
    fn finish_resp(&self, addr: u64, cmd: CohCmd);
}

/// Child-facing interface of an outer port.
pub trait CohClient: Send + Sync {
    /// Serves a probe from the parent.
    ///
    /// `meta_outer`/`data_outer` reference the parent's line; a dirty copy is
    /// written into them. Returns `(had_copy, carried_writeback)`.
    fn probe_resp(
        &self,
        addr: u64,
        meta_outer: Option<&MetaSlot>,
        data_outer: Option<&DataSlot>,
        cmd: CohCmd,
        delay: &mut u64,
    ) -> (bool, bool);
}

/// Inner-port view used by the co-located outer port to forward probes.
pub trait InnerProbe: Send + Sync {
    /// Fans a probe out to the qualifying children.
    fn probe_req(
        &self,
        addr: u64,
        meta: Option<&MetaSlot>,
        data: Option<&DataSlot>,
        cmd: CohCmd,
        delay: &mut u64,
    ) -> (bool, bool);
}
