//! Address-hashed routing to sliced last-level caches.
//!
//! A dispatcher sits between an outer port and several peer inner ports (the
//! LLC slices). It owns the slice-hash function and forwards acquires,
//! writebacks, and finishes unchanged to the selected slice; it has no state
//! beyond its slice vector. Probes flow directly from each slice to the
//! registered clients, so `connect` registers the client with every slice
//! and returns the common identifier.

use std::sync::{Arc, PoisonError, RwLock};

use crate::cache::meta::MetaSlot;
use crate::coherence::cmd::CohCmd;
use crate::coherence::policy::CohPolicy;
use crate::coherence::{CohClient, CohMaster};
use crate::common::error::BuildError;
use crate::common::DataSlot;
use crate::slicehash::SliceHash;

/// Stateless slice router.
pub struct SliceDispatcher {
    name: String,
    slices: RwLock<Vec<Arc<dyn CohMaster>>>,
    hasher: Box<dyn SliceHash + Send + Sync>,
}

impl SliceDispatcher {
    /// Creates a dispatcher over the given slice-hash function.
    pub fn new(name: &str, hasher: Box<dyn SliceHash + Send + Sync>) -> Self {
        Self {
            name: name.to_string(),
            slices: RwLock::new(Vec::new()),
            hasher,
        }
    }

    /// Registers one LLC slice (construction time, in slice-index order).
    pub fn connect_slice(&self, slice: Arc<dyn CohMaster>) {
        self.slices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(slice);
    }

    fn slice_for(&self, addr: u64) -> Arc<dyn CohMaster> {
        let slices = self.slices.read().unwrap_or_else(PoisonError::into_inner);
        let idx = self.hasher.slice(addr) as usize;
        assert!(
            idx < slices.len(),
            "dispatcher `{}`: hash selected slice {idx} of {}",
            self.name,
            slices.len()
        );
        Arc::clone(&slices[idx])
    }
}

impl CohMaster for SliceDispatcher {
    fn connect(
        &self,
        client: Arc<dyn CohClient>,
        uncached: bool,
    ) -> Result<(i16, Arc<dyn CohPolicy>), BuildError> {
        let slices = self.slices.read().unwrap_or_else(PoisonError::into_inner);
        let mut assigned: Option<(i16, Arc<dyn CohPolicy>)> = None;
        for slice in slices.iter() {
            let (id, policy) = slice.connect(Arc::clone(&client), uncached)?;
            match &assigned {
                None => assigned = Some((id, policy)),
                Some((first, _)) if *first == id => {}
                Some(_) => {
                    return Err(BuildError::InconsistentSliceIds {
                        client: self.name.clone(),
                    })
                }
            }
        }
        assigned.ok_or_else(|| {
            BuildError::Config(format!("dispatcher `{}` has no slices", self.name))
        })
    }

    fn acquire_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        cmd: CohCmd,
        delay: &mut u64,
    ) {
        self.slice_for(addr)
            .acquire_resp(addr, data_inner, meta_inner, cmd, delay);
    }

    fn writeback_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        cmd: CohCmd,
        delay: &mut u64,
    ) {
        self.slice_for(addr)
            .writeback_resp(addr, data_inner, meta_inner, cmd, delay);
    }

    fn finish_resp(&self, addr: u64, cmd: CohCmd) {
        self.slice_for(addr).finish_resp(addr, cmd);
    }
}

impl std::fmt::Debug for SliceDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceDispatcher")
            .field("name", &self.name)
            .field(
                "slices",
                &self
                    .slices
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .finish()
    }
}
