//! Pending-transaction tables for the finish protocol.
//!
//! When an inner port grants a line to a cached child, the line stays locked
//! until the child's finish arrives. The pending table maps
//! `(requester, address)` to the granted line and a flag saying whether a
//! finish must be forwarded upstream (the grant involved an outer acquire).

use crate::cache::LineLoc;
use crate::sync::guard;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug)]
struct Entry {
    key: u64,
    forward: bool,
    loc: Option<LineLoc>,
}

/// A bounded table of grants awaiting their finish.
///
/// Capacity equals the MSHR depth; overflowing it means the workload carries
/// more in-flight transactions than the cache was configured for, which is a
/// configuration error and aborts.
#[derive(Debug)]
pub struct PendingXact {
    name: String,
    entries: Mutex<Vec<Option<Entry>>>,
}

/// Packs the requester id into the (always zero) block-offset bits of the
/// address, giving a single comparable key. Ids are bounded by the 63-child
/// sharer limit, so six bits suffice.
#[inline]
fn key(addr: u64, id: i16) -> u64 {
    debug_assert!(id < 63, "coherent child ids are limited to 63 per level");
    addr | (id as u64 & 0x3f)
}

impl PendingXact {
    /// Creates a table with `mshr` slots, labeled with the owning cache name
    /// for diagnostics.
    pub fn new(name: &str, mshr: usize) -> Self {
        Self {
            name: name.to_string(),
            entries: Mutex::new(vec![None; mshr.max(1)]),
        }
    }

    /// Records a grant. `forward` marks grants whose completion must be
    /// forwarded upstream; `loc` is the granted line (absent for grants
    /// served from a staging buffer).
    pub fn insert(&self, addr: u64, id: i16, forward: bool, loc: Option<LineLoc>) {
        let mut entries = guard(&self.entries);
        let k = key(addr, id);
        debug_assert!(
            !entries.iter().flatten().any(|e| e.key == k),
            "cache `{}`: duplicate pending transaction for {addr:#x}",
            self.name
        );
        let Some(slot) = entries.iter_mut().find(|e| e.is_none()) else {
            panic!(
                "cache `{}`: pending transaction table overflow at {addr:#x} (raise mshr_depth)",
                self.name
            );
        };
        *slot = Some(Entry {
            key: k,
            forward,
            loc,
        });
    }

    /// Looks up a pending grant without removing it.
    pub fn read(&self, addr: u64, id: i16) -> Option<(bool, Option<LineLoc>)> {
        let entries = guard(&self.entries);
        let k = key(addr, id);
        entries
            .iter()
            .flatten()
            .find(|e| e.key == k)
            .map(|e| (e.forward, e.loc))
    }

    /// Removes a pending grant if present.
    pub fn remove(&self, addr: u64, id: i16) {
        let mut entries = guard(&self.entries);
        let k = key(addr, id);
        for slot in entries.iter_mut() {
            if slot.is_some_and(|e| e.key == k) {
                *slot = None;
                return;
            }
        }
    }
}
