//! Per-line coherence metadata.
//!
//! Every cache line carries a local coherence state, a parent-visible shadow
//! record, a tag, and (for directory caches) a bitmap of inner sharers:
//! 1. **`CohState`:** MOESI state encoding where "writable" is state bit 2.
//! 2. **`OuterMeta`:** The state of this line as seen by the parent cache;
//!    the dirty bit lives here so eviction releases the parent-visible dirty
//!    cleanly.
//! 3. **`Meta`:** The full per-line record.
//! 4. **`MetaSlot`:** The shared array cell: a short-guard record plus the
//!    protocol line lock held from acquire until finish.

use std::fmt;
use std::sync::Mutex;

use crate::common::addr::{block_number, BLOCK_OFFSET};
use crate::sync::{guard, LineLock};

/// Coherence state of a cache line.
///
/// The encoding makes the "writable" predicate a single mask: bit 2 is set
/// exactly for the states that permit local writes (Modified, Exclusive).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CohState {
    /// No valid copy.
    #[default]
    Invalid = 0,
    /// Clean, possibly shared.
    Shared = 1,
    /// Possibly dirty, shared (owner responsible for writeback).
    Owned = 2,
    /// Clean, sole copy; may self-promote to Modified.
    Exclusive = 4,
    /// Possibly dirty, sole writable copy.
    Modified = 6,
}

impl CohState {
    /// Whether this state holds a valid copy.
    #[inline(always)]
    pub fn is_valid(self) -> bool {
        self != Self::Invalid
    }

    /// Whether this state permits local writes (state bit 2).
    #[inline(always)]
    pub fn allow_write(self) -> bool {
        (self as u8) & 0b100 != 0
    }
}

impl fmt::Display for CohState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Self::Invalid => 'I',
            Self::Shared => 'S',
            Self::Owned => 'O',
            Self::Exclusive => 'E',
            Self::Modified => 'M',
        };
        write!(f, "{c}")
    }
}

/// The parent-visible shadow record of a line.
///
/// `state` is the permission granted by the parent; `dirty` marks data newer
/// than the parent's copy. The grant path writes this record directly: a
/// child passes its slot upward on acquire and the parent records the granted
/// permission here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OuterMeta {
    /// Permission held from the parent.
    pub state: CohState,
    /// Whether the local data is newer than the parent's copy.
    pub dirty: bool,
}

impl OuterMeta {
    /// Whether the parent granted any permission.
    #[inline(always)]
    pub fn is_valid(self) -> bool {
        self.state.is_valid()
    }

    /// Whether the parent's grant permits writes.
    #[inline(always)]
    pub fn allow_write(self) -> bool {
        self.state.allow_write()
    }
}

/// The full per-line metadata record.
#[derive(Clone, Copy, Debug, Default)]
pub struct Meta {
    state: CohState,
    outer: OuterMeta,
    extend: bool,
    relocated: bool,
    tag: u64,
    sharer: u64,
}

impl Meta {
    /// Whether the line holds a valid copy.
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    /// Whether `addr` maps to this line.
    #[inline(always)]
    pub fn match_addr(&self, addr: u64) -> bool {
        self.is_valid() && self.tag == block_number(addr)
    }

    /// Reassembles the block address from the tag.
    #[inline(always)]
    pub fn addr(&self) -> u64 {
        self.tag << BLOCK_OFFSET
    }

    /// Local coherence state.
    #[inline(always)]
    pub fn state(&self) -> CohState {
        self.state
    }

    /// The parent-visible shadow record.
    #[inline(always)]
    pub fn outer(&self) -> OuterMeta {
        self.outer
    }

    /// Whether the line is dirty (held in the shadow record).
    #[inline(always)]
    pub fn is_dirty(&self) -> bool {
        self.outer.dirty
    }

    /// Whether the parent's grant permits writes.
    #[inline(always)]
    pub fn allow_write(&self) -> bool {
        self.outer.allow_write()
    }

    /// Whether the local state is Shared.
    #[inline(always)]
    pub fn is_shared(&self) -> bool {
        self.state == CohState::Shared
    }

    /// Whether the local state is Modified.
    #[inline(always)]
    pub fn is_modified(&self) -> bool {
        self.state == CohState::Modified
    }

    /// Whether the local state is Exclusive.
    #[inline(always)]
    pub fn is_exclusive(&self) -> bool {
        self.state == CohState::Exclusive
    }

    /// Whether this slot belongs to the extended-directory region.
    #[inline(always)]
    pub fn is_extend(&self) -> bool {
        self.extend
    }

    /// Whether the line was already relocated in the current remap epoch.
    #[inline(always)]
    pub fn is_relocated(&self) -> bool {
        self.relocated
    }

    /// The inner-sharer bitmap (directory caches).
    #[inline(always)]
    pub fn sharer(&self) -> u64 {
        self.sharer
    }

    /// Whether `id` is a recorded sharer.
    #[inline(always)]
    pub fn is_sharer(&self, id: i16) -> bool {
        id >= 0 && self.sharer & (1u64 << id) != 0
    }

    /// Whether `id` is the only recorded sharer.
    #[inline(always)]
    pub fn is_exclusive_sharer(&self, id: i16) -> bool {
        id >= 0 && self.sharer == 1u64 << id
    }

    /// Initializes the record for a new address: sets the tag, drops the
    /// local state and sharers. The shadow record is left for the grant path.
    pub fn init(&mut self, addr: u64) {
        self.tag = block_number(addr);
        self.state = CohState::Invalid;
        self.sharer = 0;
        self.relocated = false;
    }

    /// Invalidates the line: local state, sharers, and the shadow record.
    pub fn to_invalid(&mut self) {
        self.state = CohState::Invalid;
        self.sharer = 0;
        self.outer = OuterMeta::default();
    }

    /// Moves to Shared, recording `id` as a sharer when non-negative.
    pub fn to_shared(&mut self, id: i16) {
        self.state = CohState::Shared;
        self.add_sharer(id);
    }

    /// Moves to Modified, recording `id` as a sharer when non-negative.
    pub fn to_modified(&mut self, id: i16) {
        self.state = CohState::Modified;
        self.add_sharer(id);
    }

    /// Moves to Exclusive, recording `id` as a sharer when non-negative.
    pub fn to_exclusive(&mut self, id: i16) {
        self.state = CohState::Exclusive;
        self.add_sharer(id);
    }

    /// Moves to Owned, recording `id` as a sharer when non-negative.
    pub fn to_owned_state(&mut self, id: i16) {
        self.state = CohState::Owned;
        self.add_sharer(id);
    }

    /// Marks the line dirty (in the shadow record).
    pub fn to_dirty(&mut self) {
        self.outer.dirty = true;
    }

    /// Marks the line clean.
    pub fn to_clean(&mut self) {
        self.outer.dirty = false;
    }

    /// Flags the slot as extended-directory storage.
    pub fn to_extend(&mut self) {
        self.extend = true;
    }

    /// Marks the line relocated in the current remap epoch.
    pub fn to_relocated(&mut self) {
        self.relocated = true;
    }

    /// Clears the relocation mark at the end of a remap epoch.
    pub fn to_unrelocated(&mut self) {
        self.relocated = false;
    }

    /// Clears `id` from the sharer bitmap after a probe or release.
    pub fn sync(&mut self, id: i16) {
        if id >= 0 {
            self.sharer &= !(1u64 << id);
        }
    }

    /// Overwrites the shadow record.
    pub fn set_outer(&mut self, outer: OuterMeta) {
        self.outer = outer;
    }

    /// Copies state, shadow record, and sharers from another record.
    /// The tag is deliberately not copied; relocation re-initializes it.
    pub fn copy_state_from(&mut self, other: &Meta) {
        self.state = other.state;
        self.outer = other.outer;
        self.sharer = other.sharer;
    }

    #[inline(always)]
    fn add_sharer(&mut self, id: i16) {
        if id >= 0 {
            self.sharer |= 1u64 << id;
        }
    }
}

impl fmt::Display for Meta {
    /// Compact `<state><d|c><W|R>` rendering used by tracers.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.state,
            if self.is_dirty() { 'd' } else { 'c' },
            if self.allow_write() { 'W' } else { 'R' }
        )
    }
}

/// A shared metadata cell: the record behind a short-lived guard plus the
/// protocol line lock.
///
/// Ports at different levels exchange `&MetaSlot` references; every state
/// access takes the internal guard briefly, so no level holds another level's
/// record locked across a port call. The separate [`LineLock`] implements the
/// acquire-to-finish protocol lock.
#[derive(Debug, Default)]
pub struct MetaSlot {
    meta: Mutex<Meta>,
    lock: LineLock,
}

impl MetaSlot {
    /// Creates an invalid slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an invalid slot pre-flagged as extended-directory storage.
    pub fn new_extend() -> Self {
        let slot = Self::default();
        slot.update(Meta::to_extend);
        slot
    }

    /// Returns a snapshot of the record.
    #[inline]
    pub fn get(&self) -> Meta {
        *guard(&self.meta)
    }

    /// Applies `f` to the record under the guard.
    #[inline]
    pub fn update<R>(&self, f: impl FnOnce(&mut Meta) -> R) -> R {
        f(&mut guard(&self.meta))
    }

    /// Takes the protocol line lock.
    #[inline]
    pub fn lock(&self) {
        self.lock.lock();
    }

    /// Releases the protocol line lock.
    #[inline]
    pub fn unlock(&self) {
        self.lock.unlock();
    }

    /// Whether the protocol line lock is held; test hook.
    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    // Short-hand record accessors mirroring the `Meta` API. Each takes the
    // guard once; multi-step transitions should use `update`.

    /// Whether the line holds a valid copy.
    pub fn is_valid(&self) -> bool {
        self.get().is_valid()
    }

    /// Whether `addr` maps to this line.
    pub fn match_addr(&self, addr: u64) -> bool {
        self.get().match_addr(addr)
    }

    /// Reassembled block address.
    pub fn addr(&self) -> u64 {
        self.get().addr()
    }

    /// Whether the line is dirty.
    pub fn is_dirty(&self) -> bool {
        self.get().is_dirty()
    }

    /// Whether this slot is extended-directory storage.
    pub fn is_extend(&self) -> bool {
        self.get().is_extend()
    }

    /// Initializes the record for a new address.
    pub fn init(&self, addr: u64) {
        self.update(|m| m.init(addr));
    }

    /// Invalidates the record.
    pub fn to_invalid(&self) {
        self.update(Meta::to_invalid);
    }

    /// Marks the record dirty.
    pub fn to_dirty(&self) {
        self.update(Meta::to_dirty);
    }

    /// Marks the record clean.
    pub fn to_clean(&self) {
        self.update(Meta::to_clean);
    }

    /// The parent-visible shadow record.
    pub fn outer(&self) -> OuterMeta {
        self.get().outer()
    }

    /// Writes a granted permission into the shadow record.
    ///
    /// Called by the parent while serving this slot's acquire; the grant
    /// never carries dirtiness.
    pub fn grant(&self, state: CohState) {
        self.update(|m| {
            let mut outer = m.outer();
            outer.state = state;
            m.set_outer(outer);
        });
    }

    /// Invalidates only the shadow record (release handling in exclusive
    /// parents; the local record is retired separately by the child).
    pub fn outer_to_invalid(&self) {
        self.update(|m| m.set_outer(OuterMeta::default()));
    }
}
