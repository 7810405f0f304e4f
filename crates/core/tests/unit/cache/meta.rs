//! Per-line metadata tests.
//!
//! Verifies the MOESI state encoding (writable = bit 2), the parent-visible
//! shadow record, sharer bookkeeping, and the slot-level grant path.

use cohsim_core::cache::meta::{CohState, Meta, MetaSlot};
use pretty_assertions::assert_eq;

// ══════════════════════════════════════════════════════════
// 1. State encoding
// ══════════════════════════════════════════════════════════

/// The writable predicate is a single mask on state bit 2.
#[test]
fn writable_states_are_modified_and_exclusive() {
    assert!(CohState::Modified.allow_write());
    assert!(CohState::Exclusive.allow_write());
    assert!(!CohState::Shared.allow_write());
    assert!(!CohState::Owned.allow_write());
    assert!(!CohState::Invalid.allow_write());
}

/// Invalid is the only non-valid state.
#[test]
fn validity_follows_state() {
    assert!(!CohState::Invalid.is_valid());
    assert!(CohState::Shared.is_valid());
    assert!(CohState::Owned.is_valid());
    assert!(CohState::Exclusive.is_valid());
    assert!(CohState::Modified.is_valid());
}

// ══════════════════════════════════════════════════════════
// 2. Record transitions
// ══════════════════════════════════════════════════════════

/// init sets the tag and drops state and sharers; the address reassembles.
#[test]
fn init_records_the_block_address() {
    let mut m = Meta::default();
    m.init(0x1040);
    assert!(!m.is_valid());
    assert_eq!(m.addr(), 0x1040);
    m.to_shared(-1);
    assert!(m.match_addr(0x1040));
    assert!(m.match_addr(0x1077), "offset bits never affect matching");
    assert!(!m.match_addr(0x1080));
}

/// The dirty bit lives in the shadow record and survives local transitions.
#[test]
fn dirty_is_held_by_the_shadow_record() {
    let mut m = Meta::default();
    m.init(0x40);
    m.to_modified(-1);
    m.to_dirty();
    assert!(m.is_dirty());
    assert!(m.outer().dirty);
    m.to_shared(-1);
    assert!(m.is_dirty(), "local downgrades do not clean the line");
    m.to_clean();
    assert!(!m.is_dirty());
}

/// Invalidation clears state, sharers, and the shadow record together.
#[test]
fn invalidation_clears_everything() {
    let mut m = Meta::default();
    m.init(0x40);
    m.to_modified(3);
    m.to_dirty();
    m.to_invalid();
    assert!(!m.is_valid());
    assert!(!m.is_dirty());
    assert_eq!(m.sharer(), 0);
    assert_eq!(m.outer().state, CohState::Invalid);
}

// ══════════════════════════════════════════════════════════
// 3. Sharer bookkeeping
// ══════════════════════════════════════════════════════════

/// Transitions with a non-negative id record the sharer; sync removes it.
#[test]
fn sharers_accumulate_and_sync_removes() {
    let mut m = Meta::default();
    m.init(0x40);
    m.to_shared(0);
    m.to_shared(2);
    assert!(m.is_sharer(0));
    assert!(m.is_sharer(2));
    assert!(!m.is_sharer(1));
    m.sync(0);
    assert!(!m.is_sharer(0));
    assert!(m.is_sharer(2));
}

/// The id -1 stands for nobody and records nothing.
#[test]
fn anonymous_transitions_record_no_sharer() {
    let mut m = Meta::default();
    m.init(0x40);
    m.to_shared(-1);
    assert_eq!(m.sharer(), 0);
    assert!(!m.is_exclusive_sharer(-1));
}

/// A sole sharer is exclusive; a second sharer is not.
#[test]
fn exclusive_sharer_requires_a_singleton() {
    let mut m = Meta::default();
    m.init(0x40);
    m.to_shared(5);
    assert!(m.is_exclusive_sharer(5));
    m.to_shared(6);
    assert!(!m.is_exclusive_sharer(5));
    assert!(!m.is_exclusive_sharer(6));
}

// ══════════════════════════════════════════════════════════
// 4. Slots and grants
// ══════════════════════════════════════════════════════════

/// A grant writes the shadow record without touching the local state.
#[test]
fn grant_targets_the_shadow_record() {
    let slot = MetaSlot::new();
    slot.init(0x40);
    slot.grant(CohState::Exclusive);
    let m = slot.get();
    assert_eq!(m.outer().state, CohState::Exclusive);
    assert!(!m.is_valid(), "local state is set by meta_after_fetch");
    assert!(m.allow_write());
}

/// The protocol line lock is manual and reports its state.
#[test]
fn line_lock_round_trip() {
    let slot = MetaSlot::new();
    assert!(!slot.is_locked());
    slot.lock();
    assert!(slot.is_locked());
    slot.unlock();
    assert!(!slot.is_locked());
}

/// Extended slots keep their flag across init.
#[test]
fn extend_flag_survives_init() {
    let slot = MetaSlot::new_extend();
    slot.init(0x40);
    assert!(slot.is_extend());
}

/// The compact display encodes state, dirtiness, and writability.
#[test]
fn display_encodes_state_dirty_writable() {
    let mut m = Meta::default();
    m.init(0x40);
    m.to_modified(-1);
    m.set_outer(cohsim_core::cache::meta::OuterMeta {
        state: CohState::Modified,
        dirty: true,
    });
    assert_eq!(m.to_string(), "MdW");
}
