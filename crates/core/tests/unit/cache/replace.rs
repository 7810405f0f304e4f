//! Replacement policy tests.
//!
//! Exercises FIFO, LRU, SRRIP, and Random through the `Replacer` trait:
//! empty-first selection, aging and promotion, demand-update-only, the
//! busy-way marker, and SRRIP's tie-break.

use cohsim_core::cache::replace::{
    build_replacer, FifoReplacer, LruReplacer, Replacer, SrripReplacer,
};
use cohsim_core::config::ReplacePolicy;
use rstest::rstest;

/// Installs a line into `way` the way the ports do: replace handed it out,
/// the first access confirms it.
fn confirm(r: &dyn Replacer, set: u32, way: u32) {
    r.access(set, way, true, false);
}

// ══════════════════════════════════════════════════════════
// 1. Empty-first across all policies
// ══════════════════════════════════════════════════════════

/// With empty-first, every policy hands out all free ways before evicting.
#[rstest]
#[case(ReplacePolicy::Fifo)]
#[case(ReplacePolicy::Lru)]
#[case(ReplacePolicy::Srrip)]
#[case(ReplacePolicy::Random)]
fn empty_first_hands_out_all_free_ways(#[case] kind: ReplacePolicy) {
    let r = build_replacer(kind, 1, 4, true, true);
    let mut seen = [false; 4];
    for i in 0..4 {
        let (w, free) = r.replace(0);
        assert!(!seen[w as usize], "way {w} handed out twice");
        seen[w as usize] = true;
        assert_eq!(free, 3 - i, "free count decrements per hand-out");
        confirm(&*r, 0, w);
    }
}

/// Invalidation returns a way to the free pool and empty-first picks it.
#[rstest]
#[case(ReplacePolicy::Fifo)]
#[case(ReplacePolicy::Lru)]
#[case(ReplacePolicy::Srrip)]
#[case(ReplacePolicy::Random)]
fn invalidation_frees_the_way(#[case] kind: ReplacePolicy) {
    let r = build_replacer(kind, 1, 2, true, true);
    for _ in 0..2 {
        let (w, _) = r.replace(0);
        confirm(&*r, 0, w);
    }
    r.invalidate(0, 1);
    let (w, _) = r.replace(0);
    assert_eq!(w, 1, "the freed way is preferred over an eviction");
}

// ══════════════════════════════════════════════════════════
// 2. FIFO ordering
// ══════════════════════════════════════════════════════════

/// FIFO evicts in installation order regardless of later accesses.
#[test]
fn fifo_evicts_in_install_order() {
    let r = FifoReplacer::new(1, 3, true);
    for w in 0..3 {
        let (got, _) = r.replace(0);
        assert_eq!(got, w);
        confirm(&r, 0, got);
    }
    // touch way 0 again; FIFO must ignore it
    r.access(0, 0, true, false);
    let (victim, _) = r.replace(0);
    assert_eq!(victim, 0, "oldest install is evicted despite the re-access");
}

// ══════════════════════════════════════════════════════════
// 3. LRU recency and demand-update-only
// ══════════════════════════════════════════════════════════

/// LRU promotes on demand access: the untouched way is evicted.
#[test]
fn lru_evicts_least_recent() {
    let r = LruReplacer::new(1, 3, true, true);
    for w in 0..3 {
        let (got, _) = r.replace(0);
        confirm(&r, 0, got);
        assert_eq!(got, w);
    }
    // touch 0 and 1; 2 becomes the LRU
    r.access(0, 0, true, false);
    r.access(0, 1, true, false);
    let (victim, _) = r.replace(0);
    assert_eq!(victim, 2);
}

/// With demand-update-only, coherence accesses do not refresh recency.
#[test]
fn lru_demand_update_only_ignores_releases() {
    let r = LruReplacer::new(1, 2, true, true);
    for w in 0..2 {
        let (got, _) = r.replace(0);
        confirm(&r, 0, got);
        assert_eq!(got, w);
    }
    // a release-class access to way 0 must not promote it
    r.access(0, 0, false, false);
    let (victim, _) = r.replace(0);
    assert_eq!(victim, 0, "way 0 stayed oldest");
}

/// Without demand-update-only, the same access does promote.
#[test]
fn lru_promotes_releases_when_knob_off() {
    let r = LruReplacer::new(1, 2, true, false);
    for w in 0..2 {
        let (got, _) = r.replace(0);
        confirm(&r, 0, got);
        assert_eq!(got, w);
    }
    r.access(0, 0, false, false);
    let (victim, _) = r.replace(0);
    assert_eq!(victim, 1, "way 0 became youngest");
}

// ══════════════════════════════════════════════════════════
// 4. SRRIP
// ══════════════════════════════════════════════════════════

/// New lines insert at RRPV 2; a demand hit promotes to 0; eviction search
/// ages the set and breaks ties by ascending way.
#[test]
fn srrip_promote_and_tiebreak() {
    let r = SrripReplacer::new(1, 3, true, true);
    for w in 0..3 {
        let (got, _) = r.replace(0);
        confirm(&r, 0, got);
        assert_eq!(got, w);
    }
    // all at RRPV 2; promote way 1 to 0
    r.access(0, 1, true, false);
    assert_eq!(r.rank(0, 1), 0);
    // victim search: ways 0 and 2 tie at the maximum; way 0 wins
    let (victim, _) = r.replace(0);
    assert_eq!(victim, 0);
    // the set aged so the maximum reached 3
    assert_eq!(r.rank(0, 2), 3);
    assert_eq!(r.rank(0, 1), 1);
}

// ══════════════════════════════════════════════════════════
// 5. Busy-way marker
// ══════════════════════════════════════════════════════════

/// A way handed to an in-flight replace is excluded until its holder
/// confirms the installation.
#[rstest]
#[case(ReplacePolicy::Fifo)]
#[case(ReplacePolicy::Lru)]
#[case(ReplacePolicy::Srrip)]
#[case(ReplacePolicy::Random)]
fn busy_way_is_not_reselected(#[case] kind: ReplacePolicy) {
    let r = build_replacer(kind, 1, 2, true, true);
    let (first, _) = r.replace(0);
    let (second, _) = r.replace(0);
    assert_ne!(first, second, "a busy way was handed out twice");
}

/// Invalidating a busy way is a no-op; the holder still owns it.
#[test]
fn busy_way_survives_invalidation() {
    let r = FifoReplacer::new(1, 2, true);
    let (first, _) = r.replace(0);
    r.invalidate(0, first);
    let (second, _) = r.replace(0);
    assert_ne!(first, second);
}
