//! Slice-hash tests.
//!
//! The Intel-CAS polynomials are fixed constants; each output bit is the
//! parity of the masked address bits, which the tests recompute
//! independently.

use cohsim_core::slicehash::{SliceHash, SliceIntelCas, SliceNorm};
use rstest::rstest;

/// Independent parity reference for one CAS output bit.
fn parity(mask: u64, addr: u64) -> u32 {
    (mask & addr).count_ones() & 1
}

/// Modulo slicing walks the slices block by block.
#[test]
fn norm_hash_is_block_modulo() {
    let h = SliceNorm::new(4);
    assert_eq!(h.slice(0x000), 0);
    assert_eq!(h.slice(0x040), 1);
    assert_eq!(h.slice(0x080), 2);
    assert_eq!(h.slice(0x0C0), 3);
    assert_eq!(h.slice(0x100), 0);
    assert_eq!(h.slice(0x17F), 1, "offset bits never select the slice");
}

/// The boundary address 0x6A1C0 routes to slice 1 under the 4-slice CAS
/// polynomials.
#[test]
fn cas_routes_the_pinned_address() {
    let h = SliceIntelCas::new(4).expect("4 slices are supported");
    let addr = 0x6A1C0;
    let bit1 = parity(0x6_B5FA_A880, addr);
    let bit0 = parity(0x3_5F57_5440, addr);
    assert_eq!(bit1, 0);
    assert_eq!(bit0, 1);
    assert_eq!(h.slice(addr), 1);
}

/// Every CAS output bit equals the parity of its masked bits.
#[rstest]
#[case(2, &[0x1_5F57_5440])]
#[case(4, &[0x3_5F57_5440, 0x6_B5FA_A880])]
#[case(8, &[0x1B_5F57_5400, 0x2E_B5FA_A880, 0x3C_CCC9_3100])]
fn cas_matches_parity_reference(#[case] slices: usize, #[case] masks: &[u64]) {
    let h = SliceIntelCas::new(slices).expect("supported slice count");
    for i in 0..512u64 {
        let addr = i.wrapping_mul(0x9E37_79B9) & 0xFFFF_FFFF_C0;
        let mut expect = 0u32;
        for (bit, mask) in masks.iter().enumerate() {
            expect |= parity(*mask, addr) << bit;
        }
        assert_eq!(h.slice(addr), expect, "address {addr:#x}");
    }
}

/// One slice degenerates to index zero.
#[test]
fn single_slice_is_constant() {
    let h = SliceIntelCas::new(1).expect("1 slice is supported");
    assert_eq!(h.slice(0xDEAD_BEC0), 0);
}

/// Unsupported slice counts are a construction error.
#[test]
fn unsupported_count_is_rejected() {
    assert!(SliceIntelCas::new(3).is_err());
    assert!(SliceIntelCas::new(16).is_err());
}
