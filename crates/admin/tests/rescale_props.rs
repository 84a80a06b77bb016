//! Property tests for the sqrt_k rescale.

use perp_admin::{rescale, AdminError};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Inputs small enough that `s * n` fits in u128, so a plain u128 reference
/// computation is exact
fn narrow_inputs() -> impl Strategy<Value = (u128, u128, u128)> {
    (any::<u64>(), any::<u64>(), 1u64..=u64::MAX)
        .prop_map(|(s, n, d)| (s as u128, n as u128, d as u128))
}

proptest! {
    #[test]
    fn prop_rescale_is_exact_floor((s, n, d) in narrow_inputs()) {
        prop_assert_eq!(rescale(s, n, d).unwrap(), s * n / d);
    }

    /// Multiply before divide: a ratio below one still scales down
    /// proportionally instead of truncating to zero
    #[test]
    fn prop_rescale_multiplies_before_dividing(
        s in 1u128..=u64::MAX as u128,
        d in 2u128..1_000,
    ) {
        let n = d - 1;
        let scaled = rescale(s, n, d).unwrap();
        prop_assert_eq!(scaled, s * n / d);
        prop_assert!(scaled <= s);
    }

    #[test]
    fn prop_identity_ratio(s in any::<u128>(), k in 1u128..=u64::MAX as u128) {
        prop_assert_eq!(rescale(s, k, k).unwrap(), s);
    }

    #[test]
    fn prop_zero_denominator_always_fails(s in any::<u128>(), n in any::<u128>()) {
        prop_assert!(matches!(rescale(s, n, 0), Err(AdminError::DivisionByZero)));
    }
}

#[test]
fn test_wide_product_does_not_overflow_early() {
    // s * n is far above u128::MAX but the quotient fits
    let s = u128::MAX / 3;
    assert_eq!(rescale(s, 1 << 100, 1 << 100).unwrap(), s);
    assert_eq!(rescale(u128::MAX, 3, 4).unwrap(), u128::MAX / 4 * 3 + 2);
}

#[test]
fn test_quotient_above_u128_overflows() {
    assert!(matches!(rescale(u128::MAX, 3, 2), Err(AdminError::Overflow)));
}
