//! Board-foot arithmetic.
//!
//! One board foot is 144 cubic inches: `thickness_in × width_in × length_ft / 12`.
//! Per-piece values are computed from nominal dimensions and rounded to two
//! decimal places (banker's rounding). Totals are always `per_piece × pieces`,
//! never re-rounded, so a stored total is recomputable from the piece count.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use lumberyard_core::{DomainError, DomainResult};

/// Decimal places kept for every board-foot value.
pub const BOARD_FEET_SCALE: u32 = 2;

/// Board feet of a single piece with the given nominal dimensions.
///
/// Fails with `Validation` when the dimensions are too large to measure.
pub fn board_feet_per_piece(thickness_in: Decimal, width_in: Decimal, length_ft: Decimal) -> DomainResult<Decimal> {
    let volume = piece_volume(thickness_in, width_in, length_ft)
        .ok_or_else(|| DomainError::validation("dimensions are too large to measure in board feet"))?;
    Ok(volume.round_dp(BOARD_FEET_SCALE))
}

/// Board feet of a milled lot: the unrounded per-piece volume times `pieces`,
/// rounded once at the end.
pub fn lot_board_feet(
    thickness_in: Decimal,
    width_in: Decimal,
    length_ft: Decimal,
    pieces: i64,
) -> DomainResult<Decimal> {
    piece_volume(thickness_in, width_in, length_ft)
        .and_then(|volume| volume.checked_mul(Decimal::from(pieces)))
        .map(|total| total.round_dp(BOARD_FEET_SCALE))
        .ok_or_else(|| DomainError::invalid_quantity(format!("board feet of {pieces} pieces overflow")))
}

/// Board feet of `pieces` pieces that each measure `per_piece`.
///
/// `pieces` is signed so ledger deltas (stock-out, negative adjustments) carry
/// their sign into the board-foot delta.
pub fn total_board_feet(per_piece: Decimal, pieces: i64) -> DomainResult<Decimal> {
    per_piece
        .checked_mul(Decimal::from(pieces))
        .ok_or_else(|| DomainError::invalid_quantity(format!("board feet of {pieces} pieces overflow")))
}

fn piece_volume(thickness_in: Decimal, width_in: Decimal, length_ft: Decimal) -> Option<Decimal> {
    thickness_in
        .checked_mul(width_in)?
        .checked_mul(length_ft)?
        .checked_div(dec!(12))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_four_by_eight() {
        // 2 × 4 × 8 / 12 = 5.333.. -> 5.33
        assert_eq!(board_feet_per_piece(dec!(2), dec!(4), dec!(8)).unwrap(), dec!(5.33));
    }

    #[test]
    fn one_by_twelve_by_one_is_one_board_foot() {
        assert_eq!(board_feet_per_piece(dec!(1), dec!(12), dec!(1)).unwrap(), dec!(1.00));
    }

    #[test]
    fn totals_are_not_rerounded() {
        let per_piece = board_feet_per_piece(dec!(2), dec!(4), dec!(8)).unwrap();
        assert_eq!(total_board_feet(per_piece, 100).unwrap(), dec!(533.00));
        assert_eq!(total_board_feet(per_piece, -3).unwrap(), dec!(-15.99));
    }

    #[test]
    fn lot_rounds_once() {
        // 10 × 5.333.. = 53.33, not 10 × 5.33
        assert_eq!(lot_board_feet(dec!(2), dec!(4), dec!(8), 10).unwrap(), dec!(53.33));
        assert_eq!(lot_board_feet(dec!(2), dec!(4), dec!(8), 5).unwrap(), dec!(26.67));
    }

    #[test]
    fn oversized_dimensions_are_rejected_not_panicking() {
        let huge = Decimal::from(100_000_000_000i64);
        assert!(matches!(
            board_feet_per_piece(huge, huge, huge),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            lot_board_feet(huge, huge, huge, 1),
            Err(DomainError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn overflowing_totals_are_invalid_quantities() {
        assert!(matches!(
            total_board_feet(Decimal::MAX, 2),
            Err(DomainError::InvalidQuantity(_))
        ));
        assert!(matches!(
            lot_board_feet(dec!(1000000), dec!(1000000), dec!(1000000), i64::MAX),
            Err(DomainError::InvalidQuantity(_))
        ));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn dimension() -> impl Strategy<Value = Decimal> {
            // 0.25 .. 48.00 in quarter-inch / quarter-foot steps
            (1i64..=192).prop_map(|quarters| Decimal::new(quarters * 25, 2))
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: per-piece board feet never carries more than two decimals.
            #[test]
            fn per_piece_has_two_decimal_places(t in dimension(), w in dimension(), l in dimension()) {
                let bf = board_feet_per_piece(t, w, l).unwrap();
                prop_assert_eq!(bf, bf.round_dp(BOARD_FEET_SCALE));
                prop_assert!(bf >= Decimal::ZERO);
            }

            /// Property: totals are additive over piece counts.
            #[test]
            fn totals_are_additive(
                t in dimension(),
                w in dimension(),
                l in dimension(),
                a in -10_000i64..10_000,
                b in -10_000i64..10_000,
            ) {
                let per_piece = board_feet_per_piece(t, w, l).unwrap();
                prop_assert_eq!(
                    total_board_feet(per_piece, a).unwrap() + total_board_feet(per_piece, b).unwrap(),
                    total_board_feet(per_piece, a + b).unwrap()
                );
            }
        }
    }
}
