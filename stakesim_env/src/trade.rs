//! Fill and match planning, shared by the ledger and the mirror.
//!
//! These are pure functions of order contents and fill progress; the ledger
//! commits their results, the framework's generators use them to predict
//! outcomes before the real call executes.

use crate::error::ChainError;
use crate::math::{partial_amount_floor, safe_partial_amount_floor};
use crate::types::Order;

/// Asset movements for one fill of one order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillPlan {
    /// Taker-token amount transferred taker -> maker.
    pub taker_fill: u128,
    /// Maker-token amount transferred maker -> taker.
    pub maker_fill: u128,
}

/// Asset movements for one maximal-fill match of two complementary orders.
///
/// Token names follow the left order: it sells A (its maker token) for B.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchPlan {
    /// B transferred right maker -> left maker; the left order's fill.
    pub b_matched: u128,
    /// A paid out by the left maker at its own price.
    pub a_from_left: u128,
    /// A received by the right maker at its own price; the right order's fill.
    pub a_to_right: u128,
    /// Price spread in A, kept by the matching taker.
    pub spread: u128,
}

/// Validates a fill request and computes the resulting transfers.
///
/// `filled` is the order's cumulative fill so far; the request is clamped to
/// the remaining amount. A fill that floor-rounds away 0.1% or more of the
/// maker amount is rejected with a [`ChainError::RoundingError`] carrying
/// `(taker_amount, maker_amount, target)`.
pub fn plan_fill(
    order: &Order,
    filled: u128,
    taker_fill_amount: u128,
    now: u64,
) -> Result<FillPlan, ChainError> {
    if now >= order.expiry {
        return Err(ChainError::OrderExpired {
            expiry: order.expiry,
            now,
        });
    }
    let remaining = order.taker_amount - filled;
    if remaining == 0 || taker_fill_amount == 0 {
        return Err(ChainError::OrderFullyFilled {
            maker: order.maker,
            salt: order.salt,
        });
    }
    let taker_fill = taker_fill_amount.min(remaining);
    let maker_fill = safe_partial_amount_floor(taker_fill, order.taker_amount, order.maker_amount)?;
    Ok(FillPlan {
        taker_fill,
        maker_fill,
    })
}

/// Computes the maximal mutual fill of two crossing orders.
///
/// The left order sells A for B, the right order sells B for A. Each maker
/// trades at their own price; the A-side spread goes to the taker.
pub fn plan_match(
    left: &Order,
    left_filled: u128,
    right: &Order,
    right_filled: u128,
    now: u64,
) -> Result<MatchPlan, ChainError> {
    if left.maker_token != right.taker_token || left.taker_token != right.maker_token {
        return Err(ChainError::OrdersNotComplementary);
    }
    for order in [left, right] {
        if now >= order.expiry {
            return Err(ChainError::OrderExpired {
                expiry: order.expiry,
                now,
            });
        }
    }

    let left_remaining = left.taker_amount - left_filled;
    let right_remaining = right.taker_amount - right_filled;
    if left_remaining == 0 {
        return Err(ChainError::OrderFullyFilled {
            maker: left.maker,
            salt: left.salt,
        });
    }
    if right_remaining == 0 {
        return Err(ChainError::OrderFullyFilled {
            maker: right.maker,
            salt: right.salt,
        });
    }

    // Crossing requires the left maker to offer at least as much A per B as
    // the right maker demands.
    let lhs = left
        .maker_amount
        .checked_mul(right.maker_amount)
        .ok_or(ChainError::ArithmeticOverflow)?;
    let rhs = left
        .taker_amount
        .checked_mul(right.taker_amount)
        .ok_or(ChainError::ArithmeticOverflow)?;
    if lhs < rhs {
        return Err(ChainError::NegativeSpread);
    }

    // Maximal fill: all the B the right maker can still sell, capped by what
    // the left order still wants.
    let right_can_give = partial_amount_floor(right_remaining, right.taker_amount, right.maker_amount)?;
    let b_matched = left_remaining.min(right_can_give);
    if b_matched == 0 {
        return Err(ChainError::OrderFullyFilled {
            maker: right.maker,
            salt: right.salt,
        });
    }

    let a_from_left = safe_partial_amount_floor(b_matched, left.taker_amount, left.maker_amount)?;
    let a_to_right = partial_amount_floor(b_matched, right.maker_amount, right.taker_amount)?;
    if a_to_right > a_from_left {
        return Err(ChainError::NegativeSpread);
    }

    Ok(MatchPlan {
        b_matched,
        a_from_left,
        a_to_right,
        spread: a_from_left - a_to_right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn order(maker_amount: u128, taker_amount: u128, salt: u64) -> Order {
        Order {
            maker: Address::from_seed(1),
            maker_token: Address::from_seed(100),
            taker_token: Address::from_seed(101),
            maker_amount,
            taker_amount,
            expiry: 10_000,
            salt,
        }
    }

    #[test]
    fn test_fill_clamps_to_remaining() {
        let order = order(500, 1000, 1);
        let plan = plan_fill(&order, 900, 500, 0).unwrap();
        assert_eq!(plan.taker_fill, 100);
        assert_eq!(plan.maker_fill, 50);

        let err = plan_fill(&order, 1000, 1, 0).unwrap_err();
        assert!(matches!(err, ChainError::OrderFullyFilled { .. }));
    }

    #[test]
    fn test_fill_rounding_rejection_scenario() {
        let order = order(5318, 47958, 1);
        let err = plan_fill(&order, 0, 998, 0).unwrap_err();
        assert_eq!(
            err,
            ChainError::RoundingError {
                numerator: 47958,
                denominator: 5318,
                target: 110,
            }
        );
    }

    #[test]
    fn test_expired_order_rejected() {
        let order = order(500, 1000, 1);
        let err = plan_fill(&order, 0, 10, 10_000).unwrap_err();
        assert!(matches!(err, ChainError::OrderExpired { .. }));
    }

    #[test]
    fn test_match_with_spread() {
        // Left sells 200 A for 100 B (2 A per B).
        // Right sells 100 B for 150 A (1.5 A per B). Spread: 0.5 A per B.
        let left = order(200, 100, 1);
        let mut right = order(100, 150, 2);
        right.maker = Address::from_seed(2);
        right.maker_token = left.taker_token;
        right.taker_token = left.maker_token;

        let plan = plan_match(&left, 0, &right, 0, 0).unwrap();
        assert_eq!(plan.b_matched, 100);
        assert_eq!(plan.a_from_left, 200);
        assert_eq!(plan.a_to_right, 150);
        assert_eq!(plan.spread, 50);
    }

    #[test]
    fn test_match_respects_partial_fills() {
        let left = order(200, 100, 1);
        let mut right = order(100, 150, 2);
        right.maker = Address::from_seed(2);
        right.maker_token = left.taker_token;
        right.taker_token = left.maker_token;

        // Right already sold 2/3 of its B: only 50 B remain on offer.
        let plan = plan_match(&left, 0, &right, 100, 0).unwrap();
        assert_eq!(plan.b_matched, 33);
        assert_eq!(plan.a_from_left, 66);
        assert_eq!(plan.a_to_right, 49);
    }

    #[test]
    fn test_match_rejects_non_crossing() {
        // Left offers 1 A per B, right demands 2 A per B.
        let left = order(100, 100, 1);
        let mut right = order(100, 200, 2);
        right.maker_token = left.taker_token;
        right.taker_token = left.maker_token;

        assert_eq!(plan_match(&left, 0, &right, 0, 0).unwrap_err(), ChainError::NegativeSpread);
    }

    #[test]
    fn test_match_rejects_mismatched_pair() {
        let left = order(100, 100, 1);
        let mut right = order(100, 100, 2);
        right.maker_token = Address::from_seed(999);
        right.taker_token = left.maker_token;

        assert_eq!(
            plan_match(&left, 0, &right, 0, 0).unwrap_err(),
            ChainError::OrdersNotComplementary
        );
    }
}
