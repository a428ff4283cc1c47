//! Proportional-fill and reward math shared by the ledger and the mirror.

use crate::error::ChainError;
use crate::types::PPM_DENOMINATOR;

/// `floor(numerator * target / denominator)` with overflow checking.
pub fn partial_amount_floor(
    numerator: u128,
    denominator: u128,
    target: u128,
) -> Result<u128, ChainError> {
    numerator
        .checked_mul(target)
        .map(|product| product / denominator)
        .ok_or(ChainError::ArithmeticOverflow)
}

/// True when flooring `fill * maker_amount / taker_amount` loses at least
/// 0.1% of the exact value.
pub fn is_rounding_error_floor(
    fill: u128,
    taker_amount: u128,
    maker_amount: u128,
) -> Result<bool, ChainError> {
    let product = fill
        .checked_mul(maker_amount)
        .ok_or(ChainError::ArithmeticOverflow)?;
    let remainder = product % taker_amount;
    let scaled = remainder
        .checked_mul(1000)
        .ok_or(ChainError::ArithmeticOverflow)?;
    Ok(scaled >= product)
}

/// Computes the maker amount bought by filling `fill` units of an order's
/// taker amount, rejecting fills that round by 0.1% or more.
///
/// On rejection the error carries `(taker_amount, maker_amount, target)`
/// where `target` is the floored partial amount.
pub fn safe_partial_amount_floor(
    fill: u128,
    taker_amount: u128,
    maker_amount: u128,
) -> Result<u128, ChainError> {
    let target = partial_amount_floor(fill, taker_amount, maker_amount)?;
    if is_rounding_error_floor(fill, taker_amount, maker_amount)? {
        return Err(ChainError::RoundingError {
            numerator: taker_amount,
            denominator: maker_amount,
            target,
        });
    }
    Ok(target)
}

/// `ceil(a / b)`; `b` must be nonzero.
pub fn ceil_div(a: u128, b: u128) -> u128 {
    a / b + u128::from(a % b != 0)
}

/// Cobb-Douglas reward for one pool, with alpha fixed at 1/3:
///
/// `rewards_available * (fees / total_fees)^(1/3) * (stake / total_stake)^(2/3)`
///
/// floored to an integer. Zero whenever either ratio is degenerate.
pub fn cobb_douglas(
    rewards_available: u128,
    fees: u128,
    total_fees: u128,
    stake: u128,
    total_stake: u128,
) -> u128 {
    if fees == 0 || total_fees == 0 || stake == 0 || total_stake == 0 {
        return 0;
    }
    let fee_ratio = fees as f64 / total_fees as f64;
    let stake_ratio = stake as f64 / total_stake as f64;
    let scaled = rewards_available as f64 * fee_ratio.powf(1.0 / 3.0) * stake_ratio.powf(2.0 / 3.0);
    // Tolerate ulp-level powf error before flooring.
    ((scaled + 1e-6).floor() as u128).min(rewards_available)
}

/// Splits a finalized pool reward between operator and members.
///
/// With no member stake the operator takes everything; otherwise the
/// operator's cut is `ceil(reward * share / PPM)` and members receive the
/// remainder.
pub fn split_reward(reward: u128, operator_share_ppm: u32, members_stake: u128) -> (u128, u128) {
    if members_stake == 0 {
        return (reward, 0);
    }
    let operator = ceil_div(
        reward * operator_share_ppm as u128,
        PPM_DENOMINATOR as u128,
    )
    .min(reward);
    (operator, reward - operator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_amount_floor() {
        assert_eq!(partial_amount_floor(998, 47958, 5318).unwrap(), 110);
        assert_eq!(partial_amount_floor(10, 100, 50).unwrap(), 5);
    }

    #[test]
    fn test_rounding_error_rejection_scenario() {
        // Fill 998 against a 47958 -> 5318 order: floor loses well over 0.1%.
        let err = safe_partial_amount_floor(998, 47958, 5318).unwrap_err();
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
    fn test_exact_fill_has_no_rounding_error() {
        // 50 * 200 / 100 divides exactly.
        assert!(!is_rounding_error_floor(50, 100, 200).unwrap());
        assert_eq!(safe_partial_amount_floor(50, 100, 200).unwrap(), 100);
    }

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(10, 5), 2);
        assert_eq!(ceil_div(11, 5), 3);
        assert_eq!(ceil_div(0, 5), 0);
    }

    #[test]
    fn test_cobb_douglas_full_share() {
        // Sole fee earner with all the stake takes the whole pot.
        assert_eq!(cobb_douglas(1_000_000, 5, 5, 300, 300), 1_000_000);
    }

    #[test]
    fn test_cobb_douglas_equal_ratios_are_linear() {
        // fee_ratio == stake_ratio == r collapses to r * rewards.
        assert_eq!(cobb_douglas(1000, 1, 4, 25, 100), 250);
        assert_eq!(cobb_douglas(1000, 1, 2, 50, 100), 500);
    }

    #[test]
    fn test_cobb_douglas_degenerate_inputs() {
        assert_eq!(cobb_douglas(1000, 0, 10, 50, 100), 0);
        assert_eq!(cobb_douglas(1000, 10, 10, 0, 100), 0);
        assert_eq!(cobb_douglas(1000, 10, 0, 50, 100), 0);
        assert_eq!(cobb_douglas(0, 10, 10, 50, 100), 0);
    }

    #[test]
    fn test_split_reward_ceiling() {
        // ceil(100 * 333_333 / 1_000_000) == 34
        assert_eq!(split_reward(100, 333_333, 1), (34, 66));
        assert_eq!(split_reward(100, 500_000, 1), (50, 50));
    }

    #[test]
    fn test_split_reward_no_members() {
        assert_eq!(split_reward(100, 100_000, 0), (100, 0));
    }

    #[test]
    fn test_split_reward_full_share() {
        assert_eq!(split_reward(77, PPM_DENOMINATOR, 10), (77, 0));
    }
}
