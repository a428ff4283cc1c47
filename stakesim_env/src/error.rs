//! Typed on-chain revert reasons.
//!
//! Every way a submitted call can be rejected by the ledger is a variant
//! here. The assertion engine captures these as data rather than letting
//! them propagate, so "expected to revert" scenarios can assert on the
//! exact shape.

use crate::types::{Address, Asset, Epoch, PoolId};
use thiserror::Error;

/// Revert reasons surfaced by the chain boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Account holds less of `asset` than the operation requires.
    #[error("insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: Asset,
        required: u128,
        available: u128,
    },

    /// Stake balance cannot cover the requested amount.
    #[error("insufficient stake: required {required}, available {available}")]
    InsufficientStake { required: u128, available: u128 },

    /// The referenced pool was never created.
    #[error("staking pool {0} does not exist")]
    PoolNotFound(PoolId),

    /// Caller is not the pool's operator.
    #[error("pool {pool_id}: sender {sender} is not the operator")]
    OnlyPoolOperator { pool_id: PoolId, sender: Address },

    /// Operator share above the PPM denominator.
    #[error("pool {pool_id}: operator share {share_ppm} exceeds PPM")]
    OperatorShareTooHigh { pool_id: PoolId, share_ppm: u32 },

    /// Operator share can only be decreased after pool creation.
    #[error("pool {pool_id}: share can only decrease (current {current_ppm}, proposed {proposed_ppm})")]
    OperatorShareCanOnlyDecrease {
        pool_id: PoolId,
        current_ppm: u32,
        proposed_ppm: u32,
    },

    /// Rewards cannot be withdrawn while the pool has an unfinalized epoch.
    #[error("pool {pool_id} is not finalized for epoch {epoch}")]
    PoolNotFinalized { pool_id: PoolId, epoch: Epoch },

    /// The epoch cannot end while pools from the previous one are unfinalized.
    #[error("epoch {epoch} still has {pools_remaining} unfinalized pool(s)")]
    PreviousEpochNotFinalized { epoch: Epoch, pools_remaining: usize },

    /// The current epoch's duration has not elapsed yet.
    #[error("epoch ends at {ends_at}, now is {now}")]
    EpochNotOver { ends_at: u64, now: u64 },

    /// A proportional fill would lose at least 0.1% to floor rounding.
    #[error("rounding error: numerator {numerator}, denominator {denominator}, target {target}")]
    RoundingError {
        numerator: u128,
        denominator: u128,
        target: u128,
    },

    /// Order signature does not verify against the maker's registered key.
    #[error("invalid order signature from maker {maker}")]
    InvalidSignature { maker: Address },

    /// Order expiry timestamp has passed.
    #[error("order expired at {expiry}, now is {now}")]
    OrderExpired { expiry: u64, now: u64 },

    /// Nothing left to fill on this order.
    #[error("order ({maker}, salt {salt}) is fully filled")]
    OrderFullyFilled { maker: Address, salt: u64 },

    /// Matched orders do not cross.
    #[error("orders do not cross: no positive spread")]
    NegativeSpread,

    /// Matched orders do not trade opposite sides of the same token pair.
    #[error("orders are not complementary")]
    OrdersNotComplementary,

    /// Account was never registered with the ledger.
    #[error("unknown account {0}")]
    UnknownAccount(Address),

    /// Arithmetic overflow in fill math.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

impl ChainError {
    /// Short stable tag for logs and error-kind matching.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::InsufficientBalance { .. } => "insufficient_balance",
            ChainError::InsufficientStake { .. } => "insufficient_stake",
            ChainError::PoolNotFound(_) => "pool_not_found",
            ChainError::OnlyPoolOperator { .. } => "only_pool_operator",
            ChainError::OperatorShareTooHigh { .. } => "operator_share_too_high",
            ChainError::OperatorShareCanOnlyDecrease { .. } => "operator_share_can_only_decrease",
            ChainError::PoolNotFinalized { .. } => "pool_not_finalized",
            ChainError::PreviousEpochNotFinalized { .. } => "previous_epoch_not_finalized",
            ChainError::EpochNotOver { .. } => "epoch_not_over",
            ChainError::RoundingError { .. } => "rounding_error",
            ChainError::InvalidSignature { .. } => "invalid_signature",
            ChainError::OrderExpired { .. } => "order_expired",
            ChainError::OrderFullyFilled { .. } => "order_fully_filled",
            ChainError::NegativeSpread => "negative_spread",
            ChainError::OrdersNotComplementary => "orders_not_complementary",
            ChainError::UnknownAccount(_) => "unknown_account",
            ChainError::ArithmeticOverflow => "arithmetic_overflow",
        }
    }
}
