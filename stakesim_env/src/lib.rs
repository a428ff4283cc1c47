//! stakesim environment layer
//!
//! Shared vocabulary and the chain boundary for the stakesim fuzzing
//! framework: addresses, pool ids, epoch-scoped stake balances, orders,
//! typed revert reasons, the decoded-event union, and the [`StakingChain`]
//! trait through which the framework reaches the ledger.
//!
//! The framework itself lives in `stakesim_fuzz`; the in-memory reference
//! ledger that implements [`StakingChain`] lives in `stakesim_chain`.

mod chain;
mod error;
mod events;
pub mod math;
pub mod trade;
mod types;

pub use chain::{PoolEpochStats, PoolSnapshot, StakingChain, UnfinalizedStats};
pub use error::ChainError;
pub use events::{ChainEvent, TxReceipt};
pub use types::{
    Address, Asset, Epoch, Order, PoolId, SignedOrder, StakeInfo, StakeStatus, StoredBalance,
    INITIAL_EPOCH, MEMBER_STAKE_WEIGHT_PPM, PPM_DENOMINATOR,
};
