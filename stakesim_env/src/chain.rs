//! The typed call boundary between the framework and the ledger.
//!
//! Everything on-chain is reached through [`StakingChain`]: read calls
//! return plain values, submitted calls return a decoded receipt or a typed
//! revert reason. The framework never sees raw transaction bytes.

use crate::error::ChainError;
use crate::events::TxReceipt;
use crate::types::{Address, Epoch, Order, PoolId, SignedOrder, StakeInfo, StakeStatus, StoredBalance};
use serde::{Deserialize, Serialize};

/// Read-only view of a staking pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub operator: Address,
    pub operator_share_ppm: u32,
    pub delegated_stake: StoredBalance,
    /// Last epoch this pool was finalized for.
    pub last_finalized: Epoch,
    /// Undistributed member rewards held for this pool.
    pub reward_pot: u128,
}

/// Aggregates frozen at the last epoch boundary, settled by finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnfinalizedStats {
    /// The epoch these aggregates cover (the one that just ended).
    pub epoch: Epoch,
    pub num_pools_to_finalize: usize,
    pub total_fees_collected: u128,
    pub total_weighted_stake: u128,
    pub rewards_available: u128,
    pub rewards_finalized: u128,
}

/// Per-pool fee statistics accumulated during an epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEpochStats {
    pub fees_collected: u128,
    /// Member (non-operator) delegated stake, snapshotted at the pool's
    /// first fee of the epoch.
    pub members_stake: u128,
    /// Operator stake plus weighted member stake, snapshotted alongside
    /// `members_stake`.
    pub weighted_stake: u128,
}

/// Typed call interface onto the staking/exchange ledger.
///
/// Submitted calls either succeed with a [`TxReceipt`] of decoded events or
/// revert with a [`ChainError`]; reverts carry no receipt. The time-control
/// methods stand in for the blockchain-environment capability (mining,
/// time travel) the framework consumes but does not own.
pub trait StakingChain {
    // ── Reads ────────────────────────────────────────────────────────────

    fn current_epoch(&self) -> Epoch;
    fn now(&self) -> u64;
    /// Timestamp at which the current epoch can be ended.
    fn epoch_end_time(&self) -> u64;
    /// Index of the most recently created pool (0 when none exist).
    fn last_pool_id(&self) -> u64;
    fn pool(&self, pool_id: PoolId) -> Option<PoolSnapshot>;
    fn num_pools_to_finalize(&self) -> usize;
    fn pools_to_finalize(&self) -> Vec<PoolId>;
    fn unfinalized_stats(&self) -> Option<UnfinalizedStats>;
    fn pool_epoch_stats(&self, pool_id: PoolId) -> Option<PoolEpochStats>;

    fn global_stake(&self, status: StakeStatus) -> StoredBalance;
    /// Owner stake by status; for `Delegated` this is the cross-pool total.
    fn owner_stake(&self, owner: Address, status: StakeStatus) -> StoredBalance;
    fn stake_delegated_to_pool(&self, owner: Address, pool_id: PoolId) -> StoredBalance;
    fn pool_delegated_stake(&self, pool_id: PoolId) -> StoredBalance;

    fn eth_balance(&self, account: Address) -> u128;
    fn erc20_balance(&self, token: Address, account: Address) -> u128;

    fn order_filled_amount(&self, order: &Order) -> u128;
    fn is_valid_order_signature(&self, order: &SignedOrder) -> bool;
    fn protocol_fee(&self) -> u128;
    fn maker_pool(&self, maker: Address) -> Option<PoolId>;

    // ── Submits ──────────────────────────────────────────────────────────

    fn stake(&mut self, sender: Address, amount: u128) -> Result<TxReceipt, ChainError>;
    fn unstake(&mut self, sender: Address, amount: u128) -> Result<TxReceipt, ChainError>;
    fn move_stake(
        &mut self,
        sender: Address,
        from: StakeInfo,
        to: StakeInfo,
        amount: u128,
    ) -> Result<TxReceipt, ChainError>;
    fn create_staking_pool(
        &mut self,
        sender: Address,
        operator_share_ppm: u32,
        add_operator_as_maker: bool,
    ) -> Result<TxReceipt, ChainError>;
    fn decrease_operator_share(
        &mut self,
        sender: Address,
        pool_id: PoolId,
        new_share_ppm: u32,
    ) -> Result<TxReceipt, ChainError>;
    fn join_pool_as_maker(
        &mut self,
        sender: Address,
        pool_id: PoolId,
    ) -> Result<TxReceipt, ChainError>;
    fn withdraw_delegator_rewards(
        &mut self,
        sender: Address,
        pool_id: PoolId,
    ) -> Result<TxReceipt, ChainError>;
    fn end_epoch(&mut self, sender: Address) -> Result<TxReceipt, ChainError>;
    fn finalize_pool(&mut self, sender: Address, pool_id: PoolId) -> Result<TxReceipt, ChainError>;
    fn fill_order(
        &mut self,
        taker: Address,
        order: &SignedOrder,
        taker_fill_amount: u128,
    ) -> Result<TxReceipt, ChainError>;
    fn match_orders(
        &mut self,
        taker: Address,
        left: &SignedOrder,
        right: &SignedOrder,
    ) -> Result<TxReceipt, ChainError>;

    // ── Chain control ────────────────────────────────────────────────────

    /// Fast-forwards chain time. Consumed by keepers to reach the epoch
    /// boundary before ending an epoch.
    fn advance_time(&mut self, seconds: u64);
}
