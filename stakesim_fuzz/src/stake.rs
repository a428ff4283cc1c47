//! Mirrored stake bookkeeping: per-owner, per-pool, and global ledgers.
//!
//! These structures are updated incrementally from assertion `after` hooks
//! and compared against chain reads after every action. The delegated
//! `total` is never recomputed from scratch in the hot path; its consistency
//! with the per-pool balances is a checkable invariant.

use stakesim_env::{Address, ChainError, Epoch, PoolId, StakeInfo, StoredBalance};
use std::collections::BTreeMap;

/// An owner's delegated stake: per-pool balances plus the incremental total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegatedStake {
    pub total: StoredBalance,
    pub by_pool: BTreeMap<PoolId, StoredBalance>,
}

/// Mirror of one owner's stake, keyed by status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerStakeByStatus {
    pub undelegated: StoredBalance,
    pub delegated: DelegatedStake,
}

impl OwnerStakeByStatus {
    pub fn stake(&mut self, epoch: Epoch, amount: u128) {
        self.undelegated.increase_current_and_next(epoch, amount);
    }

    pub fn unstake(&mut self, epoch: Epoch, amount: u128) -> Result<(), ChainError> {
        self.undelegated.decrease_current_and_next(epoch, amount)
    }

    /// Mirrors a move of next-epoch stake between positions.
    pub fn move_stake(
        &mut self,
        epoch: Epoch,
        from: StakeInfo,
        to: StakeInfo,
        amount: u128,
    ) -> Result<(), ChainError> {
        if from == to {
            return Ok(());
        }
        match from {
            StakeInfo::Undelegated => self.undelegated.decrease_next(epoch, amount)?,
            StakeInfo::Delegated(pool_id) => {
                self.delegated
                    .by_pool
                    .entry(pool_id)
                    .or_default()
                    .decrease_next(epoch, amount)?;
                self.delegated.total.decrease_next(epoch, amount)?;
            }
        }
        match to {
            StakeInfo::Undelegated => self.undelegated.increase_next(epoch, amount),
            StakeInfo::Delegated(pool_id) => {
                self.delegated
                    .by_pool
                    .entry(pool_id)
                    .or_default()
                    .increase_next(epoch, amount);
                self.delegated.total.increase_next(epoch, amount);
            }
        }
        Ok(())
    }

    /// Pools this owner currently has a nonzero position in.
    pub fn delegated_pools(&self, epoch: Epoch) -> Vec<PoolId> {
        self.delegated
            .by_pool
            .iter()
            .filter(|(_, balance)| !balance.synced(epoch).is_zero())
            .map(|(pool_id, _)| *pool_id)
            .collect()
    }

    /// Checks that the incremental total matches the per-pool sum.
    pub fn check_total(&self, epoch: Epoch) -> Result<(), String> {
        let mut current = 0u128;
        let mut next = 0u128;
        for balance in self.delegated.by_pool.values() {
            let synced = balance.synced(epoch);
            current += synced.current_epoch_balance;
            next += synced.next_epoch_balance;
        }
        let total = self.delegated.total.synced(epoch);
        if total.current_epoch_balance != current || total.next_epoch_balance != next {
            return Err(format!(
                "delegated total ({}, {}) != per-pool sum ({}, {})",
                total.current_epoch_balance, total.next_epoch_balance, current, next
            ));
        }
        Ok(())
    }
}

/// Mirror of the chain-wide stake aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalStake {
    pub undelegated: StoredBalance,
    pub delegated: StoredBalance,
}

impl GlobalStake {
    pub fn stake(&mut self, epoch: Epoch, amount: u128) {
        self.undelegated.increase_current_and_next(epoch, amount);
    }

    pub fn unstake(&mut self, epoch: Epoch, amount: u128) -> Result<(), ChainError> {
        self.undelegated.decrease_current_and_next(epoch, amount)
    }

    pub fn move_stake(
        &mut self,
        epoch: Epoch,
        from: StakeInfo,
        to: StakeInfo,
        amount: u128,
    ) -> Result<(), ChainError> {
        if from == to {
            return Ok(());
        }
        match from {
            StakeInfo::Undelegated => self.undelegated.decrease_next(epoch, amount)?,
            StakeInfo::Delegated(_) => self.delegated.decrease_next(epoch, amount)?,
        }
        match to {
            StakeInfo::Undelegated => self.undelegated.increase_next(epoch, amount),
            StakeInfo::Delegated(_) => self.delegated.increase_next(epoch, amount),
        }
        Ok(())
    }
}

/// Mirror record of one staking pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingPoolRecord {
    pub operator: Address,
    pub operator_share_ppm: u32,
    pub delegated_stake: StoredBalance,
    /// Last epoch this pool was finalized for.
    pub last_finalized: Epoch,
}
