//! The stake ledger: epoch-scoped balances per owner, per pool, and global.

use stakesim_env::{Address, ChainError, Epoch, PoolId, StakeInfo, StakeStatus, StoredBalance};
use std::collections::BTreeMap;

/// All stake positions tracked by the ledger.
///
/// Invariant: for every owner, the `Delegated` status balance equals the sum
/// of that owner's per-pool balances, and the global balances equal the sum
/// over owners. Maintained incrementally on every write.
#[derive(Debug, Default)]
pub struct StakeLedger {
    global: BTreeMap<StakeStatus, StoredBalance>,
    /// Owner stake by status; `Delegated` holds the cross-pool total.
    owner: BTreeMap<(Address, StakeStatus), StoredBalance>,
    delegated_to_pool: BTreeMap<(Address, PoolId), StoredBalance>,
    pool_delegated: BTreeMap<PoolId, StoredBalance>,
}

impl StakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self, status: StakeStatus, epoch: Epoch) -> StoredBalance {
        self.global
            .get(&status)
            .copied()
            .unwrap_or_default()
            .synced(epoch)
    }

    pub fn owner(&self, owner: Address, status: StakeStatus, epoch: Epoch) -> StoredBalance {
        self.owner
            .get(&(owner, status))
            .copied()
            .unwrap_or_default()
            .synced(epoch)
    }

    pub fn delegated_to_pool(&self, owner: Address, pool_id: PoolId, epoch: Epoch) -> StoredBalance {
        self.delegated_to_pool
            .get(&(owner, pool_id))
            .copied()
            .unwrap_or_default()
            .synced(epoch)
    }

    pub fn pool_delegated(&self, pool_id: PoolId, epoch: Epoch) -> StoredBalance {
        self.pool_delegated
            .get(&pool_id)
            .copied()
            .unwrap_or_default()
            .synced(epoch)
    }

    /// Adds undelegated stake, effective immediately in both epochs.
    pub fn stake(&mut self, epoch: Epoch, owner: Address, amount: u128) {
        self.owner
            .entry((owner, StakeStatus::Undelegated))
            .or_default()
            .increase_current_and_next(epoch, amount);
        self.global
            .entry(StakeStatus::Undelegated)
            .or_default()
            .increase_current_and_next(epoch, amount);
    }

    /// Removes undelegated stake; limited to the withdrawable minimum of the
    /// current and next epoch balances.
    pub fn unstake(&mut self, epoch: Epoch, owner: Address, amount: u128) -> Result<(), ChainError> {
        let balance = self
            .owner
            .entry((owner, StakeStatus::Undelegated))
            .or_default();
        balance.decrease_current_and_next(epoch, amount)?;
        self.global
            .entry(StakeStatus::Undelegated)
            .or_default()
            .decrease_current_and_next(epoch, amount)?;
        Ok(())
    }

    /// Moves next-epoch stake between positions. Pool existence is validated
    /// by the caller; same-position moves are successful no-ops.
    pub fn move_stake(
        &mut self,
        epoch: Epoch,
        owner: Address,
        from: StakeInfo,
        to: StakeInfo,
        amount: u128,
    ) -> Result<(), ChainError> {
        if from == to {
            return Ok(());
        }

        // The binding constraint is the most specific balance on the `from`
        // side: the per-pool balance for delegated stake.
        let available = match from {
            StakeInfo::Undelegated => {
                self.owner(owner, StakeStatus::Undelegated, epoch).next_epoch_balance
            }
            StakeInfo::Delegated(pool_id) => {
                self.delegated_to_pool(owner, pool_id, epoch).next_epoch_balance
            }
        };
        if amount > available {
            return Err(ChainError::InsufficientStake {
                required: amount,
                available,
            });
        }

        self.owner
            .entry((owner, from.status()))
            .or_default()
            .decrease_next(epoch, amount)?;
        self.owner
            .entry((owner, to.status()))
            .or_default()
            .increase_next(epoch, amount);
        self.global
            .entry(from.status())
            .or_default()
            .decrease_next(epoch, amount)?;
        self.global
            .entry(to.status())
            .or_default()
            .increase_next(epoch, amount);

        if let StakeInfo::Delegated(pool_id) = from {
            self.delegated_to_pool
                .entry((owner, pool_id))
                .or_default()
                .decrease_next(epoch, amount)?;
            self.pool_delegated
                .entry(pool_id)
                .or_default()
                .decrease_next(epoch, amount)?;
        }
        if let StakeInfo::Delegated(pool_id) = to {
            self.delegated_to_pool
                .entry((owner, pool_id))
                .or_default()
                .increase_next(epoch, amount);
            self.pool_delegated
                .entry(pool_id)
                .or_default()
                .increase_next(epoch, amount);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::from_seed(9)
    }

    #[test]
    fn test_stake_is_instant_in_both_epochs() {
        let mut ledger = StakeLedger::new();
        ledger.stake(1, owner(), 100);

        let balance = ledger.owner(owner(), StakeStatus::Undelegated, 1);
        assert_eq!(balance.current_epoch_balance, 100);
        assert_eq!(balance.next_epoch_balance, 100);
        assert_eq!(
            ledger.global(StakeStatus::Undelegated, 1).current_epoch_balance,
            100
        );
    }

    #[test]
    fn test_delegation_takes_effect_next_epoch() {
        let pool = PoolId::first();
        let mut ledger = StakeLedger::new();
        ledger.stake(1, owner(), 100);
        ledger
            .move_stake(1, owner(), StakeInfo::Undelegated, StakeInfo::Delegated(pool), 60)
            .unwrap();

        let delegated = ledger.delegated_to_pool(owner(), pool, 1);
        assert_eq!(delegated.current_epoch_balance, 0);
        assert_eq!(delegated.next_epoch_balance, 60);

        // After the epoch rolls the delegation becomes current.
        let delegated = ledger.delegated_to_pool(owner(), pool, 2);
        assert_eq!(delegated.current_epoch_balance, 60);
        assert_eq!(ledger.pool_delegated(pool, 2).current_epoch_balance, 60);

        // Unstaking is limited by the lower (current) undelegated balance.
        let undelegated = ledger.owner(owner(), StakeStatus::Undelegated, 1);
        assert_eq!(undelegated.current_epoch_balance, 100);
        assert_eq!(undelegated.next_epoch_balance, 40);
        assert!(ledger.unstake(1, owner(), 41).is_err());
        ledger.unstake(1, owner(), 40).unwrap();
    }

    #[test]
    fn test_move_between_pools_preserves_totals() {
        let pool_a = PoolId::first();
        let pool_b = pool_a.next();
        let mut ledger = StakeLedger::new();
        ledger.stake(1, owner(), 100);
        ledger
            .move_stake(1, owner(), StakeInfo::Undelegated, StakeInfo::Delegated(pool_a), 80)
            .unwrap();
        ledger
            .move_stake(1, owner(), StakeInfo::Delegated(pool_a), StakeInfo::Delegated(pool_b), 30)
            .unwrap();

        assert_eq!(
            ledger.delegated_to_pool(owner(), pool_a, 1).next_epoch_balance,
            50
        );
        assert_eq!(
            ledger.delegated_to_pool(owner(), pool_b, 1).next_epoch_balance,
            30
        );
        assert_eq!(
            ledger.owner(owner(), StakeStatus::Delegated, 1).next_epoch_balance,
            80
        );
    }

    #[test]
    fn test_same_position_move_is_noop() {
        let mut ledger = StakeLedger::new();
        ledger.stake(1, owner(), 10);
        ledger
            .move_stake(1, owner(), StakeInfo::Undelegated, StakeInfo::Undelegated, 10_000)
            .unwrap();
        assert_eq!(
            ledger.owner(owner(), StakeStatus::Undelegated, 1).next_epoch_balance,
            10
        );
    }

    #[test]
    fn test_move_limited_by_per_pool_balance() {
        let pool_a = PoolId::first();
        let pool_b = pool_a.next();
        let mut ledger = StakeLedger::new();
        ledger.stake(1, owner(), 100);
        ledger
            .move_stake(1, owner(), StakeInfo::Undelegated, StakeInfo::Delegated(pool_a), 20)
            .unwrap();
        ledger
            .move_stake(1, owner(), StakeInfo::Undelegated, StakeInfo::Delegated(pool_b), 50)
            .unwrap();

        // Owner's delegated total is 70, but only 20 sits in pool A.
        let err = ledger
            .move_stake(1, owner(), StakeInfo::Delegated(pool_a), StakeInfo::Undelegated, 21)
            .unwrap_err();
        assert_eq!(
            err,
            ChainError::InsufficientStake {
                required: 21,
                available: 20
            }
        );
    }
}
