//! Staking pool registry: sequential ids, operator shares, maker membership.

use stakesim_env::{Address, ChainError, Epoch, PoolId, PPM_DENOMINATOR};
use std::collections::BTreeMap;

/// Mutable pool record.
#[derive(Debug, Clone)]
pub struct Pool {
    pub operator: Address,
    pub operator_share_ppm: u32,
    /// Last epoch this pool was finalized for.
    pub last_finalized: Epoch,
    /// Undistributed member rewards.
    pub reward_pot: u128,
}

/// All pools ever created, plus maker membership.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: BTreeMap<PoolId, Pool>,
    last_pool_index: u64,
    maker_pools: BTreeMap<Address, PoolId>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_pool_index(&self) -> u64 {
        self.last_pool_index
    }

    pub fn get(&self, pool_id: PoolId) -> Option<&Pool> {
        self.pools.get(&pool_id)
    }

    pub fn get_mut(&mut self, pool_id: PoolId) -> Result<&mut Pool, ChainError> {
        self.pools
            .get_mut(&pool_id)
            .ok_or(ChainError::PoolNotFound(pool_id))
    }

    pub fn maker_pool(&self, maker: Address) -> Option<PoolId> {
        self.maker_pools.get(&maker).copied()
    }

    /// Creates a pool with the next sequential id.
    pub fn create(
        &mut self,
        operator: Address,
        operator_share_ppm: u32,
        epoch: Epoch,
    ) -> Result<PoolId, ChainError> {
        let pool_id = PoolId(self.last_pool_index + 1);
        if operator_share_ppm > PPM_DENOMINATOR {
            return Err(ChainError::OperatorShareTooHigh {
                pool_id,
                share_ppm: operator_share_ppm,
            });
        }
        self.last_pool_index += 1;
        self.pools.insert(
            pool_id,
            Pool {
                operator,
                operator_share_ppm,
                // Nothing to finalize until the pool earns fees.
                last_finalized: epoch.saturating_sub(1),
                reward_pot: 0,
            },
        );
        Ok(pool_id)
    }

    /// Lowers a pool's operator share. Only the operator may do this, and
    /// only downward.
    pub fn decrease_operator_share(
        &mut self,
        sender: Address,
        pool_id: PoolId,
        new_share_ppm: u32,
    ) -> Result<(u32, u32), ChainError> {
        let pool = self.get_mut(pool_id)?;
        if pool.operator != sender {
            return Err(ChainError::OnlyPoolOperator { pool_id, sender });
        }
        if new_share_ppm > pool.operator_share_ppm {
            return Err(ChainError::OperatorShareCanOnlyDecrease {
                pool_id,
                current_ppm: pool.operator_share_ppm,
                proposed_ppm: new_share_ppm,
            });
        }
        let old = pool.operator_share_ppm;
        pool.operator_share_ppm = new_share_ppm;
        Ok((old, new_share_ppm))
    }

    /// Routes a maker's future protocol fees to `pool_id`.
    pub fn join_as_maker(&mut self, maker: Address, pool_id: PoolId) -> Result<(), ChainError> {
        if !self.pools.contains_key(&pool_id) {
            return Err(ChainError::PoolNotFound(pool_id));
        }
        self.maker_pools.insert(maker, pool_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_pool_ids() {
        let mut registry = PoolRegistry::new();
        let a = registry.create(Address::from_seed(1), 500_000, 1).unwrap();
        let b = registry.create(Address::from_seed(2), 500_000, 1).unwrap();
        let c = registry.create(Address::from_seed(1), 0, 1).unwrap();
        assert_eq!((a.0, b.0, c.0), (1, 2, 3));
        assert_eq!(registry.last_pool_index(), 3);
    }

    #[test]
    fn test_share_above_ppm_rejected() {
        let mut registry = PoolRegistry::new();
        let err = registry
            .create(Address::from_seed(1), PPM_DENOMINATOR + 1, 1)
            .unwrap_err();
        assert!(matches!(err, ChainError::OperatorShareTooHigh { .. }));
        // Nothing was allocated.
        assert_eq!(registry.last_pool_index(), 0);
    }

    #[test]
    fn test_share_can_only_decrease() {
        let operator = Address::from_seed(1);
        let mut registry = PoolRegistry::new();
        let pool_id = registry.create(operator, 400_000, 1).unwrap();

        let err = registry
            .decrease_operator_share(operator, pool_id, 400_001)
            .unwrap_err();
        assert!(matches!(err, ChainError::OperatorShareCanOnlyDecrease { .. }));

        let err = registry
            .decrease_operator_share(Address::from_seed(2), pool_id, 100)
            .unwrap_err();
        assert!(matches!(err, ChainError::OnlyPoolOperator { .. }));

        assert_eq!(
            registry
                .decrease_operator_share(operator, pool_id, 100_000)
                .unwrap(),
            (400_000, 100_000)
        );
    }
}
