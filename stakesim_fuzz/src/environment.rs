//! The shared simulation environment.
//!
//! One [`SimulationEnvironment`] exists per simulation run. It is the
//! off-chain mirror of everything the framework predicts: the epoch counter,
//! stake ledgers, pool records, balance store, fee attribution, and the
//! order book. It is mutated exclusively from assertion `after` hooks, so
//! the mirror only ever moves in lockstep with a verified chain call.

use crate::actor::Capability;
use crate::balances::BalanceStore;
use crate::error::SimError;
use crate::rng::SimRng;
use crate::stake::{GlobalStake, OwnerStakeByStatus, StakingPoolRecord};

use stakesim_chain::SimChain;
use stakesim_env::{
    Address, Epoch, PoolEpochStats, PoolId, SignedOrder, StakeInfo, StakeStatus, StakingChain,
    StoredBalance, INITIAL_EPOCH, MEMBER_STAKE_WEIGHT_PPM, PPM_DENOMINATOR,
};
use std::collections::BTreeMap;

/// Addresses of the deployed system components.
#[derive(Debug, Clone, Copy)]
pub struct Deployment {
    pub zrx: Address,
    pub weth: Address,
    pub token_a: Address,
    pub token_b: Address,
    pub staking: Address,
    pub vault: Address,
}

impl Deployment {
    pub fn from_chain(chain: &SimChain) -> Self {
        let [token_a, token_b] = chain.trade_tokens();
        Self {
            zrx: chain.zrx_token(),
            weth: chain.weth_token(),
            token_a,
            token_b,
            staking: chain.staking_address(),
            vault: chain.vault_address(),
        }
    }
}

/// An actor's identity as visible to other actors' generators.
#[derive(Debug, Clone)]
pub struct ActorProfile {
    pub address: Address,
    pub capabilities: Vec<Capability>,
}

/// Mirror of an ended epoch awaiting finalization.
#[derive(Debug, Clone)]
pub struct PendingEpoch {
    pub epoch: Epoch,
    pub pool_stats: BTreeMap<PoolId, PoolEpochStats>,
    pub total_fees_collected: u128,
    pub total_weighted_stake: u128,
    pub rewards_available: u128,
    pub rewards_finalized: u128,
}

/// Everything a simulation shares between its actors.
#[derive(Debug)]
pub struct SimulationEnvironment {
    pub current_epoch: Epoch,
    pub global_stake: GlobalStake,
    pub owner_stake: BTreeMap<Address, OwnerStakeByStatus>,
    pub pools: BTreeMap<PoolId, StakingPoolRecord>,
    /// Index of the most recently observed pool id.
    pub last_pool_id: u64,
    pub maker_pools: BTreeMap<Address, PoolId>,
    pub balances: BalanceStore,
    pub actors: Vec<ActorProfile>,
    pub order_book: Vec<SignedOrder>,
    /// Mirror of cumulative fills, keyed by (maker, salt).
    pub order_fills: BTreeMap<(Address, u64), u128>,
    /// Fees accumulated during the current epoch, per pool.
    pub epoch_fees: BTreeMap<PoolId, PoolEpochStats>,
    pub pending: Option<PendingEpoch>,
    pub deployment: Deployment,
}

/// Mutable context handed to every generator step and assertion hook.
pub struct StepCx<'a> {
    pub env: &'a mut SimulationEnvironment,
    pub chain: &'a mut dyn StakingChain,
    pub rng: &'a mut SimRng,
}

impl SimulationEnvironment {
    pub fn new(deployment: Deployment) -> Self {
        Self {
            current_epoch: INITIAL_EPOCH,
            global_stake: GlobalStake::default(),
            owner_stake: BTreeMap::new(),
            pools: BTreeMap::new(),
            last_pool_id: 0,
            maker_pools: BTreeMap::new(),
            balances: BalanceStore::new(),
            actors: Vec::new(),
            order_book: Vec::new(),
            order_fills: BTreeMap::new(),
            epoch_fees: BTreeMap::new(),
            pending: None,
            deployment,
        }
    }

    pub fn owner_stake_mut(&mut self, owner: Address) -> &mut OwnerStakeByStatus {
        self.owner_stake.entry(owner).or_default()
    }

    /// A copy of the owner's mirrored stake (zeroed if never seen).
    pub fn owner_stake(&self, owner: Address) -> OwnerStakeByStatus {
        self.owner_stake.get(&owner).cloned().unwrap_or_default()
    }

    pub fn actors_with(&self, capability: Capability) -> Vec<Address> {
        self.actors
            .iter()
            .filter(|p| p.capabilities.contains(&capability))
            .map(|p| p.address)
            .collect()
    }

    pub fn filled_amount(&self, maker: Address, salt: u64) -> u128 {
        self.order_fills.get(&(maker, salt)).copied().unwrap_or(0)
    }

    /// Drops expired and fully-filled orders from the shared book.
    pub fn prune_order_book(&mut self, now: u64) {
        let fills = &self.order_fills;
        self.order_book.retain(|signed| {
            let order = &signed.order;
            let filled = fills.get(&(order.maker, order.salt)).copied().unwrap_or(0);
            now < order.expiry && filled < order.taker_amount
        });
    }

    // ── Mirror mutations (called from `after` hooks only) ────────────────

    pub fn apply_stake(&mut self, owner: Address, amount: u128) {
        let epoch = self.current_epoch;
        self.owner_stake_mut(owner).stake(epoch, amount);
        self.global_stake.stake(epoch, amount);
    }

    pub fn apply_unstake(&mut self, owner: Address, amount: u128) -> Result<(), SimError> {
        let epoch = self.current_epoch;
        let invariant =
            |err| SimError::invariant("mirror", format!("unstake prediction underflow: {}", err));
        self.owner_stake_mut(owner)
            .unstake(epoch, amount)
            .map_err(invariant)?;
        self.global_stake.unstake(epoch, amount).map_err(invariant)
    }

    pub fn apply_move(
        &mut self,
        owner: Address,
        from: StakeInfo,
        to: StakeInfo,
        amount: u128,
    ) -> Result<(), SimError> {
        let epoch = self.current_epoch;
        let invariant =
            |err| SimError::invariant("mirror", format!("move prediction underflow: {}", err));
        self.owner_stake_mut(owner)
            .move_stake(epoch, from, to, amount)
            .map_err(invariant)?;
        self.global_stake
            .move_stake(epoch, from, to, amount)
            .map_err(invariant)?;
        if from == to {
            return Ok(());
        }
        if let StakeInfo::Delegated(pool_id) = from {
            if let Some(record) = self.pools.get_mut(&pool_id) {
                record
                    .delegated_stake
                    .decrease_next(epoch, amount)
                    .map_err(invariant)?;
            }
        }
        if let StakeInfo::Delegated(pool_id) = to {
            if let Some(record) = self.pools.get_mut(&pool_id) {
                record.delegated_stake.increase_next(epoch, amount);
            }
        }
        Ok(())
    }

    /// Member and weighted stake of a pool at the current epoch, mirroring
    /// the ledger's first-fee snapshot formula.
    pub fn pool_membership_stats(&self, pool_id: PoolId) -> (u128, u128) {
        let record = match self.pools.get(&pool_id) {
            Some(record) => record,
            None => return (0, 0),
        };
        let total = record
            .delegated_stake
            .synced(self.current_epoch)
            .current_epoch_balance;
        let operator = self
            .owner_stake
            .get(&record.operator)
            .and_then(|o| o.delegated.by_pool.get(&pool_id))
            .map(|b| b.synced(self.current_epoch).current_epoch_balance)
            .unwrap_or(0);
        let members = total.saturating_sub(operator);
        let weighted =
            operator + members * MEMBER_STAKE_WEIGHT_PPM as u128 / PPM_DENOMINATOR as u128;
        (members, weighted)
    }

    /// Credits a protocol fee to a pool's current-epoch mirror stats.
    pub fn attribute_fee(&mut self, pool_id: PoolId, fee: u128) {
        let (members_stake, weighted_stake) = self.pool_membership_stats(pool_id);
        let stats = self.epoch_fees.entry(pool_id).or_insert(PoolEpochStats {
            fees_collected: 0,
            members_stake,
            weighted_stake,
        });
        stats.fees_collected += fee;
    }

    /// Rolls the mirror into the next epoch, freezing the fee stats.
    pub fn roll_epoch(&mut self, rewards_available: u128) {
        let pool_stats = std::mem::take(&mut self.epoch_fees);
        let total_fees_collected = pool_stats.values().map(|s| s.fees_collected).sum();
        let total_weighted_stake = pool_stats.values().map(|s| s.weighted_stake).sum();
        let ended = self.current_epoch;
        self.current_epoch += 1;
        self.pending = if pool_stats.is_empty() {
            None
        } else {
            Some(PendingEpoch {
                epoch: ended,
                pool_stats,
                total_fees_collected,
                total_weighted_stake,
                rewards_available,
                rewards_finalized: 0,
            })
        };
    }

    // ── Mirror/chain equivalence checks ──────────────────────────────────

    /// Compares one owner's full mirrored stake against chain reads.
    pub fn verify_owner_stake(
        &self,
        chain: &dyn StakingChain,
        owner: Address,
        assertion: &str,
    ) -> Result<(), SimError> {
        let epoch = self.current_epoch;
        let mirror = self.owner_stake(owner);
        compare_balance(
            assertion,
            &format!("owner {} undelegated", owner),
            mirror.undelegated.synced(epoch),
            chain.owner_stake(owner, StakeStatus::Undelegated),
        )?;
        compare_balance(
            assertion,
            &format!("owner {} delegated total", owner),
            mirror.delegated.total.synced(epoch),
            chain.owner_stake(owner, StakeStatus::Delegated),
        )?;
        for (pool_id, balance) in &mirror.delegated.by_pool {
            compare_balance(
                assertion,
                &format!("owner {} delegated to {}", owner, pool_id),
                balance.synced(epoch),
                chain.stake_delegated_to_pool(owner, *pool_id),
            )?;
        }
        Ok(())
    }

    pub fn verify_global_stake(
        &self,
        chain: &dyn StakingChain,
        assertion: &str,
    ) -> Result<(), SimError> {
        let epoch = self.current_epoch;
        compare_balance(
            assertion,
            "global undelegated",
            self.global_stake.undelegated.synced(epoch),
            chain.global_stake(StakeStatus::Undelegated),
        )?;
        compare_balance(
            assertion,
            "global delegated",
            self.global_stake.delegated.synced(epoch),
            chain.global_stake(StakeStatus::Delegated),
        )
    }

    /// Compares one pool's mirrored record against the chain snapshot.
    pub fn verify_pool(
        &self,
        chain: &dyn StakingChain,
        pool_id: PoolId,
        assertion: &str,
    ) -> Result<(), SimError> {
        let record = self.pools.get(&pool_id).ok_or_else(|| {
            SimError::invariant(assertion, format!("pool {} missing from mirror", pool_id))
        })?;
        let snapshot = chain.pool(pool_id).ok_or_else(|| {
            SimError::invariant(assertion, format!("pool {} missing on chain", pool_id))
        })?;
        if snapshot.operator != record.operator {
            return Err(SimError::invariant(
                assertion,
                format!("pool {} operator mismatch", pool_id),
            ));
        }
        if snapshot.operator_share_ppm != record.operator_share_ppm {
            return Err(SimError::invariant(
                assertion,
                format!(
                    "pool {} share mismatch: chain {}, mirror {}",
                    pool_id, snapshot.operator_share_ppm, record.operator_share_ppm
                ),
            ));
        }
        if snapshot.last_finalized != record.last_finalized {
            return Err(SimError::invariant(
                assertion,
                format!(
                    "pool {} last finalized: chain {}, mirror {}",
                    pool_id, snapshot.last_finalized, record.last_finalized
                ),
            ));
        }
        compare_balance(
            assertion,
            &format!("pool {} delegated stake", pool_id),
            record.delegated_stake.synced(self.current_epoch),
            snapshot.delegated_stake,
        )
    }

    /// Full internal-consistency sweep: incremental totals equal their
    /// per-pool sums, and aggregates equal the sum over owners. Used by
    /// tests and the runner's final sweep, never in the hot path.
    pub fn check_consistency(&self) -> Result<(), SimError> {
        let epoch = self.current_epoch;
        let mut undelegated = (0u128, 0u128);
        let mut delegated = (0u128, 0u128);
        let mut per_pool: BTreeMap<PoolId, (u128, u128)> = BTreeMap::new();

        for (owner, stake) in &self.owner_stake {
            stake
                .check_total(epoch)
                .map_err(|detail| SimError::invariant("consistency", format!("{}: {}", owner, detail)))?;
            let u = stake.undelegated.synced(epoch);
            undelegated.0 += u.current_epoch_balance;
            undelegated.1 += u.next_epoch_balance;
            let d = stake.delegated.total.synced(epoch);
            delegated.0 += d.current_epoch_balance;
            delegated.1 += d.next_epoch_balance;
            for (pool_id, balance) in &stake.delegated.by_pool {
                let b = balance.synced(epoch);
                let entry = per_pool.entry(*pool_id).or_insert((0, 0));
                entry.0 += b.current_epoch_balance;
                entry.1 += b.next_epoch_balance;
            }
        }

        let global_undelegated = self.global_stake.undelegated.synced(epoch);
        if (global_undelegated.current_epoch_balance, global_undelegated.next_epoch_balance)
            != undelegated
        {
            return Err(SimError::invariant(
                "consistency",
                "global undelegated does not equal the per-owner sum",
            ));
        }
        let global_delegated = self.global_stake.delegated.synced(epoch);
        if (global_delegated.current_epoch_balance, global_delegated.next_epoch_balance) != delegated
        {
            return Err(SimError::invariant(
                "consistency",
                "global delegated does not equal the per-owner sum",
            ));
        }
        for (pool_id, record) in &self.pools {
            let synced = record.delegated_stake.synced(epoch);
            let summed = per_pool.get(pool_id).copied().unwrap_or((0, 0));
            if (synced.current_epoch_balance, synced.next_epoch_balance) != summed {
                return Err(SimError::invariant(
                    "consistency",
                    format!("pool {} delegated stake does not equal the per-owner sum", pool_id),
                ));
            }
        }
        Ok(())
    }
}

/// Compares the balance fields of two stored balances (the epoch marker is a
/// storage detail and may legitimately differ between mirror and chain).
fn compare_balance(
    assertion: &str,
    what: &str,
    mirror: StoredBalance,
    chain: StoredBalance,
) -> Result<(), SimError> {
    if mirror.current_epoch_balance != chain.current_epoch_balance
        || mirror.next_epoch_balance != chain.next_epoch_balance
    {
        return Err(SimError::invariant(
            assertion,
            format!(
                "{}: mirror ({}, {}) != chain ({}, {})",
                what,
                mirror.current_epoch_balance,
                mirror.next_epoch_balance,
                chain.current_epoch_balance,
                chain.next_epoch_balance
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakesim_chain::SimChainConfig;

    #[test]
    fn test_mirror_tracks_chain_for_stake_ops() {
        let mut chain = SimChain::new(SimChainConfig::default());
        let staker = Address::from_seed(1);
        chain.mint_token(chain.zrx_token(), staker, 1_000);

        let mut env = SimulationEnvironment::new(Deployment::from_chain(&chain));
        chain.stake(staker, 600).unwrap();
        env.apply_stake(staker, 600);

        env.verify_owner_stake(&chain, staker, "test").unwrap();
        env.verify_global_stake(&chain, "test").unwrap();
        env.check_consistency().unwrap();
    }

    #[test]
    fn test_mirror_divergence_detected() {
        let mut chain = SimChain::new(SimChainConfig::default());
        let staker = Address::from_seed(1);
        chain.mint_token(chain.zrx_token(), staker, 1_000);
        chain.stake(staker, 600).unwrap();

        let mut env = SimulationEnvironment::new(Deployment::from_chain(&chain));
        env.apply_stake(staker, 599);
        assert!(env.verify_owner_stake(&chain, staker, "test").is_err());
    }

    #[test]
    fn test_roll_epoch_freezes_fees() {
        let chain = SimChain::new(SimChainConfig::default());
        let mut env = SimulationEnvironment::new(Deployment::from_chain(&chain));
        let pool = PoolId::first();
        env.pools.insert(
            pool,
            StakingPoolRecord {
                operator: Address::from_seed(2),
                operator_share_ppm: 500_000,
                delegated_stake: StoredBalance::default(),
                last_finalized: 0,
            },
        );
        env.attribute_fee(pool, 100);
        env.attribute_fee(pool, 50);

        env.roll_epoch(4_000);
        assert_eq!(env.current_epoch, INITIAL_EPOCH + 1);
        let pending = env.pending.as_ref().unwrap();
        assert_eq!(pending.total_fees_collected, 150);
        assert_eq!(pending.rewards_available, 4_000);
        assert!(env.epoch_fees.is_empty());

        // An epoch with no fees pends nothing.
        env.pending = None;
        env.roll_epoch(0);
        assert!(env.pending.is_none());
    }
}
