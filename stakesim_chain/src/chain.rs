//! `SimChain` - the ledger facade implementing the [`StakingChain`] boundary.

use crate::accounts::AccountLedger;
use crate::exchange::Exchange;
use crate::finalization::EpochTracker;
use crate::pools::PoolRegistry;
use crate::staking::StakeLedger;

use ed25519_dalek::VerifyingKey;
use stakesim_env::math::{cobb_douglas, split_reward};
use stakesim_env::{
    Address, Asset, ChainError, ChainEvent, Epoch, Order, PoolEpochStats, PoolId, PoolSnapshot,
    SignedOrder, StakeInfo, StakeStatus, StakingChain, StoredBalance, TxReceipt, UnfinalizedStats,
    MEMBER_STAKE_WEIGHT_PPM, PPM_DENOMINATOR,
};

/// Ledger parameters, fixed at construction.
#[derive(Debug, Clone)]
pub struct SimChainConfig {
    /// Seconds per epoch.
    pub epoch_duration_secs: u64,
    /// Flat WETH fee charged per fill.
    pub protocol_fee: u128,
    /// Unix timestamp the chain starts at.
    pub genesis_time: u64,
}

impl Default for SimChainConfig {
    fn default() -> Self {
        Self {
            epoch_duration_secs: 600,
            protocol_fee: 150_000_000_000_000,
            genesis_time: 1_700_000_000,
        }
    }
}

// Seeds for the well-known deployment addresses.
const ZRX_SEED: u64 = 0xA0;
const WETH_SEED: u64 = 0xA1;
const TOKEN_A_SEED: u64 = 0xB0;
const TOKEN_B_SEED: u64 = 0xB1;
const STAKING_SEED: u64 = 0xC0;
const VAULT_SEED: u64 = 0xC1;

/// In-memory staking/exchange ledger.
///
/// This is the simulation's ground truth: the framework's off-chain mirror
/// is checked against it after every action. Setup methods (`register`,
/// `mint`, `set_eth_balance`) play the deployment-provider role; everything
/// at runtime goes through the [`StakingChain`] trait.
#[derive(Debug)]
pub struct SimChain {
    config: SimChainConfig,
    now: u64,
    accounts: AccountLedger,
    stakes: StakeLedger,
    pools: PoolRegistry,
    epochs: EpochTracker,
    exchange: Exchange,
}

impl SimChain {
    pub fn new(config: SimChainConfig) -> Self {
        let epochs = EpochTracker::new(config.genesis_time, config.epoch_duration_secs);
        Self {
            now: config.genesis_time,
            accounts: AccountLedger::new(),
            stakes: StakeLedger::new(),
            pools: PoolRegistry::new(),
            epochs,
            exchange: Exchange::new(),
            config,
        }
    }

    // ── Deployment addresses ─────────────────────────────────────────────

    pub fn zrx_token(&self) -> Address {
        Address::from_seed(ZRX_SEED)
    }

    pub fn weth_token(&self) -> Address {
        Address::from_seed(WETH_SEED)
    }

    pub fn trade_tokens(&self) -> [Address; 2] {
        [Address::from_seed(TOKEN_A_SEED), Address::from_seed(TOKEN_B_SEED)]
    }

    /// The staking contract account: receives protocol fees, holds rewards.
    pub fn staking_address(&self) -> Address {
        Address::from_seed(STAKING_SEED)
    }

    /// The vault account holding staked ZRX.
    pub fn vault_address(&self) -> Address {
        Address::from_seed(VAULT_SEED)
    }

    // ── Setup (deployment-provider role) ─────────────────────────────────

    pub fn register_account(&mut self, account: Address, key: VerifyingKey) {
        self.accounts.register(account, key);
    }

    pub fn set_eth_balance(&mut self, account: Address, amount: u128) {
        self.accounts.set_eth_balance(account, amount);
    }

    pub fn mint_token(&mut self, token: Address, account: Address, amount: u128) {
        self.accounts.mint(token, account, amount);
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn require_balance(&self, token: Address, owner: Address, amount: u128) -> Result<(), ChainError> {
        let available = self.accounts.erc20_balance(token, owner);
        if amount > available {
            return Err(ChainError::InsufficientBalance {
                asset: Asset::Erc20(token),
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Member and weighted stake of a pool at the current epoch, as used for
    /// the first-fee snapshot.
    fn pool_membership_stats(&self, pool_id: PoolId) -> (u128, u128) {
        let epoch = self.epochs.current_epoch();
        let pool = match self.pools.get(pool_id) {
            Some(pool) => pool,
            None => return (0, 0),
        };
        let total = self
            .stakes
            .pool_delegated(pool_id, epoch)
            .current_epoch_balance;
        let operator = self
            .stakes
            .delegated_to_pool(pool.operator, pool_id, epoch)
            .current_epoch_balance;
        let members = total.saturating_sub(operator);
        let weighted =
            operator + members * MEMBER_STAKE_WEIGHT_PPM as u128 / PPM_DENOMINATOR as u128;
        (members, weighted)
    }

    /// Credits one protocol fee to the maker's pool, snapshotting stake
    /// stats on the pool's first fee of the epoch.
    fn attribute_fee(&mut self, maker: Address, fee: u128) -> Option<PoolId> {
        let pool_id = self.pools.maker_pool(maker)?;
        let (members, weighted) = self.pool_membership_stats(pool_id);
        self.epochs.record_fee(pool_id, fee, members, weighted);
        Some(pool_id)
    }
}

impl StakingChain for SimChain {
    // ── Reads ────────────────────────────────────────────────────────────

    fn current_epoch(&self) -> Epoch {
        self.epochs.current_epoch()
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn epoch_end_time(&self) -> u64 {
        self.epochs.epoch_end_time()
    }

    fn last_pool_id(&self) -> u64 {
        self.pools.last_pool_index()
    }

    fn pool(&self, pool_id: PoolId) -> Option<PoolSnapshot> {
        self.pools.get(pool_id).map(|pool| PoolSnapshot {
            operator: pool.operator,
            operator_share_ppm: pool.operator_share_ppm,
            delegated_stake: self
                .stakes
                .pool_delegated(pool_id, self.epochs.current_epoch()),
            last_finalized: pool.last_finalized,
            reward_pot: pool.reward_pot,
        })
    }

    fn num_pools_to_finalize(&self) -> usize {
        self.epochs.num_pools_to_finalize()
    }

    fn pools_to_finalize(&self) -> Vec<PoolId> {
        self.epochs.pools_to_finalize()
    }

    fn unfinalized_stats(&self) -> Option<UnfinalizedStats> {
        self.epochs.unfinalized_stats()
    }

    fn pool_epoch_stats(&self, pool_id: PoolId) -> Option<PoolEpochStats> {
        self.epochs.active_pool_stats(pool_id)
    }

    fn global_stake(&self, status: StakeStatus) -> StoredBalance {
        self.stakes.global(status, self.epochs.current_epoch())
    }

    fn owner_stake(&self, owner: Address, status: StakeStatus) -> StoredBalance {
        self.stakes.owner(owner, status, self.epochs.current_epoch())
    }

    fn stake_delegated_to_pool(&self, owner: Address, pool_id: PoolId) -> StoredBalance {
        self.stakes
            .delegated_to_pool(owner, pool_id, self.epochs.current_epoch())
    }

    fn pool_delegated_stake(&self, pool_id: PoolId) -> StoredBalance {
        self.stakes
            .pool_delegated(pool_id, self.epochs.current_epoch())
    }

    fn eth_balance(&self, account: Address) -> u128 {
        self.accounts.eth_balance(account)
    }

    fn erc20_balance(&self, token: Address, account: Address) -> u128 {
        self.accounts.erc20_balance(token, account)
    }

    fn order_filled_amount(&self, order: &Order) -> u128 {
        self.exchange.filled_amount(order)
    }

    fn is_valid_order_signature(&self, order: &SignedOrder) -> bool {
        self.exchange
            .verify_signature(self.accounts.key(order.order.maker), order)
            .is_ok()
    }

    fn protocol_fee(&self) -> u128 {
        self.config.protocol_fee
    }

    fn maker_pool(&self, maker: Address) -> Option<PoolId> {
        self.pools.maker_pool(maker)
    }

    // ── Submits ──────────────────────────────────────────────────────────

    fn stake(&mut self, sender: Address, amount: u128) -> Result<TxReceipt, ChainError> {
        let zrx = self.zrx_token();
        let vault = self.vault_address();
        self.accounts.transfer_erc20(zrx, sender, vault, amount)?;
        self.stakes.stake(self.epochs.current_epoch(), sender, amount);
        Ok(TxReceipt::single(ChainEvent::Stake {
            staker: sender,
            amount,
        }))
    }

    fn unstake(&mut self, sender: Address, amount: u128) -> Result<TxReceipt, ChainError> {
        self.stakes.unstake(self.epochs.current_epoch(), sender, amount)?;
        let zrx = self.zrx_token();
        let vault = self.vault_address();
        self.accounts.transfer_erc20(zrx, vault, sender, amount)?;
        Ok(TxReceipt::single(ChainEvent::Unstake {
            staker: sender,
            amount,
        }))
    }

    fn move_stake(
        &mut self,
        sender: Address,
        from: StakeInfo,
        to: StakeInfo,
        amount: u128,
    ) -> Result<TxReceipt, ChainError> {
        for info in [from, to] {
            if let StakeInfo::Delegated(pool_id) = info {
                if self.pools.get(pool_id).is_none() {
                    return Err(ChainError::PoolNotFound(pool_id));
                }
            }
        }
        if from == to {
            return Ok(TxReceipt::empty());
        }
        self.stakes
            .move_stake(self.epochs.current_epoch(), sender, from, to, amount)?;
        Ok(TxReceipt::single(ChainEvent::MoveStake {
            staker: sender,
            amount,
            from,
            to,
        }))
    }

    fn create_staking_pool(
        &mut self,
        sender: Address,
        operator_share_ppm: u32,
        add_operator_as_maker: bool,
    ) -> Result<TxReceipt, ChainError> {
        let pool_id = self
            .pools
            .create(sender, operator_share_ppm, self.epochs.current_epoch())?;
        let mut receipt = TxReceipt::single(ChainEvent::StakingPoolCreated {
            pool_id,
            operator: sender,
            operator_share_ppm,
        });
        if add_operator_as_maker {
            self.pools.join_as_maker(sender, pool_id)?;
            receipt.events.push(ChainEvent::MakerStakingPoolSet {
                maker: sender,
                pool_id,
            });
        }
        Ok(receipt)
    }

    fn decrease_operator_share(
        &mut self,
        sender: Address,
        pool_id: PoolId,
        new_share_ppm: u32,
    ) -> Result<TxReceipt, ChainError> {
        let (old_share_ppm, new_share_ppm) =
            self.pools
                .decrease_operator_share(sender, pool_id, new_share_ppm)?;
        Ok(TxReceipt::single(ChainEvent::OperatorShareDecreased {
            pool_id,
            old_share_ppm,
            new_share_ppm,
        }))
    }

    fn join_pool_as_maker(
        &mut self,
        sender: Address,
        pool_id: PoolId,
    ) -> Result<TxReceipt, ChainError> {
        self.pools.join_as_maker(sender, pool_id)?;
        Ok(TxReceipt::single(ChainEvent::MakerStakingPoolSet {
            maker: sender,
            pool_id,
        }))
    }

    fn withdraw_delegator_rewards(
        &mut self,
        sender: Address,
        pool_id: PoolId,
    ) -> Result<TxReceipt, ChainError> {
        let epoch = self.epochs.current_epoch();
        if self.pools.get(pool_id).is_none() {
            return Err(ChainError::PoolNotFound(pool_id));
        }
        if let Some(unfinalized) = self.epochs.unfinalized() {
            if unfinalized.pool_stats.contains_key(&pool_id) {
                return Err(ChainError::PoolNotFinalized {
                    pool_id,
                    epoch: unfinalized.epoch,
                });
            }
        }

        let operator = self.pools.get(pool_id).map(|p| p.operator).unwrap();
        let pot = self.pools.get(pool_id).map(|p| p.reward_pot).unwrap();
        let total = self.stakes.pool_delegated(pool_id, epoch).current_epoch_balance;
        let operator_stake = self
            .stakes
            .delegated_to_pool(operator, pool_id, epoch)
            .current_epoch_balance;
        let members_total = total.saturating_sub(operator_stake);
        let member_stake = if sender == operator {
            0
        } else {
            self.stakes
                .delegated_to_pool(sender, pool_id, epoch)
                .current_epoch_balance
        };

        let amount = if pot == 0 || member_stake == 0 || members_total == 0 {
            0
        } else {
            (pot * member_stake / members_total).min(pot)
        };

        if amount > 0 {
            let weth = self.weth_token();
            let staking = self.staking_address();
            self.accounts.transfer_erc20(weth, staking, sender, amount)?;
            self.pools.get_mut(pool_id)?.reward_pot -= amount;
        }
        Ok(TxReceipt::single(ChainEvent::RewardsWithdrawn {
            pool_id,
            member: sender,
            amount,
        }))
    }

    fn end_epoch(&mut self, _sender: Address) -> Result<TxReceipt, ChainError> {
        let rewards_available = self
            .accounts
            .erc20_balance(self.weth_token(), self.staking_address());
        let frozen = self.epochs.end_epoch(self.now, rewards_available)?;

        let mut receipt = TxReceipt::single(ChainEvent::EpochEnded {
            epoch: frozen.epoch,
            num_pools_to_finalize: frozen.pool_stats.len(),
            rewards_available: frozen.rewards_available,
            total_fees_collected: frozen.total_fees_collected,
            total_weighted_stake: frozen.total_weighted_stake,
        });
        if frozen.pool_stats.is_empty() {
            receipt.events.push(ChainEvent::EpochFinalized {
                epoch: frozen.epoch,
                rewards_paid: 0,
                rewards_remaining: frozen.rewards_available,
            });
        }
        Ok(receipt)
    }

    fn finalize_pool(&mut self, _sender: Address, pool_id: PoolId) -> Result<TxReceipt, ChainError> {
        if self.pools.get(pool_id).is_none() {
            return Err(ChainError::PoolNotFound(pool_id));
        }
        // Already-cleared stats make finalization a true no-op.
        let stats = match self.epochs.take_unfinalized_pool(pool_id) {
            Some(stats) => stats,
            None => return Ok(TxReceipt::empty()),
        };

        let (epoch, reward) = {
            let unfinalized = self.epochs.unfinalized().unwrap();
            let reward = cobb_douglas(
                unfinalized.rewards_available,
                stats.fees_collected,
                unfinalized.total_fees_collected,
                stats.weighted_stake,
                unfinalized.total_weighted_stake,
            )
            .min(unfinalized.rewards_available - unfinalized.rewards_finalized);
            (unfinalized.epoch, reward)
        };

        let operator_share_ppm = self.pools.get(pool_id).unwrap().operator_share_ppm;
        let (operator_reward, members_reward) =
            split_reward(reward, operator_share_ppm, stats.members_stake);

        if operator_reward > 0 {
            let weth = self.weth_token();
            let staking = self.staking_address();
            let operator = self.pools.get(pool_id).unwrap().operator;
            self.accounts
                .transfer_erc20(weth, staking, operator, operator_reward)?;
        }
        {
            let pool = self.pools.get_mut(pool_id)?;
            pool.reward_pot += members_reward;
            pool.last_finalized = epoch;
        }
        let unfinalized = self.epochs.unfinalized_mut().unwrap();
        unfinalized.rewards_finalized += reward;

        let mut receipt = TxReceipt::single(ChainEvent::RewardsPaid {
            epoch,
            pool_id,
            operator_reward,
            members_reward,
        });
        if unfinalized.pool_stats.is_empty() {
            receipt.events.push(ChainEvent::EpochFinalized {
                epoch,
                rewards_paid: unfinalized.rewards_finalized,
                rewards_remaining: unfinalized.rewards_available - unfinalized.rewards_finalized,
            });
        }
        Ok(receipt)
    }

    fn fill_order(
        &mut self,
        taker: Address,
        order: &SignedOrder,
        taker_fill_amount: u128,
    ) -> Result<TxReceipt, ChainError> {
        self.exchange
            .verify_signature(self.accounts.key(order.order.maker), order)?;
        let plan = self
            .exchange
            .plan_fill(&order.order, taker_fill_amount, self.now)?;

        let inner = order.order;
        let fee = self.config.protocol_fee;
        let weth = self.weth_token();
        let staking = self.staking_address();

        // Validate every leg before committing any of them.
        self.require_balance(inner.maker_token, inner.maker, plan.maker_fill)?;
        self.require_balance(inner.taker_token, taker, plan.taker_fill)?;
        self.require_balance(weth, taker, fee)?;

        self.accounts
            .transfer_erc20(inner.maker_token, inner.maker, taker, plan.maker_fill)?;
        self.accounts
            .transfer_erc20(inner.taker_token, taker, inner.maker, plan.taker_fill)?;
        self.accounts.transfer_erc20(weth, taker, staking, fee)?;

        let pool_id = self.attribute_fee(inner.maker, fee);
        self.exchange.commit_fill(&inner, plan.taker_fill);

        Ok(TxReceipt::single(ChainEvent::Fill {
            maker: inner.maker,
            taker,
            maker_token: inner.maker_token,
            taker_token: inner.taker_token,
            maker_amount_filled: plan.maker_fill,
            taker_amount_filled: plan.taker_fill,
            protocol_fee: fee,
            pool_id,
        }))
    }

    fn match_orders(
        &mut self,
        taker: Address,
        left: &SignedOrder,
        right: &SignedOrder,
    ) -> Result<TxReceipt, ChainError> {
        self.exchange
            .verify_signature(self.accounts.key(left.order.maker), left)?;
        self.exchange
            .verify_signature(self.accounts.key(right.order.maker), right)?;
        let plan = self.exchange.plan_match(&left.order, &right.order, self.now)?;

        let left_order = left.order;
        let right_order = right.order;
        let fee = self.config.protocol_fee;
        let weth = self.weth_token();
        let staking = self.staking_address();

        self.require_balance(left_order.maker_token, left_order.maker, plan.a_from_left)?;
        self.require_balance(right_order.maker_token, right_order.maker, plan.b_matched)?;
        self.require_balance(weth, taker, fee * 2)?;

        // A-side: the left maker pays the right maker's price; the spread
        // goes to the matching taker.
        self.accounts.transfer_erc20(
            left_order.maker_token,
            left_order.maker,
            right_order.maker,
            plan.a_to_right,
        )?;
        self.accounts
            .transfer_erc20(left_order.maker_token, left_order.maker, taker, plan.spread)?;
        // B-side: the right maker delivers the matched amount to the left.
        self.accounts.transfer_erc20(
            right_order.maker_token,
            right_order.maker,
            left_order.maker,
            plan.b_matched,
        )?;
        self.accounts.transfer_erc20(weth, taker, staking, fee * 2)?;

        let left_pool = self.attribute_fee(left_order.maker, fee);
        let right_pool = self.attribute_fee(right_order.maker, fee);
        self.exchange.commit_match(&left_order, &right_order, &plan);

        Ok(TxReceipt {
            events: vec![
                ChainEvent::Fill {
                    maker: left_order.maker,
                    taker,
                    maker_token: left_order.maker_token,
                    taker_token: left_order.taker_token,
                    maker_amount_filled: plan.a_from_left,
                    taker_amount_filled: plan.b_matched,
                    protocol_fee: fee,
                    pool_id: left_pool,
                },
                ChainEvent::Fill {
                    maker: right_order.maker,
                    taker,
                    maker_token: right_order.maker_token,
                    taker_token: right_order.taker_token,
                    maker_amount_filled: plan.b_matched,
                    taker_amount_filled: plan.a_to_right,
                    protocol_fee: fee,
                    pool_id: right_pool,
                },
            ],
        })
    }

    // ── Chain control ────────────────────────────────────────────────────

    fn advance_time(&mut self, seconds: u64) {
        self.now += seconds;
    }
}
