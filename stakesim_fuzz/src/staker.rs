//! Staker capability: stake, unstake, move-stake, withdraw rewards.
//!
//! The operations run the real ledger calls wrapped in condition assertions;
//! the generators produce randomized valid scenarios plus the intentionally
//! invalid variants (nonexistent pool, unfinalized pool) that verify the
//! ledger rejects them with the exact expected error.

use crate::actor::{Actor, ActionGenerator, Capability, StepOutcome};
use crate::assertion::{expect_events, expect_revert, expect_success, FunctionAssertion};
use crate::balances::BalanceStore;
use crate::environment::StepCx;
use crate::error::SimError;
use crate::rng::Kumaraswamy;

use stakesim_env::{Address, Asset, ChainError, ChainEvent, Epoch, PoolId, StakeInfo, StakingChain};

/// Registers the staker bundle on an actor.
pub fn apply(actor: &mut Actor) {
    actor.add_capability(Capability::Staker);
    let address = actor.address;
    actor.register_action(Box::new(ValidStake { address }));
    actor.register_action(Box::new(ValidUnstake { address }));
    actor.register_action(Box::new(ValidMoveStake { address }));
    actor.register_action(Box::new(MoveStakeNonexistentPool { address }));
    actor.register_action(Box::new(ValidWithdrawDelegatorRewards { address }));
    actor.register_action(Box::new(WithdrawRewardsUnfinalized { address }));
}

fn amount_distribution() -> Kumaraswamy {
    // Skewed small so repeated actions stay sustainable for a long run.
    Kumaraswamy::new(0.8, 4.0)
}

// ── Operations ───────────────────────────────────────────────────────────

/// Stakes ZRX: tokens move staker -> vault, undelegated stake rises in both
/// epoch balances.
pub fn stake(cx: &mut StepCx<'_>, staker: Address, amount: u128) -> Result<(), SimError> {
    let mut assertion: FunctionAssertion<(Address, u128), (), BalanceStore> =
        FunctionAssertion::submit("stake", |cx, &(staker, amount)| cx.chain.stake(staker, amount))
            .with_before(|cx, &(staker, amount)| {
                let mut expected = cx.env.balances.fork();
                let zrx = cx.env.deployment.zrx;
                let vault = cx.env.deployment.vault;
                expected.transfer_asset(staker, vault, amount, Asset::Erc20(zrx))?;
                Ok(expected)
            })
            .with_after(|cx, expected, result, &(staker, amount)| {
                expect_events("stake", result, &[ChainEvent::Stake { staker, amount }])?;
                cx.env.apply_stake(staker, amount);
                cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
                cx.env.verify_owner_stake(&*cx.chain, staker, "stake")?;
                cx.env.verify_global_stake(&*cx.chain, "stake")
            });
    assertion.execute(cx, &(staker, amount)).map(|_| ())
}

/// Unstakes ZRX: limited to the withdrawable minimum, tokens move back.
pub fn unstake(cx: &mut StepCx<'_>, staker: Address, amount: u128) -> Result<(), SimError> {
    let mut assertion: FunctionAssertion<(Address, u128), (), BalanceStore> =
        FunctionAssertion::submit("unstake", |cx, &(staker, amount)| {
            cx.chain.unstake(staker, amount)
        })
        .with_before(|cx, &(staker, amount)| {
            let mut expected = cx.env.balances.fork();
            let zrx = cx.env.deployment.zrx;
            let vault = cx.env.deployment.vault;
            expected.transfer_asset(vault, staker, amount, Asset::Erc20(zrx))?;
            Ok(expected)
        })
        .with_after(|cx, expected, result, &(staker, amount)| {
            expect_events("unstake", result, &[ChainEvent::Unstake { staker, amount }])?;
            cx.env.apply_unstake(staker, amount)?;
            cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
            cx.env.verify_owner_stake(&*cx.chain, staker, "unstake")?;
            cx.env.verify_global_stake(&*cx.chain, "unstake")
        });
    assertion.execute(cx, &(staker, amount)).map(|_| ())
}

/// Moves next-epoch stake between positions. A same-position move must
/// succeed with zero events.
pub fn move_stake(
    cx: &mut StepCx<'_>,
    staker: Address,
    from: StakeInfo,
    to: StakeInfo,
    amount: u128,
) -> Result<(), SimError> {
    type Args = (Address, StakeInfo, StakeInfo, u128);
    let mut assertion: FunctionAssertion<Args, (), BalanceStore> =
        FunctionAssertion::submit("move_stake", |cx, &(staker, from, to, amount)| {
            cx.chain.move_stake(staker, from, to, amount)
        })
        .with_before(|cx, _| Ok(cx.env.balances.fork()))
        .with_after(|cx, expected, result, &(staker, from, to, amount)| {
            let expected_events = if from == to {
                vec![]
            } else {
                vec![ChainEvent::MoveStake {
                    staker,
                    amount,
                    from,
                    to,
                }]
            };
            expect_events("move_stake", result, &expected_events)?;
            cx.env.apply_move(staker, from, to, amount)?;
            // No token movement; the mirror must still match exactly.
            cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
            cx.env.verify_owner_stake(&*cx.chain, staker, "move_stake")?;
            cx.env.verify_global_stake(&*cx.chain, "move_stake")?;
            for info in [from, to] {
                if let StakeInfo::Delegated(pool_id) = info {
                    cx.env.verify_pool(&*cx.chain, pool_id, "move_stake")?;
                }
            }
            Ok(())
        });
    assertion.execute(cx, &(staker, from, to, amount)).map(|_| ())
}

/// Moves stake toward a pool that was never created, expecting the ledger
/// to reject with exactly `PoolNotFound`.
pub fn move_stake_nonexistent_pool(
    cx: &mut StepCx<'_>,
    staker: Address,
    ghost: PoolId,
    amount: u128,
) -> Result<(), SimError> {
    type Args = (Address, PoolId, u128);
    let mut assertion: FunctionAssertion<Args, (), BalanceStore> =
        FunctionAssertion::submit("move_stake_nonexistent_pool", |cx, &(staker, ghost, amount)| {
            cx.chain
                .move_stake(staker, StakeInfo::Undelegated, StakeInfo::Delegated(ghost), amount)
        })
        .with_before(|cx, _| Ok(cx.env.balances.fork()))
        .with_after(|cx, expected, result, &(_, ghost, _)| {
            expect_revert(
                "move_stake_nonexistent_pool",
                result,
                &ChainError::PoolNotFound(ghost),
            )?;
            // A rejected call must leave everything untouched.
            cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
            cx.env.verify_global_stake(&*cx.chain, "move_stake_nonexistent_pool")
        });
    assertion.execute(cx, &(staker, ghost, amount)).map(|_| ())
}

/// Withdraws delegator rewards from a finalized pool. The paid amount is the
/// ledger's to compute; the hook bounds it by the pool's pot and then holds
/// the balance mirror to it exactly.
pub fn withdraw_delegator_rewards(
    cx: &mut StepCx<'_>,
    staker: Address,
    pool_id: PoolId,
) -> Result<(), SimError> {
    type Before = (BalanceStore, u128);
    let mut assertion: FunctionAssertion<(Address, PoolId), (), Before> =
        FunctionAssertion::submit("withdraw_delegator_rewards", |cx, &(staker, pool_id)| {
            cx.chain.withdraw_delegator_rewards(staker, pool_id)
        })
        .with_before(|cx, &(_, pool_id)| {
            let pot = cx.chain.pool(pool_id).map(|p| p.reward_pot).unwrap_or(0);
            Ok((cx.env.balances.fork(), pot))
        })
        .with_after(|cx, (store, pot_before), result, &(staker, pool_id)| {
            expect_success("withdraw_delegator_rewards", result)?;
            let amount = match result.events() {
                [ChainEvent::RewardsWithdrawn {
                    pool_id: event_pool,
                    member,
                    amount,
                }] if *event_pool == pool_id && *member == staker => *amount,
                events => {
                    return Err(SimError::invariant(
                        "withdraw_delegator_rewards",
                        format!("unexpected events {:?}", events),
                    ))
                }
            };
            if amount > *pot_before {
                return Err(SimError::invariant(
                    "withdraw_delegator_rewards",
                    format!("paid {} exceeds pool pot {}", amount, pot_before),
                ));
            }
            let mut expected = store.fork();
            let weth = cx.env.deployment.weth;
            let staking = cx.env.deployment.staking;
            expected.transfer_asset(staking, staker, amount, Asset::Erc20(weth))?;
            cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
            Ok(())
        });
    assertion.execute(cx, &(staker, pool_id)).map(|_| ())
}

/// Withdraws from a pool that still has an unfinalized epoch, expecting the
/// exact `PoolNotFinalized` rejection.
pub fn withdraw_rewards_unfinalized(
    cx: &mut StepCx<'_>,
    staker: Address,
    pool_id: PoolId,
    epoch: Epoch,
) -> Result<(), SimError> {
    type Args = (Address, PoolId, Epoch);
    let mut assertion: FunctionAssertion<Args, (), BalanceStore> =
        FunctionAssertion::submit("withdraw_rewards_unfinalized", |cx, &(staker, pool_id, _)| {
            cx.chain.withdraw_delegator_rewards(staker, pool_id)
        })
        .with_before(|cx, _| Ok(cx.env.balances.fork()))
        .with_after(|cx, expected, result, &(_, pool_id, epoch)| {
            expect_revert(
                "withdraw_rewards_unfinalized",
                result,
                &ChainError::PoolNotFinalized { pool_id, epoch },
            )?;
            cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
            Ok(())
        });
    assertion.execute(cx, &(staker, pool_id, epoch)).map(|_| ())
}

// ── Generators ───────────────────────────────────────────────────────────

struct ValidStake {
    address: Address,
}

impl ActionGenerator for ValidStake {
    fn name(&self) -> &'static str {
        "stake"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let zrx = cx.env.deployment.zrx;
        let balance = cx.env.balances.erc20_balance(zrx, self.address);
        if balance == 0 {
            return Ok(StepOutcome::Skipped { action: self.name() });
        }
        let amount = cx.rng.integer_with(1, balance, &amount_distribution());
        stake(cx, self.address, amount)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}

struct ValidUnstake {
    address: Address,
}

impl ActionGenerator for ValidUnstake {
    fn name(&self) -> &'static str {
        "unstake"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let withdrawable = cx
            .env
            .owner_stake(self.address)
            .undelegated
            .withdrawable(cx.env.current_epoch);
        if withdrawable == 0 {
            return Ok(StepOutcome::Skipped { action: self.name() });
        }
        let amount = cx.rng.integer_with(1, withdrawable, &amount_distribution());
        unstake(cx, self.address, amount)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}

struct ValidMoveStake {
    address: Address,
}

impl ActionGenerator for ValidMoveStake {
    fn name(&self) -> &'static str {
        "move_stake"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let epoch = cx.env.current_epoch;
        let stake = cx.env.owner_stake(self.address);

        let mut froms: Vec<(StakeInfo, u128)> = Vec::new();
        let undelegated = stake.undelegated.moveable(epoch);
        if undelegated > 0 {
            froms.push((StakeInfo::Undelegated, undelegated));
        }
        for pool_id in stake.delegated_pools(epoch) {
            let moveable = stake.delegated.by_pool[&pool_id].moveable(epoch);
            if moveable > 0 {
                froms.push((StakeInfo::Delegated(pool_id), moveable));
            }
        }
        let Some(&(from, moveable)) = cx.rng.sample(&froms) else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };

        let mut tos = vec![StakeInfo::Undelegated];
        tos.extend(cx.env.pools.keys().map(|id| StakeInfo::Delegated(*id)));
        let Some(&to) = cx.rng.sample(&tos) else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };

        let amount = cx.rng.integer_with(1, moveable, &amount_distribution());
        move_stake(cx, self.address, from, to, amount)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}

struct MoveStakeNonexistentPool {
    address: Address,
}

impl ActionGenerator for MoveStakeNonexistentPool {
    fn name(&self) -> &'static str {
        "move_stake_nonexistent_pool"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        // Any pool index beyond the last observed one is guaranteed absent,
        // and pool existence is checked before amounts, so the amount is
        // unconstrained.
        let offset = cx.rng.integer(1, 1_000) as u64;
        let ghost = PoolId(cx.env.last_pool_id + offset);
        let amount = cx.rng.integer(1, 1_000_000);
        move_stake_nonexistent_pool(cx, self.address, ghost, amount)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}

struct ValidWithdrawDelegatorRewards {
    address: Address,
}

impl ActionGenerator for ValidWithdrawDelegatorRewards {
    fn name(&self) -> &'static str {
        "withdraw_delegator_rewards"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let epoch = cx.env.current_epoch;
        let stake = cx.env.owner_stake(self.address);
        let candidates: Vec<PoolId> = stake
            .delegated_pools(epoch)
            .into_iter()
            .filter(|pool_id| {
                let pending = cx
                    .env
                    .pending
                    .as_ref()
                    .map(|p| p.pool_stats.contains_key(pool_id))
                    .unwrap_or(false);
                !pending
            })
            .collect();
        let Some(&pool_id) = cx.rng.sample(&candidates) else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };
        withdraw_delegator_rewards(cx, self.address, pool_id)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}

struct WithdrawRewardsUnfinalized {
    address: Address,
}

impl ActionGenerator for WithdrawRewardsUnfinalized {
    fn name(&self) -> &'static str {
        "withdraw_rewards_unfinalized"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let Some(pending) = cx.env.pending.as_ref() else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };
        let epoch = pending.epoch;
        let candidates: Vec<PoolId> = pending.pool_stats.keys().copied().collect();
        let Some(&pool_id) = cx.rng.sample(&candidates) else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };
        withdraw_rewards_unfinalized(cx, self.address, pool_id, epoch)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}
