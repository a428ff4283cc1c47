//! Keeper capability: end epochs and finalize pools.
//!
//! The keeper owns the epoch lifecycle: it fast-forwards chain time to the
//! boundary, ends the epoch (only once the previous one is fully settled),
//! and finalizes every pool that earned fees, checking the Cobb-Douglas
//! payout split against the mirror's independently tracked stats.

use crate::actor::{Actor, ActionGenerator, Capability, StepOutcome};
use crate::assertion::{expect_events, FunctionAssertion};
use crate::balances::BalanceStore;
use crate::environment::StepCx;
use crate::error::SimError;

use stakesim_env::math::{cobb_douglas, split_reward};
use stakesim_env::{Address, Asset, ChainEvent, PoolId, StakingChain};

/// Registers the keeper bundle on an actor.
pub fn apply(actor: &mut Actor) {
    actor.add_capability(Capability::Keeper);
    let address = actor.address;
    actor.register_action(Box::new(EndEpoch { address }));
    actor.register_action(Box::new(FinalizePools { address }));
}

// ── Operations ───────────────────────────────────────────────────────────

/// Ends the current epoch, fast-forwarding chain time to the boundary
/// first. The emitted aggregates must match the mirror's fee bookkeeping
/// exactly.
pub fn end_epoch(cx: &mut StepCx<'_>, keeper: Address) -> Result<(), SimError> {
    let mut assertion: FunctionAssertion<Address, (), BalanceStore> =
        FunctionAssertion::submit("end_epoch", |cx, &keeper| cx.chain.end_epoch(keeper))
            .with_before(|cx, _| {
                // Reaching the boundary is part of the setup, not the check.
                let target = cx.chain.epoch_end_time();
                let now = cx.chain.now();
                if now < target {
                    cx.chain.advance_time(target - now);
                }
                Ok(cx.env.balances.fork())
            })
            .with_after(|cx, expected, result, _| {
                let epoch = cx.env.current_epoch;
                let deployment = cx.env.deployment;
                let rewards_available = cx
                    .env
                    .balances
                    .erc20_balance(deployment.weth, deployment.staking);
                let num_pools = cx.env.epoch_fees.len();
                let total_fees_collected =
                    cx.env.epoch_fees.values().map(|s| s.fees_collected).sum();
                let total_weighted_stake =
                    cx.env.epoch_fees.values().map(|s| s.weighted_stake).sum();

                let mut expected_events = vec![ChainEvent::EpochEnded {
                    epoch,
                    num_pools_to_finalize: num_pools,
                    rewards_available,
                    total_fees_collected,
                    total_weighted_stake,
                }];
                if num_pools == 0 {
                    expected_events.push(ChainEvent::EpochFinalized {
                        epoch,
                        rewards_paid: 0,
                        rewards_remaining: rewards_available,
                    });
                }
                expect_events("end_epoch", result, &expected_events)?;

                cx.env.roll_epoch(rewards_available);
                if cx.chain.current_epoch() != cx.env.current_epoch {
                    return Err(SimError::invariant(
                        "end_epoch",
                        format!(
                            "epoch counter: chain {}, mirror {}",
                            cx.chain.current_epoch(),
                            cx.env.current_epoch
                        ),
                    ));
                }
                let pending = cx.env.pending.as_ref().map(|p| p.pool_stats.len()).unwrap_or(0);
                if cx.chain.num_pools_to_finalize() != pending {
                    return Err(SimError::invariant(
                        "end_epoch",
                        "unfinalized pool count mismatch",
                    ));
                }
                cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
                Ok(())
            });
    assertion.execute(cx, &keeper).map(|_| ())
}

/// Finalizes one pool, verifying the Cobb-Douglas reward and its
/// operator/member split against the mirror. Finalizing a pool with
/// nothing pending must succeed with zero events.
pub fn finalize_pool(cx: &mut StepCx<'_>, keeper: Address, pool_id: PoolId) -> Result<(), SimError> {
    type Args = (Address, PoolId);
    let mut assertion: FunctionAssertion<Args, (), BalanceStore> =
        FunctionAssertion::submit("finalize_pool", |cx, &(keeper, pool_id)| {
            cx.chain.finalize_pool(keeper, pool_id)
        })
        .with_before(|cx, _| Ok(cx.env.balances.fork()))
        .with_after(|cx, expected, result, &(_, pool_id)| {
            let pending_stats = cx
                .env
                .pending
                .as_ref()
                .and_then(|p| p.pool_stats.get(&pool_id).copied());

            let Some(stats) = pending_stats else {
                // Already cleared: a true no-op.
                expect_events("finalize_pool", result, &[])?;
                cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
                return Ok(());
            };

            let (epoch, reward, rewards_paid, rewards_remaining, last) = {
                let pending = cx.env.pending.as_ref().unwrap();
                let reward = cobb_douglas(
                    pending.rewards_available,
                    stats.fees_collected,
                    pending.total_fees_collected,
                    stats.weighted_stake,
                    pending.total_weighted_stake,
                )
                .min(pending.rewards_available - pending.rewards_finalized);
                (
                    pending.epoch,
                    reward,
                    pending.rewards_finalized + reward,
                    pending.rewards_available - pending.rewards_finalized - reward,
                    pending.pool_stats.len() == 1,
                )
            };
            let (operator, operator_share_ppm) = cx
                .env
                .pools
                .get(&pool_id)
                .map(|record| (record.operator, record.operator_share_ppm))
                .ok_or_else(|| SimError::invariant("finalize_pool", "pool missing from mirror"))?;
            let (operator_reward, members_reward) =
                split_reward(reward, operator_share_ppm, stats.members_stake);

            let mut expected_events = vec![ChainEvent::RewardsPaid {
                epoch,
                pool_id,
                operator_reward,
                members_reward,
            }];
            if last {
                expected_events.push(ChainEvent::EpochFinalized {
                    epoch,
                    rewards_paid,
                    rewards_remaining,
                });
            }
            expect_events("finalize_pool", result, &expected_events)?;

            // Commit the mirror: pot accounting, pending set, pool record.
            let deployment = cx.env.deployment;
            if let Some(pending) = cx.env.pending.as_mut() {
                pending.rewards_finalized += reward;
                pending.pool_stats.remove(&pool_id);
                if pending.pool_stats.is_empty() {
                    cx.env.pending = None;
                }
            }
            if let Some(record) = cx.env.pools.get_mut(&pool_id) {
                record.last_finalized = epoch;
            }

            let mut predicted = expected.fork();
            predicted.transfer_asset(
                deployment.staking,
                operator,
                operator_reward,
                Asset::Erc20(deployment.weth),
            )?;
            cx.env.balances = predicted.verify_against_chain(&*cx.chain)?;

            let pending_count = cx.env.pending.as_ref().map(|p| p.pool_stats.len()).unwrap_or(0);
            if cx.chain.num_pools_to_finalize() != pending_count {
                return Err(SimError::invariant(
                    "finalize_pool",
                    "unfinalized pool count mismatch",
                ));
            }
            Ok(())
        });
    assertion.execute(cx, &(keeper, pool_id)).map(|_| ())
}

// ── Generators ───────────────────────────────────────────────────────────

struct EndEpoch {
    address: Address,
}

impl ActionGenerator for EndEpoch {
    fn name(&self) -> &'static str {
        "end_epoch"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        // Ending is invalid while the previous epoch has unfinalized pools;
        // the generator yields nothing rather than forcing the revert.
        if cx.env.pending.is_some() {
            return Ok(StepOutcome::Skipped { action: self.name() });
        }
        end_epoch(cx, self.address)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}

struct FinalizePools {
    address: Address,
}

impl ActionGenerator for FinalizePools {
    fn name(&self) -> &'static str {
        "finalize_pools"
    }

    /// Finalizes every pool that earned rewards last epoch, then
    /// occasionally re-finalizes one to confirm idempotence.
    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let pools: Vec<PoolId> = cx
            .env
            .pending
            .as_ref()
            .map(|p| p.pool_stats.keys().copied().collect())
            .unwrap_or_default();
        if pools.is_empty() {
            return Ok(StepOutcome::Skipped { action: self.name() });
        }
        for &pool_id in &pools {
            finalize_pool(cx, self.address, pool_id)?;
        }
        if cx.rng.gen_bool(0.25) {
            if let Some(&pool_id) = cx.rng.sample(&pools) {
                finalize_pool(cx, self.address, pool_id)?;
            }
        }
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}
