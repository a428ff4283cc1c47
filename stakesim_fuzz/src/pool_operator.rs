//! Pool operator capability: create pools, decrease operator share.

use crate::actor::{Actor, ActionGenerator, Capability, StepOutcome};
use crate::assertion::{expect_events, FunctionAssertion};
use crate::balances::BalanceStore;
use crate::environment::StepCx;
use crate::error::SimError;
use crate::stake::StakingPoolRecord;

use stakesim_env::{Address, ChainEvent, PoolId, StakingChain, StoredBalance, PPM_DENOMINATOR};

/// Registers the pool-operator bundle on an actor.
pub fn apply(actor: &mut Actor) {
    actor.add_capability(Capability::PoolOperator);
    let address = actor.address;
    actor.register_action(Box::new(CreateStakingPool { address }));
    actor.register_action(Box::new(DecreaseOperatorShare { address }));
}

// ── Operations ───────────────────────────────────────────────────────────

/// Creates a staking pool. The new id must be exactly one past the last
/// observed id, rendered fixed-width.
pub fn create_staking_pool(
    cx: &mut StepCx<'_>,
    operator: Address,
    operator_share_ppm: u32,
    add_operator_as_maker: bool,
) -> Result<PoolId, SimError> {
    type Args = (Address, u32, bool);
    let mut assertion: FunctionAssertion<Args, (), BalanceStore, PoolId> =
        FunctionAssertion::submit("create_staking_pool", |cx, &(operator, share, as_maker)| {
            cx.chain.create_staking_pool(operator, share, as_maker)
        })
        .with_before(|cx, _| Ok(cx.env.balances.fork()))
        .with_after(|cx, expected, result, &(operator, share, as_maker)| {
            let pool_id = PoolId(cx.env.last_pool_id + 1);
            let mut expected_events = vec![ChainEvent::StakingPoolCreated {
                pool_id,
                operator,
                operator_share_ppm: share,
            }];
            if as_maker {
                expected_events.push(ChainEvent::MakerStakingPoolSet {
                    maker: operator,
                    pool_id,
                });
            }
            expect_events("create_staking_pool", result, &expected_events)?;

            cx.env.last_pool_id += 1;
            cx.env.pools.insert(
                pool_id,
                StakingPoolRecord {
                    operator,
                    operator_share_ppm: share,
                    delegated_stake: StoredBalance::default(),
                    last_finalized: cx.env.current_epoch.saturating_sub(1),
                },
            );
            if as_maker {
                cx.env.maker_pools.insert(operator, pool_id);
            }

            if cx.chain.last_pool_id() != cx.env.last_pool_id {
                return Err(SimError::invariant(
                    "create_staking_pool",
                    format!(
                        "last pool id: chain {}, mirror {}",
                        cx.chain.last_pool_id(),
                        cx.env.last_pool_id
                    ),
                ));
            }
            if cx.chain.maker_pool(operator) != cx.env.maker_pools.get(&operator).copied() {
                return Err(SimError::invariant(
                    "create_staking_pool",
                    "maker pool registration mismatch",
                ));
            }
            cx.env.verify_pool(&*cx.chain, pool_id, "create_staking_pool")?;
            cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
            Ok(pool_id)
        });
    let executed = assertion.execute(cx, &(operator, operator_share_ppm, add_operator_as_maker))?;
    Ok(executed.after)
}

/// Lowers the operator's share of a pool's rewards.
pub fn decrease_operator_share(
    cx: &mut StepCx<'_>,
    operator: Address,
    pool_id: PoolId,
    new_share_ppm: u32,
) -> Result<(), SimError> {
    type Args = (Address, PoolId, u32);
    let mut assertion: FunctionAssertion<Args, ()> =
        FunctionAssertion::submit("decrease_operator_share", |cx, &(operator, pool_id, share)| {
            cx.chain.decrease_operator_share(operator, pool_id, share)
        })
        .with_after(|cx, _, result, &(_, pool_id, share)| {
            let old_share_ppm = cx
                .env
                .pools
                .get(&pool_id)
                .map(|record| record.operator_share_ppm)
                .ok_or_else(|| {
                    SimError::invariant("decrease_operator_share", "pool missing from mirror")
                })?;
            expect_events(
                "decrease_operator_share",
                result,
                &[ChainEvent::OperatorShareDecreased {
                    pool_id,
                    old_share_ppm,
                    new_share_ppm: share,
                }],
            )?;
            if let Some(record) = cx.env.pools.get_mut(&pool_id) {
                record.operator_share_ppm = share;
            }
            cx.env.verify_pool(&*cx.chain, pool_id, "decrease_operator_share")
        });
    assertion.execute(cx, &(operator, pool_id, new_share_ppm)).map(|_| ())
}

// ── Generators ───────────────────────────────────────────────────────────

struct CreateStakingPool {
    address: Address,
}

impl ActionGenerator for CreateStakingPool {
    fn name(&self) -> &'static str {
        "create_staking_pool"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let share = cx.rng.integer(0, PPM_DENOMINATOR as u128) as u32;
        let as_maker = cx.rng.gen_bool(0.5);
        create_staking_pool(cx, self.address, share, as_maker)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}

struct DecreaseOperatorShare {
    address: Address,
}

impl ActionGenerator for DecreaseOperatorShare {
    fn name(&self) -> &'static str {
        "decrease_operator_share"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let own_pools: Vec<(PoolId, u32)> = cx
            .env
            .pools
            .iter()
            .filter(|(_, record)| record.operator == self.address)
            .map(|(pool_id, record)| (*pool_id, record.operator_share_ppm))
            .collect();
        let Some(&(pool_id, current_share)) = cx.rng.sample(&own_pools) else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };
        let new_share = cx.rng.integer(0, current_share as u128) as u32;
        decrease_operator_share(cx, self.address, pool_id, new_share)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}
