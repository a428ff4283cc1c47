//! Taker capability: fill orders, force rounding rejections, match pairs.

use crate::actor::{Actor, ActionGenerator, Capability, StepOutcome};
use crate::assertion::{expect_events, expect_revert, FunctionAssertion};
use crate::balances::BalanceStore;
use crate::environment::StepCx;
use crate::error::SimError;
use crate::rng::Kumaraswamy;

use stakesim_env::math::{is_rounding_error_floor, partial_amount_floor};
use stakesim_env::trade::{self, FillPlan, MatchPlan};
use stakesim_env::{Address, Asset, ChainError, ChainEvent, SignedOrder, StakingChain};

/// Registers the taker bundle on an actor.
pub fn apply(actor: &mut Actor) {
    actor.add_capability(Capability::Taker);
    let address = actor.address;
    actor.register_action(Box::new(FillOrder { address }));
    actor.register_action(Box::new(FillOrderRoundingError { address }));
    actor.register_action(Box::new(MatchOrders { address }));
}

fn fill_distribution() -> Kumaraswamy {
    Kumaraswamy::new(0.8, 3.0)
}

// ── Operations ───────────────────────────────────────────────────────────

/// Fills an order, predicting every transfer (including the protocol fee and
/// its pool attribution) before the call and holding the ledger to it.
pub fn fill_order(
    cx: &mut StepCx<'_>,
    taker: Address,
    signed: SignedOrder,
    fill_amount: u128,
) -> Result<(), SimError> {
    type Args = (Address, SignedOrder, u128);
    type Before = (BalanceStore, FillPlan);
    let mut assertion: FunctionAssertion<Args, (), Before> =
        FunctionAssertion::submit("fill_order", |cx, (taker, signed, fill_amount): &Args| {
            cx.chain.fill_order(*taker, signed, *fill_amount)
        })
        .with_before(|cx, (taker, signed, fill_amount): &Args| {
            let order = signed.order;
            let filled = cx.env.filled_amount(order.maker, order.salt);
            let plan = trade::plan_fill(&order, filled, *fill_amount, cx.chain.now()).map_err(
                |err| {
                    SimError::invariant(
                        "fill_order",
                        format!("generator proposed an unfillable order: {}", err),
                    )
                },
            )?;
            let deployment = cx.env.deployment;
            let fee = cx.chain.protocol_fee();
            let mut expected = cx.env.balances.fork();
            expected.transfer_asset(order.maker, *taker, plan.maker_fill, Asset::Erc20(order.maker_token))?;
            expected.transfer_asset(*taker, order.maker, plan.taker_fill, Asset::Erc20(order.taker_token))?;
            expected.transfer_asset(*taker, deployment.staking, fee, Asset::Erc20(deployment.weth))?;
            Ok((expected, plan))
        })
        .with_after(|cx, (expected, plan), result, (taker, signed, _): &Args| {
            let order = signed.order;
            let fee = cx.chain.protocol_fee();
            let pool_id = cx.env.maker_pools.get(&order.maker).copied();
            expect_events(
                "fill_order",
                result,
                &[ChainEvent::Fill {
                    maker: order.maker,
                    taker: *taker,
                    maker_token: order.maker_token,
                    taker_token: order.taker_token,
                    maker_amount_filled: plan.maker_fill,
                    taker_amount_filled: plan.taker_fill,
                    protocol_fee: fee,
                    pool_id,
                }],
            )?;
            if let Some(pool_id) = pool_id {
                cx.env.attribute_fee(pool_id, fee);
            }
            *cx.env
                .order_fills
                .entry((order.maker, order.salt))
                .or_insert(0) += plan.taker_fill;
            cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
            Ok(())
        });
    assertion.execute(cx, &(taker, signed, fill_amount)).map(|_| ())
}

/// Attempts a fill chosen to lose at least 0.1% to rounding, expecting the
/// ledger to reject with the exact `(taker_amount, maker_amount, target)`
/// triple.
pub fn fill_order_rounding_error(
    cx: &mut StepCx<'_>,
    taker: Address,
    signed: SignedOrder,
    fill_amount: u128,
) -> Result<(), SimError> {
    type Args = (Address, SignedOrder, u128);
    let mut assertion: FunctionAssertion<Args, (), BalanceStore> =
        FunctionAssertion::submit(
            "fill_order_rounding_error",
            |cx, (taker, signed, fill_amount): &Args| {
                cx.chain.fill_order(*taker, signed, *fill_amount)
            },
        )
        .with_before(|cx, _| Ok(cx.env.balances.fork()))
        .with_after(|cx, expected, result, (_, signed, fill_amount): &Args| {
            let order = signed.order;
            let target =
                partial_amount_floor(*fill_amount, order.taker_amount, order.maker_amount)
                    .map_err(|err| {
                        SimError::invariant("fill_order_rounding_error", err.to_string())
                    })?;
            expect_revert(
                "fill_order_rounding_error",
                result,
                &ChainError::RoundingError {
                    numerator: order.taker_amount,
                    denominator: order.maker_amount,
                    target,
                },
            )?;
            cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
            Ok(())
        });
    assertion.execute(cx, &(taker, signed, fill_amount)).map(|_| ())
}

/// Matches two crossing orders at the maximal mutual fill; both legs are
/// predicted and the two Fill events checked exactly.
pub fn match_orders(
    cx: &mut StepCx<'_>,
    taker: Address,
    left: SignedOrder,
    right: SignedOrder,
) -> Result<(), SimError> {
    type Args = (Address, SignedOrder, SignedOrder);
    type Before = (BalanceStore, MatchPlan);
    let mut assertion: FunctionAssertion<Args, (), Before> =
        FunctionAssertion::submit("match_orders", |cx, (taker, left, right): &Args| {
            cx.chain.match_orders(*taker, left, right)
        })
        .with_before(|cx, (taker, left, right): &Args| {
            let left_order = left.order;
            let right_order = right.order;
            let plan = trade::plan_match(
                &left_order,
                cx.env.filled_amount(left_order.maker, left_order.salt),
                &right_order,
                cx.env.filled_amount(right_order.maker, right_order.salt),
                cx.chain.now(),
            )
            .map_err(|err| {
                SimError::invariant(
                    "match_orders",
                    format!("generator proposed an unmatchable pair: {}", err),
                )
            })?;
            let deployment = cx.env.deployment;
            let fee = cx.chain.protocol_fee();
            let mut expected = cx.env.balances.fork();
            let a = Asset::Erc20(left_order.maker_token);
            let b = Asset::Erc20(right_order.maker_token);
            expected.transfer_asset(left_order.maker, right_order.maker, plan.a_to_right, a)?;
            expected.transfer_asset(left_order.maker, *taker, plan.spread, a)?;
            expected.transfer_asset(right_order.maker, left_order.maker, plan.b_matched, b)?;
            expected.transfer_asset(*taker, deployment.staking, fee * 2, Asset::Erc20(deployment.weth))?;
            Ok((expected, plan))
        })
        .with_after(|cx, (expected, plan), result, (taker, left, right): &Args| {
            let left_order = left.order;
            let right_order = right.order;
            let fee = cx.chain.protocol_fee();
            let left_pool = cx.env.maker_pools.get(&left_order.maker).copied();
            let right_pool = cx.env.maker_pools.get(&right_order.maker).copied();
            expect_events(
                "match_orders",
                result,
                &[
                    ChainEvent::Fill {
                        maker: left_order.maker,
                        taker: *taker,
                        maker_token: left_order.maker_token,
                        taker_token: left_order.taker_token,
                        maker_amount_filled: plan.a_from_left,
                        taker_amount_filled: plan.b_matched,
                        protocol_fee: fee,
                        pool_id: left_pool,
                    },
                    ChainEvent::Fill {
                        maker: right_order.maker,
                        taker: *taker,
                        maker_token: right_order.maker_token,
                        taker_token: right_order.taker_token,
                        maker_amount_filled: plan.b_matched,
                        taker_amount_filled: plan.a_to_right,
                        protocol_fee: fee,
                        pool_id: right_pool,
                    },
                ],
            )?;
            if let Some(pool_id) = left_pool {
                cx.env.attribute_fee(pool_id, fee);
            }
            if let Some(pool_id) = right_pool {
                cx.env.attribute_fee(pool_id, fee);
            }
            *cx.env
                .order_fills
                .entry((left_order.maker, left_order.salt))
                .or_insert(0) += plan.b_matched;
            *cx.env
                .order_fills
                .entry((right_order.maker, right_order.salt))
                .or_insert(0) += plan.a_to_right;
            cx.env.balances = expected.verify_against_chain(&*cx.chain)?;
            Ok(())
        });
    assertion.execute(cx, &(taker, left, right)).map(|_| ())
}

// ── Generators ───────────────────────────────────────────────────────────

struct FillOrder {
    address: Address,
}

impl ActionGenerator for FillOrder {
    fn name(&self) -> &'static str {
        "fill_order"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let now = cx.chain.now();
        cx.env.prune_order_book(now);
        let book = cx.env.order_book.clone();
        let Some(signed) = cx.rng.sample(&book).cloned() else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };

        let order = signed.order;
        let deployment = cx.env.deployment;
        let fee = cx.chain.protocol_fee();
        let remaining = order.taker_amount - cx.env.filled_amount(order.maker, order.salt);
        let maker_funds = cx.env.balances.erc20_balance(order.maker_token, order.maker);
        let taker_funds = cx.env.balances.erc20_balance(order.taker_token, self.address);
        let taker_weth = cx.env.balances.erc20_balance(deployment.weth, self.address);
        if remaining == 0 || taker_weth < fee {
            return Ok(StepOutcome::Skipped { action: self.name() });
        }

        // Draw a few candidate fills; keep the first one every party can
        // actually settle and that survives the rounding guard.
        let mut chosen = None;
        for _ in 0..8 {
            let fill = cx.rng.integer_with(1, remaining, &fill_distribution());
            let Ok(plan) = trade::plan_fill(&order, order.taker_amount - remaining, fill, now) else {
                continue;
            };
            if plan.maker_fill > maker_funds || plan.taker_fill > taker_funds {
                continue;
            }
            chosen = Some(fill);
            break;
        }
        let Some(fill) = chosen else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };
        fill_order(cx, self.address, signed, fill)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}

struct FillOrderRoundingError {
    address: Address,
}

impl ActionGenerator for FillOrderRoundingError {
    fn name(&self) -> &'static str {
        "fill_order_rounding_error"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let now = cx.chain.now();
        cx.env.prune_order_book(now);

        // Scan small fills for one the rounding guard is guaranteed to
        // reject; parameters are constructed to force that error kind.
        let mut candidates: Vec<(SignedOrder, u128)> = Vec::new();
        for signed in &cx.env.order_book {
            let order = signed.order;
            let remaining = order.taker_amount - cx.env.filled_amount(order.maker, order.salt);
            for fill in 1..=remaining.min(256) {
                if is_rounding_error_floor(fill, order.taker_amount, order.maker_amount)
                    .unwrap_or(false)
                {
                    candidates.push((signed.clone(), fill));
                    break;
                }
            }
            if candidates.len() >= 16 {
                break;
            }
        }
        let Some((signed, fill)) = cx.rng.sample(&candidates).cloned() else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };
        fill_order_rounding_error(cx, self.address, signed, fill)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}

struct MatchOrders {
    address: Address,
}

impl ActionGenerator for MatchOrders {
    fn name(&self) -> &'static str {
        "match_orders"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let now = cx.chain.now();
        cx.env.prune_order_book(now);
        let deployment = cx.env.deployment;
        let fee = cx.chain.protocol_fee();
        if cx.env.balances.erc20_balance(deployment.weth, self.address) < fee * 2 {
            return Ok(StepOutcome::Skipped { action: self.name() });
        }

        let book = cx.env.order_book.clone();
        let mut pairs: Vec<(SignedOrder, SignedOrder)> = Vec::new();
        'outer: for (i, left) in book.iter().enumerate() {
            for (j, right) in book.iter().enumerate() {
                if i == j {
                    continue;
                }
                let left_filled = cx.env.filled_amount(left.order.maker, left.order.salt);
                let right_filled = cx.env.filled_amount(right.order.maker, right.order.salt);
                let Ok(plan) =
                    trade::plan_match(&left.order, left_filled, &right.order, right_filled, now)
                else {
                    continue;
                };
                let left_funds = cx
                    .env
                    .balances
                    .erc20_balance(left.order.maker_token, left.order.maker);
                let right_funds = cx
                    .env
                    .balances
                    .erc20_balance(right.order.maker_token, right.order.maker);
                if plan.a_from_left > left_funds || plan.b_matched > right_funds {
                    continue;
                }
                pairs.push((left.clone(), right.clone()));
                if pairs.len() >= 8 {
                    break 'outer;
                }
            }
        }
        let Some((left, right)) = cx.rng.sample(&pairs).cloned() else {
            return Ok(StepOutcome::Skipped { action: self.name() });
        };
        match_orders(cx, self.address, left, right)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}
