//! End-to-end properties of the simulation framework and the ledger.

use ed25519_dalek::{Signer, SigningKey};
use proptest::prelude::*;
use stakesim_chain::{SimChain, SimChainConfig};
use stakesim_env::math::{ceil_div, cobb_douglas};
use stakesim_env::{
    Address, ChainError, ChainEvent, Order, PoolId, SignedOrder, StakeInfo, StakingChain,
    StoredBalance, PPM_DENOMINATOR,
};
use stakesim_fuzz::{
    Deployment, PendingEpoch, ScenarioId, ScenarioRunner, SimRng, SimulationEnvironment, StepCx,
};
use std::collections::BTreeMap;

fn seeded_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn funded_account(chain: &mut SimChain, seed: u64, zrx: u128) -> Address {
    let address = Address::from_seed(seed);
    let key = seeded_key(seed as u8);
    chain.register_account(address, key.verifying_key());
    let token = chain.zrx_token();
    chain.mint_token(token, address, zrx);
    address
}

// ── Mirror/chain equivalence ─────────────────────────────────────────────

#[test]
fn mirror_stays_equal_to_chain_across_seeds() {
    for seed in [1u64, 2, 3] {
        let result = ScenarioRunner::new(seed)
            .with_steps(250)
            .run(ScenarioId::Staking);
        assert!(
            result.passed,
            "seed {}: {:?}",
            seed, result.failure_reason
        );
    }
}

#[test]
fn full_scenario_mirror_equivalence() {
    let result = ScenarioRunner::new(99).with_steps(400).run(ScenarioId::Full);
    assert!(result.passed, "{:?}", result.failure_reason);
}

// ── Pool id monotonicity ─────────────────────────────────────────────────

#[test]
fn pool_ids_are_sequential_fixed_width_hex() {
    let mut chain = SimChain::new(SimChainConfig::default());
    let alice = funded_account(&mut chain, 1, 0);
    let bob = funded_account(&mut chain, 2, 0);

    let mut hexes = Vec::new();
    for i in 0..6u64 {
        let operator = if i % 2 == 0 { alice } else { bob };
        let receipt = chain.create_staking_pool(operator, 100_000, false).unwrap();
        match receipt.events[0] {
            ChainEvent::StakingPoolCreated { pool_id, .. } => hexes.push(pool_id.to_hex()),
            ref other => panic!("unexpected event {:?}", other),
        }
    }

    for (i, hex) in hexes.iter().enumerate() {
        assert_eq!(hex.len(), 66);
        assert_eq!(*hex, format!("0x{:064x}", i + 1));
    }
}

// ── Epoch monotonicity ───────────────────────────────────────────────────

#[test]
fn epoch_increases_by_exactly_one_per_end_epoch() {
    let mut chain = SimChain::new(SimChainConfig::default());
    let keeper = funded_account(&mut chain, 1, 0);

    for expected in 2..=5u64 {
        let now = chain.now();
        chain.advance_time(chain.epoch_end_time().saturating_sub(now));
        chain.end_epoch(keeper).unwrap();
        assert_eq!(chain.current_epoch(), expected);
    }
}

#[test]
fn end_epoch_generator_skips_while_pools_unfinalized() {
    use stakesim_fuzz::{Actor, StepOutcome};

    let mut chain = SimChain::new(SimChainConfig::default());
    let keeper_key = seeded_key(9);
    let keeper = Address::from_seed(9);
    chain.register_account(keeper, keeper_key.verifying_key());

    let mut env = SimulationEnvironment::new(Deployment::from_chain(&chain));
    // A pending epoch with one unfinalized pool.
    env.pending = Some(PendingEpoch {
        epoch: 1,
        pool_stats: BTreeMap::from([(PoolId::first(), Default::default())]),
        total_fees_collected: 10,
        total_weighted_stake: 100,
        rewards_available: 1_000,
        rewards_finalized: 0,
    });

    let mut actor = Actor::new(keeper, keeper_key).with_keeper();
    let mut rng = SimRng::new(42);
    let mut cx = StepCx {
        env: &mut env,
        chain: &mut chain,
        rng: &mut rng,
    };
    let generator = actor.actions.get_mut("end_epoch").unwrap();
    let outcome = generator.step(&mut cx).unwrap();
    assert_eq!(outcome, StepOutcome::Skipped { action: "end_epoch" });
}

// ── Finalization ─────────────────────────────────────────────────────────

/// Drives a two-pool epoch with fees and member stake through finalization,
/// checking Cobb-Douglas rewards and the ceiling operator split.
#[test]
fn finalize_pays_cobb_douglas_rewards_and_is_idempotent() {
    let mut chain = SimChain::new(SimChainConfig::default());
    let operator_a = funded_account(&mut chain, 1, 100_000);
    let operator_b = funded_account(&mut chain, 2, 100_000);
    let delegator = funded_account(&mut chain, 3, 100_000);
    let maker_a = funded_account(&mut chain, 4, 0);
    let maker_b = funded_account(&mut chain, 5, 0);
    let taker = funded_account(&mut chain, 6, 0);

    let [token_a, token_b] = chain.trade_tokens();
    let weth = chain.weth_token();
    chain.mint_token(token_a, maker_a, 10_000_000);
    chain.mint_token(token_a, maker_b, 10_000_000);
    chain.mint_token(token_b, taker, 10_000_000);
    chain.mint_token(weth, taker, chain.protocol_fee() * 100);

    // Pool A: operator share 1/3-ish, with member stake.
    let pool_a = match chain.create_staking_pool(operator_a, 333_333, false).unwrap().events[0] {
        ChainEvent::StakingPoolCreated { pool_id, .. } => pool_id,
        ref other => panic!("unexpected event {:?}", other),
    };
    let pool_b = match chain.create_staking_pool(operator_b, PPM_DENOMINATOR, false).unwrap().events[0] {
        ChainEvent::StakingPoolCreated { pool_id, .. } => pool_id,
        ref other => panic!("unexpected event {:?}", other),
    };
    chain.join_pool_as_maker(maker_a, pool_a).unwrap();
    chain.join_pool_as_maker(maker_b, pool_b).unwrap();

    // Stake: operator A self-delegates 1_000, delegator adds 2_000 to A;
    // operator B self-delegates 3_000.
    chain.stake(operator_a, 1_000).unwrap();
    chain
        .move_stake(operator_a, StakeInfo::Undelegated, StakeInfo::Delegated(pool_a), 1_000)
        .unwrap();
    chain.stake(delegator, 2_000).unwrap();
    chain
        .move_stake(delegator, StakeInfo::Undelegated, StakeInfo::Delegated(pool_a), 2_000)
        .unwrap();
    chain.stake(operator_b, 3_000).unwrap();
    chain
        .move_stake(operator_b, StakeInfo::Undelegated, StakeInfo::Delegated(pool_b), 3_000)
        .unwrap();

    // Roll the delegations into effect.
    let now = chain.now();
    chain.advance_time(chain.epoch_end_time().saturating_sub(now));
    chain.end_epoch(operator_a).unwrap();

    // One fill per maker: each pool earns one protocol fee.
    let fee = chain.protocol_fee();
    for (maker, key_seed, salt) in [(maker_a, 4u8, 1u64), (maker_b, 5u8, 2u64)] {
        let order = Order {
            maker,
            maker_token: token_a,
            taker_token: token_b,
            maker_amount: 5_000,
            taker_amount: 10_000,
            expiry: chain.now() + 1_000_000,
            salt,
        };
        let signed = SignedOrder {
            order,
            signature: seeded_key(key_seed).sign(&order.signing_bytes()),
        };
        chain.fill_order(taker, &signed, 1_000).unwrap();
    }

    let now = chain.now();
    chain.advance_time(chain.epoch_end_time().saturating_sub(now));
    chain.end_epoch(operator_a).unwrap();
    assert_eq!(chain.num_pools_to_finalize(), 2);

    // Expected Cobb-Douglas inputs, from first-fee snapshots:
    //   pool A: members 2_000, weighted 1_000 + 2_000 * 0.9 = 2_800
    //   pool B: members 0,     weighted 3_000
    let stats = chain.unfinalized_stats().unwrap();
    assert_eq!(stats.total_fees_collected, fee * 2);
    assert_eq!(stats.total_weighted_stake, 2_800 + 3_000);
    let rewards_available = stats.rewards_available;

    let reward_a = cobb_douglas(rewards_available, fee, fee * 2, 2_800, 5_800);
    let receipt = chain.finalize_pool(operator_a, pool_a).unwrap();
    match receipt.events[0] {
        ChainEvent::RewardsPaid {
            pool_id,
            operator_reward,
            members_reward,
            ..
        } => {
            assert_eq!(pool_id, pool_a);
            // Members stake > 0: ceiling split at 333_333 PPM.
            let expected_operator = ceil_div(reward_a * 333_333, PPM_DENOMINATOR as u128);
            assert_eq!(operator_reward, expected_operator);
            assert_eq!(members_reward, reward_a - expected_operator);
        }
        ref other => panic!("unexpected event {:?}", other),
    }

    // Pool B: no members, operator takes everything (capped by remainder).
    let reward_b = cobb_douglas(rewards_available, fee, fee * 2, 3_000, 5_800)
        .min(rewards_available - reward_a);
    let receipt = chain.finalize_pool(operator_a, pool_b).unwrap();
    match receipt.events[0] {
        ChainEvent::RewardsPaid {
            operator_reward,
            members_reward,
            ..
        } => {
            assert_eq!(operator_reward, reward_b);
            assert_eq!(members_reward, 0);
        }
        ref other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(receipt.events[1], ChainEvent::EpochFinalized { .. }));

    // Idempotence: both pools are cleared; refinalizing emits nothing.
    assert!(chain.finalize_pool(operator_a, pool_a).unwrap().events.is_empty());
    assert!(chain.finalize_pool(operator_a, pool_b).unwrap().events.is_empty());

    // The delegator can now withdraw from the finalized pool.
    let receipt = chain.withdraw_delegator_rewards(delegator, pool_a).unwrap();
    match receipt.events[0] {
        ChainEvent::RewardsWithdrawn { member, amount, .. } => {
            assert_eq!(member, delegator);
            assert!(amount > 0);
        }
        ref other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn withdraw_rejected_while_pool_unfinalized() {
    let mut chain = SimChain::new(SimChainConfig::default());
    let operator = funded_account(&mut chain, 1, 100_000);
    let maker = funded_account(&mut chain, 2, 0);
    let taker = funded_account(&mut chain, 3, 0);

    let [token_a, token_b] = chain.trade_tokens();
    chain.mint_token(token_a, maker, 1_000_000);
    chain.mint_token(token_b, taker, 1_000_000);
    let weth = chain.weth_token();
    chain.mint_token(weth, taker, chain.protocol_fee() * 10);

    let pool_id = match chain.create_staking_pool(operator, 0, false).unwrap().events[0] {
        ChainEvent::StakingPoolCreated { pool_id, .. } => pool_id,
        ref other => panic!("unexpected event {:?}", other),
    };
    chain.join_pool_as_maker(maker, pool_id).unwrap();

    let order = Order {
        maker,
        maker_token: token_a,
        taker_token: token_b,
        maker_amount: 5_000,
        taker_amount: 10_000,
        expiry: chain.now() + 1_000_000,
        salt: 1,
    };
    let signed = SignedOrder {
        order,
        signature: seeded_key(2).sign(&order.signing_bytes()),
    };
    chain.fill_order(taker, &signed, 1_000).unwrap();

    let now = chain.now();
    chain.advance_time(chain.epoch_end_time().saturating_sub(now));
    chain.end_epoch(operator).unwrap();

    let err = chain.withdraw_delegator_rewards(operator, pool_id).unwrap_err();
    assert_eq!(
        err,
        ChainError::PoolNotFinalized { pool_id, epoch: 1 }
    );
}

// ── Rounding-error rejection scenario ────────────────────────────────────

#[test]
fn bridge_rounding_scenario_surfaces_exact_triple() {
    let mut chain = SimChain::new(SimChainConfig::default());
    let maker = funded_account(&mut chain, 1, 0);
    let taker = funded_account(&mut chain, 2, 0);
    let [token_a, token_b] = chain.trade_tokens();
    chain.mint_token(token_a, maker, 1_000_000);
    chain.mint_token(token_b, taker, 1_000_000);
    chain.mint_token(chain.weth_token(), taker, chain.protocol_fee() * 10);

    let order = Order {
        maker,
        maker_token: token_a,
        taker_token: token_b,
        maker_amount: 5_318,
        taker_amount: 47_958,
        expiry: chain.now() + 1_000_000,
        salt: 1,
    };
    let signed = SignedOrder {
        order,
        signature: seeded_key(1).sign(&order.signing_bytes()),
    };

    let err = chain.fill_order(taker, &signed, 998).unwrap_err();
    assert_eq!(
        err,
        ChainError::RoundingError {
            numerator: 47_958,
            denominator: 5_318,
            target: 110,
        }
    );
    // Nothing moved.
    assert_eq!(chain.erc20_balance(token_a, maker), 1_000_000);
    assert_eq!(chain.erc20_balance(token_b, taker), 1_000_000);
}

// ── Weighted selection law ───────────────────────────────────────────────

#[test]
fn weighted_selection_matches_weight_ratios() {
    let mut rng = SimRng::new(1234);
    let weights = [2.0, 5.0, 13.0];
    let total: f64 = weights.iter().sum();
    let trials = 40_000;
    let mut counts = [0u64; 3];
    for _ in 0..trials {
        counts[rng.sample_weighted_index(&weights).unwrap()] += 1;
    }
    for (i, &weight) in weights.iter().enumerate() {
        let observed = counts[i] as f64 / trials as f64;
        let expected = weight / total;
        assert!(
            (observed - expected).abs() < 0.01,
            "index {}: observed {:.4}, expected {:.4}",
            i,
            observed,
            expected
        );
    }
}

// ── StoredBalance epoch-roll model ───────────────────────────────────────

proptest! {
    /// Random op sequences against a naive two-field model: a write at a
    /// later epoch promotes next into current before applying.
    #[test]
    fn stored_balance_matches_promotion_model(
        ops in proptest::collection::vec((0u8..4, 1u128..1_000, 0u64..3), 1..60)
    ) {
        let mut balance = StoredBalance::default();
        let mut epoch = 1u64;
        let (mut current, mut next) = (0u128, 0u128);
        let mut model_epoch = 0u64;

        for (op, amount, advance) in ops {
            epoch += advance;
            if model_epoch < epoch {
                current = next;
                model_epoch = epoch;
            }
            match op {
                0 => {
                    balance.increase_current_and_next(epoch, amount);
                    current += amount;
                    next += amount;
                }
                1 => {
                    let available = current.min(next);
                    let amount = amount.min(available);
                    if amount > 0 {
                        balance.decrease_current_and_next(epoch, amount).unwrap();
                        current -= amount;
                        next -= amount;
                    }
                }
                2 => {
                    balance.increase_next(epoch, amount);
                    next += amount;
                }
                _ => {
                    let amount = amount.min(next);
                    if amount > 0 {
                        balance.decrease_next(epoch, amount).unwrap();
                        next -= amount;
                    }
                }
            }
            let synced = balance.synced(epoch);
            prop_assert_eq!(synced.current_epoch_balance, current);
            prop_assert_eq!(synced.next_epoch_balance, next);
        }

        // Reads far in the future see the promoted value without mutating.
        let future = balance.synced(epoch + 10);
        prop_assert_eq!(future.current_epoch_balance, next);
    }
}

proptest! {
    /// The incremental delegated total always equals the per-pool sum.
    #[test]
    fn owner_stake_total_matches_pool_sum(
        moves in proptest::collection::vec((0u64..4, 1u128..500), 1..40)
    ) {
        use stakesim_fuzz::OwnerStakeByStatus;

        let mut owner = OwnerStakeByStatus::default();
        owner.stake(1, 1_000_000);
        for (pool_index, amount) in moves {
            let to = if pool_index == 0 {
                StakeInfo::Undelegated
            } else {
                StakeInfo::Delegated(PoolId(pool_index))
            };
            // Move from undelegated when possible, otherwise skip.
            if owner.undelegated.moveable(1) >= amount {
                owner.move_stake(1, StakeInfo::Undelegated, to, amount).unwrap();
            }
        }
        prop_assert!(owner.check_total(1).is_ok());
        prop_assert!(owner.check_total(4).is_ok());
    }
}
