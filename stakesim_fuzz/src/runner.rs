//! Scenario runner: builds the ledger and actor population, drives the
//! simulation, and sweeps the mirror against chain state at the end.

use crate::actor::{Actor, Capability};
use crate::driver::{ActionWeights, RunStats, Simulation};
use crate::environment::{Deployment, SimulationEnvironment, StepCx};
use crate::keys::DeterministicKeyProvider;
use crate::rng::SimRng;
use crate::scenarios::ScenarioId;

use serde::Serialize;
use stakesim_chain::{SimChain, SimChainConfig};
use stakesim_env::{Address, Epoch};
use tracing::{error, info};

/// ETH funded to every actor.
const ETH_FUNDING: u128 = 1_000_000_000_000_000_000;
/// ZRX (stake token) funded to every actor.
const ZRX_FUNDING: u128 = 1_000_000_000;
/// WETH (fee token) funded to every actor.
const WETH_FUNDING: u128 = 1_000_000_000_000_000_000;
/// Trade-token funding per actor.
const TRADE_FUNDING: u128 = 1_000_000_000;

/// Action names composed into the nested exchange sub-simulation in the
/// `full` scenario.
const EXCHANGE_ACTIONS: &[&str] = &[
    "sign_order",
    "fill_order",
    "fill_order_rounding_error",
    "match_orders",
];

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub seed: u64,
    pub passed: bool,
    pub stats: RunStats,
    pub final_epoch: Epoch,
    pub pools_created: u64,
    pub failure_reason: Option<String>,
}

/// Runs named fuzz scenarios.
pub struct ScenarioRunner {
    seed: u64,
    steps: u64,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self { seed, steps: 1_000 }
    }

    /// Sets the number of driver steps.
    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    /// Default selection weights: valid flows dominate, invalid variants and
    /// epoch control stay occasional.
    pub fn default_weights() -> ActionWeights {
        ActionWeights::new()
            .set("stake", 2.0)
            .set("unstake", 1.5)
            .set("move_stake", 2.0)
            .set("move_stake_nonexistent_pool", 0.4)
            .set("withdraw_delegator_rewards", 1.0)
            .set("withdraw_rewards_unfinalized", 0.4)
            .set("create_staking_pool", 0.7)
            .set("decrease_operator_share", 0.4)
            .set("end_epoch", 0.4)
            .set("finalize_pools", 0.8)
            .set("sign_order", 2.0)
            .set("fill_order", 3.0)
            .set("fill_order_rounding_error", 0.4)
            .set("match_orders", 1.0)
    }

    fn role_sets(scenario: ScenarioId) -> Vec<Vec<Capability>> {
        use Capability::*;
        match scenario {
            ScenarioId::Staking => vec![
                vec![Staker],
                vec![Staker],
                vec![Staker],
                vec![PoolOperator],
                vec![Staker, PoolOperator],
            ],
            ScenarioId::Epochs => vec![
                vec![Staker],
                vec![Staker],
                vec![PoolOperator],
                vec![Staker, Keeper],
            ],
            ScenarioId::Exchange => vec![
                vec![Maker],
                vec![Maker],
                vec![Taker],
                vec![Taker],
            ],
            ScenarioId::Full => vec![
                vec![Staker],
                vec![Staker],
                vec![PoolOperator, Maker],
                vec![Staker, PoolOperator],
                vec![Staker, Keeper],
                vec![Maker],
                vec![Taker],
                vec![Taker],
            ],
        }
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!(
            "Starting scenario: {} (seed={}, steps={})",
            scenario.name(),
            self.seed,
            self.steps
        );

        let mut chain = SimChain::new(SimChainConfig::default());
        let mut keys = DeterministicKeyProvider::new(self.seed);
        // Separate stream for the driver so population changes in one
        // subsystem do not reshuffle another.
        let mut rng = SimRng::new(self.seed).derive(0x51);

        // Fund and register the population (the deployment-provider role).
        let deployment = Deployment::from_chain(&chain);
        let mut actors: Vec<Actor> = Vec::new();
        for (index, roles) in Self::role_sets(scenario).iter().enumerate() {
            let key = keys.actor_key(index as u64);
            let address = Address::from_seed(1_000 + index as u64);
            chain.register_account(address, key.verifying_key());
            chain.set_eth_balance(address, ETH_FUNDING);
            chain.mint_token(deployment.zrx, address, ZRX_FUNDING);
            chain.mint_token(deployment.weth, address, WETH_FUNDING);
            chain.mint_token(deployment.token_a, address, TRADE_FUNDING);
            chain.mint_token(deployment.token_b, address, TRADE_FUNDING);

            let mut actor = Actor::new(address, key);
            for role in roles {
                actor = match role {
                    Capability::Staker => actor.with_staker(),
                    Capability::PoolOperator => actor.with_pool_operator(),
                    Capability::Keeper => actor.with_keeper(),
                    Capability::Maker => actor.with_maker(),
                    Capability::Taker => actor.with_taker(),
                };
            }
            actors.push(actor);
        }

        // Seed the mirror from a fresh read of the funded ledger.
        let mut env = SimulationEnvironment::new(deployment);
        for actor in &actors {
            env.actors.push(actor.profile());
            env.balances.track_account(actor.address);
        }
        env.balances.track_account(deployment.staking);
        env.balances.track_account(deployment.vault);
        for token in [deployment.zrx, deployment.weth, deployment.token_a, deployment.token_b] {
            env.balances.track_token(token);
        }
        env.balances.update_erc20_balances(&chain);
        env.balances.update_eth_balances(&chain);

        info!(
            "  population: {} actors ({} stakers, {} operators, {} keepers, {} makers, {} takers)",
            env.actors.len(),
            env.actors_with(Capability::Staker).len(),
            env.actors_with(Capability::PoolOperator).len(),
            env.actors_with(Capability::Keeper).len(),
            env.actors_with(Capability::Maker).len(),
            env.actors_with(Capability::Taker).len(),
        );

        let weights = Self::default_weights();
        let mut simulation = match scenario {
            ScenarioId::Full => {
                // The exchange runs as its own driver stream, nested as one
                // weighted branch of the parent.
                let mut parent = Simulation::new("full");
                let mut exchange = Simulation::new("exchange_nested");
                for actor in &mut actors {
                    for (action, generator) in std::mem::take(&mut actor.actions) {
                        let weight = weights.weight_of(action);
                        if EXCHANGE_ACTIONS.contains(&action) {
                            exchange.push_action(generator, weight);
                        } else {
                            parent.push_action(generator, weight);
                        }
                    }
                }
                if exchange.num_branches() > 0 {
                    parent.push_nested(exchange, 4.0);
                }
                parent
            }
            _ => Simulation::from_actors(scenario.name(), &mut actors, &weights),
        };

        let mut cx = StepCx {
            env: &mut env,
            chain: &mut chain,
            rng: &mut rng,
        };
        let run_outcome = simulation.run(&mut cx, Some(self.steps));

        let (stats, failure_reason) = match run_outcome {
            Ok(stats) => (stats, Self::final_sweep(&env, &chain)),
            Err(err) => (RunStats::default(), Some(err.to_string())),
        };

        let passed = failure_reason.is_none();
        if passed {
            info!(
                "✓ {} complete: {} steps, {} performed, {} skipped, epoch {}, {} pools",
                scenario.name(),
                stats.steps,
                stats.performed,
                stats.skipped,
                env.current_epoch,
                env.last_pool_id
            );
        } else {
            error!(
                "✗ {} failed (seed={}): {}",
                scenario.name(),
                self.seed,
                failure_reason.as_deref().unwrap_or("unknown")
            );
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            stats,
            final_epoch: env.current_epoch,
            pools_created: env.last_pool_id,
            failure_reason,
        }
    }

    /// Full-ledger equivalence sweep after the run: internal consistency,
    /// every owner and pool against chain reads, and the balance mirror.
    fn final_sweep(env: &SimulationEnvironment, chain: &SimChain) -> Option<String> {
        if let Err(err) = env.check_consistency() {
            return Some(err.to_string());
        }
        for profile in &env.actors {
            if let Err(err) = env.verify_owner_stake(chain, profile.address, "final_sweep") {
                return Some(err.to_string());
            }
        }
        if let Err(err) = env.verify_global_stake(chain, "final_sweep") {
            return Some(err.to_string());
        }
        for pool_id in env.pools.keys() {
            if let Err(err) = env.verify_pool(chain, *pool_id, "final_sweep") {
                return Some(err.to_string());
            }
        }
        if let Err(err) = env.balances.verify_against_chain(chain) {
            return Some(err.to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staking_scenario_short_run() {
        let result = ScenarioRunner::new(42).with_steps(200).run(ScenarioId::Staking);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.stats.performed > 0);
    }

    #[test]
    fn test_epochs_scenario_advances_epochs() {
        let result = ScenarioRunner::new(42).with_steps(600).run(ScenarioId::Epochs);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.final_epoch > 1);
    }

    #[test]
    fn test_exchange_scenario_short_run() {
        let result = ScenarioRunner::new(42).with_steps(200).run(ScenarioId::Exchange);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.stats.per_action.get("sign_order").copied().unwrap_or(0) > 0);
    }

    #[test]
    fn test_full_scenario_short_run() {
        let result = ScenarioRunner::new(7).with_steps(400).run(ScenarioId::Full);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_deterministic_replay() {
        let first = ScenarioRunner::new(1234).with_steps(150).run(ScenarioId::Staking);
        let second = ScenarioRunner::new(1234).with_steps(150).run(ScenarioId::Staking);
        assert!(first.passed && second.passed);
        assert_eq!(first.stats, second.stats);
        assert_eq!(first.final_epoch, second.final_epoch);
        assert_eq!(first.pools_created, second.pools_created);
    }
}
