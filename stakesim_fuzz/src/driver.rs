//! The simulation driver: weighted random interleaving of action streams.
//!
//! A [`Simulation`] holds a weighted list of branches, each either a single
//! action generator or a nested sub-simulation. One advancement step picks a
//! branch by weighted random draw and advances it exactly once; a full
//! action (before, call, after) completes before the next draw, so the
//! environment has a single writer at any moment.

use crate::actor::{ActionGenerator, Actor, StepOutcome};
use crate::environment::StepCx;
use crate::error::SimError;

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Per-action selection weights, with a default for unlisted actions.
#[derive(Debug, Clone)]
pub struct ActionWeights {
    weights: BTreeMap<&'static str, f64>,
    default: f64,
}

impl Default for ActionWeights {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            default: 1.0,
        }
    }
}

impl ActionWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, action: &'static str, weight: f64) -> Self {
        self.weights.insert(action, weight);
        self
    }

    pub fn weight_of(&self, action: &str) -> f64 {
        self.weights.get(action).copied().unwrap_or(self.default)
    }
}

enum Branch {
    Action(Box<dyn ActionGenerator>),
    Nested(Simulation),
}

/// A weighted composite of indefinitely running action streams.
pub struct Simulation {
    name: &'static str,
    branches: Vec<(Branch, f64)>,
}

impl Simulation {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            branches: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn num_branches(&self) -> usize {
        self.branches.len()
    }

    pub fn push_action(&mut self, generator: Box<dyn ActionGenerator>, weight: f64) {
        self.branches.push((Branch::Action(generator), weight));
    }

    /// Adds a whole sub-simulation as one weighted branch of this one.
    pub fn push_nested(&mut self, simulation: Simulation, weight: f64) {
        self.branches.push((Branch::Nested(simulation), weight));
    }

    /// Builds a simulation from an actor population, draining every actor's
    /// registered generators into weighted branches.
    pub fn from_actors(
        name: &'static str,
        actors: &mut [Actor],
        weights: &ActionWeights,
    ) -> Self {
        let mut simulation = Simulation::new(name);
        for actor in actors {
            for (action, generator) in std::mem::take(&mut actor.actions) {
                simulation.push_action(generator, weights.weight_of(action));
            }
        }
        simulation
    }

    /// One advancement step: weighted-select a branch, advance it once.
    pub fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let weights: Vec<f64> = self.branches.iter().map(|(_, weight)| *weight).collect();
        let Some(index) = cx.rng.sample_weighted_index(&weights) else {
            return Ok(StepOutcome::Skipped { action: "idle" });
        };
        match &mut self.branches[index].0 {
            Branch::Action(generator) => generator.step(cx),
            Branch::Nested(simulation) => simulation.step(cx),
        }
    }

    /// Runs `steps` advancement steps, or forever when `None`. The first
    /// invariant violation aborts the run; expected on-chain rejections do
    /// not surface here.
    pub fn run(&mut self, cx: &mut StepCx<'_>, steps: Option<u64>) -> Result<RunStats, SimError> {
        let mut stats = RunStats::default();
        loop {
            if let Some(limit) = steps {
                if stats.steps >= limit {
                    break;
                }
            }
            let outcome = self.step(cx)?;
            if let StepOutcome::Performed { action, actor } = outcome {
                debug!("  step {}: {} by {}", stats.steps + 1, action, actor);
            }
            stats.record(&outcome);
            if stats.steps % 500 == 0 {
                debug!(
                    "  {} | step {} | epoch {} | {} performed / {} skipped",
                    self.name, stats.steps, cx.env.current_epoch, stats.performed, stats.skipped
                );
            }
        }
        Ok(stats)
    }
}

/// Counters accumulated over one driver run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub steps: u64,
    pub performed: u64,
    pub skipped: u64,
    pub per_action: BTreeMap<&'static str, u64>,
}

impl RunStats {
    fn record(&mut self, outcome: &StepOutcome) {
        self.steps += 1;
        match outcome {
            StepOutcome::Performed { action, .. } => {
                self.performed += 1;
                *self.per_action.entry(action).or_insert(0) += 1;
            }
            StepOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Deployment, SimulationEnvironment};
    use crate::rng::SimRng;
    use stakesim_chain::{SimChain, SimChainConfig};
    use stakesim_env::Address;

    struct CountingGenerator {
        name: &'static str,
        count: u64,
    }

    impl ActionGenerator for CountingGenerator {
        fn name(&self) -> &'static str {
            self.name
        }

        fn step(&mut self, _cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
            self.count += 1;
            Ok(StepOutcome::Performed {
                action: self.name,
                actor: Address::from_seed(0),
            })
        }
    }

    fn fixture() -> (SimulationEnvironment, SimChain, SimRng) {
        let chain = SimChain::new(SimChainConfig::default());
        let env = SimulationEnvironment::new(Deployment::from_chain(&chain));
        (env, chain, SimRng::new(42))
    }

    #[test]
    fn test_empty_simulation_idles() {
        let (mut env, mut chain, mut rng) = fixture();
        let mut cx = StepCx {
            env: &mut env,
            chain: &mut chain,
            rng: &mut rng,
        };
        let mut simulation = Simulation::new("empty");
        let outcome = simulation.step(&mut cx).unwrap();
        assert_eq!(outcome, StepOutcome::Skipped { action: "idle" });
    }

    #[test]
    fn test_bounded_run_executes_exact_step_count() {
        let (mut env, mut chain, mut rng) = fixture();
        let mut cx = StepCx {
            env: &mut env,
            chain: &mut chain,
            rng: &mut rng,
        };
        let mut simulation = Simulation::new("bounded");
        simulation.push_action(
            Box::new(CountingGenerator {
                name: "count",
                count: 0,
            }),
            1.0,
        );

        let stats = simulation.run(&mut cx, Some(250)).unwrap();
        assert_eq!(stats.steps, 250);
        assert_eq!(stats.performed, 250);
        assert_eq!(stats.per_action["count"], 250);
    }

    #[test]
    fn test_weighted_selection_favors_heavy_branches() {
        let (mut env, mut chain, mut rng) = fixture();
        let mut cx = StepCx {
            env: &mut env,
            chain: &mut chain,
            rng: &mut rng,
        };
        let mut simulation = Simulation::new("weighted");
        simulation.push_action(
            Box::new(CountingGenerator {
                name: "rare",
                count: 0,
            }),
            1.0,
        );
        simulation.push_action(
            Box::new(CountingGenerator {
                name: "common",
                count: 0,
            }),
            9.0,
        );

        let stats = simulation.run(&mut cx, Some(5_000)).unwrap();
        let rare = stats.per_action["rare"] as f64;
        let common = stats.per_action["common"] as f64;
        let observed = common / (rare + common);
        assert!((observed - 0.9).abs() < 0.03, "observed {:.3}", observed);
    }

    #[test]
    fn test_nested_simulation_is_one_weighted_branch() {
        let (mut env, mut chain, mut rng) = fixture();
        let mut cx = StepCx {
            env: &mut env,
            chain: &mut chain,
            rng: &mut rng,
        };

        let mut child = Simulation::new("child");
        child.push_action(
            Box::new(CountingGenerator {
                name: "inner",
                count: 0,
            }),
            1.0,
        );
        let mut parent = Simulation::new("parent");
        parent.push_action(
            Box::new(CountingGenerator {
                name: "outer",
                count: 0,
            }),
            1.0,
        );
        parent.push_nested(child, 1.0);

        let stats = parent.run(&mut cx, Some(2_000)).unwrap();
        assert!(stats.per_action["inner"] > 0);
        assert!(stats.per_action["outer"] > 0);
        assert_eq!(stats.per_action["inner"] + stats.per_action["outer"], 2_000);
    }
}
