//! stakesim fuzzing framework
//!
//! A stateful property-based simulation engine for the staking/exchange
//! ledger: actors perform randomized, weighted sequences of ledger
//! operations, every operation is checked against independently computed
//! expected state, and an off-chain mirror of balances, stake, and pool
//! accounting is held bit-exact against the chain after each action.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                          │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ Simulation (weighted branches, possibly nested)        │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │       │ weighted draw                                        │
//! │  ┌────▼─────────┐   FunctionAssertion    ┌────────────────┐  │
//! │  │  Generator   │──(before ▸ call ▸ after)──►│  SimChain   │  │
//! │  │ (capability) │                        │ (ground truth) │  │
//! │  └────┬─────────┘                        └────────▲───────┘  │
//! │       │ mirror updates + equivalence checks       │ reads    │
//! │  ┌────▼────────────────────────────────────────────┴──────┐  │
//! │  │        SimulationEnvironment (off-chain mirror)        │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All randomness flows from one seed ([`SimRng`]); a failing run is
//! reproducible by re-running with the reported seed.

pub mod actor;
pub mod assertion;
pub mod balances;
pub mod driver;
pub mod environment;
pub mod error;
pub mod keeper;
pub mod keys;
pub mod maker;
pub mod pool_operator;
pub mod rng;
pub mod runner;
pub mod scenarios;
pub mod stake;
pub mod staker;
pub mod taker;

pub use actor::{ActionGenerator, Actor, Capability, StepOutcome};
pub use assertion::{Executed, FunctionAssertion, FunctionResult};
pub use balances::BalanceStore;
pub use driver::{ActionWeights, RunStats, Simulation};
pub use environment::{ActorProfile, Deployment, PendingEpoch, SimulationEnvironment, StepCx};
pub use error::SimError;
pub use keys::DeterministicKeyProvider;
pub use rng::{Kumaraswamy, SimRng, UnitDistribution};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use stake::{DelegatedStake, GlobalStake, OwnerStakeByStatus, StakingPoolRecord};
