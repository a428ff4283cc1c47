//! stakesim reference ledger
//!
//! An in-memory staking/exchange ledger implementing the
//! [`stakesim_env::StakingChain`] boundary. This crate is the simulation's
//! ground truth: the fuzzing framework's off-chain mirror is checked against
//! it after every action. It is a deterministic test double, not a contract
//! system - balances, stake, pools, epochs, rewards, and order fills are
//! modeled just faithfully enough to exercise every path the framework
//! verifies.

mod accounts;
mod chain;
mod exchange;
mod finalization;
mod pools;
mod staking;

pub use chain::{SimChain, SimChainConfig};
