//! Typed decoded events.
//!
//! Receipts carry a decoded-event union rather than raw logs so that
//! verification hooks can match exhaustively on event shape instead of
//! poking at untyped fields.

use crate::types::{Address, Epoch, PoolId, StakeInfo};
use serde::{Deserialize, Serialize};

/// Every event the ledger can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    Stake {
        staker: Address,
        amount: u128,
    },
    Unstake {
        staker: Address,
        amount: u128,
    },
    MoveStake {
        staker: Address,
        amount: u128,
        from: StakeInfo,
        to: StakeInfo,
    },
    StakingPoolCreated {
        pool_id: PoolId,
        operator: Address,
        operator_share_ppm: u32,
    },
    MakerStakingPoolSet {
        maker: Address,
        pool_id: PoolId,
    },
    OperatorShareDecreased {
        pool_id: PoolId,
        old_share_ppm: u32,
        new_share_ppm: u32,
    },
    /// Emitted once per successful end-epoch call, carrying the aggregates
    /// the subsequent finalization round will settle against.
    EpochEnded {
        epoch: Epoch,
        num_pools_to_finalize: usize,
        rewards_available: u128,
        total_fees_collected: u128,
        total_weighted_stake: u128,
    },
    /// Emitted when the last pool of `epoch` is finalized (immediately after
    /// `EpochEnded` when no pool earned fees).
    EpochFinalized {
        epoch: Epoch,
        rewards_paid: u128,
        rewards_remaining: u128,
    },
    RewardsPaid {
        epoch: Epoch,
        pool_id: PoolId,
        operator_reward: u128,
        members_reward: u128,
    },
    RewardsWithdrawn {
        pool_id: PoolId,
        member: Address,
        amount: u128,
    },
    Fill {
        maker: Address,
        taker: Address,
        maker_token: Address,
        taker_token: Address,
        maker_amount_filled: u128,
        taker_amount_filled: u128,
        protocol_fee: u128,
        pool_id: Option<PoolId>,
    },
}

impl ChainEvent {
    /// Stable event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ChainEvent::Stake { .. } => "Stake",
            ChainEvent::Unstake { .. } => "Unstake",
            ChainEvent::MoveStake { .. } => "MoveStake",
            ChainEvent::StakingPoolCreated { .. } => "StakingPoolCreated",
            ChainEvent::MakerStakingPoolSet { .. } => "MakerStakingPoolSet",
            ChainEvent::OperatorShareDecreased { .. } => "OperatorShareDecreased",
            ChainEvent::EpochEnded { .. } => "EpochEnded",
            ChainEvent::EpochFinalized { .. } => "EpochFinalized",
            ChainEvent::RewardsPaid { .. } => "RewardsPaid",
            ChainEvent::RewardsWithdrawn { .. } => "RewardsWithdrawn",
            ChainEvent::Fill { .. } => "Fill",
        }
    }
}

/// Decoded receipt of one successful submitted call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub events: Vec<ChainEvent>,
}

impl TxReceipt {
    /// A receipt with no events (successful no-op).
    pub fn empty() -> Self {
        Self { events: Vec::new() }
    }

    pub fn single(event: ChainEvent) -> Self {
        Self {
            events: vec![event],
        }
    }

    /// All events with the given name, in emission order.
    pub fn events_named(&self, name: &str) -> Vec<&ChainEvent> {
        self.events.iter().filter(|e| e.name() == name).collect()
    }
}
