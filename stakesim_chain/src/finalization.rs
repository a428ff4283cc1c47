//! Epoch lifecycle: fee accumulation, epoch rolls, and the unfinalized set.

use stakesim_env::{ChainError, Epoch, PoolEpochStats, PoolId, UnfinalizedStats, INITIAL_EPOCH};
use std::collections::BTreeMap;

/// Aggregates for an ended epoch awaiting pool finalization.
#[derive(Debug, Clone)]
pub struct UnfinalizedEpoch {
    pub epoch: Epoch,
    pub pool_stats: BTreeMap<PoolId, PoolEpochStats>,
    pub total_fees_collected: u128,
    pub total_weighted_stake: u128,
    pub rewards_available: u128,
    pub rewards_finalized: u128,
}

/// Tracks the current epoch, its accumulating fee stats, and the previous
/// epoch's unfinalized state.
#[derive(Debug)]
pub struct EpochTracker {
    current_epoch: Epoch,
    epoch_start_time: u64,
    epoch_duration: u64,
    /// Fees accumulated during the current epoch, per pool.
    active_stats: BTreeMap<PoolId, PoolEpochStats>,
    unfinalized: Option<UnfinalizedEpoch>,
}

impl EpochTracker {
    pub fn new(genesis_time: u64, epoch_duration: u64) -> Self {
        Self {
            current_epoch: INITIAL_EPOCH,
            epoch_start_time: genesis_time,
            epoch_duration,
            active_stats: BTreeMap::new(),
            unfinalized: None,
        }
    }

    pub fn current_epoch(&self) -> Epoch {
        self.current_epoch
    }

    pub fn epoch_end_time(&self) -> u64 {
        self.epoch_start_time + self.epoch_duration
    }

    pub fn num_pools_to_finalize(&self) -> usize {
        self.unfinalized
            .as_ref()
            .map(|u| u.pool_stats.len())
            .unwrap_or(0)
    }

    pub fn pools_to_finalize(&self) -> Vec<PoolId> {
        self.unfinalized
            .as_ref()
            .map(|u| u.pool_stats.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn unfinalized(&self) -> Option<&UnfinalizedEpoch> {
        self.unfinalized.as_ref()
    }

    pub fn unfinalized_mut(&mut self) -> Option<&mut UnfinalizedEpoch> {
        self.unfinalized.as_mut()
    }

    pub fn unfinalized_stats(&self) -> Option<UnfinalizedStats> {
        self.unfinalized.as_ref().map(|u| UnfinalizedStats {
            epoch: u.epoch,
            num_pools_to_finalize: u.pool_stats.len(),
            total_fees_collected: u.total_fees_collected,
            total_weighted_stake: u.total_weighted_stake,
            rewards_available: u.rewards_available,
            rewards_finalized: u.rewards_finalized,
        })
    }

    pub fn active_pool_stats(&self, pool_id: PoolId) -> Option<PoolEpochStats> {
        self.active_stats.get(&pool_id).copied()
    }

    /// Credits a protocol fee to a pool. The stake snapshot values are only
    /// used on the pool's first fee of the epoch.
    pub fn record_fee(
        &mut self,
        pool_id: PoolId,
        fee: u128,
        members_stake: u128,
        weighted_stake: u128,
    ) {
        let stats = self.active_stats.entry(pool_id).or_insert(PoolEpochStats {
            fees_collected: 0,
            members_stake,
            weighted_stake,
        });
        stats.fees_collected += fee;
    }

    /// Ends the current epoch.
    ///
    /// Requires wall-clock past the epoch boundary and a fully finalized
    /// previous epoch. Freezes the accumulated fee stats as the new
    /// unfinalized set and starts the next epoch at `now`.
    pub fn end_epoch(&mut self, now: u64, rewards_available: u128) -> Result<&UnfinalizedEpoch, ChainError> {
        let ends_at = self.epoch_end_time();
        if now < ends_at {
            return Err(ChainError::EpochNotOver { ends_at, now });
        }
        if self.num_pools_to_finalize() > 0 {
            return Err(ChainError::PreviousEpochNotFinalized {
                epoch: self.unfinalized.as_ref().map(|u| u.epoch).unwrap_or(0),
                pools_remaining: self.num_pools_to_finalize(),
            });
        }

        let pool_stats = std::mem::take(&mut self.active_stats);
        let total_fees_collected = pool_stats.values().map(|s| s.fees_collected).sum();
        let total_weighted_stake = pool_stats.values().map(|s| s.weighted_stake).sum();

        let ended = self.current_epoch;
        self.current_epoch += 1;
        self.epoch_start_time = now;
        self.unfinalized = Some(UnfinalizedEpoch {
            epoch: ended,
            pool_stats,
            total_fees_collected,
            total_weighted_stake,
            rewards_available,
            rewards_finalized: 0,
        });
        Ok(self.unfinalized.as_ref().unwrap())
    }

    /// Removes a pool from the unfinalized set, returning its frozen stats.
    /// `None` when the pool has nothing pending (finalization is idempotent).
    pub fn take_unfinalized_pool(&mut self, pool_id: PoolId) -> Option<PoolEpochStats> {
        self.unfinalized
            .as_mut()
            .and_then(|u| u.pool_stats.remove(&pool_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_epoch_requires_elapsed_time() {
        let mut tracker = EpochTracker::new(1000, 600);
        let err = tracker.end_epoch(1599, 0).unwrap_err();
        assert!(matches!(err, ChainError::EpochNotOver { .. }));
        tracker.end_epoch(1600, 0).unwrap();
        assert_eq!(tracker.current_epoch(), INITIAL_EPOCH + 1);
    }

    #[test]
    fn test_end_epoch_blocked_by_unfinalized_pools() {
        let mut tracker = EpochTracker::new(0, 600);
        tracker.record_fee(PoolId::first(), 10, 0, 100);
        tracker.end_epoch(600, 500).unwrap();
        assert_eq!(tracker.num_pools_to_finalize(), 1);

        let err = tracker.end_epoch(1200, 500).unwrap_err();
        assert_eq!(
            err,
            ChainError::PreviousEpochNotFinalized {
                epoch: INITIAL_EPOCH,
                pools_remaining: 1
            }
        );

        tracker.take_unfinalized_pool(PoolId::first()).unwrap();
        tracker.end_epoch(1200, 0).unwrap();
        assert_eq!(tracker.current_epoch(), INITIAL_EPOCH + 2);
    }

    #[test]
    fn test_fee_snapshot_taken_once() {
        let mut tracker = EpochTracker::new(0, 600);
        let pool = PoolId::first();
        tracker.record_fee(pool, 10, 50, 95);
        // Later fees must not disturb the first snapshot.
        tracker.record_fee(pool, 5, 999, 999);

        let stats = tracker.active_pool_stats(pool).unwrap();
        assert_eq!(stats.fees_collected, 15);
        assert_eq!(stats.members_stake, 50);
        assert_eq!(stats.weighted_stake, 95);
    }

    #[test]
    fn test_aggregates_frozen_at_epoch_end() {
        let mut tracker = EpochTracker::new(0, 600);
        tracker.record_fee(PoolId(1), 10, 0, 100);
        tracker.record_fee(PoolId(2), 30, 20, 200);

        let frozen = tracker.end_epoch(600, 777).unwrap();
        assert_eq!(frozen.total_fees_collected, 40);
        assert_eq!(frozen.total_weighted_stake, 300);
        assert_eq!(frozen.rewards_available, 777);
        assert_eq!(frozen.epoch, INITIAL_EPOCH);
    }
}
