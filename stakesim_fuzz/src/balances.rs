//! The off-chain balance mirror.
//!
//! A [`BalanceStore`] tracks a fixed set of accounts and tokens. Hooks fork
//! it, apply predicted transfers, then check the prediction against a fresh
//! read of the real ledger; any difference is a hard failure.

use crate::error::SimError;
use stakesim_env::{Address, Asset, StakingChain};
use std::collections::{BTreeMap, BTreeSet};

/// Snapshot-and-diff store over tracked accounts and tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceStore {
    accounts: BTreeSet<Address>,
    tokens: BTreeSet<Address>,
    eth: BTreeMap<Address, u128>,
    erc20: BTreeMap<(Address, Address), u128>,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_account(&mut self, account: Address) {
        self.accounts.insert(account);
    }

    pub fn track_token(&mut self, token: Address) {
        self.tokens.insert(token);
    }

    pub fn tracked_accounts(&self) -> impl Iterator<Item = Address> + '_ {
        self.accounts.iter().copied()
    }

    /// Deep copy, used to seed an expected-post-state snapshot before a call.
    pub fn fork(&self) -> BalanceStore {
        self.clone()
    }

    pub fn eth_balance(&self, account: Address) -> u128 {
        self.eth.get(&account).copied().unwrap_or(0)
    }

    pub fn erc20_balance(&self, token: Address, account: Address) -> u128 {
        self.erc20.get(&(token, account)).copied().unwrap_or(0)
    }

    /// Applies a hypothetical transfer to the mirror without touching the
    /// chain. A prediction that overdraws the sender is a framework bug.
    pub fn transfer_asset(
        &mut self,
        from: Address,
        to: Address,
        amount: u128,
        asset: Asset,
    ) -> Result<(), SimError> {
        let balance_of = |store: &Self, account: Address| match asset {
            Asset::Eth => store.eth_balance(account),
            Asset::Erc20(token) => store.erc20_balance(token, account),
        };
        let available = balance_of(self, from);
        if amount > available {
            return Err(SimError::invariant(
                "balance_store",
                format!(
                    "predicted {} transfer of {} from {} exceeds mirrored balance {}",
                    asset, amount, from, available
                ),
            ));
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        match asset {
            Asset::Eth => {
                *self.eth.entry(from).or_insert(0) -= amount;
                *self.eth.entry(to).or_insert(0) += amount;
            }
            Asset::Erc20(token) => {
                *self.erc20.entry((token, from)).or_insert(0) -= amount;
                *self.erc20.entry((token, to)).or_insert(0) += amount;
            }
        }
        Ok(())
    }

    /// Overwrites every tracked ERC20 balance with the ledger's value.
    pub fn update_erc20_balances(&mut self, chain: &dyn StakingChain) {
        for &token in &self.tokens {
            for &account in &self.accounts {
                self.erc20
                    .insert((token, account), chain.erc20_balance(token, account));
            }
        }
    }

    /// Overwrites every tracked ETH balance with the ledger's value.
    pub fn update_eth_balances(&mut self, chain: &dyn StakingChain) {
        for &account in &self.accounts {
            self.eth.insert(account, chain.eth_balance(account));
        }
    }

    /// Deep-equality check against another store; any divergence is fatal.
    pub fn assert_equals(&self, expected: &BalanceStore) -> Result<(), SimError> {
        let mut diffs = Vec::new();
        for &account in self.accounts.union(&expected.accounts) {
            let actual = self.eth_balance(account);
            let want = expected.eth_balance(account);
            if actual != want {
                diffs.push(format!("ETH[{}]: {} != expected {}", account, actual, want));
            }
            for &token in self.tokens.union(&expected.tokens) {
                let actual = self.erc20_balance(token, account);
                let want = expected.erc20_balance(token, account);
                if actual != want {
                    diffs.push(format!(
                        "ERC20[{}][{}]: {} != expected {}",
                        token, account, actual, want
                    ));
                }
            }
        }
        if !diffs.is_empty() {
            return Err(SimError::invariant("balance_store", diffs.join("; ")));
        }
        Ok(())
    }

    /// Checks this (predicted) store against a fresh read of the ledger and
    /// returns the refreshed store on success.
    pub fn verify_against_chain(&self, chain: &dyn StakingChain) -> Result<BalanceStore, SimError> {
        let mut actual = self.fork();
        actual.update_erc20_balances(chain);
        actual.update_eth_balances(chain);
        actual.assert_equals(self)?;
        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakesim_chain::{SimChain, SimChainConfig};

    fn accounts() -> (Address, Address) {
        (Address::from_seed(1), Address::from_seed(2))
    }

    #[test]
    fn test_transfer_moves_mirrored_balance() {
        let (a, b) = accounts();
        let token = Address::from_seed(100);
        let mut store = BalanceStore::new();
        store.track_account(a);
        store.track_account(b);
        store.track_token(token);
        store.erc20.insert((token, a), 100);

        store.transfer_asset(a, b, 40, Asset::Erc20(token)).unwrap();
        assert_eq!(store.erc20_balance(token, a), 60);
        assert_eq!(store.erc20_balance(token, b), 40);
    }

    #[test]
    fn test_predicted_overdraft_is_fatal() {
        let (a, b) = accounts();
        let mut store = BalanceStore::new();
        assert!(store.transfer_asset(a, b, 1, Asset::Eth).is_err());
    }

    #[test]
    fn test_assert_equals_reports_divergence() {
        let (a, _) = accounts();
        let token = Address::from_seed(100);
        let mut left = BalanceStore::new();
        left.track_account(a);
        left.track_token(token);
        let mut right = left.fork();

        left.erc20.insert((token, a), 10);
        right.erc20.insert((token, a), 11);
        let err = left.assert_equals(&right).unwrap_err();
        assert!(err.to_string().contains("!= expected"));
    }

    #[test]
    fn test_verify_against_chain_roundtrip() {
        let mut chain = SimChain::new(SimChainConfig::default());
        let (a, b) = accounts();
        let token = chain.zrx_token();
        chain.mint_token(token, a, 500);

        let mut store = BalanceStore::new();
        store.track_account(a);
        store.track_account(b);
        store.track_token(token);
        store.update_erc20_balances(&chain);
        store.update_eth_balances(&chain);

        // Prediction matching the chain passes and refreshes.
        let refreshed = store.verify_against_chain(&chain).unwrap();
        assert_eq!(refreshed.erc20_balance(token, a), 500);

        // A stale prediction fails.
        let mut stale = store.fork();
        stale.erc20.insert((token, a), 499);
        assert!(stale.verify_against_chain(&chain).is_err());
    }
}
