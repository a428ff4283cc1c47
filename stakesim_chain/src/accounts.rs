//! Account ledgers: ETH, ERC20 balances, and registered signing keys.

use ed25519_dalek::VerifyingKey;
use stakesim_env::{Address, Asset, ChainError};
use std::collections::BTreeMap;

/// Balances and keys for every account the ledger knows about.
#[derive(Debug, Default)]
pub struct AccountLedger {
    eth: BTreeMap<Address, u128>,
    /// Keyed by (token, owner).
    erc20: BTreeMap<(Address, Address), u128>,
    keys: BTreeMap<Address, VerifyingKey>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account's signing key. Overwrites any previous key.
    pub fn register(&mut self, account: Address, key: VerifyingKey) {
        self.keys.insert(account, key);
    }

    pub fn key(&self, account: Address) -> Option<&VerifyingKey> {
        self.keys.get(&account)
    }

    pub fn eth_balance(&self, account: Address) -> u128 {
        self.eth.get(&account).copied().unwrap_or(0)
    }

    pub fn erc20_balance(&self, token: Address, account: Address) -> u128 {
        self.erc20.get(&(token, account)).copied().unwrap_or(0)
    }

    pub fn set_eth_balance(&mut self, account: Address, amount: u128) {
        self.eth.insert(account, amount);
    }

    /// Credits `amount` of `token` to `account` out of thin air (faucet).
    pub fn mint(&mut self, token: Address, account: Address, amount: u128) {
        *self.erc20.entry((token, account)).or_insert(0) += amount;
    }

    /// Moves `amount` of `token` between accounts, rejecting overdrafts.
    pub fn transfer_erc20(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), ChainError> {
        let available = self.erc20_balance(token, from);
        if amount > available {
            return Err(ChainError::InsufficientBalance {
                asset: Asset::Erc20(token),
                required: amount,
                available,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        *self.erc20.entry((token, from)).or_insert(0) -= amount;
        *self.erc20.entry((token, to)).or_insert(0) += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_rejects_overdraft() {
        let token = Address::from_seed(100);
        let a = Address::from_seed(1);
        let b = Address::from_seed(2);

        let mut ledger = AccountLedger::new();
        ledger.mint(token, a, 50);

        let err = ledger.transfer_erc20(token, a, b, 51).unwrap_err();
        assert!(matches!(err, ChainError::InsufficientBalance { .. }));

        ledger.transfer_erc20(token, a, b, 50).unwrap();
        assert_eq!(ledger.erc20_balance(token, a), 0);
        assert_eq!(ledger.erc20_balance(token, b), 50);
    }

    #[test]
    fn test_self_transfer_is_noop() {
        let token = Address::from_seed(100);
        let a = Address::from_seed(1);

        let mut ledger = AccountLedger::new();
        ledger.mint(token, a, 50);
        ledger.transfer_erc20(token, a, a, 30).unwrap();
        assert_eq!(ledger.erc20_balance(token, a), 50);
    }
}
