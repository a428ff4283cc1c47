//! Order-fill state: signatures and cumulative fill tracking.
//!
//! The planning math lives in [`stakesim_env::trade`] so that the framework
//! can predict outcomes with the same code the ledger commits with.

use ed25519_dalek::{Verifier, VerifyingKey};
use stakesim_env::trade::{self, FillPlan, MatchPlan};
use stakesim_env::{Address, ChainError, Order, SignedOrder};
use std::collections::BTreeMap;

/// Tracks cumulative fills per order, keyed by (maker, salt).
#[derive(Debug, Default)]
pub struct Exchange {
    filled: BTreeMap<(Address, u64), u128>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filled_amount(&self, order: &Order) -> u128 {
        self.filled.get(&order.id()).copied().unwrap_or(0)
    }

    /// Checks the maker's Ed25519 signature over the order's canonical bytes.
    pub fn verify_signature(
        &self,
        maker_key: Option<&VerifyingKey>,
        signed: &SignedOrder,
    ) -> Result<(), ChainError> {
        let key = maker_key.ok_or(ChainError::UnknownAccount(signed.order.maker))?;
        key.verify(&signed.order.signing_bytes(), &signed.signature)
            .map_err(|_| ChainError::InvalidSignature {
                maker: signed.order.maker,
            })
    }

    pub fn plan_fill(
        &self,
        order: &Order,
        taker_fill_amount: u128,
        now: u64,
    ) -> Result<FillPlan, ChainError> {
        trade::plan_fill(order, self.filled_amount(order), taker_fill_amount, now)
    }

    pub fn plan_match(&self, left: &Order, right: &Order, now: u64) -> Result<MatchPlan, ChainError> {
        trade::plan_match(
            left,
            self.filled_amount(left),
            right,
            self.filled_amount(right),
            now,
        )
    }

    /// Records a planned fill as committed.
    pub fn commit_fill(&mut self, order: &Order, taker_fill: u128) {
        *self.filled.entry(order.id()).or_insert(0) += taker_fill;
    }

    /// Records a planned match as committed.
    pub fn commit_match(&mut self, left: &Order, right: &Order, plan: &MatchPlan) {
        *self.filled.entry(left.id()).or_insert(0) += plan.b_matched;
        *self.filled.entry(right.id()).or_insert(0) += plan.a_to_right;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn seeded_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn order(maker_amount: u128, taker_amount: u128, salt: u64) -> Order {
        Order {
            maker: Address::from_seed(1),
            maker_token: Address::from_seed(100),
            taker_token: Address::from_seed(101),
            maker_amount,
            taker_amount,
            expiry: 10_000,
            salt,
        }
    }

    #[test]
    fn test_signature_roundtrip() {
        let key = seeded_key(7);
        let order = order(500, 1000, 1);
        let signed = SignedOrder {
            order,
            signature: key.sign(&order.signing_bytes()),
        };

        let exchange = Exchange::new();
        exchange
            .verify_signature(Some(&key.verifying_key()), &signed)
            .unwrap();

        let wrong_key = seeded_key(8);
        let err = exchange
            .verify_signature(Some(&wrong_key.verifying_key()), &signed)
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidSignature { .. }));

        let err = exchange.verify_signature(None, &signed).unwrap_err();
        assert!(matches!(err, ChainError::UnknownAccount(_)));
    }

    #[test]
    fn test_fill_tracking_feeds_planning() {
        let order = order(500, 1000, 1);
        let mut exchange = Exchange::new();
        exchange.commit_fill(&order, 900);

        let plan = exchange.plan_fill(&order, 500, 0).unwrap();
        assert_eq!(plan.taker_fill, 100);
        assert_eq!(plan.maker_fill, 50);

        exchange.commit_fill(&order, plan.taker_fill);
        let err = exchange.plan_fill(&order, 1, 0).unwrap_err();
        assert!(matches!(err, ChainError::OrderFullyFilled { .. }));
    }

    #[test]
    fn test_fills_tracked_per_salt() {
        let first = order(500, 1000, 1);
        let second = order(500, 1000, 2);
        let mut exchange = Exchange::new();
        exchange.commit_fill(&first, 600);
        assert_eq!(exchange.filled_amount(&first), 600);
        assert_eq!(exchange.filled_amount(&second), 0);
    }
}
