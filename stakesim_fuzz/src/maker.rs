//! Maker capability: craft, sign, and publish orders.
//!
//! Signing happens off-chain; the assertion wraps the ledger's signature
//! check and, once it passes, publishes the order into the environment's
//! shared book for takers to discover.

use crate::actor::{Actor, ActionGenerator, Capability, StepOutcome};
use crate::assertion::{expect_success, FunctionAssertion};
use crate::environment::StepCx;
use crate::error::SimError;

use ed25519_dalek::{Signer, SigningKey};
use stakesim_env::{Address, Order, SignedOrder, StakingChain};

/// Open orders kept in the shared book before the oldest is dropped.
const MAX_OPEN_ORDERS: usize = 64;

/// Registers the maker bundle on an actor.
pub fn apply(actor: &mut Actor) {
    actor.add_capability(Capability::Maker);
    actor.register_action(Box::new(SignOrder {
        address: actor.address,
        signing_key: actor.signing_key.clone(),
    }));
}

// ── Operations ───────────────────────────────────────────────────────────

/// Verifies a freshly signed order against the ledger's signature check and
/// publishes it to the shared order book.
pub fn sign_order(cx: &mut StepCx<'_>, signed: SignedOrder) -> Result<(), SimError> {
    let mut assertion: FunctionAssertion<SignedOrder, bool> =
        FunctionAssertion::read("sign_order", |cx, signed: &SignedOrder| {
            Ok(cx.chain.is_valid_order_signature(signed))
        })
        .with_after(|cx, _, result, signed| {
            let valid = expect_success("sign_order", result)?;
            if !valid {
                return Err(SimError::invariant(
                    "sign_order",
                    format!("ledger rejected signature from maker {}", signed.order.maker),
                ));
            }
            cx.env.order_book.push(signed.clone());
            if cx.env.order_book.len() > MAX_OPEN_ORDERS {
                cx.env.order_book.remove(0);
            }
            Ok(())
        });
    assertion.execute(cx, &signed).map(|_| ())
}

// ── Generators ───────────────────────────────────────────────────────────

struct SignOrder {
    address: Address,
    signing_key: SigningKey,
}

impl ActionGenerator for SignOrder {
    fn name(&self) -> &'static str {
        "sign_order"
    }

    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError> {
        let deployment = cx.env.deployment;
        // Random direction over the trade pair; uniform amounts give the
        // awkward price ratios the rounding scenarios feed on.
        let (maker_token, taker_token) = if cx.rng.gen_bool(0.5) {
            (deployment.token_a, deployment.token_b)
        } else {
            (deployment.token_b, deployment.token_a)
        };
        let order = Order {
            maker: self.address,
            maker_token,
            taker_token,
            maker_amount: cx.rng.integer(1_000, 1_000_000),
            taker_amount: cx.rng.integer(1_000, 1_000_000),
            expiry: cx.chain.now() + 1_000_000,
            salt: cx.rng.integer(0, u64::MAX as u128) as u64,
        };
        let signed = SignedOrder {
            signature: self.signing_key.sign(&order.signing_bytes()),
            order,
        };
        sign_order(cx, signed)?;
        Ok(StepOutcome::Performed {
            action: self.name(),
            actor: self.address,
        })
    }
}
