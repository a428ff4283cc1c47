//! The condition engine: Hoare-triple-style wrappers around ledger calls.
//!
//! A [`FunctionAssertion`] pairs one black-box operation with an optional
//! `before` snapshot hook and an `after` verification hook. Call failures
//! are captured as data in the [`FunctionResult`] - never control flow - so
//! that expected-to-revert scenarios can assert on the failure shape. Hook
//! failures ([`SimError`]) are invariant violations and abort the run.

use crate::environment::StepCx;
use crate::error::SimError;
use stakesim_env::{ChainError, ChainEvent, TxReceipt};

/// Outcome of one call attempt: the return value or captured revert, plus
/// the decoded receipt on success.
#[derive(Debug)]
pub struct FunctionResult<R> {
    pub data: Result<R, ChainError>,
    pub receipt: Option<TxReceipt>,
}

impl<R> FunctionResult<R> {
    pub fn success(&self) -> bool {
        self.data.is_ok()
    }

    pub fn revert(&self) -> Option<&ChainError> {
        self.data.as_ref().err()
    }

    /// Decoded events, empty when the call reverted.
    pub fn events(&self) -> &[ChainEvent] {
        self.receipt
            .as_ref()
            .map(|r| r.events.as_slice())
            .unwrap_or(&[])
    }
}

/// What `execute` hands back: both hook states plus the call's fate.
#[derive(Debug)]
pub struct Executed<Before, After> {
    pub before: Before,
    pub after: After,
    pub success: bool,
}

type BeforeHook<Args, B> = Box<dyn FnMut(&mut StepCx<'_>, &Args) -> Result<B, SimError>>;
type CallHook<Args, R> =
    Box<dyn FnMut(&mut StepCx<'_>, &Args) -> Result<(R, Option<TxReceipt>), ChainError>>;
type AfterHook<Args, R, B, A> =
    Box<dyn FnMut(&mut StepCx<'_>, &B, &FunctionResult<R>, &Args) -> Result<A, SimError>>;

/// One named operation wrapped with before/after condition hooks.
pub struct FunctionAssertion<Args, Ret, Before = (), After = ()> {
    name: &'static str,
    before: Option<BeforeHook<Args, Before>>,
    call: CallHook<Args, Ret>,
    after: Option<AfterHook<Args, Ret, Before, After>>,
}

impl<Args, Before: Default, After: Default> FunctionAssertion<Args, (), Before, After> {
    /// Wraps a submitted call; the receipt is the interesting output.
    pub fn submit(
        name: &'static str,
        mut call: impl FnMut(&mut StepCx<'_>, &Args) -> Result<TxReceipt, ChainError> + 'static,
    ) -> Self {
        Self {
            name,
            before: None,
            call: Box::new(move |cx, args| call(cx, args).map(|receipt| ((), Some(receipt)))),
            after: None,
        }
    }
}

impl<Args, Ret, Before: Default, After: Default> FunctionAssertion<Args, Ret, Before, After> {
    /// Wraps a read call; no receipt is produced.
    pub fn read(
        name: &'static str,
        mut call: impl FnMut(&mut StepCx<'_>, &Args) -> Result<Ret, ChainError> + 'static,
    ) -> Self {
        Self {
            name,
            before: None,
            call: Box::new(move |cx, args| call(cx, args).map(|value| (value, None))),
            after: None,
        }
    }

    pub fn with_before(
        mut self,
        hook: impl FnMut(&mut StepCx<'_>, &Args) -> Result<Before, SimError> + 'static,
    ) -> Self {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn with_after(
        mut self,
        hook: impl FnMut(&mut StepCx<'_>, &Before, &FunctionResult<Ret>, &Args) -> Result<After, SimError>
            + 'static,
    ) -> Self {
        self.after = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs `before`, attempts the call (capturing any revert), then runs
    /// `after`. Only hook errors - invariant violations - escape.
    pub fn execute(&mut self, cx: &mut StepCx<'_>, args: &Args) -> Result<Executed<Before, After>, SimError> {
        let before = match &mut self.before {
            Some(hook) => hook(cx, args)?,
            None => Before::default(),
        };
        let result = match (self.call)(cx, args) {
            Ok((value, receipt)) => FunctionResult {
                data: Ok(value),
                receipt,
            },
            Err(err) => FunctionResult {
                data: Err(err),
                receipt: None,
            },
        };
        let success = result.success();
        let after = match &mut self.after {
            Some(hook) => hook(cx, &before, &result, args)?,
            None => After::default(),
        };
        Ok(Executed {
            before,
            after,
            success,
        })
    }
}

/// Requires a successful call; maps reverts to [`SimError::UnexpectedRevert`].
pub fn expect_success<'r, R>(
    assertion: &str,
    result: &'r FunctionResult<R>,
) -> Result<&'r R, SimError> {
    result.data.as_ref().map_err(|err| SimError::UnexpectedRevert {
        assertion: assertion.to_string(),
        source: err.clone(),
    })
}

/// Requires a successful call whose receipt carries exactly `expected`.
pub fn expect_events<R>(
    assertion: &str,
    result: &FunctionResult<R>,
    expected: &[ChainEvent],
) -> Result<(), SimError> {
    expect_success(assertion, result)?;
    let actual = result.events();
    if actual != expected {
        return Err(SimError::invariant(
            assertion,
            format!("expected events {:?}, got {:?}", expected, actual),
        ));
    }
    Ok(())
}

/// Requires the call to have reverted with exactly `expected`.
pub fn expect_revert<R>(
    assertion: &str,
    result: &FunctionResult<R>,
    expected: &ChainError,
) -> Result<(), SimError> {
    match result.revert() {
        None => Err(SimError::UnexpectedSuccess {
            assertion: assertion.to_string(),
            expected: expected.to_string(),
        }),
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(SimError::WrongRevert {
            assertion: assertion.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Deployment, SimulationEnvironment};
    use crate::rng::SimRng;
    use stakesim_env::{Address, StakingChain};
    use stakesim_chain::{SimChain, SimChainConfig};

    fn fixture() -> (SimulationEnvironment, SimChain, SimRng) {
        let chain = SimChain::new(SimChainConfig::default());
        let env = SimulationEnvironment::new(Deployment::from_chain(&chain));
        (env, chain, SimRng::new(42))
    }

    #[test]
    fn test_revert_is_captured_not_raised() {
        let (mut env, mut chain, mut rng) = fixture();
        let mut cx = StepCx {
            env: &mut env,
            chain: &mut chain,
            rng: &mut rng,
        };

        // Unfunded staker: the stake call must revert, and execute must
        // still return Ok with the revert captured as data.
        let mut assertion = FunctionAssertion::<(Address, u128), (), (), bool>::submit(
            "stake",
            |cx, &(staker, amount)| cx.chain.stake(staker, amount),
        )
        .with_after(|_cx, _before, result, _args| Ok(result.success()));

        let executed = assertion
            .execute(&mut cx, &(Address::from_seed(1), 100))
            .unwrap();
        assert!(!executed.success);
        assert!(!executed.after);
    }

    #[test]
    fn test_hook_error_propagates() {
        let (mut env, mut chain, mut rng) = fixture();
        let mut cx = StepCx {
            env: &mut env,
            chain: &mut chain,
            rng: &mut rng,
        };

        let mut assertion = FunctionAssertion::<(), u64, (), ()>::read("epoch", |cx, _| {
            Ok(cx.chain.current_epoch())
        })
        .with_after(|_cx, _before, _result, _args| {
            Err(SimError::invariant("epoch", "forced failure"))
        });

        assert!(assertion.execute(&mut cx, &()).is_err());
    }

    #[test]
    fn test_before_runs_before_call() {
        let (mut env, mut chain, mut rng) = fixture();
        let mut cx = StepCx {
            env: &mut env,
            chain: &mut chain,
            rng: &mut rng,
        };

        // `before` snapshots the epoch; the call ends it; `after` sees both.
        let mut assertion = FunctionAssertion::<(), (), u64, ()>::submit("end_epoch", |cx, _| {
            let target = cx.chain.epoch_end_time();
            let now = cx.chain.now();
            cx.chain.advance_time(target.saturating_sub(now));
            cx.chain.end_epoch(Address::from_seed(0))
        })
        .with_before(|cx, _| Ok(cx.chain.current_epoch()))
        .with_after(|cx, &before, result, _| {
            expect_success("end_epoch", result)?;
            if cx.chain.current_epoch() != before + 1 {
                return Err(SimError::invariant("end_epoch", "epoch did not advance"));
            }
            Ok(())
        });

        let executed = assertion.execute(&mut cx, &()).unwrap();
        assert!(executed.success);
        assert_eq!(executed.before, 1);
    }
}
