//! Fatal simulation errors.
//!
//! These are the errors that stop a run: a mirrored ledger diverging from
//! chain state, an event with the wrong shape, or a call that succeeded or
//! reverted when the scenario expected otherwise. On-chain rejections that a
//! scenario *expects* never appear here; they are captured as data by the
//! assertion engine.

use stakesim_env::ChainError;
use thiserror::Error;

/// An invariant violation or unexpected outcome. Always fatal to the run.
#[derive(Debug, Error)]
pub enum SimError {
    /// A verification check inside an `after` hook failed.
    #[error("invariant violated in `{assertion}`: {detail}")]
    Invariant { assertion: String, detail: String },

    /// A call that was expected to succeed reverted.
    #[error("`{assertion}` expected success, got revert: {source}")]
    UnexpectedRevert {
        assertion: String,
        #[source]
        source: ChainError,
    },

    /// A call that was expected to revert succeeded.
    #[error("`{assertion}` expected revert `{expected}`, but the call succeeded")]
    UnexpectedSuccess { assertion: String, expected: String },

    /// A call reverted with the wrong error.
    #[error("`{assertion}` expected revert `{expected}`, got `{actual}`")]
    WrongRevert {
        assertion: String,
        expected: String,
        actual: String,
    },
}

impl SimError {
    pub fn invariant(assertion: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Invariant {
            assertion: assertion.into(),
            detail: detail.into(),
        }
    }
}
