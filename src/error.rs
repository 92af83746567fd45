//! Error taxonomy for the evaluation core
//!
//! `ArbError` is what the simulator, evaluator and monitor surface to their
//! callers. `QuoteError` is the failure of a single quote source call; the
//! evaluator wraps it into `ArbError::QuoteUnavailable` tagged with the hop
//! index where it happened.
//!
//! Retriable: `QuoteUnavailable` only (and only at the monitor layer).
//! Everything else means the caller passed bad data or bad configuration.

use alloy::primitives::Address;
use thiserror::Error;

/// Errors surfaced by the evaluation core
#[derive(Debug, Clone, Error)]
pub enum ArbError {
    /// Zero reserves (or a missing side) handed to the simulator.
    /// Caller must refresh pool data before quoting again.
    #[error("invalid pool state: {0}")]
    InvalidPoolState(String),

    /// Zero / unparsable / out-of-range amount or rate. Caller bug.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A quote source call failed while evaluating hop `hop` of a path
    #[error("quote unavailable at hop {hop}: {source}")]
    QuoteUnavailable {
        hop: usize,
        #[source]
        source: QuoteError,
    },

    /// Profit was requested for a path that does not start and end on the same token
    #[error("path {start} -> {end} is not a cycle, profit is undefined")]
    IncompleteCycle { start: String, end: String },

    /// Path shorter than two tokens, or with a hop from a token to itself
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Static configuration rejected before the polling loop starts
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ArbError {
    /// Whether the monitor may retry the failed evaluation
    pub fn is_retriable(&self) -> bool {
        matches!(self, ArbError::QuoteUnavailable { .. })
    }
}

/// Failure of one quote source call (one hop)
#[derive(Debug, Clone, Error)]
pub enum QuoteError {
    /// No pool is known for this token pair
    #[error("no pool for {token_in:?} -> {token_out:?}")]
    NoPool { token_in: Address, token_out: Address },

    /// Provider / transport / revert
    #[error("router call failed: {0}")]
    Rpc(String),

    /// Router answered with something we can't interpret
    #[error("malformed router response: {0}")]
    Malformed(String),

    /// Local simulator refused the pool state or amount
    #[error("simulation rejected: {0}")]
    Rejected(String),
}
