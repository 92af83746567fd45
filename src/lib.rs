//! Cycle Arbitrage Evaluator
//!
//! Quotes multi-hop token paths across constant-product (V2-style) pools,
//! either live through a router's `getAmountsOut` or locally from pool
//! reserves, and reports cycles that come back with more than they started.
//!
//! Evaluation only: nothing here signs or sends transactions.

pub mod arbitrage;
pub mod config;
pub mod contracts;
pub mod error;
pub mod pool;
pub mod report;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use arbitrage::{
    CycleEvaluator, MonitorConfig, MonitorStats, OpportunityMonitor, ProfitThreshold, QuoteSource,
    RetryPolicy, RouterQuoter, SimulatedQuoter,
};
pub use config::{AppConfig, ResolvedConfig};
pub use error::{ArbError, QuoteError};
pub use pool::PoolBook;
pub use report::{JsonlSink, LogSink, OpportunityReport, OpportunitySink};
pub use types::{FeeRate, Opportunity, Pool, Quote, Token, TokenRegistry, TradePath};
