//! Arbitrage Module
//!
//! Quote sources, hop-chaining cycle evaluation, and the polling monitor.

pub mod cooldown;
pub mod evaluator;
pub mod monitor;
pub mod quoter;

pub use cooldown::RouteCooldown;
pub use evaluator::{CycleEvaluator, PriceGap, ProfitThreshold};
pub use monitor::{
    build_probes, MonitorConfig, MonitorStats, OpportunityMonitor, Probe, RetryPolicy, TickOutcome,
};
pub use quoter::{HopImpact, QuoteSource, RouterQuoter, SimulatedQuoter};
