//! Pool module
//!
//! Constant-product quote math, the shared pool book, and on-chain
//! reserve/token reads.

pub mod calculator;
pub mod state;
pub mod syncer;

pub use calculator::{amount_in_for, price_impact, quote_out};
pub use state::{DirectedReserves, PoolBook};
pub use syncer::{ChainReader, PairState, ReserveSource, TokenCheck};
