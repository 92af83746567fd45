//! Cycle Evaluator
//!
//! Chains hop quotes along a path: hop i is quoted with the output of hop
//! i-1, strictly in order. The first failing hop aborts the evaluation with
//! its index; there are no partial results and no retries here.
//!
//! Profitability is `profit > 0` in base units. ROI is carried along for
//! reporting and for the monitor's minimum-return threshold.

use crate::arbitrage::quoter::QuoteSource;
use crate::error::ArbError;
use crate::types::{max_input_amount, u256_to_f64, Opportunity, Quote, Token, TradePath};
use alloy::primitives::{U256, U512};
use tracing::debug;

/// ROI denominator for thresholds (parts-per-million)
const ROI_PPM: u64 = 1_000_000;

/// Minimum return a cycle must beat to be reported.
///
/// Stored as integer ppm of the input so the comparison never touches
/// floating point: `profit * 1e6 > amount_in * min_roi_ppm`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfitThreshold {
    min_roi_ppm: u64,
}

impl ProfitThreshold {
    /// Any strictly positive profit
    pub const ANY_PROFIT: ProfitThreshold = ProfitThreshold { min_roi_ppm: 0 };

    /// `percent` of the input amount, e.g. `1.0` for 1%
    pub fn from_percent(percent: f64) -> Result<Self, ArbError> {
        if !percent.is_finite() || percent < 0.0 {
            return Err(ArbError::InvalidConfig(format!(
                "minimum profit percent must be a non-negative number, got {}",
                percent
            )));
        }
        Ok(Self {
            min_roi_ppm: (percent * 10_000.0).round() as u64,
        })
    }

    pub fn as_percent(&self) -> f64 {
        self.min_roi_ppm as f64 / 10_000.0
    }

    /// Profitable and above the minimum return
    pub fn is_met(&self, opportunity: &Opportunity) -> bool {
        let profit = match opportunity.profit {
            Some(p) if p.is_positive() => p.unsigned_abs(),
            _ => return false,
        };
        let lhs = U512::from(profit) * U512::from(ROI_PPM);
        let rhs = U512::from(opportunity.amount_in) * U512::from(self.min_roi_ppm);
        lhs > rhs
    }
}

/// Implied cross rates between two tokens, one whole unit each way
#[derive(Debug, Clone, PartialEq)]
pub struct PriceGap {
    /// B received per A
    pub forward_rate: f64,
    /// A received per B
    pub reverse_rate: f64,
    /// How far the reverse rate sits above the inverse of the forward rate
    pub gap_percent: f64,
}

/// Stateless hop-chaining evaluator
pub struct CycleEvaluator;

impl CycleEvaluator {
    /// Quote every hop of `path` starting from `amount_in` base units of the first token
    pub async fn evaluate<S: QuoteSource + ?Sized>(
        path: &TradePath,
        amount_in: U256,
        source: &S,
    ) -> Result<Opportunity, ArbError> {
        if amount_in.is_zero() {
            return Err(ArbError::InvalidAmount(format!("{}: input amount is zero", path)));
        }
        if amount_in > max_input_amount() {
            return Err(ArbError::InvalidAmount(format!(
                "{}: input amount {} does not fit a signed 256-bit profit",
                path, amount_in
            )));
        }

        let mut hops = Vec::with_capacity(path.hop_count());
        let mut amount = amount_in;

        for (hop, (token_in, token_out)) in path.hops().enumerate() {
            let amount_out = source
                .quote_hop(token_in.address, token_out.address, amount)
                .await
                .map_err(|source| ArbError::QuoteUnavailable { hop, source })?;

            hops.push(Quote {
                token_in: token_in.address,
                token_out: token_out.address,
                amount_in: amount,
                amount_out,
            });
            amount = amount_out;
        }

        let opportunity = Opportunity::from_hops(path.clone(), amount_in, hops);
        debug!(
            "{} via {}: in={} out={} profit={:?}",
            path,
            source.name(),
            amount_in,
            opportunity.amount_out,
            opportunity.profit
        );
        Ok(opportunity)
    }

    /// Quote one unit of `a -> b` and one unit of `b -> a` and compare the
    /// reverse rate with the inverse of the forward rate.
    ///
    /// With fees the gap is negative for an arbitrage-free pair; a positive
    /// gap means the round trip beats the implied price.
    pub async fn implied_price_gap<S: QuoteSource + ?Sized>(
        source: &S,
        a: &Token,
        b: &Token,
    ) -> Result<PriceGap, ArbError> {
        let forward_out = source
            .quote_hop(a.address, b.address, a.unit())
            .await
            .map_err(|source| ArbError::QuoteUnavailable { hop: 0, source })?;
        let reverse_out = source
            .quote_hop(b.address, a.address, b.unit())
            .await
            .map_err(|source| ArbError::QuoteUnavailable { hop: 1, source })?;

        if forward_out.is_zero() || reverse_out.is_zero() {
            return Err(ArbError::InvalidAmount(format!(
                "{}/{}: one unit quotes to zero",
                a.symbol, b.symbol
            )));
        }

        let forward_rate = u256_to_f64(forward_out) / u256_to_f64(b.unit());
        let reverse_rate = u256_to_f64(reverse_out) / u256_to_f64(a.unit());
        let theoretical = 1.0 / forward_rate;

        Ok(PriceGap {
            forward_rate,
            reverse_rate,
            gap_percent: (reverse_rate - theoretical) / theoretical * 100.0,
        })
    }
}
