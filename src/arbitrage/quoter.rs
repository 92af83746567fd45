//! Quote Sources
//!
//! One hop = one quote: `token_in -> token_out` for an exact input amount.
//!
//! - `RouterQuoter` asks the V2 router (`getAmountsOut`) over RPC.
//! - `SimulatedQuoter` runs the constant-product formula against the
//!   pool book, optionally refreshing reserves from chain at tick start.
//!
//! Sources never retry and never cache; that belongs to the monitor.

use crate::contracts::IUniswapV2Router02;
use crate::error::{ArbError, QuoteError};
use crate::pool::{amount_in_for, price_impact, quote_out, PoolBook, ReserveSource};
use crate::types::{FeeRate, TradePath};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Anything that can price a single hop
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Called once per monitor tick before any probe is evaluated
    async fn begin_tick(&self) -> Result<(), QuoteError> {
        Ok(())
    }

    /// Output amount for swapping `amount_in` of `token_in` into `token_out`
    async fn quote_hop(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256, QuoteError>;
}

/// Live quotes from a V2 router
pub struct RouterQuoter<P> {
    provider: Arc<P>,
    router: Address,
}

impl<P: Provider + 'static> RouterQuoter<P> {
    pub fn new(provider: Arc<P>, router: Address) -> Self {
        Self { provider, router }
    }

    pub fn router(&self) -> Address {
        self.router
    }

    /// Full `getAmountsOut` call: one amount per token in `path`, input first
    pub async fn amounts_out(&self, amount_in: U256, path: Vec<Address>) -> Result<Vec<U256>, QuoteError> {
        let expected = path.len();
        let router = IUniswapV2Router02::new(self.router, self.provider.clone());

        let amounts = router
            .getAmountsOut(amount_in, path)
            .call()
            .await
            .map_err(|e| QuoteError::Rpc(e.to_string()))?;

        if amounts.len() != expected {
            return Err(QuoteError::Malformed(format!(
                "expected {} amounts, router returned {}",
                expected,
                amounts.len()
            )));
        }
        Ok(amounts)
    }
}

#[async_trait]
impl<P: Provider + 'static> QuoteSource for RouterQuoter<P> {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn quote_hop(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256, QuoteError> {
        let amounts = self.amounts_out(amount_in, vec![token_in, token_out]).await?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| QuoteError::Malformed("empty amounts".to_string()))
    }
}

/// One hop of a simulated trade with its price impact
#[derive(Debug, Clone, PartialEq)]
pub struct HopImpact {
    pub token_in: Address,
    pub token_out: Address,
    pub fee: FeeRate,
    pub amount_in: U256,
    pub amount_out: U256,
    /// Percent below the spot price, fee included
    pub impact_percent: f64,
}

/// Local constant-product quotes over the pool book
pub struct SimulatedQuoter {
    book: PoolBook,
    fee_free: bool,
    refresh: Option<Arc<dyn ReserveSource>>,
}

impl SimulatedQuoter {
    pub fn new(book: PoolBook) -> Self {
        Self {
            book,
            fee_free: false,
            refresh: None,
        }
    }

    /// Quote every hop with a zero fee (flash/atomic comparison)
    pub fn fee_free(mut self, fee_free: bool) -> Self {
        self.fee_free = fee_free;
        self
    }

    /// Refresh reserves from `source` at the start of every tick
    pub fn with_refresh(mut self, source: Arc<dyn ReserveSource>) -> Self {
        self.refresh = Some(source);
        self
    }

    pub fn book(&self) -> &PoolBook {
        &self.book
    }

    pub fn is_fee_free(&self) -> bool {
        self.fee_free
    }

    /// Start-token input needed for `path` to end with at least `amount_out`.
    ///
    /// Hops are inverted last to first. Each inverse rounds up, so quoting
    /// the result forward never lands below `amount_out`.
    pub fn required_input(&self, path: &TradePath, amount_out: U256) -> Result<U256, ArbError> {
        let hops: Vec<_> = path.hops().collect();
        let mut amount = amount_out;
        for (token_in, token_out) in hops.into_iter().rev() {
            let reserves = self.book.directed(token_in.address, token_out.address).ok_or_else(|| {
                ArbError::InvalidPath(format!(
                    "{}: no pool configured for {} -> {}",
                    path, token_in.symbol, token_out.symbol
                ))
            })?;
            let fee = if self.fee_free { FeeRate::ZERO } else { reserves.fee };
            amount = amount_in_for(reserves.reserve_in, reserves.reserve_out, amount, fee)?;
        }
        Ok(amount)
    }

    /// Walk `path` from `amount_in`, recording each hop's price impact.
    /// Stops at the first hop that cannot be quoted.
    pub fn hop_impacts(&self, path: &TradePath, amount_in: U256) -> Result<Vec<HopImpact>, ArbError> {
        let mut impacts = Vec::with_capacity(path.hop_count());
        let mut amount = amount_in;
        for (hop, (token_in, token_out)) in path.hops().enumerate() {
            let reserves = self
                .book
                .directed(token_in.address, token_out.address)
                .ok_or(QuoteError::NoPool {
                    token_in: token_in.address,
                    token_out: token_out.address,
                })
                .map_err(|source| ArbError::QuoteUnavailable { hop, source })?;
            let fee = if self.fee_free { FeeRate::ZERO } else { reserves.fee };

            let amount_out = quote_out(reserves.reserve_in, reserves.reserve_out, amount, fee).map_err(|e| {
                ArbError::QuoteUnavailable {
                    hop,
                    source: QuoteError::Rejected(e.to_string()),
                }
            })?;
            impacts.push(HopImpact {
                token_in: token_in.address,
                token_out: token_out.address,
                fee,
                amount_in: amount,
                amount_out,
                impact_percent: price_impact(reserves.reserve_in, reserves.reserve_out, amount, fee),
            });
            amount = amount_out;
        }
        Ok(impacts)
    }

    /// Every hop of every path must have a pool with liquidity on both sides
    pub fn validate_paths(&self, paths: &[TradePath]) -> Result<(), ArbError> {
        for path in paths {
            for (token_in, token_out) in path.hops() {
                let pool = self.book.get(token_in.address, token_out.address).ok_or_else(|| {
                    ArbError::InvalidPath(format!(
                        "{}: no pool configured for {} -> {}",
                        path, token_in.symbol, token_out.symbol
                    ))
                })?;
                pool.validate().map_err(|e| match e {
                    ArbError::InvalidPoolState(msg) => ArbError::InvalidPoolState(format!(
                        "{} ({}/{}): {}",
                        path, token_in.symbol, token_out.symbol, msg
                    )),
                    other => other,
                })?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QuoteSource for SimulatedQuoter {
    fn name(&self) -> &'static str {
        if self.is_fee_free() {
            "simulated-fee-free"
        } else {
            "simulated"
        }
    }

    async fn begin_tick(&self) -> Result<(), QuoteError> {
        if let Some(source) = &self.refresh {
            let updated = source
                .refresh(&self.book)
                .await
                .map_err(|e| QuoteError::Rpc(format!("reserve refresh: {:#}", e)))?;
            let (pools, oldest, newest) = self.book.stats();
            debug!(
                "Refreshed reserves for {}/{} pools (blocks {}..={})",
                updated, pools, oldest, newest
            );
        }
        Ok(())
    }

    async fn quote_hop(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256, QuoteError> {
        let reserves = self
            .book
            .directed(token_in, token_out)
            .ok_or(QuoteError::NoPool { token_in, token_out })?;
        let fee = if self.fee_free { FeeRate::ZERO } else { reserves.fee };

        quote_out(reserves.reserve_in, reserves.reserve_out, amount_in, fee)
            .map_err(|e| QuoteError::Rejected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ether, skewed_triangle_book, tokens_abc};
    use crate::types::Token;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_simulated_quote_matches_formula() {
        let (a, b, _) = tokens_abc();
        let book = skewed_triangle_book();
        let quoter = SimulatedQuoter::new(book.clone());

        let out = assert_ok!(quoter.quote_hop(a.address, b.address, ether(1)).await);
        let pool = book.get(a.address, b.address).unwrap();
        let (r_in, r_out) = pool.reserves_for(a.address).unwrap();
        assert_eq!(out, quote_out(r_in, r_out, ether(1), pool.fee).unwrap());
    }

    #[tokio::test]
    async fn test_fee_free_pays_more() {
        let (a, b, _) = tokens_abc();
        let book = skewed_triangle_book();
        let with_fee = SimulatedQuoter::new(book.clone());
        let without_fee = SimulatedQuoter::new(book).fee_free(true);

        let paid = assert_ok!(with_fee.quote_hop(a.address, b.address, ether(1)).await);
        let free = assert_ok!(without_fee.quote_hop(a.address, b.address, ether(1)).await);
        assert!(free > paid);
        assert_eq!(without_fee.name(), "simulated-fee-free");
    }

    #[tokio::test]
    async fn test_missing_pool_is_quote_error() {
        let (a, _, _) = tokens_abc();
        let quoter = SimulatedQuoter::new(PoolBook::new());
        let err = assert_err!(quoter.quote_hop(a.address, Address::repeat_byte(9), ether(1)).await);
        assert!(matches!(err, QuoteError::NoPool { .. }));
    }

    #[tokio::test]
    async fn test_quote_sees_reserve_updates() {
        let (a, b, _) = tokens_abc();
        let book = skewed_triangle_book();
        let quoter = SimulatedQuoter::new(book.clone());

        let before = assert_ok!(quoter.quote_hop(a.address, b.address, ether(1)).await);
        book.update_reserves(a.address, b.address, ether(1_000), ether(4_000), None);
        let after = assert_ok!(quoter.quote_hop(a.address, b.address, ether(1)).await);
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_required_input_reaches_target() {
        let (a, b, c) = tokens_abc();
        let quoter = SimulatedQuoter::new(skewed_triangle_book());
        let cycle = TradePath::new(vec![a.clone(), b, c, a.clone()]).unwrap();

        let target = ether(1);
        let needed = assert_ok!(quoter.required_input(&cycle, target));
        // The skewed triangle is profitable at this size, so less than 1 A buys 1 A back
        assert!(needed < target);

        let opp = assert_ok!(crate::arbitrage::CycleEvaluator::evaluate(&cycle, needed, &quoter).await);
        assert!(opp.amount_out >= target);
        assert!(opp.amount_out - target < U256::from(100u8));

        // Asking for more than the last pool holds
        let err = assert_err!(quoter.required_input(&cycle, ether(5_000)));
        assert!(matches!(err, ArbError::InvalidAmount(_)));
    }

    #[test]
    fn test_hop_impacts_follow_amounts() {
        let (a, b, c) = tokens_abc();
        let quoter = SimulatedQuoter::new(skewed_triangle_book());
        let cycle = TradePath::new(vec![a.clone(), b.clone(), c.clone(), a.clone()]).unwrap();

        let impacts = assert_ok!(quoter.hop_impacts(&cycle, ether(10)));
        assert_eq!(impacts.len(), 3);
        assert_eq!(impacts[0].amount_in, ether(10));
        for pair in impacts.windows(2) {
            assert_eq!(pair[1].amount_in, pair[0].amount_out);
        }
        assert!(impacts.iter().all(|h| h.impact_percent > 0.3 && h.impact_percent < 5.0));
    }

    #[test]
    fn test_hop_impacts_stop_at_failed_hop() {
        let (a, b, c) = tokens_abc();
        let book = skewed_triangle_book();
        book.update_reserves(b.address, c.address, U256::ZERO, U256::ZERO, None);
        let quoter = SimulatedQuoter::new(book);
        let cycle = TradePath::new(vec![a.clone(), b, c, a]).unwrap();

        let err = assert_err!(quoter.hop_impacts(&cycle, ether(10)));
        match err {
            ArbError::QuoteUnavailable { hop, source } => {
                assert_eq!(hop, 1);
                assert!(matches!(source, QuoteError::Rejected(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    struct DoubleReserveOut {
        token_in: Address,
        token_out: Address,
    }

    #[async_trait]
    impl ReserveSource for DoubleReserveOut {
        async fn refresh(&self, book: &PoolBook) -> anyhow::Result<usize> {
            let updated = book.update_reserves(self.token_in, self.token_out, ether(1_000), ether(2_000), Some(42));
            Ok(usize::from(updated))
        }
    }

    #[tokio::test]
    async fn test_begin_tick_refreshes_book() {
        let (a, b, _) = tokens_abc();
        let book = skewed_triangle_book();
        let quoter = SimulatedQuoter::new(book.clone()).with_refresh(Arc::new(DoubleReserveOut {
            token_in: a.address,
            token_out: b.address,
        }));

        let before = assert_ok!(quoter.quote_hop(a.address, b.address, ether(1)).await);
        assert_ok!(quoter.begin_tick().await);
        let after = assert_ok!(quoter.quote_hop(a.address, b.address, ether(1)).await);
        assert!(after > before);
        assert_eq!(book.stats(), (3, 42, 42));
    }

    #[tokio::test]
    async fn test_router_quoter_targets_configured_router() {
        use alloy::providers::ProviderBuilder;

        let provider = ProviderBuilder::new().connect_http("http://127.0.0.1:8545".parse().unwrap());
        let router = Address::repeat_byte(0xee);
        let quoter = RouterQuoter::new(Arc::new(provider), router);
        assert_eq!(quoter.router(), router);
        assert_eq!(quoter.name(), "router");
    }

    #[test]
    fn test_validate_paths() {
        let (a, b, c) = tokens_abc();
        let book = skewed_triangle_book();
        let quoter = SimulatedQuoter::new(book.clone());

        let cycle = TradePath::new(vec![a.clone(), b.clone(), c.clone(), a.clone()]).unwrap();
        assert!(quoter.validate_paths(&[cycle.clone()]).is_ok());

        let unknown = TradePath::new(vec![a.clone(), Token::new("X", Address::repeat_byte(9), 18)]).unwrap();
        assert!(matches!(quoter.validate_paths(&[unknown]), Err(ArbError::InvalidPath(_))));

        book.update_reserves(b.address, c.address, U256::ZERO, ether(1), None);
        assert!(matches!(
            quoter.validate_paths(&[cycle]),
            Err(ArbError::InvalidPoolState(_))
        ));
    }
}
