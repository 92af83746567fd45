//! Shared fixtures for unit tests: tokens, pool books and scripted quote sources

use crate::arbitrage::{QuoteSource, SimulatedQuoter};
use crate::error::QuoteError;
use crate::pool::PoolBook;
use crate::types::{FeeRate, Pool, Token};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn token(symbol: &str, byte: u8, decimals: u8) -> Token {
    Token::new(symbol, Address::repeat_byte(byte), decimals)
}

pub fn tokens_abc() -> (Token, Token, Token) {
    (token("A", 0xa1, 18), token("B", 0xb2, 18), token("C", 0xc3, 18))
}

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u8))
}

/// A/B and C/A balanced at 1000:1000, B/C skewed so B buys 3% more C
pub fn skewed_triangle_book() -> PoolBook {
    let (a, b, c) = tokens_abc();
    let book = PoolBook::new();
    book.insert(Pool::new(a.address, b.address, ether(1_000), ether(1_000), FeeRate::UNISWAP_V2));
    book.insert(Pool::new(b.address, c.address, ether(1_000), ether(1_030), FeeRate::UNISWAP_V2));
    book.insert(Pool::new(c.address, a.address, ether(1_000), ether(1_000), FeeRate::UNISWAP_V2));
    book
}

/// Simulated quotes, except one pair (either direction) always reverts
pub struct FailingPairSource {
    inner: SimulatedQuoter,
    fail: (Address, Address),
    calls: AtomicUsize,
}

impl FailingPairSource {
    pub fn new(book: PoolBook, a: Address, b: Address) -> Self {
        Self {
            inner: SimulatedQuoter::new(book),
            fail: (a, b),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for FailingPairSource {
    fn name(&self) -> &'static str {
        "failing-pair"
    }

    async fn quote_hop(&self, token_in: Address, token_out: Address, amount_in: U256) -> Result<U256, QuoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (x, y) = self.fail;
        if (token_in, token_out) == (x, y) || (token_in, token_out) == (y, x) {
            return Err(QuoteError::Rpc("execution reverted".to_string()));
        }
        self.inner.quote_hop(token_in, token_out, amount_in).await
    }
}

/// Simulated quotes that fail the first `failures` calls
pub struct FlakySource {
    inner: SimulatedQuoter,
    failures_left: AtomicUsize,
    ticks: AtomicUsize,
}

impl FlakySource {
    pub fn new(book: PoolBook, failures: usize) -> Self {
        Self {
            inner: SimulatedQuoter::new(book),
            failures_left: AtomicUsize::new(failures),
            ticks: AtomicUsize::new(0),
        }
    }

    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for FlakySource {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn begin_tick(&self) -> Result<(), QuoteError> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn quote_hop(&self, token_in: Address, token_out: Address, amount_in: U256) -> Result<U256, QuoteError> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(QuoteError::Rpc("connection reset".to_string()));
        }
        self.inner.quote_hop(token_in, token_out, amount_in).await
    }
}

/// A node that accepts quote calls and never answers
#[derive(Default)]
pub struct StalledSource {
    calls: AtomicUsize,
}

impl StalledSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for StalledSource {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn quote_hop(&self, _token_in: Address, _token_out: Address, _amount_in: U256) -> Result<U256, QuoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}
