//! Chain Reader
//!
//! Read-only on-chain checks for the configured universe:
//! - ERC20 metadata (name, symbol, decimals) compared against config
//! - V2 pair lookup through the router's factory
//! - pair reserves, used to refresh the pool book at the start of a tick
//!
//! Refresh fetches only getReserves() (1 RPC call per pool) concurrently via
//! join_all. A pool whose call fails keeps its previous reserves.

use crate::contracts::{IERC20, IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02};
use crate::pool::PoolBook;
use crate::types::Token;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Something that can bring pool reserves up to date
#[async_trait]
pub trait ReserveSource: Send + Sync {
    /// Refresh reserves in place. Returns how many pools were updated.
    async fn refresh(&self, book: &PoolBook) -> Result<usize>;
}

/// ERC20 metadata as reported by the token contract
#[derive(Debug, Clone)]
pub struct TokenCheck {
    pub token: Token,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenCheck {
    /// Decimals must agree; symbol is compared case-insensitively
    pub fn matches(&self) -> bool {
        self.decimals == self.token.decimals && self.symbol.eq_ignore_ascii_case(&self.token.symbol)
    }
}

/// Full pair state as read from the pair contract
#[derive(Debug, Clone)]
pub struct PairState {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
}

/// Reads token and pair state through any alloy provider
pub struct ChainReader<P> {
    provider: Arc<P>,
}

impl<P: Provider + 'static> ChainReader<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Read ERC20 metadata and compare it with the configured token
    pub async fn check_token(&self, token: &Token) -> Result<TokenCheck> {
        let contract = IERC20::new(token.address, self.provider.clone());

        let name = contract
            .name()
            .call()
            .await
            .with_context(|| format!("{}: failed to get name", token.symbol))?;
        let symbol = contract
            .symbol()
            .call()
            .await
            .with_context(|| format!("{}: failed to get symbol", token.symbol))?;
        let decimals = contract
            .decimals()
            .call()
            .await
            .with_context(|| format!("{}: failed to get decimals", token.symbol))?;

        let check = TokenCheck {
            token: token.clone(),
            name,
            symbol,
            decimals,
        };
        if !check.matches() {
            warn!(
                "Token {} at {:?} reports symbol={} decimals={} (configured decimals={})",
                token.symbol, token.address, check.symbol, check.decimals, token.decimals
            );
        }
        Ok(check)
    }

    /// Pair address for two tokens from the router's factory, None if no pair exists
    pub async fn find_pair(&self, router: Address, a: Address, b: Address) -> Result<Option<Address>> {
        let factory_address = IUniswapV2Router02::new(router, self.provider.clone())
            .factory()
            .call()
            .await
            .context("failed to get factory from router")?;

        let pair = IUniswapV2Factory::new(factory_address, self.provider.clone())
            .getPair(a, b)
            .call()
            .await
            .context("failed to get pair from factory")?;

        Ok((pair != Address::ZERO).then_some(pair))
    }

    /// token0, token1 and reserves of a pair (3 RPC calls)
    pub async fn pair_state(&self, pair: Address) -> Result<PairState> {
        let contract = IUniswapV2Pair::new(pair, self.provider.clone());

        let token0 = contract
            .token0()
            .call()
            .await
            .with_context(|| format!("{:?}: failed to get token0", pair))?;
        let token1 = contract
            .token1()
            .call()
            .await
            .with_context(|| format!("{:?}: failed to get token1", pair))?;
        let reserves = contract
            .getReserves()
            .call()
            .await
            .with_context(|| format!("{:?}: failed to get reserves", pair))?;

        Ok(PairState {
            address: pair,
            token0,
            token1,
            reserve0: U256::from(reserves.reserve0),
            reserve1: U256::from(reserves.reserve1),
        })
    }

    /// Refresh reserves of every addressed pool in the book concurrently.
    ///
    /// V2 pairs store the lower token address as token0, so the reserve
    /// orientation follows from the addresses without extra calls.
    pub async fn refresh_pools(&self, book: &PoolBook) -> Result<usize> {
        let pools = book.with_address();
        if pools.is_empty() {
            return Ok(0);
        }

        let block = self
            .provider
            .get_block_number()
            .await
            .context("failed to get block number")?;

        let tasks: Vec<_> = pools
            .iter()
            .filter_map(|pool| pool.address.map(|address| (pool, address)))
            .map(|(pool, address)| {
                let provider = self.provider.clone();
                let (lower, upper) = if pool.token0 < pool.token1 {
                    (pool.token0, pool.token1)
                } else {
                    (pool.token1, pool.token0)
                };
                async move {
                    let contract = IUniswapV2Pair::new(address, provider);
                    match contract.getReserves().call().await {
                        Ok(r) => Some((lower, upper, U256::from(r.reserve0), U256::from(r.reserve1))),
                        Err(e) => {
                            warn!("Reserve refresh failed for {:?}: {}", address, e);
                            None
                        }
                    }
                }
            })
            .collect();

        let mut updated = 0;
        for (token0, token1, reserve0, reserve1) in join_all(tasks).await.into_iter().flatten() {
            if book.update_reserves(token0, token1, reserve0, reserve1, Some(block)) {
                updated += 1;
            }
        }

        debug!("Refreshed {}/{} pools at block {}", updated, pools.len(), block);
        Ok(updated)
    }

    /// Check every configured token; logs a summary line
    pub async fn check_tokens<'a>(&self, tokens: impl IntoIterator<Item = &'a Token>) -> Vec<Result<TokenCheck>> {
        let results = join_all(tokens.into_iter().map(|t| self.check_token(t))).await;
        let ok = results.iter().filter(|r| matches!(r, Ok(c) if c.matches())).count();
        info!("Token check: {}/{} match configuration", ok, results.len());
        results
    }
}

#[async_trait]
impl<P: Provider + 'static> ReserveSource for ChainReader<P> {
    async fn refresh(&self, book: &PoolBook) -> Result<usize> {
        self.refresh_pools(book).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_check_matches() {
        let token = Token::new("WETH", Address::repeat_byte(1), 18);
        let check = TokenCheck {
            token: token.clone(),
            name: "Wrapped Ether".to_string(),
            symbol: "weth".to_string(),
            decimals: 18,
        };
        assert!(check.matches());

        let wrong_decimals = TokenCheck { decimals: 6, ..check.clone() };
        assert!(!wrong_decimals.matches());

        let wrong_symbol = TokenCheck { symbol: "WBTC".to_string(), ..check };
        assert!(!wrong_symbol.matches());
    }
}
