//! Pool Book
//!
//! Thread-safe storage for pool reserves using DashMap, keyed by the
//! unordered token pair. Readers copy what they need out of the map;
//! no guard is ever held across an await.

use crate::types::{FeeRate, Pool};
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

type PairKey = (Address, Address);

fn pair_key(a: Address, b: Address) -> PairKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Reserves of one pool oriented for a swap direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectedReserves {
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub fee: FeeRate,
}

/// Shared pool registry. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct PoolBook {
    pools: Arc<DashMap<PairKey, Pool>>,
}

impl PoolBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the pool for its token pair
    pub fn insert(&self, pool: Pool) {
        debug!(
            "Pool {:?}/{:?} set: reserves ({}, {}) fee {}",
            pool.token0, pool.token1, pool.reserve0, pool.reserve1, pool.fee
        );
        self.pools.insert(pair_key(pool.token0, pool.token1), pool);
    }

    pub fn get(&self, a: Address, b: Address) -> Option<Pool> {
        self.pools.get(&pair_key(a, b)).map(|entry| entry.clone())
    }

    /// Reserves for trading `token_in -> token_out`, read at call time
    pub fn directed(&self, token_in: Address, token_out: Address) -> Option<DirectedReserves> {
        let entry = self.pools.get(&pair_key(token_in, token_out))?;
        let (reserve_in, reserve_out) = entry.reserves_for(token_in)?;
        Some(DirectedReserves {
            reserve_in,
            reserve_out,
            fee: entry.fee,
        })
    }

    /// Overwrite reserves of a known pool. `reserve0` belongs to `token0`
    /// as given here, which need not match the stored orientation.
    /// Returns false when the pair is unknown.
    pub fn update_reserves(
        &self,
        token0: Address,
        token1: Address,
        reserve0: U256,
        reserve1: U256,
        block: Option<u64>,
    ) -> bool {
        match self.pools.get_mut(&pair_key(token0, token1)) {
            Some(mut entry) => {
                let pool = entry.value_mut();
                if pool.token0 == token0 {
                    pool.reserve0 = reserve0;
                    pool.reserve1 = reserve1;
                } else {
                    pool.reserve0 = reserve1;
                    pool.reserve1 = reserve0;
                }
                if block.is_some() {
                    pool.last_updated = block;
                }
                true
            }
            None => false,
        }
    }

    pub fn all(&self) -> Vec<Pool> {
        self.pools.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Pools that can be refreshed from chain
    pub fn with_address(&self) -> Vec<Pool> {
        self.pools
            .iter()
            .filter(|entry| entry.value().address.is_some())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// (pool_count, oldest_block, newest_block) over refreshed pools
    pub fn stats(&self) -> (usize, u64, u64) {
        let blocks: Vec<u64> = self
            .pools
            .iter()
            .filter_map(|entry| entry.value().last_updated)
            .collect();
        let min_block = blocks.iter().copied().min().unwrap_or(0);
        let max_block = blocks.iter().copied().max().unwrap_or(0);
        (self.pools.len(), min_block, max_block)
    }
}
