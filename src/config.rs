//! Configuration
//!
//! TOML file describing the network, the token universe, the pools between
//! them, the candidate paths and the monitor settings. `resolve()` validates
//! it all and turns it into ready-to-use core types, so a bad config halts
//! before the first tick.
//!
//! ```toml
//! [network]
//! rpc_url = "https://..."        # RPC_URL env var takes precedence
//! router = "0x..."
//!
//! [monitor]
//! interval_secs = 5
//! min_profit_percent = 1.0
//! amounts = ["1", "100"]
//!
//! [[token]]
//! symbol = "DAI"
//! address = "0x..."
//! decimals = 18
//!
//! [[pool]]
//! token0 = "DAI"
//! token1 = "WETH"
//! address = "0x..."              # optional, enables on-chain refresh
//! reserve0 = "250000"            # optional, human units
//! reserve1 = "100"
//!
//! [[path]]
//! tokens = ["DAI", "WETH", "DAI"]
//! ```

use crate::arbitrage::{MonitorConfig, ProfitThreshold, RetryPolicy};
use crate::error::ArbError;
use crate::pool::PoolBook;
use crate::types::{FeeRate, Pool, Token, TokenRegistry, TradePath};
use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Top-level TOML configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(rename = "token", default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(rename = "pool", default)]
    pub pools: Vec<PoolConfig>,
    #[serde(rename = "path", default)]
    pub paths: Vec<PathConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: Option<String>,
    /// V2 router used for live quotes
    pub router: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub min_profit_percent: f64,
    /// Probe sizes in human units of each path's start token
    #[serde(default = "default_amounts")]
    pub amounts: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub failure_cooldown_ticks: u64,
    /// Simulated quotes ignore pool fees
    #[serde(default)]
    pub fee_free: bool,
    #[serde(default = "default_fee_bps")]
    pub default_fee_bps: u32,
    #[serde(default = "default_stats_every_ticks")]
    pub stats_every_ticks: u64,
}

fn default_interval_secs() -> u64 { 5 }
fn default_amounts() -> Vec<String> { vec!["1".to_string(), "100".to_string()] }
fn default_concurrency() -> usize { 4 }
fn default_max_attempts() -> u32 { 2 }
fn default_retry_backoff_ms() -> u64 { 250 }
fn default_fee_bps() -> u32 { 30 }
fn default_stats_every_ticks() -> u64 { 60 }
fn default_decimals() -> u8 { 18 }

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            min_profit_percent: 0.0,
            amounts: default_amounts(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            failure_cooldown_ticks: 0,
            fee_free: false,
            default_fee_bps: default_fee_bps(),
            stats_every_ticks: default_stats_every_ticks(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    /// Append reported opportunities as JSON lines
    pub jsonl_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub token0: String,
    pub token1: String,
    pub address: Option<String>,
    pub fee_bps: Option<u32>,
    pub reserve0: Option<String>,
    pub reserve1: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathConfig {
    pub tokens: Vec<String>,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub rpc_url: Option<String>,
    pub router: Option<Address>,
    pub tokens: TokenRegistry,
    pub book: PoolBook,
    pub paths: Vec<TradePath>,
    pub amounts: Vec<String>,
    pub monitor: MonitorConfig,
    pub fee_free: bool,
    pub jsonl_path: Option<PathBuf>,
}

impl ResolvedConfig {
    pub fn require_rpc_url(&self) -> Result<&str> {
        self.rpc_url
            .as_deref()
            .context("No RPC URL: set network.rpc_url, RPC_URL or --rpc-url")
    }

    pub fn require_router(&self) -> Result<Address> {
        self.router.context("No router address: set network.router")
    }
}

fn parse_address(what: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).with_context(|| format!("{}: invalid address '{}'", what, raw))
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let m = &self.monitor;
        if m.interval_secs == 0 {
            bail!(ArbError::InvalidConfig("monitor.interval_secs must be positive".to_string()));
        }
        Ok(MonitorConfig {
            interval: Duration::from_secs(m.interval_secs),
            threshold: ProfitThreshold::from_percent(m.min_profit_percent)?,
            concurrency: m.concurrency,
            retry: RetryPolicy {
                max_attempts: m.max_attempts,
                base_delay: Duration::from_millis(m.retry_backoff_ms),
            },
            failure_cooldown_ticks: m.failure_cooldown_ticks,
            stats_every_ticks: m.stats_every_ticks,
        })
    }

    /// Validate and build core types. Pool reserves left out stay zero until refreshed.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let mut tokens = TokenRegistry::new();
        for t in &self.tokens {
            let address = parse_address(&format!("token {}", t.symbol), &t.address)?;
            tokens.insert(Token::new(t.symbol.clone(), address, t.decimals))?;
        }
        if tokens.is_empty() {
            bail!(ArbError::InvalidConfig("no [[token]] entries".to_string()));
        }

        let default_fee = FeeRate::from_bps(self.monitor.default_fee_bps)?;
        let book = PoolBook::new();
        for (i, p) in self.pools.iter().enumerate() {
            let pool = self
                .resolve_pool(p, &tokens, default_fee)
                .with_context(|| format!("pool #{} ({}/{})", i + 1, p.token0, p.token1))?;
            if book.get(pool.token0, pool.token1).is_some() {
                bail!(ArbError::InvalidConfig(format!(
                    "pool {}/{} declared twice",
                    p.token0, p.token1
                )));
            }
            book.insert(pool);
        }

        let mut paths = Vec::with_capacity(self.paths.len());
        for p in &self.paths {
            let hops = p
                .tokens
                .iter()
                .map(|symbol| tokens.get(symbol).cloned())
                .collect::<Result<Vec<Token>, ArbError>>()?;
            paths.push(TradePath::new(hops)?);
        }
        if paths.is_empty() {
            bail!(ArbError::InvalidConfig("no [[path]] entries".to_string()));
        }

        let router = self
            .network
            .router
            .as_deref()
            .map(|raw| parse_address("network.router", raw))
            .transpose()?;

        let resolved = ResolvedConfig {
            rpc_url: self.network.rpc_url.clone(),
            router,
            tokens,
            book,
            paths,
            amounts: self.monitor.amounts.clone(),
            monitor: self.monitor_config()?,
            fee_free: self.monitor.fee_free,
            jsonl_path: self.report.jsonl_path.as_ref().map(PathBuf::from),
        };
        debug!(
            "Config resolved: {} tokens, {} pools, {} paths",
            resolved.tokens.len(),
            resolved.book.len(),
            resolved.paths.len()
        );
        Ok(resolved)
    }

    fn resolve_pool(&self, p: &PoolConfig, tokens: &TokenRegistry, default_fee: FeeRate) -> Result<Pool> {
        let token0 = tokens.get(&p.token0)?;
        let token1 = tokens.get(&p.token1)?;
        if token0.address == token1.address {
            bail!(ArbError::InvalidConfig("pool pairs a token with itself".to_string()));
        }

        let fee = match p.fee_bps {
            Some(bps) => FeeRate::from_bps(bps)?,
            None => default_fee,
        };
        let reserve0 = match &p.reserve0 {
            Some(raw) => token0.parse_amount(raw)?,
            None => U256::ZERO,
        };
        let reserve1 = match &p.reserve1 {
            Some(raw) => token1.parse_amount(raw)?,
            None => U256::ZERO,
        };

        let mut pool = Pool::new(token0.address, token1.address, reserve0, reserve1, fee);
        if let Some(raw) = &p.address {
            pool = pool.with_address(parse_address("pool address", raw)?);
        }
        Ok(pool)
    }
}
