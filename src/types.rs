//! Core data structures
//!
//! Static configuration (tokens, pools, paths) plus the per-evaluation value
//! objects (hop quotes, opportunities). Nothing here caches prices: quotes and
//! opportunities are rebuilt on every tick.

use crate::error::ArbError;
use alloy::primitives::utils::{format_units, parse_units};
use alloy::primitives::{Address, I256, U256};
use std::collections::HashMap;
use std::fmt;

/// Fee denominator: fee rates are stored in parts-per-million
pub const FEE_DENOMINATOR: u32 = 1_000_000;

/// Trading fee of a pool as an integer fraction (parts-per-million).
///
/// 3000 ppm = 0.30% (the Uniswap V2 997/1000 factor). Always `< 1e6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeeRate(u32);

impl FeeRate {
    /// Fee-free execution (atomic swap-back, flash swap modelling)
    pub const ZERO: FeeRate = FeeRate(0);
    /// Standard V2 pool fee, 0.30%
    pub const UNISWAP_V2: FeeRate = FeeRate(3_000);

    pub fn from_ppm(ppm: u32) -> Result<Self, ArbError> {
        if ppm >= FEE_DENOMINATOR {
            return Err(ArbError::InvalidAmount(format!(
                "fee rate {} ppm must be below {}",
                ppm, FEE_DENOMINATOR
            )));
        }
        Ok(Self(ppm))
    }

    /// 30 bps = 0.30%
    pub fn from_bps(bps: u32) -> Result<Self, ArbError> {
        let ppm = bps
            .checked_mul(100)
            .ok_or_else(|| ArbError::InvalidAmount(format!("fee rate {} bps overflows", bps)))?;
        Self::from_ppm(ppm)
    }

    /// Fraction in `[0, 1)`, e.g. `0.003`
    pub fn from_fraction(fraction: f64) -> Result<Self, ArbError> {
        if !fraction.is_finite() || !(0.0..1.0).contains(&fraction) {
            return Err(ArbError::InvalidAmount(format!(
                "fee rate {} must be within [0, 1)",
                fraction
            )));
        }
        Self::from_ppm((fraction * FEE_DENOMINATOR as f64).round() as u32)
    }

    pub fn ppm(self) -> u32 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn as_fraction(self) -> f64 {
        self.0 as f64 / FEE_DENOMINATOR as f64
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        FeeRate::UNISWAP_V2
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.2}%", self.as_fraction() * 100.0)
    }
}

/// ERC20 token as configured at startup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

impl Token {
    pub fn new(symbol: impl Into<String>, address: Address, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            address,
            decimals,
        }
    }

    /// One whole token in base units (10^decimals)
    pub fn unit(&self) -> U256 {
        U256::from(10u64).pow(U256::from(self.decimals))
    }

    /// Parse a human amount ("0.1", "100") into base units of this token
    pub fn parse_amount(&self, human: &str) -> Result<U256, ArbError> {
        parse_token_amount(human, self.decimals)
    }

    /// Render base units as a human amount
    pub fn format_amount(&self, amount: U256) -> String {
        format_token_amount(amount, self.decimals)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Parse a non-negative decimal string into base units
pub fn parse_token_amount(human: &str, decimals: u8) -> Result<U256, ArbError> {
    let trimmed = human.trim();
    if trimmed.starts_with('-') {
        return Err(ArbError::InvalidAmount(format!("negative amount '{}'", human)));
    }
    parse_units(trimmed, decimals)
        .map(|parsed| parsed.get_absolute())
        .map_err(|e| ArbError::InvalidAmount(format!("cannot parse '{}': {}", human, e)))
}

/// Format base units with the given decimals; falls back to the raw integer
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    format_units(amount, decimals).unwrap_or_else(|_| amount.to_string())
}

/// Approximate conversion for informational ratios (ROI, rates, impact)
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

/// Signed counterpart of [`u256_to_f64`]
pub fn i256_to_f64(value: I256) -> f64 {
    let magnitude = u256_to_f64(value.unsigned_abs());
    if value.is_negative() {
        -magnitude
    } else {
        magnitude
    }
}

/// Token lookup by symbol and address
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    by_symbol: HashMap<String, Token>,
    by_address: HashMap<Address, String>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token. Duplicate symbols or addresses are configuration errors.
    pub fn insert(&mut self, token: Token) -> Result<(), ArbError> {
        if self.by_symbol.contains_key(&token.symbol) {
            return Err(ArbError::InvalidConfig(format!(
                "token symbol {} declared twice",
                token.symbol
            )));
        }
        if let Some(existing) = self.by_address.get(&token.address) {
            return Err(ArbError::InvalidConfig(format!(
                "token address {:?} declared as both {} and {}",
                token.address, existing, token.symbol
            )));
        }
        self.by_address.insert(token.address, token.symbol.clone());
        self.by_symbol.insert(token.symbol.clone(), token);
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Result<&Token, ArbError> {
        self.by_symbol
            .get(symbol)
            .ok_or_else(|| ArbError::InvalidConfig(format!("unknown token symbol '{}'", symbol)))
    }

    pub fn by_address(&self, address: &Address) -> Option<&Token> {
        self.by_address
            .get(address)
            .and_then(|symbol| self.by_symbol.get(symbol))
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.by_symbol.values()
    }
}

/// Constant-product pool state.
///
/// Reserves mirror live chain state and may be stale; quote sources re-read
/// them from the pool book on every quote instead of holding on to a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    /// Pair contract, if the pool can be refreshed from chain
    pub address: Option<Address>,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
    pub fee: FeeRate,
    /// Block of the last reserve refresh
    pub last_updated: Option<u64>,
}

impl Pool {
    pub fn new(token0: Address, token1: Address, reserve0: U256, reserve1: U256, fee: FeeRate) -> Self {
        Self {
            address: None,
            token0,
            token1,
            reserve0,
            reserve1,
            fee,
            last_updated: None,
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn contains(&self, token: Address) -> bool {
        token == self.token0 || token == self.token1
    }

    /// (reserve_in, reserve_out) for a swap starting from `token_in`
    pub fn reserves_for(&self, token_in: Address) -> Option<(U256, U256)> {
        if token_in == self.token0 {
            Some((self.reserve0, self.reserve1))
        } else if token_in == self.token1 {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }

    /// Pools must have two distinct tokens and liquidity on both sides
    pub fn validate(&self) -> Result<(), ArbError> {
        if self.token0 == self.token1 {
            return Err(ArbError::InvalidPoolState(format!(
                "pool pairs {:?} with itself",
                self.token0
            )));
        }
        if self.reserve0.is_zero() || self.reserve1.is_zero() {
            return Err(ArbError::InvalidPoolState(format!(
                "pool {:?}/{:?} has zero reserves ({}, {})",
                self.token0, self.token1, self.reserve0, self.reserve1
            )));
        }
        Ok(())
    }
}

/// Ordered token sequence; hop i trades `tokens[i] -> tokens[i + 1]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradePath {
    tokens: Vec<Token>,
}

impl TradePath {
    pub fn new(tokens: Vec<Token>) -> Result<Self, ArbError> {
        if tokens.len() < 2 {
            return Err(ArbError::InvalidPath(format!(
                "path needs at least 2 tokens, got {}",
                tokens.len()
            )));
        }
        if let Some(pair) = tokens.windows(2).find(|w| w[0].address == w[1].address) {
            return Err(ArbError::InvalidPath(format!(
                "hop {} -> {} trades a token for itself",
                pair[0].symbol, pair[1].symbol
            )));
        }
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn start(&self) -> &Token {
        &self.tokens[0]
    }

    pub fn end(&self) -> &Token {
        &self.tokens[self.tokens.len() - 1]
    }

    /// First and last token identical: profit is comparable in one unit
    pub fn is_cycle(&self) -> bool {
        self.start().address == self.end().address
    }

    pub fn hop_count(&self) -> usize {
        self.tokens.len() - 1
    }

    pub fn hops(&self) -> impl Iterator<Item = (&Token, &Token)> {
        self.tokens.windows(2).map(|w| (&w[0], &w[1]))
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.tokens.iter().map(|t| t.address).collect()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.symbol.clone()).collect()
    }

    pub fn label(&self) -> String {
        self.symbols().join("->")
    }
}

impl fmt::Display for TradePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Result of quoting one hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// Largest input the evaluator accepts: profit must be representable as I256
pub fn max_input_amount() -> U256 {
    I256::MAX.into_raw()
}

/// `a - b` as a signed value, saturating at the I256 bounds
fn signed_difference(a: U256, b: U256) -> I256 {
    if a >= b {
        I256::try_from(a - b).unwrap_or(I256::MAX)
    } else {
        I256::try_from(b - a).map(|d| -d).unwrap_or(I256::MIN)
    }
}

/// Outcome of evaluating a path for one input amount
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub path: TradePath,
    pub amount_in: U256,
    pub amount_out: U256,
    /// One quote per hop, in path order
    pub hops: Vec<Quote>,
    /// `amount_out - amount_in`; None unless the path is a cycle
    pub profit: Option<I256>,
    /// `profit / amount_in`; None unless the path is a cycle
    pub roi: Option<f64>,
}

impl Opportunity {
    /// Compose hop quotes into a path result. Profit is only computed for cycles.
    pub fn from_hops(path: TradePath, amount_in: U256, hops: Vec<Quote>) -> Self {
        let amount_out = hops.last().map(|q| q.amount_out).unwrap_or(amount_in);

        let (profit, roi) = if path.is_cycle() {
            let profit = signed_difference(amount_out, amount_in);
            let roi = if amount_in.is_zero() {
                None
            } else {
                Some(i256_to_f64(profit) / u256_to_f64(amount_in))
            };
            (Some(profit), roi)
        } else {
            (None, None)
        };

        Self {
            path,
            amount_in,
            amount_out,
            hops,
            profit,
            roi,
        }
    }

    /// Strictly positive profit. Never decided on ROI.
    pub fn is_profitable(&self) -> bool {
        self.profit.map(|p| p.is_positive()).unwrap_or(false)
    }

    /// Profit for callers that need one; one-way paths are an error here
    pub fn require_cycle_profit(&self) -> Result<I256, ArbError> {
        self.profit.ok_or_else(|| ArbError::IncompleteCycle {
            start: self.path.start().symbol.clone(),
            end: self.path.end().symbol.clone(),
        })
    }

    pub fn roi_percent(&self) -> Option<f64> {
        self.roi.map(|r| r * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{token, tokens_abc};

    #[test]
    fn test_fee_rate_constructors_agree() {
        assert_eq!(FeeRate::from_bps(30).unwrap(), FeeRate::UNISWAP_V2);
        assert_eq!(FeeRate::from_fraction(0.003).unwrap(), FeeRate::UNISWAP_V2);
        assert_eq!(FeeRate::from_ppm(0).unwrap(), FeeRate::ZERO);
        assert_eq!(FeeRate::UNISWAP_V2.to_string(), "0.30%");
    }

    #[test]
    fn test_fee_rate_rejects_out_of_range() {
        assert!(FeeRate::from_fraction(1.0).is_err());
        assert!(FeeRate::from_fraction(-0.01).is_err());
        assert!(FeeRate::from_fraction(f64::NAN).is_err());
        assert!(FeeRate::from_bps(10_000).is_err());
        assert!(FeeRate::from_ppm(1_000_000).is_err());
    }

    #[test]
    fn test_parse_and_format_amounts() {
        let dai = token("DAI", 1, 18);
        assert_eq!(dai.parse_amount("1").unwrap(), dai.unit());
        assert_eq!(
            dai.parse_amount("0.1").unwrap(),
            U256::from(100_000_000_000_000_000u64)
        );
        assert!(dai.parse_amount("-5").is_err());
        assert!(dai.parse_amount("abc").is_err());

        let usdc = token("USDC", 2, 6);
        assert_eq!(usdc.format_amount(U256::from(1_500_000u64)), "1.500000");
    }

    #[test]
    fn test_path_requires_two_tokens() {
        let (a, _, _) = tokens_abc();
        let err = TradePath::new(vec![a]).unwrap_err();
        assert!(matches!(err, ArbError::InvalidPath(_)));
    }

    #[test]
    fn test_path_rejects_self_hop() {
        let (a, b, _) = tokens_abc();
        let err = TradePath::new(vec![a.clone(), a, b]).unwrap_err();
        assert!(matches!(err, ArbError::InvalidPath(_)));
    }

    #[test]
    fn test_path_cycle_detection_and_hops() {
        let (a, b, c) = tokens_abc();
        let cycle = TradePath::new(vec![a.clone(), b.clone(), c.clone(), a.clone()]).unwrap();
        assert!(cycle.is_cycle());
        assert_eq!(cycle.hop_count(), 3);
        assert_eq!(cycle.label(), "A->B->C->A");
        let hops: Vec<_> = cycle.hops().map(|(i, o)| (i.symbol.as_str(), o.symbol.as_str())).collect();
        assert_eq!(hops, vec![("A", "B"), ("B", "C"), ("C", "A")]);

        let one_way = TradePath::new(vec![a, b, c]).unwrap();
        assert!(!one_way.is_cycle());
    }

    #[test]
    fn test_pool_reserves_follow_direction() {
        let (a, b, c) = tokens_abc();
        let pool = Pool::new(a.address, b.address, U256::from(100), U256::from(200), FeeRate::UNISWAP_V2);
        assert_eq!(pool.reserves_for(a.address), Some((U256::from(100), U256::from(200))));
        assert_eq!(pool.reserves_for(b.address), Some((U256::from(200), U256::from(100))));
        assert_eq!(pool.reserves_for(c.address), None);
    }

    #[test]
    fn test_pool_validate_rejects_empty_side() {
        let (a, b, _) = tokens_abc();
        let pool = Pool::new(a.address, b.address, U256::ZERO, U256::from(200), FeeRate::UNISWAP_V2);
        assert!(matches!(pool.validate(), Err(ArbError::InvalidPoolState(_))));
    }

    #[test]
    fn test_opportunity_profit_only_for_cycles() {
        let (a, b, _) = tokens_abc();
        let hops = vec![
            Quote { token_in: a.address, token_out: b.address, amount_in: U256::from(100), amount_out: U256::from(50) },
            Quote { token_in: b.address, token_out: a.address, amount_in: U256::from(50), amount_out: U256::from(110) },
        ];
        let cycle = TradePath::new(vec![a.clone(), b.clone(), a.clone()]).unwrap();
        let opp = Opportunity::from_hops(cycle, U256::from(100), hops.clone());
        assert_eq!(opp.amount_out, U256::from(110));
        assert_eq!(opp.profit, Some(I256::try_from(10).unwrap()));
        assert!(opp.is_profitable());
        assert!((opp.roi.unwrap() - 0.1).abs() < 1e-12);

        let one_way = TradePath::new(vec![a, b]).unwrap();
        let opp = Opportunity::from_hops(one_way, U256::from(100), hops[..1].to_vec());
        assert_eq!(opp.profit, None);
        assert_eq!(opp.roi, None);
        assert!(!opp.is_profitable());
        assert!(matches!(opp.require_cycle_profit(), Err(ArbError::IncompleteCycle { .. })));
    }

    #[test]
    fn test_profit_sign_holds_for_huge_amounts() {
        let (a, b, _) = tokens_abc();
        let amount_in = U256::from(1u8) << 255usize;
        let hops = vec![
            Quote { token_in: a.address, token_out: b.address, amount_in, amount_out: U256::from(500) },
            Quote { token_in: b.address, token_out: a.address, amount_in: U256::from(500), amount_out: U256::from(499) },
        ];
        let cycle = TradePath::new(vec![a.clone(), b, a]).unwrap();
        let opp = Opportunity::from_hops(cycle.clone(), amount_in, hops.clone());
        let loss = I256::try_from(amount_in - U256::from(499)).unwrap();
        assert_eq!(opp.profit, Some(-loss));
        assert!(!opp.is_profitable());

        // Beyond I256 the loss saturates, it never wraps into a gain
        let opp = Opportunity::from_hops(cycle, U256::MAX, hops);
        assert_eq!(opp.profit, Some(I256::MIN));
        assert!(!opp.is_profitable());

        assert_eq!(signed_difference(U256::MAX, U256::ZERO), I256::MAX);
        assert_eq!(signed_difference(U256::from(7), U256::from(10)), I256::try_from(-3).unwrap());
        assert_eq!(max_input_amount(), U256::MAX >> 1usize);
    }

    #[test]
    fn test_zero_profit_is_not_profitable() {
        let (a, b, _) = tokens_abc();
        let hops = vec![
            Quote { token_in: a.address, token_out: b.address, amount_in: U256::from(100), amount_out: U256::from(50) },
            Quote { token_in: b.address, token_out: a.address, amount_in: U256::from(50), amount_out: U256::from(100) },
        ];
        let cycle = TradePath::new(vec![a.clone(), b, a]).unwrap();
        let opp = Opportunity::from_hops(cycle, U256::from(100), hops);
        assert_eq!(opp.profit, Some(I256::ZERO));
        assert!(!opp.is_profitable());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = TokenRegistry::new();
        registry.insert(token("DAI", 1, 18)).unwrap();
        assert!(registry.insert(token("DAI", 2, 18)).is_err());
        assert!(registry.insert(token("XDAI", 1, 18)).is_err());
        assert_eq!(registry.get("DAI").unwrap().decimals, 18);
        assert!(registry.get("WETH").is_err());
        assert_eq!(registry.by_address(&token("DAI", 1, 18).address).unwrap().symbol, "DAI");
    }

    #[test]
    fn test_u256_to_f64_spans_limbs() {
        assert_eq!(u256_to_f64(U256::from(12345u64)), 12345.0);
        let big = U256::from(1u64) << 70;
        assert_eq!(u256_to_f64(big), 2f64.powi(70));
        assert_eq!(i256_to_f64(I256::try_from(-42).unwrap()), -42.0);
    }
}
