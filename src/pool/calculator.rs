//! AMM Quote Simulator
//!
//! Constant product (x * y = k) quoting with the fee taken from the input.
//! Everything here is pure integer math on base units; intermediates are
//! widened to U512 so `amount * reserve * 1e6` can't overflow for any
//! uint112-sized reserves.
//!
//! Created: 2026-10-16

use crate::error::ArbError;
use crate::types::{u256_to_f64, FeeRate, FEE_DENOMINATOR};
use alloy::primitives::ruint::UintTryFrom;
use alloy::primitives::{U256, U512};

fn check_reserves(reserve_in: U256, reserve_out: U256) -> Result<(), ArbError> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(ArbError::InvalidPoolState(format!(
            "reserves must be positive (in={}, out={})",
            reserve_in, reserve_out
        )));
    }
    Ok(())
}

fn narrow(value: U512) -> Result<U256, ArbError> {
    U256::uint_try_from(value)
        .map_err(|_| ArbError::InvalidAmount(format!("quote {} exceeds 256 bits", value)))
}

fn overflow(what: &str) -> ArbError {
    ArbError::InvalidAmount(format!("{} overflows 512-bit intermediate", what))
}

/// Output amount for swapping `amount_in` into a pool.
///
/// `out = in*(1e6-fee)*reserve_out / (reserve_in*1e6 + in*(1e6-fee))`
///
/// With `fee = 3000 ppm` this is the router's own `getAmountOut` (997/1000).
/// The result is always strictly below `reserve_out`.
pub fn quote_out(
    reserve_in: U256,
    reserve_out: U256,
    amount_in: U256,
    fee: FeeRate,
) -> Result<U256, ArbError> {
    check_reserves(reserve_in, reserve_out)?;
    if amount_in.is_zero() {
        return Ok(U256::ZERO);
    }

    let in_with_fee = U512::from(amount_in) * U512::from(FEE_DENOMINATOR - fee.ppm());
    let numerator = in_with_fee
        .checked_mul(U512::from(reserve_out))
        .ok_or_else(|| overflow("numerator"))?;
    let denominator = U512::from(reserve_in) * U512::from(FEE_DENOMINATOR) + in_with_fee;

    narrow(numerator / denominator)
}

/// Input needed to receive exactly `amount_out` (inverse of [`quote_out`], rounded up)
pub fn amount_in_for(
    reserve_in: U256,
    reserve_out: U256,
    amount_out: U256,
    fee: FeeRate,
) -> Result<U256, ArbError> {
    check_reserves(reserve_in, reserve_out)?;
    if amount_out.is_zero() {
        return Ok(U256::ZERO);
    }
    if amount_out >= reserve_out {
        return Err(ArbError::InvalidAmount(format!(
            "cannot take {} out of a pool holding {}",
            amount_out, reserve_out
        )));
    }

    let numerator = U512::from(reserve_in)
        .checked_mul(U512::from(amount_out))
        .and_then(|n| n.checked_mul(U512::from(FEE_DENOMINATOR)))
        .ok_or_else(|| overflow("numerator"))?;
    let denominator =
        U512::from(reserve_out - amount_out) * U512::from(FEE_DENOMINATOR - fee.ppm());

    narrow(numerator / denominator + U512::from(1u8))
}

/// Price impact of a trade as a percentage of the spot price, fee included.
///
/// Informational only. Empty pools report 100%.
pub fn price_impact(reserve_in: U256, reserve_out: U256, amount_in: U256, fee: FeeRate) -> f64 {
    if amount_in.is_zero() {
        return 0.0;
    }
    let amount_out = match quote_out(reserve_in, reserve_out, amount_in, fee) {
        Ok(out) if !out.is_zero() => out,
        _ => return 100.0,
    };

    let spot_price = u256_to_f64(reserve_out) / u256_to_f64(reserve_in);
    let execution_price = u256_to_f64(amount_out) / u256_to_f64(amount_in);

    ((spot_price - execution_price) / spot_price) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u8))
    }

    #[test]
    fn test_quote_out_matches_router_formula() {
        // Typical WETH/USDC pool: 100 WETH vs 200,000 USDC
        let amount_in = ether(1);
        let reserve_in = ether(100);
        let reserve_out = U256::from(200_000_000_000u64);

        let amount_out = quote_out(reserve_in, reserve_out, amount_in, FeeRate::UNISWAP_V2).unwrap();

        let legacy = (amount_in * U256::from(997u64) * reserve_out)
            / (reserve_in * U256::from(1000u64) + amount_in * U256::from(997u64));
        assert_eq!(amount_out, legacy);
        assert!(amount_out > U256::from(1_970_000_000u64));
        assert!(amount_out < U256::from(2_000_000_000u64));
    }

    #[test]
    fn test_thousand_two_thousand_scenario() {
        // 1000 A / 2000 B, 0.3% fee, 10 A in: 9.97 * 2000 / 1009.97 = 19.7431...
        let (reserve_a, reserve_b) = (ether(1000), ether(2000));
        let out = quote_out(reserve_a, reserve_b, ether(10), FeeRate::UNISWAP_V2).unwrap();
        assert!(out > U256::from(19_743_000_000_000_000_000u128));
        assert!(out < U256::from(19_744_000_000_000_000_000u128));

        let back = quote_out(reserve_b, reserve_a, out, FeeRate::UNISWAP_V2).unwrap();
        assert!(back < ether(10));
    }

    #[test]
    fn test_zero_reserves_rejected() {
        let fee = FeeRate::UNISWAP_V2;
        for (r_in, r_out) in [(0u64, 100u64), (100, 0), (0, 0)] {
            let err = quote_out(U256::from(r_in), U256::from(r_out), U256::from(10), fee).unwrap_err();
            assert!(matches!(err, ArbError::InvalidPoolState(_)));
        }
    }

    #[test]
    fn test_zero_amount_quotes_zero() {
        let out = quote_out(U256::from(100), U256::from(100), U256::ZERO, FeeRate::UNISWAP_V2).unwrap();
        assert_eq!(out, U256::ZERO);
    }

    #[test]
    fn test_output_monotonic_in_amount() {
        let (r_in, r_out) = (ether(5_000), ether(3_000));
        let mut last = U256::ZERO;
        for step in 0..200u64 {
            let amount = U256::from(step) * U256::from(37_000_000_000_000_000u64);
            let out = quote_out(r_in, r_out, amount, FeeRate::UNISWAP_V2).unwrap();
            assert!(out >= last, "output decreased at step {}", step);
            last = out;
        }
    }

    #[test]
    fn test_output_bounded_by_reserve() {
        let r_out = ether(2_000);
        for amount in [ether(1), ether(1_000), ether(1_000_000), U256::from(u128::MAX)] {
            for fee in [FeeRate::ZERO, FeeRate::UNISWAP_V2] {
                let out = quote_out(ether(1_000), r_out, amount, fee).unwrap();
                assert!(out < r_out);
            }
        }
    }

    #[test]
    fn test_higher_fee_never_pays_more() {
        let one_percent = FeeRate::from_bps(100).unwrap();
        let (r_in, r_out, amount) = (ether(1_000), ether(2_000), ether(10));

        let free = quote_out(r_in, r_out, amount, FeeRate::ZERO).unwrap();
        let standard = quote_out(r_in, r_out, amount, FeeRate::UNISWAP_V2).unwrap();
        let expensive = quote_out(r_in, r_out, amount, one_percent).unwrap();

        assert!(free > standard);
        assert!(standard > expensive);
    }

    #[test]
    fn test_round_trip_with_fee_loses() {
        let (r_a, r_b) = (ether(1_000), ether(2_000));
        for amount in [U256::from(1_000u64), ether(1), ether(10), ether(100)] {
            let mid = quote_out(r_a, r_b, amount, FeeRate::UNISWAP_V2).unwrap();
            let back = quote_out(r_b, r_a, mid, FeeRate::UNISWAP_V2).unwrap();
            assert!(back < amount);
        }
    }

    #[test]
    fn test_zero_fee_round_trip_breaks_even() {
        // Second leg trades against the pool as the first leg left it
        let (r_a, r_b) = (ether(1_000), ether(2_000));
        for amount in [U256::from(12_345u64), ether(1), ether(10), ether(250)] {
            let mid = quote_out(r_a, r_b, amount, FeeRate::ZERO).unwrap();
            let back = quote_out(r_b - mid, r_a + amount, mid, FeeRate::ZERO).unwrap();
            assert!(back <= amount);
            assert!(amount - back <= U256::from(2u8), "lost {} units", amount - back);
        }
    }

    #[test]
    fn test_amount_in_for_inverts_quote() {
        let amount_out = U256::from(1_000_000_000u64);
        let reserve_in = ether(100);
        let reserve_out = U256::from(200_000_000_000u64);

        let amount_in = amount_in_for(reserve_in, reserve_out, amount_out, FeeRate::UNISWAP_V2).unwrap();
        let verified = quote_out(reserve_in, reserve_out, amount_in, FeeRate::UNISWAP_V2).unwrap();
        assert!(verified >= amount_out);
    }

    #[test]
    fn test_amount_in_for_rejects_draining_pool() {
        let err = amount_in_for(U256::from(100), U256::from(100), U256::from(100), FeeRate::UNISWAP_V2)
            .unwrap_err();
        assert!(matches!(err, ArbError::InvalidAmount(_)));
    }

    #[test]
    fn test_narrow_rejects_values_above_u256() {
        assert_eq!(narrow(U512::from(42u8)).unwrap(), U256::from(42u8));
        assert_eq!(narrow(U512::from(U256::MAX)).unwrap(), U256::MAX);
        let err = narrow(U512::from(U256::MAX) + U512::from(1u8)).unwrap_err();
        assert!(matches!(err, ArbError::InvalidAmount(_)));
    }

    #[test]
    fn test_price_impact() {
        // 10% of the pool
        let impact = price_impact(ether(100), U256::from(200_000_000_000u64), ether(10), FeeRate::UNISWAP_V2);
        assert!(impact > 5.0);
        assert!(impact < 15.0);

        let tiny = price_impact(ether(100), U256::from(200_000_000_000u64), U256::from(1_000_000_000_000_000u64), FeeRate::ZERO);
        assert!(tiny < 0.01);
        assert_eq!(price_impact(U256::ZERO, U256::from(1), ether(1), FeeRate::ZERO), 100.0);
    }
}
