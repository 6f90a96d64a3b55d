//! Dutch auction price decay and fixed point amount conversion.

use crate::u256_decimal;
use lazy_static::lazy_static;
use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};

lazy_static! {
    /// One unit in the protocol's 18 decimal fixed point price encoding.
    pub static ref PRICE_UNIT: U256 = U256::exp10(18);
}

/// The price decay window signed into an order.
///
/// Prices are taker asset per maker asset unit, 18 decimal fixed point.
/// Outside the window the price is clamped to the respective end, inside it
/// decays linearly with truncating integer division, so every observer
/// computing the price for the same timestamp gets the same value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionParams {
    pub start_time: u64,
    pub end_time: u64,
    #[serde(with = "u256_decimal")]
    pub start_price: U256,
    #[serde(with = "u256_decimal")]
    pub end_price: U256,
}

impl AuctionParams {
    pub fn is_valid_window(&self) -> bool {
        self.start_time <= self.end_time
    }

    pub fn current_price(&self, now: u64) -> U256 {
        if now <= self.start_time {
            return self.start_price;
        }
        if now >= self.end_time {
            return self.end_price;
        }
        let elapsed = U256::from(now - self.start_time);
        let window = U256::from(self.end_time - self.start_time);
        if self.start_price >= self.end_price {
            let span = self.start_price - self.end_price;
            self.start_price - span * elapsed / window
        } else {
            let span = self.end_price - self.start_price;
            self.start_price + span * elapsed / window
        }
    }
}

/// Converts an amount at an 18 decimal fixed point rate, truncating.
///
/// Used both for taker amounts (`amount * price / 1e18`) and for scaling per
/// unit safety deposits to a partial fill.
pub fn scale(amount: U256, rate: U256) -> U256 {
    let scaled = amount.full_mul(rate) / U512::from(*PRICE_UNIT);
    // The quotient only overflows for amount * rate >= 2^256 * 1e18 which no
    // real asset supply reaches.
    U256::try_from(scaled).unwrap_or(U256::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(value: u128) -> U256 {
        U256::from(value)
    }

    fn descending() -> AuctionParams {
        AuctionParams {
            start_time: 1_000,
            end_time: 1_300,
            start_price: eth(1_020_000_000_000_000_000),
            end_price: eth(980_000_000_000_000_000),
        }
    }

    #[test]
    fn clamps_outside_window() {
        let params = descending();
        assert_eq!(params.current_price(0), params.start_price);
        assert_eq!(params.current_price(1_000), params.start_price);
        assert_eq!(params.current_price(1_300), params.end_price);
        assert_eq!(params.current_price(10_000), params.end_price);
    }

    #[test]
    fn interpolates_midpoint() {
        // 1.02 decaying to 0.98 over 300 seconds crosses 1.00 exactly in
        // the middle.
        assert_eq!(
            descending().current_price(1_150),
            eth(1_000_000_000_000_000_000),
        );
    }

    #[test]
    fn price_is_monotonically_non_increasing() {
        let params = descending();
        let mut last = params.current_price(0);
        for now in 0..1_500 {
            let price = params.current_price(now);
            assert!(price <= last, "price increased at {now}");
            last = price;
        }
    }

    #[test]
    fn supports_ascending_windows() {
        let params = AuctionParams {
            start_time: 0,
            end_time: 100,
            start_price: eth(100),
            end_price: eth(200),
        };
        assert_eq!(params.current_price(50), eth(150));
        let mut last = params.current_price(0);
        for now in 0..120 {
            let price = params.current_price(now);
            assert!(price >= last);
            last = price;
        }
    }

    #[test]
    fn interpolation_truncates() {
        let params = AuctionParams {
            start_time: 0,
            end_time: 3,
            start_price: eth(10),
            end_price: eth(0),
        };
        // span * elapsed / window = 10 / 3 = 3 with truncation.
        assert_eq!(params.current_price(1), eth(7));
    }

    #[test]
    fn degenerate_window_never_divides_by_zero() {
        let params = AuctionParams {
            start_time: 100,
            end_time: 100,
            start_price: eth(2),
            end_price: eth(1),
        };
        assert_eq!(params.current_price(99), eth(2));
        assert_eq!(params.current_price(100), eth(2));
        assert_eq!(params.current_price(101), eth(1));
    }

    #[test]
    fn window_validation() {
        assert!(descending().is_valid_window());
        let invalid = AuctionParams {
            start_time: 2,
            end_time: 1,
            ..Default::default()
        };
        assert!(!invalid.is_valid_window());
    }

    #[test]
    fn scales_amounts_at_fixed_point_rates() {
        // 2 units at a price of 1.5 cost 3 units.
        assert_eq!(
            scale(eth(2_000_000_000_000_000_000), eth(1_500_000_000_000_000_000)),
            eth(3_000_000_000_000_000_000),
        );
        assert_eq!(scale(eth(100), *PRICE_UNIT), eth(100));
        assert_eq!(scale(U256::zero(), eth(5)), U256::zero());
    }

    #[test]
    fn scaling_truncates() {
        // 3 wei at half price truncates to 1.
        assert_eq!(scale(eth(3), eth(500_000_000_000_000_000)), eth(1));
    }

    #[test]
    fn scaling_huge_amounts_does_not_overflow() {
        assert_eq!(scale(U256::MAX, *PRICE_UNIT), U256::MAX);
    }
}
