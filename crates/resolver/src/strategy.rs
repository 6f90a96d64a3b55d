//! Decides whether an auction is worth filling and how much to take.

use primitive_types::{U256, U512};

const BPS: u32 = 10_000;

/// The resolver's pricing policy.
///
/// Prices are taker asset per maker asset unit in 18 decimal fixed point,
/// the same encoding the auction uses. The strategy compares the auction
/// price against its own valuation of the pair and only fills once the
/// required margin is cleared.
#[derive(Clone, Copy, Debug)]
pub struct Strategy {
    /// What one maker asset unit is worth in taker asset to this resolver.
    pub reference_price: U256,
    /// Required margin below the reference price in basis points.
    pub min_profit_bps: u32,
    /// Largest share of an order's remaining capacity taken per commitment,
    /// in basis points.
    pub max_fill_bps: u32,
}

impl Strategy {
    /// The highest auction price at which a fill still clears the margin.
    pub fn max_acceptable_price(&self) -> U256 {
        self.reference_price * U256::from(BPS) / U256::from(BPS + self.min_profit_bps)
    }

    pub fn is_profitable(&self, price: U256) -> bool {
        price <= self.max_acceptable_price()
    }

    /// Whether the decaying price is within one percent of becoming
    /// acceptable, which is when polling switches to the fast cadence.
    pub fn is_approaching(&self, price: U256) -> bool {
        let threshold = self.max_acceptable_price();
        price <= threshold.saturating_add(threshold / 100)
    }

    /// The slice of the remaining capacity to commit to. At least one unit
    /// so a commitment is never empty.
    pub fn fill_amount(&self, remaining: U256) -> U256 {
        let share = U256::from(self.max_fill_bps.min(BPS));
        let scaled = remaining.full_mul(share) / U512::from(BPS);
        // The share is clamped to at most one, so the quotient fits.
        U256::try_from(scaled).unwrap_or(remaining).max(U256::one())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(value: u128) -> U256 {
        U256::from(value)
    }

    fn strategy() -> Strategy {
        Strategy {
            reference_price: wei(1_000_000_000_000_000_000),
            min_profit_bps: 50,
            max_fill_bps: BPS,
        }
    }

    #[test]
    fn margin_shifts_the_acceptable_price() {
        // 1.0 / 1.005
        assert_eq!(
            strategy().max_acceptable_price(),
            wei(995_024_875_621_890_547),
        );
        assert!(strategy().is_profitable(wei(980_000_000_000_000_000)));
        assert!(strategy().is_profitable(wei(995_024_875_621_890_547)));
        assert!(!strategy().is_profitable(wei(995_024_875_621_890_548)));
        assert!(!strategy().is_profitable(wei(1_020_000_000_000_000_000)));
    }

    #[test]
    fn zero_margin_accepts_the_reference_price() {
        let strategy = Strategy {
            min_profit_bps: 0,
            ..strategy()
        };
        assert!(strategy.is_profitable(strategy.reference_price));
        assert!(!strategy.is_profitable(strategy.reference_price + 1));
    }

    #[test]
    fn approaching_band_sits_above_the_threshold() {
        let strategy = strategy();
        let threshold = strategy.max_acceptable_price();
        assert!(strategy.is_approaching(threshold));
        assert!(strategy.is_approaching(threshold + threshold / 100));
        assert!(!strategy.is_approaching(threshold + threshold / 50));
    }

    #[test]
    fn fill_amount_takes_the_configured_share() {
        let half = Strategy {
            max_fill_bps: 5_000,
            ..strategy()
        };
        assert_eq!(half.fill_amount(wei(100)), wei(50));
        assert_eq!(strategy().fill_amount(wei(100)), wei(100));
        // Shares above 100% are clamped.
        let greedy = Strategy {
            max_fill_bps: 20_000,
            ..strategy()
        };
        assert_eq!(greedy.fill_amount(wei(100)), wei(100));
    }

    #[test]
    fn fill_amount_is_never_zero() {
        let sliver = Strategy {
            max_fill_bps: 1,
            ..strategy()
        };
        assert_eq!(sliver.fill_amount(wei(100)), wei(1));
        assert_eq!(sliver.fill_amount(U256::one()), wei(1));
    }

    #[test]
    fn fill_amount_survives_huge_capacities() {
        assert_eq!(strategy().fill_amount(U256::MAX), U256::MAX);
        let half = Strategy {
            max_fill_bps: 5_000,
            ..strategy()
        };
        assert_eq!(half.fill_amount(U256::MAX), U256::MAX / 2);
    }
}
