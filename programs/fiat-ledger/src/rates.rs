//! Devaluation-sensitive interest rate model. Each currency carries a
//! compounding borrow index advanced lazily at the current dynamic rate;
//! every operation that reads outstanding debt accrues the index first so
//! debt is always priced at the latest index.

use anchor_lang::prelude::*;

use crate::math::{ray_mul, RAY, SECONDS_PER_YEAR};
use crate::state::{CurrencyConfig, LedgerError};

impl CurrencyConfig {
    /// Current annualized borrow rate, RAY-scaled. `unit_price` is the price
    /// of one currency unit in collateral-asset terms (RAY == parity), or
    /// None when the currency has no feed configured.
    pub fn dynamic_rate(&self, unit_price: Option<u128>) -> u128 {
        let raw = match unit_price {
            None => self.base_rate,
            Some(price) if price >= RAY => {
                let premium = ray_mul(price - RAY, self.sensitivity).unwrap_or(u128::MAX);
                self.base_rate.saturating_add(premium)
            }
            Some(price) => {
                let discount = ray_mul(RAY - price, self.sensitivity).unwrap_or(u128::MAX);
                self.base_rate.saturating_sub(discount)
            }
        };
        raw.clamp(self.min_rate, self.max_rate)
    }

    /// Advance the borrow index to `now` at the current dynamic rate:
    /// index *= 1 + rate * elapsed / year. No-op when no time has elapsed.
    pub fn accrue_index(&mut self, now: i64, unit_price: Option<u128>) -> Result<()> {
        if now <= self.last_index_update {
            return Ok(());
        }
        let elapsed = (now - self.last_index_update) as u128;
        let rate = self.dynamic_rate(unit_price);
        let accrued_fraction = rate
            .checked_mul(elapsed)
            .ok_or(LedgerError::MathOverflow)?
            .checked_div(SECONDS_PER_YEAR)
            .ok_or(LedgerError::MathOverflow)?;
        let growth = RAY
            .checked_add(accrued_fraction)
            .ok_or(LedgerError::MathOverflow)?;
        self.borrow_index = ray_mul(self.borrow_index, growth).ok_or(LedgerError::MathOverflow)?;
        self.last_index_update = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn currency(base: u128, min: u128, max: u128, sensitivity: u128) -> CurrencyConfig {
        CurrencyConfig {
            code: *b"ARS\0\0\0\0\0",
            decimals: 2,
            collateralization_ratio: 3 * RAY / 2,
            liquidation_threshold: 6 * RAY / 5,
            price_feed: None,
            base_rate: base,
            min_rate: min,
            max_rate: max,
            sensitivity,
            borrow_index: RAY,
            last_index_update: 0,
            bump: 255,
        }
    }

    #[test]
    fn base_rate_without_feed() {
        let c = currency(RAY / 20, 0, RAY, RAY);
        assert_eq!(c.dynamic_rate(None), RAY / 20);
        assert_eq!(c.dynamic_rate(Some(RAY)), RAY / 20);
    }

    #[test]
    fn rate_rises_above_parity_and_falls_below() {
        // base 5%, sensitivity 1.0
        let c = currency(RAY / 20, 0, RAY, RAY);
        // currency unit buys 1.02 asset units: +2%
        assert_eq!(c.dynamic_rate(Some(RAY + RAY / 50)), RAY / 20 + RAY / 50);
        // currency unit buys 0.98 asset units: -2%
        assert_eq!(c.dynamic_rate(Some(RAY - RAY / 50)), RAY / 20 - RAY / 50);
    }

    #[test]
    fn rate_is_clamped() {
        let c = currency(RAY / 20, RAY / 100, RAY / 10, RAY);
        // deep premium clamps at max
        assert_eq!(c.dynamic_rate(Some(2 * RAY)), RAY / 10);
        // deep discount saturates at zero then clamps to min
        assert_eq!(c.dynamic_rate(Some(RAY / 2)), RAY / 100);
    }

    #[test]
    fn sensitivity_scales_the_premium() {
        // sensitivity 2.0 doubles the deviation
        let c = currency(RAY / 20, 0, RAY, 2 * RAY);
        assert_eq!(c.dynamic_rate(Some(RAY + RAY / 100)), RAY / 20 + 2 * RAY / 100);
    }

    #[test]
    fn accrue_is_a_noop_without_elapsed_time() {
        let mut c = currency(RAY / 20, 0, RAY, RAY);
        c.last_index_update = 500;
        c.accrue_index(500, None).unwrap();
        assert_eq!(c.borrow_index, RAY);
        c.accrue_index(100, None).unwrap();
        assert_eq!(c.borrow_index, RAY);
        assert_eq!(c.last_index_update, 500);
    }

    #[test]
    fn one_year_at_five_percent() {
        let mut c = currency(RAY / 20, 0, RAY, RAY);
        c.accrue_index(SECONDS_PER_YEAR as i64, None).unwrap();
        assert_eq!(c.borrow_index, RAY + RAY / 20);
        assert_eq!(c.last_index_update, SECONDS_PER_YEAR as i64);
    }

    #[test]
    fn index_is_monotone_under_any_price() {
        let mut c = currency(RAY / 20, 0, RAY, RAY);
        let mut prev = c.borrow_index;
        let prices = [None, Some(RAY / 2), Some(RAY), Some(3 * RAY)];
        for (i, price) in prices.iter().enumerate() {
            c.accrue_index(((i + 1) * 1_000_000) as i64, *price).unwrap();
            assert!(c.borrow_index >= prev);
            prev = c.borrow_index;
        }
    }

    #[test]
    fn currencies_accrue_independently() {
        let mut a = currency(RAY / 20, 0, RAY, RAY);
        let mut b = currency(RAY / 10, 0, RAY, RAY);
        a.accrue_index(SECONDS_PER_YEAR as i64, None).unwrap();
        assert_eq!(b.borrow_index, RAY);
        b.accrue_index(SECONDS_PER_YEAR as i64, None).unwrap();
        assert_eq!(a.borrow_index, RAY + RAY / 20);
        assert_eq!(b.borrow_index, RAY + RAY / 10);
    }
}
