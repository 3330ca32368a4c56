//! Cross-asset price conversion. The feed quotes fiat units (at currency
//! decimals) per one whole collateral-asset unit; conversions are pure in the
//! quoted price and the asset's decimal precision, and are inverses of each
//! other up to one unit of fixed-point rounding.

use anchor_lang::prelude::*;

use crate::math::{mul_div, pow10, to_u64, RAY};
use crate::state::{CurrencyConfig, LedgerError, PriceFeed};

/// Fiat amount (raw units) -> collateral asset amount (raw units).
pub fn currency_to_asset(amount: u64, price: u64, asset_decimals: u8) -> Result<u64> {
    require!(price > 0, LedgerError::PriceUnavailable);
    let value = mul_div(amount as u128, pow10(asset_decimals), price as u128)
        .ok_or(LedgerError::MathOverflow)?;
    to_u64(value).ok_or(LedgerError::MathOverflow.into())
}

/// Collateral asset amount (raw units) -> fiat amount (raw units).
pub fn asset_to_currency(amount: u64, price: u64, asset_decimals: u8) -> Result<u64> {
    require!(price > 0, LedgerError::PriceUnavailable);
    let value = mul_div(amount as u128, price as u128, pow10(asset_decimals))
        .ok_or(LedgerError::MathOverflow)?;
    to_u64(value).ok_or(LedgerError::MathOverflow.into())
}

/// Price of one whole currency unit expressed in collateral-asset terms,
/// RAY-scaled (RAY == parity). Feeds the devaluation-sensitive rate model.
pub fn currency_unit_price(price: u64, currency_decimals: u8) -> Result<u128> {
    require!(price > 0, LedgerError::PriceUnavailable);
    mul_div(RAY, pow10(currency_decimals), price as u128)
        .ok_or(LedgerError::MathOverflow.into())
}

/// A feed quote of zero marks the feed unavailable.
pub fn quote(price: u64) -> Option<u64> {
    if price == 0 {
        None
    } else {
        Some(price)
    }
}

/// Resolve the currency's feed, if any. `None` when no feed is configured or
/// the configured feed quotes zero; a feed account that does not match the
/// registered reference is an error.
pub fn feed_price(
    currency: &CurrencyConfig,
    feed: &Option<Account<PriceFeed>>,
) -> Result<Option<u64>> {
    match (currency.price_feed, feed) {
        (None, _) => Ok(None),
        (Some(expected), Some(feed)) => {
            require_keys_eq!(feed.key(), expected, LedgerError::FeedMismatch);
            Ok(quote(feed.price))
        }
        (Some(_), None) => Err(LedgerError::FeedMismatch.into()),
    }
}
