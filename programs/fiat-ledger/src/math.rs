//! RAY (10^27) fixed-point arithmetic. Index and rate math follows the
//! convention that RAY == 1.0; products are taken through a 256-bit
//! intermediate because u128 overflows at this scale.

use uint::construct_uint;

construct_uint! {
    pub struct U256(4);
}

pub const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;

pub const SECONDS_PER_YEAR: u128 = 365 * 24 * 60 * 60;

/// floor(a * b / c); None on zero divisor or u128 overflow.
pub fn mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    let result = U256::from(a) * U256::from(b) / U256::from(c);
    if result > U256::from(u128::MAX) {
        None
    } else {
        Some(result.as_u128())
    }
}

/// a * b / RAY
pub fn ray_mul(a: u128, b: u128) -> Option<u128> {
    mul_div(a, b, RAY)
}

/// a * RAY / b
pub fn ray_div(a: u128, b: u128) -> Option<u128> {
    mul_div(a, RAY, b)
}

/// 10^exp for decimal scaling; currency and asset decimals are capped at 18
/// so this never overflows.
pub fn pow10(exp: u8) -> u128 {
    10u128.pow(exp as u32)
}

pub fn to_u64(value: u128) -> Option<u64> {
    if value > u64::MAX as u128 {
        None
    } else {
        Some(value as u64)
    }
}
