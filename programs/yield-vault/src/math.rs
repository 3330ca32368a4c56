//! RAY fixed-point helpers for the liquidity index.

use uint::construct_uint;

construct_uint! {
    pub struct U256(4);
}

/// 10^27 fixed-point unit, matching the index precision used across the
/// protocol.
pub const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;

pub const SECONDS_PER_YEAR: u128 = 365 * 24 * 60 * 60;

/// Annualized rates above 1000% are treated as configuration mistakes.
pub const MAX_LIQUIDITY_RATE: u128 = 10 * RAY;

/// a * b / c with a 256-bit intermediate product. Returns None on division by
/// zero or if the result does not fit in a u128.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_survives_ray_scale_products() {
        // u64::MAX * RAY would overflow u128 without the wide intermediate
        let v = mul_div(u64::MAX as u128, RAY, RAY).unwrap();
        assert_eq!(v, u64::MAX as u128);
    }

    #[test]
    fn mul_div_rejects_zero_divisor() {
        assert_eq!(mul_div(1, 1, 0), None);
    }

    #[test]
    fn mul_div_rejects_overflowing_result() {
        assert_eq!(mul_div(u128::MAX, 2, 1), None);
    }
}
