//! Checked arithmetic helpers used across the program.
//!
//! All USD values carry 30 fractional decimals and are held in u128, so
//! products of two USD quantities need a 256-bit intermediate. Everything
//! funnels through these helpers so overflow always surfaces as
//! `VaultError::MathOverflow` instead of wrapping.

use {
    crate::error::VaultError,
    anchor_lang::prelude::*,
    num_traits::{CheckedAdd, CheckedDiv, CheckedMul, CheckedSub, One, ToPrimitive},
    std::fmt::Display,
};

pub fn checked_add<T>(arg1: T, arg2: T) -> Result<T>
where
    T: CheckedAdd + Display,
{
    if let Some(res) = arg1.checked_add(&arg2) {
        Ok(res)
    } else {
        msg!("Error: Overflow in {} + {}", arg1, arg2);
        err!(VaultError::MathOverflow)
    }
}

pub fn checked_sub<T>(arg1: T, arg2: T) -> Result<T>
where
    T: CheckedSub + Display,
{
    if let Some(res) = arg1.checked_sub(&arg2) {
        Ok(res)
    } else {
        msg!("Error: Overflow in {} - {}", arg1, arg2);
        err!(VaultError::MathOverflow)
    }
}

pub fn checked_mul<T>(arg1: T, arg2: T) -> Result<T>
where
    T: CheckedMul + Display,
{
    if let Some(res) = arg1.checked_mul(&arg2) {
        Ok(res)
    } else {
        msg!("Error: Overflow in {} * {}", arg1, arg2);
        err!(VaultError::MathOverflow)
    }
}

pub fn checked_div<T>(arg1: T, arg2: T) -> Result<T>
where
    T: CheckedDiv + Display,
{
    if let Some(res) = arg1.checked_div(&arg2) {
        Ok(res)
    } else {
        msg!("Error: Overflow in {} / {}", arg1, arg2);
        err!(VaultError::MathOverflow)
    }
}

pub fn checked_pow<T>(arg: T, exp: usize) -> Result<T>
where
    T: CheckedMul + One + Copy + Display,
{
    if let Some(res) = num_traits::checked_pow(arg, exp) {
        Ok(res)
    } else {
        msg!("Error: Overflow in {} ^ {}", arg, exp);
        err!(VaultError::MathOverflow)
    }
}

pub fn checked_as_u64<T>(arg: T) -> Result<u64>
where
    T: ToPrimitive + Display,
{
    if let Some(res) = arg.to_u64() {
        Ok(res)
    } else {
        msg!("Error: Overflow casting {} to u64", arg);
        err!(VaultError::MathOverflow)
    }
}

pub fn checked_as_i128<T>(arg: T) -> Result<i128>
where
    T: ToPrimitive + Display,
{
    if let Some(res) = arg.to_i128() {
        Ok(res)
    } else {
        msg!("Error: Overflow casting {} to i128", arg);
        err!(VaultError::MathOverflow)
    }
}

/// `arg1 * arg2 / denominator` with a 256-bit intermediate product.
pub fn checked_u128_mul_div(arg1: u128, arg2: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        msg!("Error: Overflow in {} * {} / 0", arg1, arg2);
        return err!(VaultError::MathOverflow);
    }
    if arg1 == 0 || arg2 == 0 {
        return Ok(0);
    }
    if let Some(product) = arg1.checked_mul(arg2) {
        return Ok(product / denominator);
    }
    let (quotient, _) = U256::mul_u128(arg1, arg2).div_rem_u128(denominator);
    quotient.try_to_u128()
}

/// Same as [`checked_u128_mul_div`] but rounds the quotient up.
pub fn checked_u128_mul_div_ceil(arg1: u128, arg2: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        msg!("Error: Overflow in {} * {} / 0", arg1, arg2);
        return err!(VaultError::MathOverflow);
    }
    if arg1 == 0 || arg2 == 0 {
        return Ok(0);
    }
    let (quotient, remainder) = U256::mul_u128(arg1, arg2).div_rem_u128(denominator);
    let quotient = quotient.try_to_u128()?;
    if remainder > 0 {
        checked_add(quotient, 1u128)
    } else {
        Ok(quotient)
    }
}

/// Minimal 256-bit unsigned integer for wide mul/div intermediates.
/// Field order makes the derived ordering numeric.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct U256 {
    pub hi: u128,
    pub lo: u128,
}

impl U256 {
    pub const ZERO: U256 = U256 { hi: 0, lo: 0 };

    pub fn from_u128(value: u128) -> Self {
        U256 { hi: 0, lo: value }
    }

    pub fn is_zero(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }

    fn bit(&self, index: u32) -> bool {
        if index >= 128 {
            (self.hi >> (index - 128)) & 1 == 1
        } else {
            (self.lo >> index) & 1 == 1
        }
    }

    fn set_bit(&mut self, index: u32) {
        if index >= 128 {
            self.hi |= 1u128 << (index - 128);
        } else {
            self.lo |= 1u128 << index;
        }
    }

    fn leading_zeros(&self) -> u32 {
        if self.hi != 0 {
            self.hi.leading_zeros()
        } else {
            128 + self.lo.leading_zeros()
        }
    }

    /// Full 128x128 -> 256 bit product. Cannot overflow.
    pub fn mul_u128(arg1: u128, arg2: u128) -> U256 {
        let a_lo = arg1 as u64 as u128;
        let a_hi = arg1 >> 64;
        let b_lo = arg2 as u64 as u128;
        let b_hi = arg2 >> 64;

        let ll = a_lo * b_lo;
        let lh = a_lo * b_hi;
        let hl = a_hi * b_lo;
        let hh = a_hi * b_hi;

        let (mid, mid_carry) = lh.overflowing_add(hl);
        let (lo, lo_carry) = ll.overflowing_add(mid << 64);
        let hi = hh + (mid >> 64) + ((mid_carry as u128) << 64) + lo_carry as u128;

        U256 { hi, lo }
    }

    /// Long division by a 128-bit divisor. Divisor must be non-zero.
    pub fn div_rem_u128(self, divisor: u128) -> (U256, u128) {
        debug_assert!(divisor != 0);
        if self.hi == 0 {
            return (U256::from_u128(self.lo / divisor), self.lo % divisor);
        }
        let mut quotient = U256::ZERO;
        let mut remainder: u128 = 0;
        let highest_bit = 255 - self.leading_zeros();
        for index in (0..=highest_bit).rev() {
            // Conceptual remainder is carry * 2^128 + remainder; one divisor
            // subtraction is always enough since remainder < divisor held
            // before the shift.
            let carry = remainder >> 127;
            remainder = (remainder << 1) | self.bit(index) as u128;
            if carry == 1 || remainder >= divisor {
                remainder = remainder.wrapping_sub(divisor);
                quotient.set_bit(index);
            }
        }
        (quotient, remainder)
    }

    pub fn try_to_u128(self) -> Result<u128> {
        if self.hi != 0 {
            msg!("Error: Overflow casting U256 to u128");
            return err!(VaultError::MathOverflow);
        }
        Ok(self.lo)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mul_u128_wide_product() {
        let product = U256::mul_u128(u128::MAX, u128::MAX);
        // (2^128 - 1)^2 = 2^256 - 2^129 + 1
        assert_eq!(product.lo, 1);
        assert_eq!(product.hi, u128::MAX - 1);

        let small = U256::mul_u128(1u128 << 100, 1u128 << 50);
        assert_eq!(small.hi, 1u128 << 22);
        assert_eq!(small.lo, 0);
    }

    #[test]
    fn div_rem_round_trip() {
        let a = 123_456_789_012_345_678_901_234_567_890u128;
        let b = 987_654_321_098_765_432_109_876_543_210u128;
        let d = 1_000_000_000_000_000_000_000_000_000_000u128;
        let (q, r) = U256::mul_u128(a, b).div_rem_u128(d);
        // Verify q * d + r == a * b over U256.
        let back = U256::mul_u128(q.lo, d);
        let (lo, carry) = back.lo.overflowing_add(r);
        let reconstructed = U256 {
            hi: back.hi + carry as u128,
            lo,
        };
        assert_eq!(reconstructed, U256::mul_u128(a, b));
        assert!(r < d);
    }

    #[test]
    fn mul_div_exceeding_u128_intermediate() {
        // 10^30 scale values whose product overflows u128 but whose quotient fits.
        let usd = 2_000_000u128 * 10u128.pow(30);
        let price = 60_000u128 * 10u128.pow(30);
        let size = checked_u128_mul_div(usd, 10u128.pow(30), price).unwrap();
        // 10^32 / 3, floored
        assert_eq!(size, 33_333_333_333_333_333_333_333_333_333_333u128);
        let ceil = checked_u128_mul_div_ceil(usd, 10u128.pow(30), price).unwrap();
        assert_eq!(ceil, size + 1);
    }

    #[test]
    fn mul_div_exact_has_no_ceil_bump() {
        let exact = checked_u128_mul_div_ceil(10u128.pow(30), 4, 2).unwrap();
        assert_eq!(exact, 2 * 10u128.pow(30));
    }

    #[test]
    fn mul_div_rejects_unrepresentable_quotient() {
        assert!(checked_u128_mul_div(u128::MAX, u128::MAX, 2).is_err());
        assert!(checked_u128_mul_div(1, 1, 0).is_err());
    }

    #[test]
    fn wide_products_compare_numerically() {
        assert!(U256::mul_u128(u128::MAX, 3) < U256::mul_u128(u128::MAX, 4));
        assert!(U256::from_u128(u128::MAX) < U256::mul_u128(2, u128::MAX));
        assert_eq!(U256::mul_u128(7, 9), U256::mul_u128(9, 7));
    }
}
