use super::{scale_by_pow2, ExtendedScalar, Precision};
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{float::FloatCore, One, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Arbitrary-precision binary floating point number.
///
/// The value is `mantissa · 2^exponent` with `|mantissa| < 2^bits`; every
/// operation rounds its exact result to `bits` significand bits (round half
/// away from zero). Division by zero and square roots of negative numbers
/// produce NaN, which propagates through all further operations.
#[derive(Clone)]
pub struct BigFloat {
    mantissa: BigInt,
    exponent: i64,
    bits: u32,
    nan: bool,
}

impl BigFloat {
    pub fn zero(precision: Precision) -> Self {
        Self {
            mantissa: BigInt::zero(),
            exponent: 0,
            bits: precision.bits.max(2),
            nan: false,
        }
    }

    pub fn nan(precision: Precision) -> Self {
        Self {
            nan: true,
            ..Self::zero(precision)
        }
    }

    /// Exact conversion of a finite double, rounded to `precision` bits.
    pub fn from_f64(value: f64, precision: Precision) -> Self {
        if !value.is_finite() {
            return Self::nan(precision);
        }
        if value == 0.0 {
            return Self::zero(precision);
        }
        let (mantissa, exponent, sign) = FloatCore::integer_decode(value);
        let sign = if sign < 0 { Sign::Minus } else { Sign::Plus };
        Self::rounded(
            BigInt::from_biguint(sign, BigUint::from(mantissa)),
            exponent as i64,
            precision.bits.max(2),
        )
    }

    pub fn precision(&self) -> Precision {
        Precision { bits: self.bits }
    }

    pub fn is_nan(&self) -> bool {
        self.nan
    }

    fn is_exact_zero(&self) -> bool {
        !self.nan && self.mantissa.is_zero()
    }

    /// Rounds `mantissa · 2^exponent` to `bits` significand bits.
    fn rounded(mantissa: BigInt, exponent: i64, bits: u32) -> Self {
        if mantissa.is_zero() {
            return Self::zero(Precision { bits });
        }
        let length = mantissa.bits();
        if length <= bits as u64 {
            return Self {
                mantissa,
                exponent,
                bits,
                nan: false,
            };
        }
        let shift = length - bits as u64;
        let sign = mantissa.sign();
        let magnitude = mantissa.magnitude();
        let round_up = (magnitude >> (shift - 1)).is_odd();
        let mut kept: BigUint = magnitude >> shift;
        let mut exponent = exponent + shift as i64;
        if round_up {
            kept += 1u32;
            if kept.bits() > bits as u64 {
                kept >>= 1u32;
                exponent += 1;
            }
        }
        Self {
            mantissa: BigInt::from_biguint(sign, kept),
            exponent,
            bits,
            nan: false,
        }
    }

    /// Position one past the most significant bit, i.e. `|self| < 2^top`.
    fn top(&self) -> i64 {
        self.exponent + self.mantissa.bits() as i64
    }

    fn add_values(lhs: &Self, rhs: &Self) -> Self {
        let bits = lhs.bits.max(rhs.bits);
        if lhs.nan || rhs.nan {
            return Self::nan(Precision { bits });
        }
        if rhs.mantissa.is_zero() {
            return Self::rounded(lhs.mantissa.clone(), lhs.exponent, bits);
        }
        if lhs.mantissa.is_zero() {
            return Self::rounded(rhs.mantissa.clone(), rhs.exponent, bits);
        }
        // The smaller operand cannot reach the rounding position.
        let gap = bits as i64 + 2;
        if lhs.top() - rhs.top() > gap {
            return Self::rounded(lhs.mantissa.clone(), lhs.exponent, bits);
        }
        if rhs.top() - lhs.top() > gap {
            return Self::rounded(rhs.mantissa.clone(), rhs.exponent, bits);
        }
        let exponent = lhs.exponent.min(rhs.exponent);
        let a = &lhs.mantissa << ((lhs.exponent - exponent) as u64);
        let b = &rhs.mantissa << ((rhs.exponent - exponent) as u64);
        Self::rounded(a + b, exponent, bits)
    }

    fn mul_values(lhs: &Self, rhs: &Self) -> Self {
        let bits = lhs.bits.max(rhs.bits);
        if lhs.nan || rhs.nan {
            return Self::nan(Precision { bits });
        }
        Self::rounded(
            &lhs.mantissa * &rhs.mantissa,
            lhs.exponent + rhs.exponent,
            bits,
        )
    }

    fn div_values(lhs: &Self, rhs: &Self) -> Self {
        let bits = lhs.bits.max(rhs.bits);
        if lhs.nan || rhs.nan || rhs.mantissa.is_zero() {
            return Self::nan(Precision { bits });
        }
        if lhs.mantissa.is_zero() {
            return Self::zero(Precision { bits });
        }
        let shift = (bits as i64 + 2 + rhs.mantissa.bits() as i64 - lhs.mantissa.bits() as i64)
            .max(0);
        let quotient = (&lhs.mantissa << (shift as u64)) / &rhs.mantissa;
        Self::rounded(quotient, lhs.exponent - shift - rhs.exponent, bits)
    }

    fn neg_value(&self) -> Self {
        Self {
            mantissa: -self.mantissa.clone(),
            exponent: self.exponent,
            bits: self.bits,
            nan: self.nan,
        }
    }

    fn sqrt_value(&self) -> Self {
        let precision = self.precision();
        if self.nan || self.mantissa.sign() == Sign::Minus {
            return Self::nan(precision);
        }
        if self.mantissa.is_zero() {
            return Self::zero(precision);
        }
        let mut shift = (2 * self.bits as i64 + 2 - self.mantissa.bits() as i64).max(0);
        if (self.exponent - shift).rem_euclid(2) != 0 {
            shift += 1;
        }
        let scaled = self.mantissa.magnitude() << (shift as u64);
        let root = scaled.sqrt();
        Self::rounded(
            BigInt::from_biguint(Sign::Plus, root),
            (self.exponent - shift).div_euclid(2),
            self.bits,
        )
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        if self.nan || other.nan {
            return None;
        }
        let difference = Self::add_values(self, &other.neg_value());
        Some(match difference.mantissa.sign() {
            Sign::Minus => Ordering::Less,
            Sign::NoSign => Ordering::Equal,
            Sign::Plus => Ordering::Greater,
        })
    }

    pub fn to_f64(&self) -> f64 {
        if self.nan {
            return f64::NAN;
        }
        if self.mantissa.is_zero() {
            return 0.0;
        }
        let length = self.mantissa.bits();
        let (head, exponent) = if length > 64 {
            let drop = length - 64;
            (self.mantissa.magnitude() >> drop, self.exponent + drop as i64)
        } else {
            (self.mantissa.magnitude().clone(), self.exponent)
        };
        let magnitude = head.to_f64().unwrap_or(f64::NAN);
        let value = scale_by_pow2(magnitude, exponent);
        if self.mantissa.sign() == Sign::Minus {
            -value
        } else {
            value
        }
    }
}

impl fmt::Debug for BigFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BigFloat({:e}, {} bits)", self.to_f64(), self.bits)
    }
}

impl fmt::Display for BigFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:e}", self.to_f64())
    }
}

impl PartialEq for BigFloat {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for BigFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

impl Add for BigFloat {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::add_values(&self, &rhs)
    }
}

impl Sub for BigFloat {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::add_values(&self, &rhs.neg_value())
    }
}

impl Mul for BigFloat {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::mul_values(&self, &rhs)
    }
}

impl Div for BigFloat {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self::div_values(&self, &rhs)
    }
}

impl Neg for BigFloat {
    type Output = Self;
    fn neg(self) -> Self {
        self.neg_value()
    }
}

impl<'a> Add<&'a BigFloat> for &'a BigFloat {
    type Output = BigFloat;
    fn add(self, rhs: &'a BigFloat) -> BigFloat {
        BigFloat::add_values(self, rhs)
    }
}

impl<'a> Mul<&'a BigFloat> for &'a BigFloat {
    type Output = BigFloat;
    fn mul(self, rhs: &'a BigFloat) -> BigFloat {
        BigFloat::mul_values(self, rhs)
    }
}

impl ExtendedScalar for BigFloat {
    fn from_f64(value: f64, precision: Precision) -> Self {
        BigFloat::from_f64(value, precision)
    }

    fn to_f64(&self) -> f64 {
        BigFloat::to_f64(self)
    }

    fn sqrt(&self) -> Self {
        self.sqrt_value()
    }

    fn abs(&self) -> Self {
        if self.mantissa.sign() == Sign::Minus {
            self.neg_value()
        } else {
            self.clone()
        }
    }

    fn is_zero(&self) -> bool {
        self.is_exact_zero()
    }

    fn is_finite(&self) -> bool {
        !self.nan
    }

    fn effective_precision(requested: Precision) -> Precision {
        Precision {
            bits: requested.bits.max(2),
        }
    }

    fn pow2(exponent: i64, precision: Precision) -> Self {
        Self::rounded(BigInt::one(), exponent, precision.bits.max(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: Precision = Precision { bits: 200 };

    fn big(value: f64) -> BigFloat {
        BigFloat::from_f64(value, P)
    }

    #[test]
    fn round_trips_doubles_exactly() {
        for value in [1.0, -2.5, 0.1, 1e-300, 6.02e23, -7.0 / 3.0] {
            assert_eq!(big(value).to_f64(), value);
        }
        assert_eq!(big(0.0).to_f64(), 0.0);
        assert!(big(f64::NAN).is_nan());
    }

    #[test]
    fn arithmetic_matches_exact_values() {
        assert_eq!((big(1.5) + big(2.25)).to_f64(), 3.75);
        assert_eq!((big(1.5) - big(2.25)).to_f64(), -0.75);
        assert_eq!((big(-3.0) * big(0.5)).to_f64(), -1.5);
        assert_eq!((big(1.0) / big(8.0)).to_f64(), 0.125);
        assert_eq!(big(9.0).sqrt_value().to_f64(), 3.0);
    }

    #[test]
    fn keeps_digits_that_doubles_lose() {
        // (1 + 2^-80) - 1 vanishes in f64 but not at 200 bits.
        let tiny = big(2f64.powi(-80));
        let sum = big(1.0) + tiny.clone();
        let recovered = sum - big(1.0);
        assert_eq!(recovered, tiny);
        assert_eq!(1.0 + 2f64.powi(-80) - 1.0, 0.0);
    }

    #[test]
    fn one_third_times_three_is_one_to_working_precision() {
        let third = big(1.0) / big(3.0);
        let error = (third * big(3.0) - big(1.0)).abs();
        assert!(error.to_f64() < 2f64.powi(-190));
    }

    #[test]
    fn sqrt_two_squares_back() {
        let root = big(2.0).sqrt_value();
        let error = (root.clone() * root - big(2.0)).abs();
        assert!(error.to_f64() < 2f64.powi(-190));
        assert!((big(2.0).sqrt_value().to_f64() - std::f64::consts::SQRT_2).abs() < 1e-16);
    }

    #[test]
    fn rounding_to_fewer_bits_matches_f32_style_rounding() {
        let coarse = BigFloat::from_f64(1.0 + 2f64.powi(-30), Precision::bits(24));
        assert_eq!(coarse.to_f64(), 1.0);
        let up = BigFloat::from_f64(1.0 + 2f64.powi(-23) + 2f64.powi(-24), Precision::bits(24));
        assert_eq!(up.to_f64(), 1.0 + 2f64.powi(-22));
    }

    #[test]
    fn ordering_and_nan_semantics() {
        assert!(big(1.0) < big(2.0));
        assert!(big(-1.0) < big(0.0));
        assert_eq!(big(0.5), big(0.5));
        let nan = big(1.0) / big(0.0);
        assert!(nan.is_nan());
        assert!(nan.partial_cmp(&big(1.0)).is_none());
        assert!(big(-4.0).sqrt_value().is_nan());
        assert!((nan + big(1.0)).is_nan());
    }

    #[test]
    fn mixed_precision_promotes_to_the_wider_operand() {
        let narrow = BigFloat::from_f64(1.0, Precision::bits(64));
        let wide = BigFloat::from_f64(1.0, Precision::bits(300));
        assert_eq!((narrow * wide).precision(), Precision::bits(300));
    }
}
