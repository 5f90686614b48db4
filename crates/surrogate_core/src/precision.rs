//! Numeric precision abstraction for the extended-precision solves.
//!
//! The re-optimizer and the generic dense algebra in [`crate::linalg`] are
//! written against [`ExtendedScalar`], so callers pick the arithmetic at the
//! call site: `f64` for a quick double-precision pass, [`BigFloat`] with a
//! runtime number of significand bits when the monomial system is too
//! ill-conditioned for doubles.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

mod bigfloat;
pub use bigfloat::BigFloat;

/// Number of significand bits carried by an extended-precision value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Precision {
    pub bits: u32,
}

impl Precision {
    /// IEEE-754 binary64.
    pub const DOUBLE: Precision = Precision { bits: 53 };
    /// Smallest precision accepted by the settings validators.
    pub const MIN_BITS: u32 = 24;

    pub fn bits(bits: u32) -> Self {
        Self { bits }
    }

    /// The next escalation step. Retrying at higher precision is a caller
    /// decision; nothing in this crate escalates on its own.
    pub fn doubled(self) -> Self {
        Self {
            bits: self.bits.saturating_mul(2),
        }
    }

    /// Unit roundoff 2^(1 - bits), built exactly in `S`.
    pub fn epsilon<S: ExtendedScalar>(self) -> S {
        S::pow2(1 - self.bits as i64, self)
    }

    /// Default relative pivot tolerance for rank decisions, 2^(-3·bits/4).
    ///
    /// Loose enough that a mathematically dependent column (pivot at the
    /// roundoff level) is always flagged, tight enough that a Gram matrix
    /// with condition ~10^12 still passes at 128 bits and above. Built in
    /// `S` so it stays nonzero at any bit count.
    pub fn rank_tolerance<S: ExtendedScalar>(self) -> S {
        S::pow2(-((self.bits as i64 * 3) / 4), self)
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self { bits: 256 }
    }
}

/// Arithmetic required by the extended-precision linear algebra.
///
/// Values are created from doubles with an explicit [`Precision`]; binary
/// operations on mixed precisions produce the larger of the two.
pub trait ExtendedScalar:
    Clone
    + Debug
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn from_f64(value: f64, precision: Precision) -> Self;

    /// Nearest double (NaN for values that cannot be represented as a number).
    fn to_f64(&self) -> f64;

    fn sqrt(&self) -> Self;

    fn abs(&self) -> Self;

    fn is_zero(&self) -> bool;

    fn is_finite(&self) -> bool;

    /// The precision this type actually computes with when `requested` is asked for.
    fn effective_precision(requested: Precision) -> Precision;

    /// Exact power of two. `f64` saturates to 0 or infinity outside its range.
    fn pow2(exponent: i64, precision: Precision) -> Self;

    fn zero(precision: Precision) -> Self {
        Self::from_f64(0.0, precision)
    }

    fn one(precision: Precision) -> Self {
        Self::from_f64(1.0, precision)
    }
}

impl ExtendedScalar for f64 {
    fn from_f64(value: f64, _precision: Precision) -> Self {
        value
    }

    fn to_f64(&self) -> f64 {
        *self
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    fn abs(&self) -> Self {
        f64::abs(*self)
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }

    fn is_finite(&self) -> bool {
        f64::is_finite(*self)
    }

    fn effective_precision(_requested: Precision) -> Precision {
        Precision::DOUBLE
    }

    fn pow2(exponent: i64, _precision: Precision) -> Self {
        scale_by_pow2(1.0, exponent)
    }
}

/// value · 2^exponent without overflowing the intermediate power.
pub(crate) fn scale_by_pow2(value: f64, exponent: i64) -> f64 {
    let mut result = value;
    let mut remaining = exponent;
    while remaining > 1000 {
        result *= 2f64.powi(1000);
        remaining -= 1000;
        if result.is_infinite() {
            return result;
        }
    }
    while remaining < -1000 {
        result *= 2f64.powi(-1000);
        remaining += 1000;
        if result == 0.0 {
            return result;
        }
    }
    result * 2f64.powi(remaining as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubling_escalates_bits() {
        assert_eq!(Precision::bits(128).doubled(), Precision::bits(256));
        assert_eq!(Precision::bits(u32::MAX).doubled().bits, u32::MAX);
    }

    #[test]
    fn epsilon_matches_f64_at_double_precision() {
        assert_eq!(Precision::DOUBLE.epsilon::<f64>(), f64::EPSILON);
    }

    #[test]
    fn rank_tolerance_shrinks_with_precision() {
        let low: f64 = Precision::bits(64).rank_tolerance();
        let high: f64 = Precision::bits(256).rank_tolerance();
        assert!(high < low);
        assert_eq!(low, 2f64.powi(-48));
    }

    #[test]
    fn tolerances_stay_positive_past_the_double_range() {
        let precision = Precision::bits(2048);
        let epsilon: BigFloat = precision.epsilon();
        let tolerance: BigFloat = precision.rank_tolerance();
        let zero = BigFloat::zero(precision);
        assert!(epsilon > zero);
        assert!(tolerance > zero);
        assert!(epsilon < tolerance);
        // Doubles cannot represent either value.
        assert_eq!(epsilon.to_f64(), 0.0);
        assert_eq!(tolerance.to_f64(), 0.0);
        let doubled = tolerance.clone() + tolerance.clone();
        assert_eq!(doubled / tolerance, BigFloat::from_f64(2.0, precision));
    }

    #[test]
    fn f64_reports_double_precision() {
        assert_eq!(
            <f64 as ExtendedScalar>::effective_precision(Precision::bits(512)),
            Precision::DOUBLE
        );
    }

    #[test]
    fn scale_by_pow2_handles_extreme_exponents() {
        assert_eq!(scale_by_pow2(1.5, 3), 12.0);
        assert_eq!(<f64 as ExtendedScalar>::pow2(-1074, Precision::DOUBLE), f64::from_bits(1));
        assert_eq!(scale_by_pow2(1.0, -5000), 0.0);
        assert!(scale_by_pow2(1.0, 5000).is_infinite());
    }
}
