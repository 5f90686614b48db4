use crate::traits::Objective;
use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Hyper-dual number for second-order forward mode AD.
/// val: real part
/// e1, e2: independent infinitesimal parts (ε₁² = ε₂² = 0)
/// e12: the mixed ε₁ε₂ part, which carries second derivatives
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct HyperDual {
    pub val: f64,
    pub e1: f64,
    pub e2: f64,
    pub e12: f64,
}

impl HyperDual {
    pub fn new(val: f64, e1: f64, e2: f64, e12: f64) -> Self {
        Self { val, e1, e2, e12 }
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0, 0.0, 0.0)
    }

    /// Applies a scalar function given its value and first two derivatives at `val`.
    fn chain(self, f0: f64, f1: f64, f2: f64) -> Self {
        Self::new(
            f0,
            f1 * self.e1,
            f1 * self.e2,
            f1 * self.e12 + f2 * self.e1 * self.e2,
        )
    }

    /// Derivative parts only meaningful when finite.
    pub fn is_differentiable(&self) -> bool {
        self.val.is_finite() && self.e1.is_finite() && self.e2.is_finite() && self.e12.is_finite()
    }
}

impl Zero for HyperDual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.e1 == 0.0 && self.e2 == 0.0 && self.e12 == 0.0
    }
}

impl One for HyperDual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for HyperDual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.val + rhs.val,
            self.e1 + rhs.e1,
            self.e2 + rhs.e2,
            self.e12 + rhs.e12,
        )
    }
}

impl Sub for HyperDual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.val - rhs.val,
            self.e1 - rhs.e1,
            self.e2 - rhs.e2,
            self.e12 - rhs.e12,
        )
    }
}

impl Mul for HyperDual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.val * rhs.val,
            self.val * rhs.e1 + self.e1 * rhs.val,
            self.val * rhs.e2 + self.e2 * rhs.val,
            self.val * rhs.e12 + self.e1 * rhs.e2 + self.e2 * rhs.e1 + self.e12 * rhs.val,
        )
    }
}

impl Div for HyperDual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        self * rhs.recip()
    }
}

impl Neg for HyperDual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.e1, -self.e2, -self.e12)
    }
}

impl Rem for HyperDual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // Locally x mod c = x - k·c with k constant.
        let k = (self.val / rhs.val).trunc();
        self - rhs * Self::constant(k)
    }
}

impl AddAssign for HyperDual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for HyperDual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for HyperDual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for HyperDual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl RemAssign for HyperDual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Num for HyperDual {
    type FromStrRadixErr = <f64 as Num>::FromStrRadixErr;
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(str, radix).map(Self::constant)
    }
}

impl ToPrimitive for HyperDual {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.val)
    }
}

impl FromPrimitive for HyperDual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for HyperDual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for HyperDual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::new(-0.0, -0.0, -0.0, -0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }
    fn is_nan(self) -> bool {
        self.val.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.val.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.val.is_finite()
    }
    fn is_normal(self) -> bool {
        self.val.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.val.classify()
    }
    fn floor(self) -> Self {
        Self::constant(self.val.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.val.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.val.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.val.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.val.fract(), self.e1, self.e2, self.e12)
    }
    fn abs(self) -> Self {
        // Not differentiable at zero: poison the derivative parts.
        if self.val > 0.0 {
            self
        } else if self.val < 0.0 {
            -self
        } else {
            self.chain(0.0, f64::NAN, f64::NAN)
        }
    }
    fn signum(self) -> Self {
        Self::constant(self.val.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.val.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.val.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        let r = 1.0 / self.val;
        self.chain(r, -r * r, 2.0 * r * r * r)
    }

    fn powi(self, n: i32) -> Self {
        let nf = n as f64;
        let f1 = if n == 0 { 0.0 } else { nf * self.val.powi(n - 1) };
        let f2 = if n == 0 || n == 1 {
            0.0
        } else {
            nf * (nf - 1.0) * self.val.powi(n - 2)
        };
        self.chain(self.val.powi(n), f1, f2)
    }

    fn powf(self, n: Self) -> Self {
        // x^y = exp(y * ln(x))
        (n * self.ln()).exp()
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        self.chain(s, 0.5 / s, -0.25 / (s * self.val))
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e, e)
    }

    fn exp2(self) -> Self {
        let e = self.val.exp2();
        let l = std::f64::consts::LN_2;
        self.chain(e, e * l, e * l * l)
    }
    fn ln(self) -> Self {
        let r = 1.0 / self.val;
        self.chain(self.val.ln(), r, -r * r)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        self.ln() / Self::constant(std::f64::consts::LN_2)
    }
    fn log10(self) -> Self {
        self.ln() / Self::constant(std::f64::consts::LN_10)
    }

    fn max(self, other: Self) -> Self {
        if self.val > other.val {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.val < other.val {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.val > other.val {
            self - other
        } else {
            Self::zero()
        }
    }

    fn cbrt(self) -> Self {
        let c = self.val.cbrt();
        let f1 = 1.0 / (3.0 * c * c);
        self.chain(c, f1, -2.0 * f1 / (3.0 * self.val))
    }
    fn hypot(self, other: Self) -> Self {
        (self * self + other * other).sqrt()
    }

    fn sin(self) -> Self {
        let (s, c) = self.val.sin_cos();
        self.chain(s, c, -s)
    }
    fn cos(self) -> Self {
        let (s, c) = self.val.sin_cos();
        self.chain(c, -s, -c)
    }
    fn tan(self) -> Self {
        let t = self.val.tan();
        let sec2 = 1.0 + t * t;
        self.chain(t, sec2, 2.0 * t * sec2)
    }
    fn asin(self) -> Self {
        let q = 1.0 - self.val * self.val;
        let f1 = 1.0 / q.sqrt();
        self.chain(self.val.asin(), f1, self.val * f1 / q)
    }
    fn acos(self) -> Self {
        let q = 1.0 - self.val * self.val;
        let f1 = -1.0 / q.sqrt();
        self.chain(self.val.acos(), f1, self.val * f1 / q)
    }
    fn atan(self) -> Self {
        let q = 1.0 + self.val * self.val;
        self.chain(self.val.atan(), 1.0 / q, -2.0 * self.val / (q * q))
    }
    fn atan2(self, other: Self) -> Self {
        // atan2(y, x) = atan(y / x) up to a locally constant branch offset.
        let offset = self.val.atan2(other.val) - (self.val / other.val).atan();
        (self / other).atan() + Self::constant(offset)
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        let e = self.val.exp();
        self.chain(self.val.exp_m1(), e, e)
    }
    fn ln_1p(self) -> Self {
        let r = 1.0 / (1.0 + self.val);
        self.chain(self.val.ln_1p(), r, -r * r)
    }
    fn sinh(self) -> Self {
        let (s, c) = (self.val.sinh(), self.val.cosh());
        self.chain(s, c, s)
    }
    fn cosh(self) -> Self {
        let (s, c) = (self.val.sinh(), self.val.cosh());
        self.chain(c, s, c)
    }
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        let sech2 = 1.0 - t * t;
        self.chain(t, sech2, -2.0 * t * sech2)
    }
    fn asinh(self) -> Self {
        let q = 1.0 + self.val * self.val;
        let f1 = 1.0 / q.sqrt();
        self.chain(self.val.asinh(), f1, -self.val * f1 / q)
    }
    fn acosh(self) -> Self {
        let q = self.val * self.val - 1.0;
        let f1 = 1.0 / q.sqrt();
        self.chain(self.val.acosh(), f1, -self.val * f1 / q)
    }
    fn atanh(self) -> Self {
        let q = 1.0 - self.val * self.val;
        self.chain(self.val.atanh(), 1.0 / q, 2.0 * self.val / (q * q))
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }
}

/// Value, gradient and Hessian (row-major) of an objective at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondOrder {
    pub value: f64,
    pub gradient: Vec<f64>,
    pub hessian: Vec<f64>,
}

/// Exact gradient and Hessian by seeding ε₁ along `eᵢ` and ε₂ along `eⱼ`.
///
/// Takes `n²` evaluations; the Hessian is not symmetrized here. Points
/// where the objective is not twice differentiable show up as non-finite
/// entries rather than errors.
pub fn gradient_and_hessian<F>(objective: &F, x: &[f64]) -> SecondOrder
where
    F: Objective<HyperDual> + ?Sized,
{
    let n = x.len();
    let mut gradient = vec![0.0; n];
    let mut hessian = vec![0.0; n * n];
    let mut value = f64::NAN;
    let mut point = vec![HyperDual::zero(); n];

    for i in 0..n {
        for j in 0..n {
            for (k, slot) in point.iter_mut().enumerate() {
                *slot = HyperDual::new(
                    x[k],
                    if k == i { 1.0 } else { 0.0 },
                    if k == j { 1.0 } else { 0.0 },
                    0.0,
                );
            }
            let out = objective.value(&point);
            hessian[i * n + j] = out.e12;
            if i == j {
                gradient[i] = out.e1;
                value = out.val;
            }
        }
    }

    SecondOrder {
        value,
        gradient,
        hessian,
    }
}
