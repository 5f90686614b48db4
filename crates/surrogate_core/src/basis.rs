//! Polynomial bases and term orderings.
//!
//! A [`Basis`] is a closed set of variants: orthogonal families used for the
//! well-conditioned fit, and the monomial basis the fit is expanded into.
//! Every basis is expressed in normalized coordinates `u ∈ [-1, 1]ⁿ`; the
//! mapping from physical coordinates lives in [`crate::domain::Domain`].

use crate::error::{Error, Result};
use crate::precision::{ExtendedScalar, Precision};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Exponent vector of one tensor-product term, one entry per dimension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MultiIndex(pub Vec<u32>);

impl MultiIndex {
    pub fn new(exponents: Vec<u32>) -> Self {
        Self(exponents)
    }

    pub fn exponents(&self) -> &[u32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn total_degree(&self) -> u32 {
        self.0.iter().sum()
    }

    pub fn max_exponent(&self) -> u32 {
        self.0.iter().copied().max().unwrap_or(0)
    }
}

impl fmt::Display for MultiIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, ")")
    }
}

/// Degree of a multivariate polynomial space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegreeSpec {
    /// All terms with `Σ αᵢ ≤ d`.
    Total(u32),
    /// Tensor space with `αᵢ ≤ dᵢ` per dimension.
    PerDimension(Vec<u32>),
}

impl DegreeSpec {
    /// Largest exponent any term can carry in dimension `axis`.
    pub fn max_exponent(&self, axis: usize) -> u32 {
        match self {
            DegreeSpec::Total(d) => *d,
            DegreeSpec::PerDimension(ds) => ds.get(axis).copied().unwrap_or(0),
        }
    }

    fn check_dimension(&self, dim: usize) -> Result<()> {
        if dim == 0 {
            return Err(Error::DimensionMismatch {
                context: "polynomial dimension",
                expected: 1,
                found: 0,
            });
        }
        if let DegreeSpec::PerDimension(ds) = self {
            if ds.len() != dim {
                return Err(Error::DimensionMismatch {
                    context: "per-dimension degree",
                    expected: dim,
                    found: ds.len(),
                });
            }
        }
        Ok(())
    }
}

/// Canonical term ordering of a degree space.
///
/// Total-degree spaces are graded (ascending total degree, then descending
/// lexicographic within a grade, so `x` precedes `y`). Tensor spaces are
/// lexicographic with the last dimension varying fastest.
pub fn enumerate_terms(dim: usize, degree: &DegreeSpec) -> Result<Vec<MultiIndex>> {
    degree.check_dimension(dim)?;
    let mut terms = Vec::new();
    match degree {
        DegreeSpec::Total(d) => {
            for grade in 0..=*d {
                let mut current = vec![0u32; dim];
                compositions(grade, 0, &mut current, &mut terms);
            }
        }
        DegreeSpec::PerDimension(ds) => {
            let mut current = vec![0u32; dim];
            loop {
                terms.push(MultiIndex(current.clone()));
                let mut axis = dim;
                loop {
                    if axis == 0 {
                        return Ok(terms);
                    }
                    axis -= 1;
                    if current[axis] < ds[axis] {
                        current[axis] += 1;
                        break;
                    }
                    current[axis] = 0;
                }
            }
        }
    }
    Ok(terms)
}

fn compositions(remaining: u32, axis: usize, current: &mut Vec<u32>, out: &mut Vec<MultiIndex>) {
    let dim = current.len();
    if axis == dim - 1 {
        current[axis] = remaining;
        out.push(MultiIndex(current.clone()));
        current[axis] = 0;
        return;
    }
    for take in (0..=remaining).rev() {
        current[axis] = take;
        compositions(remaining - take, axis + 1, current, out);
    }
    current[axis] = 0;
}

fn binomial(n: u64, k: u64) -> u64 {
    let k = k.min(n - k);
    (0..k).fold(1u64, |acc, i| acc * (n - i) / (i + 1))
}

/// Orthogonal polynomial families on [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrthogonalFamily {
    /// First kind, weight `(1 - u²)^(-1/2)`.
    Chebyshev,
    /// Unit weight.
    Legendre,
}

impl OrthogonalFamily {
    /// Weighted norm `‖φₖ‖²` of the unnormalized k-th element.
    pub fn norm_squared(self, k: u32) -> f64 {
        match self {
            OrthogonalFamily::Chebyshev => {
                if k == 0 {
                    PI
                } else {
                    PI / 2.0
                }
            }
            OrthogonalFamily::Legendre => 2.0 / (2.0 * k as f64 + 1.0),
        }
    }

    /// Scale applied to the k-th element; makes the family orthonormal when `normalized`.
    pub fn scale(self, k: u32, normalized: bool) -> f64 {
        if normalized {
            1.0 / self.norm_squared(k).sqrt()
        } else {
            1.0
        }
    }

    /// Values `φ₀(u) … φ_max(u)` by the three-term recurrence.
    pub fn evaluate_all(self, max_degree: u32, u: f64, normalized: bool) -> Vec<f64> {
        let len = max_degree as usize + 1;
        let mut values = Vec::with_capacity(len);
        values.push(1.0);
        if len > 1 {
            values.push(u);
        }
        for k in 1..(len.saturating_sub(1)) {
            let next = match self {
                OrthogonalFamily::Chebyshev => 2.0 * u * values[k] - values[k - 1],
                OrthogonalFamily::Legendre => {
                    let kf = k as f64;
                    ((2.0 * kf + 1.0) * u * values[k] - kf * values[k - 1]) / (kf + 1.0)
                }
            };
            values.push(next);
        }
        if normalized {
            for (k, value) in values.iter_mut().enumerate() {
                *value *= self.scale(k as u32, true);
            }
        }
        values
    }

    /// Power-basis coefficients of `φ₀ … φ_max`: row k holds the
    /// coefficients of `u⁰ … uᵏ`.
    ///
    /// Built with the same recurrences as [`Self::evaluate_all`], carried out
    /// in `S`; the Chebyshev rows are integers and exact at any precision.
    pub fn monomial_expansion<S: ExtendedScalar>(
        self,
        max_degree: u32,
        normalized: bool,
        precision: Precision,
    ) -> Vec<Vec<S>> {
        let zero = S::zero(precision);
        let mut rows: Vec<Vec<S>> = Vec::with_capacity(max_degree as usize + 1);
        rows.push(vec![S::one(precision)]);
        if max_degree >= 1 {
            rows.push(vec![zero.clone(), S::one(precision)]);
        }
        for k in 1..max_degree as usize {
            let mut next = vec![zero.clone(); k + 2];
            let (lead, trail) = match self {
                OrthogonalFamily::Chebyshev => (
                    S::from_f64(2.0, precision),
                    S::one(precision),
                ),
                OrthogonalFamily::Legendre => {
                    let denom = S::from_f64(k as f64 + 1.0, precision);
                    (
                        S::from_f64(2.0 * k as f64 + 1.0, precision) / denom.clone(),
                        S::from_f64(k as f64, precision) / denom,
                    )
                }
            };
            for (i, c) in rows[k].iter().enumerate() {
                next[i + 1] = next[i + 1].clone() + lead.clone() * c.clone();
            }
            for (i, c) in rows[k - 1].iter().enumerate() {
                next[i] = next[i].clone() - trail.clone() * c.clone();
            }
            rows.push(next);
        }
        if normalized {
            for (k, row) in rows.iter_mut().enumerate() {
                let factor = self.scale_in::<S>(k as u32, precision);
                for c in row.iter_mut() {
                    *c = c.clone() * factor.clone();
                }
            }
        }
        rows
    }

    fn scale_in<S: ExtendedScalar>(self, k: u32, precision: Precision) -> S {
        match self {
            OrthogonalFamily::Chebyshev => {
                let numerator = if k == 0 { 1.0 } else { 2.0 };
                (S::from_f64(numerator, precision) / S::from_f64(PI, precision)).sqrt()
            }
            OrthogonalFamily::Legendre => {
                (S::from_f64(2.0 * k as f64 + 1.0, precision) / S::from_f64(2.0, precision))
                    .sqrt()
            }
        }
    }
}

/// Active term set of a monomial polynomial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MonomialSupport {
    /// Every term of the degree space.
    Dense,
    /// Only the listed terms, in the order of the parent expansion.
    Sparse(Vec<MultiIndex>),
}

/// Basis a polynomial's coefficients refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Basis {
    Orthogonal {
        family: OrthogonalFamily,
        normalized: bool,
    },
    Monomial(MonomialSupport),
}

impl Basis {
    pub fn chebyshev(normalized: bool) -> Self {
        Basis::Orthogonal {
            family: OrthogonalFamily::Chebyshev,
            normalized,
        }
    }

    pub fn legendre(normalized: bool) -> Self {
        Basis::Orthogonal {
            family: OrthogonalFamily::Legendre,
            normalized,
        }
    }

    /// Parses a configuration name. There is no fallback family.
    pub fn from_name(name: &str, normalized: bool) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "chebyshev" => Ok(Self::chebyshev(normalized)),
            "legendre" => Ok(Self::legendre(normalized)),
            "monomial" => Ok(Basis::Monomial(MonomialSupport::Dense)),
            _ => Err(Error::UnknownBasis(name.to_string())),
        }
    }

    pub fn is_orthogonal(&self) -> bool {
        matches!(self, Basis::Orthogonal { .. })
    }

    pub fn is_normalized(&self) -> bool {
        match self {
            Basis::Orthogonal { normalized, .. } => *normalized,
            Basis::Monomial(_) => false,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Basis::Monomial(MonomialSupport::Sparse(_)))
    }

    /// Number of basis elements spanning the space of `degree` in `dim` variables.
    pub fn support_size(&self, degree: &DegreeSpec, dim: usize) -> Result<usize> {
        degree.check_dimension(dim)?;
        if let Basis::Monomial(MonomialSupport::Sparse(active)) = self {
            return Ok(active.len());
        }
        let count = match degree {
            DegreeSpec::Total(d) => binomial(*d as u64 + dim as u64, dim as u64),
            DegreeSpec::PerDimension(ds) => ds.iter().map(|d| *d as u64 + 1).product(),
        };
        Ok(count as usize)
    }
}
