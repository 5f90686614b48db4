use crate::basis::{enumerate_terms, Basis, DegreeSpec, MonomialSupport, MultiIndex};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::quadrature::TensorQuadrature;
use crate::traits::Objective;
use std::sync::Arc;

/// Sampled objective values on a caller-supplied grid (physical coordinates).
///
/// Shared read-only between the fitted polynomial and everything derived
/// from it, so the re-optimizer always sees the original data.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    dim: usize,
    points: Vec<f64>,
    values: Vec<f64>,
}

impl SampleSet {
    pub fn new(dim: usize, points: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if dim == 0 {
            return Err(Error::DimensionMismatch {
                context: "sample dimension",
                expected: 1,
                found: 0,
            });
        }
        if points.len() != dim * values.len() {
            return Err(Error::DimensionMismatch {
                context: "sample point storage",
                expected: dim * values.len(),
                found: points.len(),
            });
        }
        if points.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFiniteInput("sample points"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFiniteInput("sample values"));
        }
        Ok(Self {
            dim,
            points,
            values,
        })
    }

    pub fn from_points(points: &[Vec<f64>], values: Vec<f64>) -> Result<Self> {
        let dim = points.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = points.iter().find(|p| p.len() != dim) {
            return Err(Error::DimensionMismatch {
                context: "sample point",
                expected: dim,
                found: bad.len(),
            });
        }
        Self::new(dim, points.concat(), values)
    }

    /// Evaluates `objective` on the given grid.
    pub fn from_objective<F>(objective: &F, points: &[Vec<f64>]) -> Result<Self>
    where
        F: Objective<f64>,
    {
        let values = points.iter().map(|p| objective.value(p)).collect();
        Self::from_points(points, values)
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn point(&self, index: usize) -> &[f64] {
        &self.points[index * self.dim..(index + 1) * self.dim]
    }

    pub fn points(&self) -> impl Iterator<Item = &[f64]> {
        self.points.chunks(self.dim)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// A polynomial surrogate together with the data it was fitted to.
///
/// Immutable once constructed: conversion and re-optimization produce new
/// polynomials so the original stays available for quality comparisons.
#[derive(Debug, Clone)]
pub struct Polynomial {
    basis: Basis,
    degree: DegreeSpec,
    terms: Vec<MultiIndex>,
    coefficients: Vec<f64>,
    domain: Domain,
    samples: Arc<SampleSet>,
}

impl Polynomial {
    /// Assembles a polynomial, checking that the coefficients match the
    /// basis support and the term ordering matches the basis.
    pub fn new(
        basis: Basis,
        degree: DegreeSpec,
        terms: Vec<MultiIndex>,
        coefficients: Vec<f64>,
        domain: Domain,
        samples: Arc<SampleSet>,
    ) -> Result<Self> {
        let dim = domain.dimension();
        if samples.dimension() != dim {
            return Err(Error::DimensionMismatch {
                context: "sample dimension vs domain",
                expected: dim,
                found: samples.dimension(),
            });
        }
        let support = basis.support_size(&degree, dim)?;
        if coefficients.len() != support {
            return Err(Error::DimensionMismatch {
                context: "coefficient count vs basis support",
                expected: support,
                found: coefficients.len(),
            });
        }
        if terms.len() != support {
            return Err(Error::DimensionMismatch {
                context: "term count vs basis support",
                expected: support,
                found: terms.len(),
            });
        }
        if let Some(bad) = terms.iter().find(|t| t.dimension() != dim) {
            return Err(Error::DimensionMismatch {
                context: "term dimension",
                expected: dim,
                found: bad.dimension(),
            });
        }
        match &basis {
            Basis::Monomial(MonomialSupport::Sparse(active)) => {
                if *active != terms {
                    return Err(Error::PatternMismatch {
                        pattern_terms: active.len(),
                        polynomial_terms: terms.len(),
                    });
                }
            }
            _ => {
                if terms != enumerate_terms(dim, &degree)? {
                    return Err(Error::PatternMismatch {
                        pattern_terms: support,
                        polynomial_terms: terms.len(),
                    });
                }
            }
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(Error::NonFiniteInput("polynomial coefficients"));
        }
        Ok(Self {
            basis,
            degree,
            terms,
            coefficients,
            domain,
            samples,
        })
    }

    pub fn basis(&self) -> &Basis {
        &self.basis
    }

    pub fn degree(&self) -> &DegreeSpec {
        &self.degree
    }

    pub fn terms(&self) -> &[MultiIndex] {
        &self.terms
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn samples(&self) -> &Arc<SampleSet> {
        &self.samples
    }

    pub fn dimension(&self) -> usize {
        self.domain.dimension()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Largest exponent used in each dimension.
    pub fn max_exponents(&self) -> Vec<u32> {
        let mut maxima = vec![0u32; self.dimension()];
        for term in &self.terms {
            for (axis, &e) in term.exponents().iter().enumerate() {
                maxima[axis] = maxima[axis].max(e);
            }
        }
        maxima
    }

    /// Value at a physical point.
    pub fn evaluate(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.dimension() {
            return Err(Error::DimensionMismatch {
                context: "evaluation point",
                expected: self.dimension(),
                found: x.len(),
            });
        }
        Ok(self.value_at(&self.domain.to_normalized(x)))
    }

    /// Value at a point of the reference box [-1, 1]ⁿ.
    pub fn evaluate_normalized(&self, u: &[f64]) -> Result<f64> {
        if u.len() != self.dimension() {
            return Err(Error::DimensionMismatch {
                context: "normalized evaluation point",
                expected: self.dimension(),
                found: u.len(),
            });
        }
        Ok(self.value_at(u))
    }

    /// `u` must have one coordinate per dimension.
    fn value_at(&self, u: &[f64]) -> f64 {
        let maxima = self.max_exponents();
        // tables[axis][k] = k-th univariate basis element at u[axis]
        let tables: Vec<Vec<f64>> = maxima
            .iter()
            .zip(u)
            .map(|(&max, &ui)| match &self.basis {
                Basis::Orthogonal { family, normalized } => {
                    family.evaluate_all(max, ui, *normalized)
                }
                Basis::Monomial(_) => {
                    let mut powers = Vec::with_capacity(max as usize + 1);
                    let mut p = 1.0;
                    for _ in 0..=max {
                        powers.push(p);
                        p *= ui;
                    }
                    powers
                }
            })
            .collect();

        self.terms
            .iter()
            .zip(&self.coefficients)
            .map(|(term, c)| {
                term.exponents()
                    .iter()
                    .enumerate()
                    .fold(*c, |acc, (axis, &e)| acc * tables[axis][e as usize])
            })
            .sum()
    }

    /// L2 norm over the physical domain, `(∫ p(x)² dx)^½`.
    ///
    /// Tensor Gauss–Legendre with `max exponent + 1` nodes per axis, which is
    /// exact for `p²` up to rounding regardless of the basis.
    pub fn l2_norm(&self) -> f64 {
        let nodes: Vec<usize> = self
            .max_exponents()
            .iter()
            .map(|&e| e as usize + 1)
            .collect();
        let rule = TensorQuadrature::new(&nodes);
        let integral = rule.integrate(|u| {
            let value = self.value_at(u);
            value * value
        });
        (integral.max(0.0) * self.domain.jacobian()).sqrt()
    }

    /// Parseval norm `(Σ cₐ² Π ‖φ_{aᵢ}‖²)^½` under the family's own weight.
    ///
    /// Only meaningful for orthogonal bases; the monomial basis has no such
    /// shortcut and is rejected.
    pub fn weighted_norm(&self) -> Result<f64> {
        let (family, normalized) = match &self.basis {
            Basis::Orthogonal { family, normalized } => (*family, *normalized),
            Basis::Monomial(_) => return Err(Error::NotOrthogonal("weighted_norm")),
        };
        let sum: f64 = self
            .terms
            .iter()
            .zip(&self.coefficients)
            .map(|(term, c)| {
                let element: f64 = term
                    .exponents()
                    .iter()
                    .map(|&k| {
                        if normalized {
                            1.0
                        } else {
                            family.norm_squared(k)
                        }
                    })
                    .product();
                c * c * element
            })
            .sum();
        Ok(sum.sqrt())
    }

    /// `‖p(xᵢ) − yᵢ‖₂` over the attached samples.
    pub fn grid_residual_norm(&self) -> f64 {
        self.samples
            .points()
            .zip(self.samples.values())
            .map(|(x, y)| {
                let r = self.value_at(&self.domain.to_normalized(x)) - y;
                r * r
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Largest coefficient magnitude.
    pub fn max_abs_coefficient(&self) -> f64 {
        self.coefficients
            .iter()
            .fold(0.0f64, |acc, c| acc.max(c.abs()))
    }
}
