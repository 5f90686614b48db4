//! Extended-precision least-squares re-fit over a retained monomial subset.
//!
//! Dropping small monomial coefficients outright throws away accuracy out of
//! proportion to their size, because the monomial system is badly
//! conditioned and the large coefficients were tuned to cancel the small
//! ones. Instead, the retained terms are re-fitted against the *original*
//! samples, with the design and Gram matrices assembled and factorized in
//! the caller's choice of [`ExtendedScalar`].

use crate::basis::{Basis, MonomialSupport, MultiIndex};
use crate::error::{Error, Result};
use crate::linalg::{householder_qr_solve, svd_solve, Matrix};
use crate::polynomial::Polynomial;
use crate::precision::{ExtendedScalar, Precision};
use crate::sparsify::SparsityPattern;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Householder QR of the Gram matrix.
    Qr,
    /// Truncated pseudo-inverse from a Jacobi SVD of the Gram matrix.
    Svd,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReoptimizeSettings {
    /// Significand bits requested for the solve. `f64` callers always get 53.
    pub precision: Precision,
    pub solver: SolverKind,
    /// Relative pivot/singular-value cutoff for rank decisions; defaults to
    /// [`Precision::rank_tolerance`] of the working precision.
    pub rank_tolerance: Option<f64>,
    /// L2 ratios below this value attach a [`QualityWarning`].
    pub quality_threshold: f64,
}

impl Default for ReoptimizeSettings {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            solver: SolverKind::Qr,
            rank_tolerance: None,
            quality_threshold: 0.95,
        }
    }
}

impl ReoptimizeSettings {
    pub fn validate(&self) -> Result<()> {
        if self.precision.bits < Precision::MIN_BITS {
            return Err(Error::InvalidSettings(format!(
                "precision must carry at least {} bits, got {}",
                Precision::MIN_BITS,
                self.precision.bits
            )));
        }
        if let Some(tol) = self.rank_tolerance {
            if !(tol > 0.0 && tol < 1.0) {
                return Err(Error::InvalidSettings(format!(
                    "rank_tolerance must lie in (0, 1), got {tol}"
                )));
            }
        }
        if !(self.quality_threshold > 0.0 && self.quality_threshold <= 1.0) {
            return Err(Error::InvalidSettings(format!(
                "quality_threshold must lie in (0, 1], got {}",
                self.quality_threshold
            )));
        }
        Ok(())
    }
}

/// Quality problems attached to an otherwise successful re-optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityWarning {
    #[error("L2-norm ratio {ratio:.6} is below the acceptable bound {threshold}")]
    Degradation { ratio: f64, threshold: f64 },
}

#[derive(Debug, Clone)]
pub struct ReoptimizationResult {
    /// Sparse monomial polynomial over the retained terms.
    pub polynomial: Polynomial,
    /// Condition estimate of the Gram system actually solved.
    pub condition_number: f64,
    /// Precision the arithmetic actually carried.
    pub precision: Precision,
    pub solver: SolverKind,
    /// `‖sparse‖_{L2(Ω)} / ‖original‖_{L2(Ω)}`.
    pub l2_ratio: f64,
    pub original_l2: f64,
    pub sparse_l2: f64,
    pub original_terms: usize,
    pub retained_terms: usize,
    pub grid_residual_norm: f64,
    pub warnings: Vec<QualityWarning>,
}

impl ReoptimizationResult {
    pub fn is_acceptable(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Re-fits the terms retained by `pattern` to the samples of `original`.
///
/// `monomial` is the dense monomial expansion the pattern was derived from;
/// only its term ordering is used. Linearly dependent retained terms fail
/// with [`Error::SparseSystemRankDeficient`]. A low L2 ratio is reported as
/// a warning on the result. Precision escalation is left to the caller
/// (see [`Precision::doubled`]).
pub fn reoptimize<S: ExtendedScalar>(
    original: &Polynomial,
    monomial: &Polynomial,
    pattern: &SparsityPattern,
    settings: &ReoptimizeSettings,
) -> Result<ReoptimizationResult> {
    settings.validate()?;
    if !matches!(monomial.basis(), Basis::Monomial(MonomialSupport::Dense)) {
        return Err(Error::NotMonomial("reoptimize"));
    }
    pattern.check_compatible(monomial)?;
    if original.dimension() != monomial.dimension() {
        return Err(Error::DimensionMismatch {
            context: "original vs monomial dimension",
            expected: original.dimension(),
            found: monomial.dimension(),
        });
    }

    let active = pattern.active_terms();
    if active.is_empty() {
        return Err(Error::EmptyPattern {
            total: pattern.len(),
        });
    }

    let precision = S::effective_precision(settings.precision);
    let samples = original.samples();
    let domain = original.domain();
    let rows = samples.len();
    let cols = active.len();

    let design = sparse_design::<S>(original, &active, precision);
    let values: Vec<S> = samples
        .values()
        .iter()
        .map(|&y| S::from_f64(y, precision))
        .collect();
    let gram = design.gram(precision);
    let rhs = design.transpose_mul(&values, precision);

    let tolerance = match settings.rank_tolerance {
        Some(tol) => S::from_f64(tol, precision),
        None => precision.rank_tolerance::<S>(),
    };
    let outcome = match settings.solver {
        SolverKind::Qr => householder_qr_solve(&gram, &rhs, &tolerance, precision),
        SolverKind::Svd => svd_solve(&gram, &rhs, &tolerance, precision),
    };
    if !outcome.is_full_rank() {
        tracing::debug!(
            target: "reoptimize",
            rows,
            cols,
            rank = outcome.rank,
            condition = outcome.condition,
            converged = outcome.converged,
            "sparse monomial system is rank deficient"
        );
        return Err(Error::SparseSystemRankDeficient {
            rows,
            cols,
            rank: outcome.rank,
            condition: outcome.condition,
        });
    }

    let coefficients: Vec<f64> = outcome.solution.iter().map(S::to_f64).collect();
    let polynomial = Polynomial::new(
        Basis::Monomial(MonomialSupport::Sparse(active.clone())),
        monomial.degree().clone(),
        active,
        coefficients,
        domain.clone(),
        samples.clone(),
    )?;

    let original_l2 = original.l2_norm();
    let sparse_l2 = polynomial.l2_norm();
    let l2_ratio = if original_l2 > 0.0 {
        sparse_l2 / original_l2
    } else if sparse_l2 == 0.0 {
        1.0
    } else {
        f64::INFINITY
    };

    let mut warnings = Vec::new();
    if l2_ratio < settings.quality_threshold {
        tracing::warn!(
            target: "reoptimize",
            ratio = l2_ratio,
            threshold = settings.quality_threshold,
            retained = cols,
            original = monomial.term_count(),
            "re-optimized polynomial lost L2 mass"
        );
        warnings.push(QualityWarning::Degradation {
            ratio: l2_ratio,
            threshold: settings.quality_threshold,
        });
    }

    let grid_residual_norm = polynomial.grid_residual_norm();
    tracing::debug!(
        target: "reoptimize",
        rows,
        cols,
        bits = precision.bits,
        solver = ?settings.solver,
        condition = outcome.condition,
        ratio = l2_ratio,
        residual = grid_residual_norm,
        "re-optimized sparse monomial fit"
    );

    Ok(ReoptimizationResult {
        polynomial,
        condition_number: outcome.condition,
        precision,
        solver: settings.solver,
        l2_ratio,
        original_l2,
        sparse_l2,
        original_terms: monomial.term_count(),
        retained_terms: cols,
        grid_residual_norm,
        warnings,
    })
}

/// Rows are samples, columns the active monomials `Π uᵢ^{aᵢ}` in `S`.
fn sparse_design<S: ExtendedScalar>(
    original: &Polynomial,
    active: &[MultiIndex],
    precision: Precision,
) -> Matrix<S> {
    let samples = original.samples();
    let domain = original.domain();
    let dim = domain.dimension();
    let mut max_power = vec![0u32; dim];
    for term in active {
        for (axis, &e) in term.exponents().iter().enumerate() {
            max_power[axis] = max_power[axis].max(e);
        }
    }
    let centers: Vec<S> = domain
        .center()
        .iter()
        .map(|&c| S::from_f64(c, precision))
        .collect();
    let half_widths: Vec<S> = domain
        .half_widths()
        .iter()
        .map(|&h| S::from_f64(h, precision))
        .collect();

    let mut design = Matrix::zeros(samples.len(), active.len(), precision);
    for (i, x) in samples.points().enumerate() {
        // powers[axis][k] = u_axis^k
        let powers: Vec<Vec<S>> = (0..dim)
            .map(|axis| {
                let u = (S::from_f64(x[axis], precision) - centers[axis].clone())
                    / half_widths[axis].clone();
                let mut row = Vec::with_capacity(max_power[axis] as usize + 1);
                let mut current = S::one(precision);
                for _ in 0..=max_power[axis] {
                    row.push(current.clone());
                    current = current * u.clone();
                }
                row
            })
            .collect();
        for (j, term) in active.iter().enumerate() {
            let entry = term
                .exponents()
                .iter()
                .enumerate()
                .fold(S::one(precision), |acc, (axis, &e)| {
                    acc * powers[axis][e as usize].clone()
                });
            design.set(i, j, entry);
        }
    }
    design
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{enumerate_terms, DegreeSpec};
    use crate::convert::to_monomial;
    use crate::domain::Domain;
    use crate::fit::{fit_polynomial, FitSettings};
    use crate::polynomial::SampleSet;
    use crate::precision::BigFloat;
    use crate::sparsify::sparsify;
    use crate::test_support::{chebyshev_grid, sample_on_grid};
    use std::sync::Arc;

    fn cubic_pipeline() -> (Polynomial, Polynomial) {
        let samples = sample_on_grid(&chebyshev_grid(1, 7), |x| {
            2.0 * x[0].powi(3) + 0.5 * x[0] + 0.05
        });
        let fitted = fit_polynomial(
            samples,
            Domain::unit(1).unwrap(),
            Basis::chebyshev(false),
            DegreeSpec::Total(3),
            &FitSettings::default(),
        )
        .unwrap()
        .polynomial;
        let monomial = to_monomial(&fitted).unwrap();
        (fitted, monomial)
    }

    fn settings(solver: SolverKind) -> ReoptimizeSettings {
        ReoptimizeSettings {
            precision: Precision::bits(128),
            solver,
            ..ReoptimizeSettings::default()
        }
    }

    #[test]
    fn keeps_quality_when_only_noise_is_dropped() {
        let (fitted, monomial) = cubic_pipeline();
        let report = sparsify(&monomial, 0.01).unwrap();
        assert_eq!(report.pattern.retained(), 3);
        for solver in [SolverKind::Qr, SolverKind::Svd] {
            let result =
                reoptimize::<BigFloat>(&fitted, &monomial, &report.pattern, &settings(solver))
                    .unwrap();
            assert_eq!(result.retained_terms, 3);
            assert_eq!(result.original_terms, 4);
            assert!((result.l2_ratio - 1.0).abs() < 1e-12);
            assert!(result.is_acceptable());
            assert!(result.grid_residual_norm < 1e-12);
            assert_eq!(result.precision, Precision::bits(128));
            assert_eq!(result.solver, solver);
            let c = result.polynomial.coefficients();
            assert!((c[0] - 0.05).abs() < 1e-13);
            assert!((c[1] - 0.5).abs() < 1e-13);
            assert!((c[2] - 2.0).abs() < 1e-13);
        }
    }

    #[test]
    fn refits_dropped_mass_into_remaining_terms() {
        let (fitted, monomial) = cubic_pipeline();
        let pattern = sparsify(&monomial, 0.5).unwrap().pattern;
        assert_eq!(pattern.retained(), 1);
        let result =
            reoptimize::<BigFloat>(&fitted, &monomial, &pattern, &settings(SolverKind::Qr)).unwrap();
        // Least-squares slope of the lone u³ term on the seven nodes.
        assert!((result.polynomial.coefficients()[0] - 2.6).abs() < 1e-12);
        assert!((result.l2_ratio - 0.955_725_196_9).abs() < 1e-8);
        assert!(result.is_acceptable());
    }

    #[test]
    fn attaches_warning_below_quality_threshold() {
        let (fitted, monomial) = cubic_pipeline();
        let pattern = sparsify(&monomial, 0.5).unwrap().pattern;
        let strict = ReoptimizeSettings {
            quality_threshold: 0.99,
            ..settings(SolverKind::Qr)
        };
        let result = reoptimize::<BigFloat>(&fitted, &monomial, &pattern, &strict).unwrap();
        assert!(!result.is_acceptable());
        match &result.warnings[..] {
            [QualityWarning::Degradation { ratio, threshold }] => {
                assert!(*ratio < 0.99);
                assert_eq!(*threshold, 0.99);
            }
            other => panic!("unexpected warnings {other:?}"),
        }
    }

    #[test]
    fn double_precision_path_reports_fifty_three_bits() {
        let (fitted, monomial) = cubic_pipeline();
        let pattern = sparsify(&monomial, 0.1).unwrap().pattern;
        let result =
            reoptimize::<f64>(&fitted, &monomial, &pattern, &settings(SolverKind::Qr)).unwrap();
        assert_eq!(result.precision, Precision::DOUBLE);
        assert!((result.l2_ratio - 0.998_817_000_966).abs() < 1e-9);
    }

    #[test]
    fn dependent_terms_are_rank_deficient() {
        // On u = ±1 the columns 1 and u² coincide.
        let points: Vec<Vec<f64>> = [-1.0, 1.0, -1.0, 1.0, -1.0, 1.0]
            .iter()
            .map(|&x| vec![x])
            .collect();
        let samples = Arc::new(SampleSet::from_points(&points, vec![2.0; 6]).unwrap());
        let terms = enumerate_terms(1, &DegreeSpec::Total(2)).unwrap();
        let monomial = Polynomial::new(
            Basis::Monomial(MonomialSupport::Dense),
            DegreeSpec::Total(2),
            terms,
            vec![1.0, 0.0, 1.0],
            Domain::unit(1).unwrap(),
            samples,
        )
        .unwrap();
        let pattern = SparsityPattern::from_mask(&monomial, vec![true, false, true]).unwrap();
        for solver in [SolverKind::Qr, SolverKind::Svd] {
            let err = reoptimize::<BigFloat>(&monomial, &monomial, &pattern, &settings(solver))
                .unwrap_err();
            match err {
                Error::SparseSystemRankDeficient { rows, cols, rank, .. } => {
                    assert_eq!((rows, cols, rank), (6, 2, 1));
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn dependent_terms_stay_rank_deficient_past_double_exponent_range() {
        // u = ±0.1 is inexact in binary; 1 and u² are still proportional.
        let points: Vec<Vec<f64>> = [-0.1, 0.1, -0.1, 0.1].iter().map(|&x| vec![x]).collect();
        let samples = Arc::new(SampleSet::from_points(&points, vec![0.7; 4]).unwrap());
        let terms = enumerate_terms(1, &DegreeSpec::Total(2)).unwrap();
        let monomial = Polynomial::new(
            Basis::Monomial(MonomialSupport::Dense),
            DegreeSpec::Total(2),
            terms,
            vec![0.5, 0.0, 20.0],
            Domain::unit(1).unwrap(),
            samples,
        )
        .unwrap();
        let pattern = SparsityPattern::from_mask(&monomial, vec![true, false, true]).unwrap();
        for bits in [256, 1536, 2048] {
            for solver in [SolverKind::Qr, SolverKind::Svd] {
                let settings = ReoptimizeSettings {
                    precision: Precision::bits(bits),
                    solver,
                    ..ReoptimizeSettings::default()
                };
                let err = reoptimize::<BigFloat>(&monomial, &monomial, &pattern, &settings)
                    .unwrap_err();
                match err {
                    Error::SparseSystemRankDeficient { rows, cols, rank, .. } => {
                        assert_eq!((rows, cols, rank), (4, 2, 1), "{bits} bits, {solver:?}");
                    }
                    other => panic!("unexpected error at {bits} bits: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn rejects_foreign_patterns_and_orthogonal_input() {
        let (fitted, monomial) = cubic_pipeline();
        let pattern = sparsify(&monomial, 0.1).unwrap().pattern;
        let err = reoptimize::<f64>(&fitted, &fitted, &pattern, &settings(SolverKind::Qr))
            .unwrap_err();
        assert!(matches!(err, Error::NotMonomial(_)));

        let other = {
            let samples = sample_on_grid(&chebyshev_grid(1, 7), |x| x[0]);
            let p = fit_polynomial(
                samples,
                Domain::unit(1).unwrap(),
                Basis::chebyshev(false),
                DegreeSpec::Total(4),
                &FitSettings::default(),
            )
            .unwrap()
            .polynomial;
            to_monomial(&p).unwrap()
        };
        let err = reoptimize::<f64>(&fitted, &other, &pattern, &settings(SolverKind::Qr))
            .unwrap_err();
        assert!(matches!(err, Error::PatternMismatch { .. }));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let (fitted, monomial) = cubic_pipeline();
        let pattern = SparsityPattern::from_mask(&monomial, vec![false; 4]).unwrap();
        let err = reoptimize::<f64>(&fitted, &monomial, &pattern, &settings(SolverKind::Qr))
            .unwrap_err();
        assert_eq!(err, Error::EmptyPattern { total: 4 });
    }

    #[test]
    fn validate_rejects_tiny_precision() {
        let bad = ReoptimizeSettings {
            precision: Precision::bits(8),
            ..ReoptimizeSettings::default()
        };
        assert!(bad.validate().is_err());
    }
}
