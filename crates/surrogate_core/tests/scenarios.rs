use std::f64::consts::PI;
use std::sync::Arc;
use surrogate_core::basis::{Basis, DegreeSpec};
use surrogate_core::classify::{classify_batch, BatchSummary, Classification, ClassifierSettings};
use surrogate_core::convert::to_monomial;
use surrogate_core::domain::Domain;
use surrogate_core::fit::{fit_polynomial, FitSettings};
use surrogate_core::polynomial::{Polynomial, SampleSet};
use surrogate_core::precision::{BigFloat, Precision};
use surrogate_core::reoptimize::{reoptimize, ReoptimizeSettings, SolverKind};
use surrogate_core::sparsify::{sparsify, truncate};
use surrogate_core::traits::{Objective, Scalar};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn chebyshev_grid(domain: &Domain, n: usize) -> Vec<Vec<f64>> {
    let nodes: Vec<f64> = (0..n)
        .map(|i| ((2 * i + 1) as f64 * PI / (2 * n) as f64).cos())
        .collect();
    let mut grid: Vec<Vec<f64>> = vec![Vec::new()];
    for _ in 0..domain.dimension() {
        let mut next = Vec::with_capacity(grid.len() * n);
        for prefix in &grid {
            for &node in &nodes {
                let mut point = prefix.clone();
                point.push(node);
                next.push(point);
            }
        }
        grid = next;
    }
    grid.iter().map(|u| domain.to_physical(u)).collect()
}

struct Quartic;

impl<T: Scalar> Objective<T> for Quartic {
    fn dimension(&self) -> usize {
        2
    }
    fn value(&self, x: &[T]) -> T {
        let half = T::from_f64(0.5).unwrap();
        let shift = T::from_f64(0.3).unwrap();
        x[0].powi(4) + x[1].powi(4) - x[0] * x[0] * x[1] + half * x[0] - shift
    }
}

struct Wavy;

impl<T: Scalar> Objective<T> for Wavy {
    fn dimension(&self) -> usize {
        2
    }
    fn value(&self, x: &[T]) -> T {
        let a = T::from_f64(1.3).unwrap();
        let b = T::from_f64(0.7).unwrap();
        (a * x[0]).sin() * (b * x[1]).cos() + T::from_f64(0.2).unwrap()
    }
}

fn fitted<F: Objective<f64>>(objective: &F, domain: &Domain, n: usize, degree: u32) -> Polynomial {
    let points = chebyshev_grid(domain, n);
    let samples = Arc::new(SampleSet::from_objective(objective, &points).unwrap());
    fit_polynomial(
        samples,
        domain.clone(),
        Basis::chebyshev(false),
        DegreeSpec::Total(degree),
        &FitSettings::default(),
    )
    .unwrap()
    .polynomial
}

#[test]
fn quartic_on_seven_by_seven_grid_sparsifies_and_keeps_quality() {
    init_tracing();
    let domain = Domain::unit(2).unwrap();
    let original = fitted(&Quartic, &domain, 7, 6);
    let monomial = to_monomial(&original).unwrap();
    assert_eq!(monomial.term_count(), 28);

    let report = sparsify(&monomial, 1e-6).unwrap();
    assert!(report.pattern.retained() < 28);
    assert_eq!(report.pattern.retained(), 5);

    for solver in [SolverKind::Qr, SolverKind::Svd] {
        let settings = ReoptimizeSettings {
            solver,
            ..ReoptimizeSettings::default()
        };
        let result = reoptimize::<BigFloat>(&original, &monomial, &report.pattern, &settings)
            .unwrap();
        assert!(result.l2_ratio >= 0.95, "ratio {}", result.l2_ratio);
        assert!((result.l2_ratio - 1.0).abs() < 1e-10);
        assert_eq!(result.retained_terms, 5);
        assert_eq!(result.precision, Precision::default());
        assert!(result.warnings.is_empty());
        let point = [0.4, -0.25];
        let value = result.polynomial.evaluate(&point).unwrap();
        assert!((value - Objective::<f64>::value(&Quartic, &point)).abs() < 1e-12);
    }
}

#[test]
fn non_polynomial_objective_sparsifies_and_keeps_quality() {
    init_tracing();
    let domain = Domain::unit(2).unwrap();
    let original = fitted(&Wavy, &domain, 7, 6);
    let monomial = to_monomial(&original).unwrap();
    assert_eq!(monomial.term_count(), 28);

    // Odd-in-x, even-in-y terms plus the constant survive; the rest sit at roundoff.
    let report = sparsify(&monomial, 1e-6).unwrap();
    assert_eq!(report.pattern.retained(), 7);
    let result = reoptimize::<BigFloat>(
        &original,
        &monomial,
        &report.pattern,
        &ReoptimizeSettings::default(),
    )
    .unwrap();
    assert!(result.l2_ratio >= 0.95);
    assert!((result.l2_ratio - 1.0).abs() < 1e-9);
    assert!(result.warnings.is_empty());

    // Coarser thresholds drop genuine terms: x⁵ and xy⁴, then x³y² as well.
    for (tau, retained, ratio) in [(0.02, 5, 1.000_178_977_23), (0.1, 4, 0.998_006_086_712)] {
        let pattern = sparsify(&monomial, tau).unwrap().pattern;
        assert_eq!(pattern.retained(), retained, "τ = {tau}");
        for solver in [SolverKind::Qr, SolverKind::Svd] {
            let settings = ReoptimizeSettings {
                solver,
                ..ReoptimizeSettings::default()
            };
            let result =
                reoptimize::<BigFloat>(&original, &monomial, &pattern, &settings).unwrap();
            assert!(result.l2_ratio >= 0.95);
            assert!(
                (result.l2_ratio - ratio).abs() < 1e-8,
                "τ = {tau}, {solver:?}: ratio {}",
                result.l2_ratio
            );
            assert!(result.is_acceptable());
        }
    }
}

#[test]
fn conversion_round_trip_on_shifted_domain() {
    let domain = Domain::from_bounds(&[-2.0, 0.5], &[1.0, 3.0]).unwrap();
    let original = fitted(&Wavy, &domain, 9, 8);
    let monomial = to_monomial(&original).unwrap();
    let scale: f64 = original.coefficients().iter().map(|c| c.abs()).sum::<f64>() * 128.0;
    for point in chebyshev_grid(&domain, 4) {
        let diff = (monomial.evaluate(&point).unwrap() - original.evaluate(&point).unwrap()).abs();
        assert!(diff <= 64.0 * f64::EPSILON * scale, "diff {diff} at {point:?}");
    }
}

struct Cubic;

impl<T: Scalar> Objective<T> for Cubic {
    fn dimension(&self) -> usize {
        1
    }
    fn value(&self, x: &[T]) -> T {
        let two = T::from_f64(2.0).unwrap();
        let half = T::from_f64(0.5).unwrap();
        let offset = T::from_f64(0.05).unwrap();
        two * x[0].powi(3) + half * x[0] + offset
    }
}

#[test]
fn reoptimization_ratio_is_monotone_in_threshold() {
    let domain = Domain::unit(1).unwrap();
    let original = fitted(&Cubic, &domain, 7, 3);
    let monomial = to_monomial(&original).unwrap();
    let settings = ReoptimizeSettings {
        precision: Precision::bits(160),
        quality_threshold: 0.5,
        ..ReoptimizeSettings::default()
    };

    let mut previous_ratio = 0.0;
    let mut previous_terms = 0;
    for tau in [0.5, 0.1, 0.01] {
        let first = sparsify(&monomial, tau).unwrap();
        let again = sparsify(&monomial, tau).unwrap();
        assert_eq!(first.pattern, again.pattern);
        let result =
            reoptimize::<BigFloat>(&original, &monomial, &first.pattern, &settings).unwrap();
        assert!(result.retained_terms > previous_terms);
        assert!(
            result.l2_ratio >= previous_ratio,
            "τ = {tau}: {} < {previous_ratio}",
            result.l2_ratio
        );
        previous_ratio = result.l2_ratio;
        previous_terms = result.retained_terms;
    }
    assert_eq!(previous_terms, 3);
    assert!((previous_ratio - 1.0).abs() < 1e-10);
}

#[test]
fn grid_residual_shrinks_as_threshold_drops() {
    let domain = Domain::unit(2).unwrap();
    let original = fitted(&Wavy, &domain, 7, 6);
    let monomial = to_monomial(&original).unwrap();
    let settings = ReoptimizeSettings {
        precision: Precision::bits(160),
        quality_threshold: 0.1,
        ..ReoptimizeSettings::default()
    };

    // Threshold patterns are nested, so each least-squares residual bounds the next.
    let mut previous = f64::INFINITY;
    for tau in [0.5, 0.2, 0.05, 1e-3] {
        let pattern = sparsify(&monomial, tau).unwrap().pattern;
        let result = reoptimize::<BigFloat>(&original, &monomial, &pattern, &settings).unwrap();
        assert!(result.grid_residual_norm <= previous + 1e-12);
        previous = result.grid_residual_norm;
    }
}

#[test]
fn reoptimization_beats_naive_truncation() {
    let domain = Domain::unit(2).unwrap();
    let original = fitted(&Wavy, &domain, 7, 6);
    let monomial = to_monomial(&original).unwrap();
    let pattern = sparsify(&monomial, 0.05).unwrap().pattern;
    let truncated = truncate(&monomial, &pattern).unwrap();
    let result = reoptimize::<BigFloat>(
        &original,
        &monomial,
        &pattern,
        &ReoptimizeSettings::default(),
    )
    .unwrap();
    let truncation_error = truncated.grid_residual_norm();
    assert!(result.grid_residual_norm <= truncation_error + 1e-12);
}

#[test]
fn caller_escalates_precision_explicitly() {
    let domain = Domain::unit(2).unwrap();
    let original = fitted(&Quartic, &domain, 7, 6);
    let monomial = to_monomial(&original).unwrap();
    let pattern = sparsify(&monomial, 1e-6).unwrap().pattern;

    let first = ReoptimizeSettings {
        precision: Precision::bits(64),
        ..ReoptimizeSettings::default()
    };
    let low = reoptimize::<BigFloat>(&original, &monomial, &pattern, &first).unwrap();
    let escalated = ReoptimizeSettings {
        precision: first.precision.doubled(),
        ..first
    };
    let high = reoptimize::<BigFloat>(&original, &monomial, &pattern, &escalated).unwrap();
    assert_eq!(low.precision.bits, 64);
    assert_eq!(high.precision.bits, 128);
    for (a, b) in low
        .polynomial
        .coefficients()
        .iter()
        .zip(high.polynomial.coefficients())
    {
        assert!((a - b).abs() < 1e-12);
    }
}

/// `xᵀ A x` with diagonal `A`, whose Hessian is `2A`.
struct DiagonalQuadratic(Vec<f64>);

impl<T: Scalar> Objective<T> for DiagonalQuadratic {
    fn dimension(&self) -> usize {
        self.0.len()
    }
    fn value(&self, x: &[T]) -> T {
        self.0.iter().zip(x).fold(T::zero(), |acc, (&a, &xi)| {
            acc + T::from_f64(a).unwrap() * xi * xi
        })
    }
}

struct Saddle;

impl<T: Scalar> Objective<T> for Saddle {
    fn dimension(&self) -> usize {
        2
    }
    fn value(&self, x: &[T]) -> T {
        x[0] * x[0] - x[1] * x[1]
    }
}

#[test]
fn diagonal_quadratic_origin_is_minimum() {
    let a = vec![3.0, 0.25, 1.5, 6.0];
    let records = classify_batch(
        &DiagonalQuadratic(a.clone()),
        &[vec![0.0; 4]],
        &ClassifierSettings::default(),
    )
    .unwrap();
    let record = &records[0];
    assert_eq!(record.classification, Classification::Minimum);
    let mut expected: Vec<f64> = a.iter().map(|v| 2.0 * v).collect();
    expected.sort_by(|x, y| x.total_cmp(y));
    for (got, want) in record.eigenvalues.iter().zip(&expected) {
        assert!((got - want).abs() < 1e-12);
    }
    assert!((record.condition_number - 6.0 / 0.25).abs() < 1e-10);
}

#[test]
fn saddle_at_origin() {
    let records = classify_batch(&Saddle, &[vec![0.0, 0.0]], &ClassifierSettings::default()).unwrap();
    let record = &records[0];
    assert_eq!(record.classification, Classification::Saddle);
    assert!((record.eigenvalues[0] + 2.0).abs() < 1e-12);
    assert!((record.eigenvalues[1] - 2.0).abs() < 1e-12);
    assert!((record.condition_number - 1.0).abs() < 1e-12);
}

#[test]
fn every_candidate_gets_a_record() {
    let candidates: Vec<Vec<f64>> = vec![
        vec![0.0, 0.0],
        vec![0.3, -0.2],
        vec![f64::INFINITY, 0.0],
        vec![],
        vec![1.0, 2.0, 3.0],
        vec![-0.5, 0.5],
    ];
    let settings = ClassifierSettings {
        cluster_distance: Some(1e-6),
        ..ClassifierSettings::default()
    };
    let records = classify_batch(&Quartic, &candidates, &settings).unwrap();
    assert_eq!(records.len(), candidates.len());
    assert_eq!(records[2].classification, Classification::Error);
    assert_eq!(records[3].classification, Classification::Error);
    assert_eq!(records[4].classification, Classification::Error);
    let summary = BatchSummary::from_records(&records, &settings).unwrap();
    assert_eq!(summary.total, 6);
    assert_eq!(summary.errors, 3);
    assert_eq!(
        summary.minima + summary.maxima + summary.saddles + summary.degenerate + summary.errors,
        6
    );
    assert!(summary.distinct_minima.is_some());
}
