//! Hessian-based classification of candidate critical points.
//!
//! Candidates come from an external root solver and are judged against the
//! true objective, differentiated exactly with [`HyperDual`] numbers. Every
//! candidate yields exactly one record: points where the Hessian cannot be
//! computed are labelled [`Classification::Error`] with NaN diagnostics.

use crate::autodiff::{gradient_and_hessian, HyperDual};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::traits::Objective;
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Minimum,
    Maximum,
    Saddle,
    Degenerate,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Minimum requires every eigenvalue above `tol_pos`.
    pub tol_pos: f64,
    /// Maximum requires every eigenvalue below `-tol_neg`.
    pub tol_neg: f64,
    /// Any `|λ| < tol_zero` marks the point degenerate.
    pub tol_zero: f64,
    /// Keep the symmetrized Hessian on each record.
    pub retain_hessian: bool,
    /// Merge minima closer than this (Euclidean) into one cluster. Large
    /// values merge genuinely distinct minima.
    pub cluster_distance: Option<f64>,
    /// Flag each record with membership in this box.
    pub domain: Option<Domain>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            tol_pos: 1e-8,
            tol_neg: 1e-8,
            tol_zero: 1e-8,
            retain_hessian: false,
            cluster_distance: None,
            domain: None,
        }
    }
}

impl ClassifierSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, tol) in [
            ("tol_pos", self.tol_pos),
            ("tol_neg", self.tol_neg),
            ("tol_zero", self.tol_zero),
        ] {
            if !(tol >= 0.0 && tol.is_finite()) {
                return Err(Error::InvalidSettings(format!(
                    "{name} must be finite and non-negative, got {tol}"
                )));
            }
        }
        if self.tol_pos > self.tol_zero || self.tol_neg > self.tol_zero {
            return Err(Error::InvalidSettings(
                "tol_pos and tol_neg must not exceed tol_zero".to_string(),
            ));
        }
        if let Some(d) = self.cluster_distance {
            if !(d >= 0.0 && d.is_finite()) {
                return Err(Error::InvalidSettings(format!(
                    "cluster_distance must be finite and non-negative, got {d}"
                )));
            }
        }
        Ok(())
    }
}

/// Why a candidate's Hessian could not be used. Recorded, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("Hessian computation failed for candidate {index}: {reason}")]
pub struct HessianComputationFailed {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPointRecord {
    pub index: usize,
    pub coordinates: Vec<f64>,
    pub value: f64,
    pub gradient_norm: f64,
    /// Symmetrized Hessian, row-major; only kept on request.
    pub hessian: Option<Vec<f64>>,
    pub classification: Classification,
    /// Ascending.
    pub eigenvalues: Vec<f64>,
    pub min_eigenvalue: f64,
    pub max_eigenvalue: f64,
    /// `max |λ| / min |λ|`.
    pub condition_number: f64,
    pub determinant: f64,
    pub trace: f64,
    pub frobenius_norm: f64,
    /// Stability margin of a minimum.
    pub smallest_positive_eigenvalue: Option<f64>,
    /// Stability margin of a maximum.
    pub largest_negative_eigenvalue: Option<f64>,
    pub in_domain: Option<bool>,
    pub failure: Option<HessianComputationFailed>,
}

impl CriticalPointRecord {
    fn failed(index: usize, x: &[f64], reason: String, settings: &ClassifierSettings) -> Self {
        let failure = HessianComputationFailed { index, reason };
        tracing::warn!(target: "classify", index, error = %failure, "classification failed");
        Self {
            index,
            coordinates: x.to_vec(),
            value: f64::NAN,
            gradient_norm: f64::NAN,
            hessian: None,
            classification: Classification::Error,
            eigenvalues: vec![f64::NAN; x.len()],
            min_eigenvalue: f64::NAN,
            max_eigenvalue: f64::NAN,
            condition_number: f64::NAN,
            determinant: f64::NAN,
            trace: f64::NAN,
            frobenius_norm: f64::NAN,
            smallest_positive_eigenvalue: None,
            largest_negative_eigenvalue: None,
            in_domain: settings.domain.as_ref().map(|d| d.contains(x, 0.0)),
            failure: Some(failure),
        }
    }
}

/// Tolerance-banded rule. Degeneracy is checked first because a point can
/// have near-zero eigenvalues alongside clearly signed ones.
pub fn classify_eigenvalues(eigenvalues: &[f64], settings: &ClassifierSettings) -> Classification {
    if eigenvalues.is_empty() || eigenvalues.iter().any(|l| !l.is_finite()) {
        return Classification::Error;
    }
    if eigenvalues.iter().any(|l| l.abs() < settings.tol_zero) {
        Classification::Degenerate
    } else if eigenvalues.iter().all(|&l| l > settings.tol_pos) {
        Classification::Minimum
    } else if eigenvalues.iter().all(|&l| l < -settings.tol_neg) {
        Classification::Maximum
    } else {
        Classification::Saddle
    }
}

/// Classifies one candidate. Never fails: problems become an
/// [`Classification::Error`] record.
pub fn classify_point<F>(
    objective: &F,
    index: usize,
    x: &[f64],
    settings: &ClassifierSettings,
) -> CriticalPointRecord
where
    F: Objective<HyperDual> + ?Sized,
{
    let dim = objective.dimension();
    if x.len() != dim {
        return CriticalPointRecord::failed(
            index,
            x,
            format!("expected {dim} coordinates, got {}", x.len()),
            settings,
        );
    }
    if dim == 0 {
        return CriticalPointRecord::failed(index, x, "objective has no inputs".into(), settings);
    }
    if x.iter().any(|v| !v.is_finite()) {
        return CriticalPointRecord::failed(index, x, "non-finite coordinates".into(), settings);
    }

    let derivatives = gradient_and_hessian(objective, x);
    if !derivatives.value.is_finite()
        || derivatives.gradient.iter().any(|g| !g.is_finite())
        || derivatives.hessian.iter().any(|h| !h.is_finite())
    {
        return CriticalPointRecord::failed(
            index,
            x,
            "objective is not twice differentiable here".into(),
            settings,
        );
    }

    let raw = DMatrix::from_row_slice(dim, dim, &derivatives.hessian);
    let hessian = (&raw + raw.transpose()) * 0.5;
    let mut eigenvalues: Vec<f64> = SymmetricEigen::new(hessian.clone())
        .eigenvalues
        .iter()
        .copied()
        .collect();
    if eigenvalues.iter().any(|l| !l.is_finite()) {
        return CriticalPointRecord::failed(
            index,
            x,
            "eigen-decomposition produced non-finite values".into(),
            settings,
        );
    }
    eigenvalues.sort_by(|a, b| a.total_cmp(b));

    let classification = classify_eigenvalues(&eigenvalues, settings);
    let min_eigenvalue = eigenvalues[0];
    let max_eigenvalue = eigenvalues[dim - 1];
    let largest_abs = eigenvalues.iter().fold(0.0f64, |acc, l| acc.max(l.abs()));
    let smallest_abs = eigenvalues
        .iter()
        .fold(f64::INFINITY, |acc, l| acc.min(l.abs()));
    let condition_number = if smallest_abs > 0.0 {
        largest_abs / smallest_abs
    } else {
        f64::INFINITY
    };
    let smallest_positive_eigenvalue = match classification {
        Classification::Minimum => eigenvalues.iter().copied().find(|l| *l > 0.0),
        _ => None,
    };
    let largest_negative_eigenvalue = match classification {
        Classification::Maximum => eigenvalues.iter().rev().copied().find(|l| *l < 0.0),
        _ => None,
    };

    let gradient_norm = derivatives
        .gradient
        .iter()
        .map(|g| g * g)
        .sum::<f64>()
        .sqrt();

    tracing::debug!(
        target: "classify",
        index,
        label = ?classification,
        gradient_norm,
        min_eigenvalue,
        max_eigenvalue,
        "classified candidate"
    );

    CriticalPointRecord {
        index,
        coordinates: x.to_vec(),
        value: derivatives.value,
        gradient_norm,
        hessian: settings
            .retain_hessian
            .then(|| hessian.transpose().iter().copied().collect()),
        classification,
        min_eigenvalue,
        max_eigenvalue,
        condition_number,
        determinant: eigenvalues.iter().product(),
        trace: hessian.trace(),
        frobenius_norm: hessian.norm(),
        eigenvalues,
        smallest_positive_eigenvalue,
        largest_negative_eigenvalue,
        in_domain: settings.domain.as_ref().map(|d| d.contains(x, 0.0)),
        failure: None,
    }
}

/// One record per candidate, in input order.
pub fn classify_batch<F>(
    objective: &F,
    points: &[Vec<f64>],
    settings: &ClassifierSettings,
) -> Result<Vec<CriticalPointRecord>>
where
    F: Objective<HyperDual> + ?Sized,
{
    settings.validate()?;
    Ok(points
        .iter()
        .enumerate()
        .map(|(index, x)| classify_point(objective, index, x, settings))
        .collect())
}

/// [`classify_batch`] with candidates processed on the rayon pool.
#[cfg(feature = "parallel")]
pub fn classify_batch_par<F>(
    objective: &F,
    points: &[Vec<f64>],
    settings: &ClassifierSettings,
) -> Result<Vec<CriticalPointRecord>>
where
    F: Objective<HyperDual> + Sync + ?Sized,
{
    use rayon::prelude::*;

    settings.validate()?;
    Ok(points
        .par_iter()
        .enumerate()
        .map(|(index, x)| classify_point(objective, index, x, settings))
        .collect())
}

/// Near-duplicate minima merged into one representative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimumCluster {
    /// Record index of the member with the smallest gradient norm.
    pub representative: usize,
    /// Record indices, representative first.
    pub members: Vec<usize>,
}

impl MinimumCluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Groups minima whose distance to a cluster representative is at most
/// `distance`.
///
/// Minima are visited by ascending gradient norm, so the most stationary
/// candidate of each group becomes its representative. The threshold has
/// no natural default; too large a value merges distinct minima.
pub fn cluster_minima(records: &[CriticalPointRecord], distance: f64) -> Result<Vec<MinimumCluster>> {
    if !(distance >= 0.0 && distance.is_finite()) {
        return Err(Error::InvalidSettings(format!(
            "cluster distance must be finite and non-negative, got {distance}"
        )));
    }
    let mut minima: Vec<&CriticalPointRecord> = records
        .iter()
        .filter(|r| r.classification == Classification::Minimum)
        .collect();
    minima.sort_by(|a, b| {
        a.gradient_norm
            .total_cmp(&b.gradient_norm)
            .then(a.index.cmp(&b.index))
    });

    let mut clusters: Vec<(MinimumCluster, &[f64])> = Vec::new();
    for record in minima {
        let home = clusters
            .iter_mut()
            .find(|(_, center)| euclidean(center, &record.coordinates) <= distance);
        match home {
            Some((cluster, _)) => cluster.members.push(record.index),
            None => clusters.push((
                MinimumCluster {
                    representative: record.index,
                    members: vec![record.index],
                },
                record.coordinates.as_slice(),
            )),
        }
    }
    Ok(clusters.into_iter().map(|(cluster, _)| cluster).collect())
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Per-label counts of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub minima: usize,
    pub maxima: usize,
    pub saddles: usize,
    pub degenerate: usize,
    pub errors: usize,
    /// Number of minimum clusters, when clustering is configured.
    pub distinct_minima: Option<usize>,
}

impl BatchSummary {
    pub fn from_records(records: &[CriticalPointRecord], settings: &ClassifierSettings) -> Result<Self> {
        let mut summary = BatchSummary {
            total: records.len(),
            ..BatchSummary::default()
        };
        for record in records {
            match record.classification {
                Classification::Minimum => summary.minima += 1,
                Classification::Maximum => summary.maxima += 1,
                Classification::Saddle => summary.saddles += 1,
                Classification::Degenerate => summary.degenerate += 1,
                Classification::Error => summary.errors += 1,
            }
        }
        if let Some(distance) = settings.cluster_distance {
            summary.distinct_minima = Some(cluster_minima(records, distance)?.len());
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Scalar;

    /// `½ xᵀ diag(a) x`
    struct Quadratic(Vec<f64>);

    impl<T: Scalar> Objective<T> for Quadratic {
        fn dimension(&self) -> usize {
            self.0.len()
        }
        fn value(&self, x: &[T]) -> T {
            let half = T::from_f64(0.5).unwrap();
            self.0
                .iter()
                .zip(x)
                .fold(T::zero(), |acc, (&a, &xi)| acc + half * T::from_f64(a).unwrap() * xi * xi)
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

    /// Double well `(x² − 1)² + y²`, a kink `|y|` added on the line y = 3.
    struct DoubleWell;

    impl<T: Scalar> Objective<T> for DoubleWell {
        fn dimension(&self) -> usize {
            2
        }
        fn value(&self, x: &[T]) -> T {
            let one = T::one();
            let three = T::from_f64(3.0).unwrap();
            let kink = if x[1].to_f64() == Some(3.0) {
                (x[1] - three).abs()
            } else {
                T::zero()
            };
            (x[0] * x[0] - one).powi(2) + x[1] * x[1] + kink
        }
    }

    #[test]
    fn positive_definite_quadratic_is_minimum() {
        let a = vec![4.0, 0.5, 2.0];
        let record = classify_point(&Quadratic(a), 0, &[0.0, 0.0, 0.0], &ClassifierSettings::default());
        assert_eq!(record.classification, Classification::Minimum);
        for (got, want) in record.eigenvalues.iter().zip([0.5, 2.0, 4.0]) {
            assert!((got - want).abs() < 1e-12, "{got} vs {want}");
        }
        assert!((record.condition_number - 8.0).abs() < 1e-12);
        assert!((record.determinant - 4.0).abs() < 1e-12);
        assert!((record.trace - 6.5).abs() < 1e-12);
        assert!((record.smallest_positive_eigenvalue.unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(record.largest_negative_eigenvalue, None);
        assert_eq!(record.gradient_norm, 0.0);
        assert!(record.failure.is_none());
    }

    #[test]
    fn saddle_has_opposite_eigenvalues() {
        let settings = ClassifierSettings {
            retain_hessian: true,
            ..ClassifierSettings::default()
        };
        let record = classify_point(&Saddle, 0, &[0.0, 0.0], &settings);
        assert_eq!(record.classification, Classification::Saddle);
        assert!((record.eigenvalues[0] + 2.0).abs() < 1e-12);
        assert!((record.eigenvalues[1] - 2.0).abs() < 1e-12);
        assert!((record.condition_number - 1.0).abs() < 1e-12);
        assert!((record.determinant + 4.0).abs() < 1e-12);
        assert_eq!(record.hessian, Some(vec![2.0, 0.0, 0.0, -2.0]));
        assert!((record.frobenius_norm - 8.0f64.sqrt()).abs() < 1e-14);
    }

    #[test]
    fn negative_definite_is_maximum() {
        let record = classify_point(
            &Quadratic(vec![-1.0, -3.0]),
            0,
            &[0.0, 0.0],
            &ClassifierSettings::default(),
        );
        assert_eq!(record.classification, Classification::Maximum);
        assert!((record.largest_negative_eigenvalue.unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(record.smallest_positive_eigenvalue, None);
    }

    #[test]
    fn zero_band_is_checked_first() {
        let settings = ClassifierSettings {
            tol_zero: 0.1,
            ..ClassifierSettings::default()
        };
        assert_eq!(classify_eigenvalues(&[0.05, 3.0], &settings), Classification::Degenerate);
        assert_eq!(classify_eigenvalues(&[-0.05, -3.0], &settings), Classification::Degenerate);
        assert_eq!(classify_eigenvalues(&[0.2, 3.0], &settings), Classification::Minimum);
        assert_eq!(classify_eigenvalues(&[-0.2, 3.0], &settings), Classification::Saddle);
        assert_eq!(classify_eigenvalues(&[f64::NAN, 3.0], &settings), Classification::Error);
    }

    #[test]
    fn batch_yields_one_record_per_candidate() {
        let points = vec![
            vec![1.0, 0.0],
            vec![0.0, 0.0],
            vec![0.0, 3.0],
            vec![1.0],
            vec![-1.0, 0.0],
            vec![f64::NAN, 0.0],
        ];
        let settings = ClassifierSettings {
            domain: Some(Domain::unit(2).unwrap()),
            ..ClassifierSettings::default()
        };
        let records = classify_batch(&DoubleWell, &points, &settings).unwrap();
        assert_eq!(records.len(), points.len());
        let labels: Vec<Classification> = records.iter().map(|r| r.classification).collect();
        assert_eq!(
            labels,
            vec![
                Classification::Minimum,
                Classification::Saddle,
                Classification::Error,
                Classification::Error,
                Classification::Minimum,
                Classification::Error,
            ]
        );
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.index, i);
        }
        let kink = &records[2];
        assert!(kink.failure.as_ref().unwrap().reason.contains("differentiable"));
        assert!(kink.eigenvalues.iter().all(|l| l.is_nan()));
        assert!(kink.condition_number.is_nan());
        assert_eq!(kink.in_domain, Some(false));
        assert_eq!(records[0].in_domain, Some(true));

        let summary = BatchSummary::from_records(&records, &settings).unwrap();
        assert_eq!(summary.total, 6);
        assert_eq!((summary.minima, summary.saddles, summary.errors), (2, 1, 3));
        assert_eq!(summary.distinct_minima, None);
    }

    #[test]
    fn records_serialize_with_lowercase_labels() {
        let record = classify_point(&Saddle, 7, &[0.0, 0.0], &ClassifierSettings::default());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["classification"], "saddle");
        assert_eq!(json["index"], 7);
    }

    #[test]
    fn clustering_merges_near_duplicates_only() {
        let points = vec![
            vec![1.0 + 1e-7, 0.0],
            vec![1.0, 0.0],
            vec![-1.0, 1e-8],
            vec![0.0, 0.0],
        ];
        let records = classify_batch(&DoubleWell, &points, &ClassifierSettings::default()).unwrap();
        let clusters = cluster_minima(&records, 1e-4).unwrap();
        assert_eq!(clusters.len(), 2);
        let right = clusters.iter().find(|c| c.members.contains(&0)).unwrap();
        assert_eq!(right.size(), 2);
        // The exact root has the smaller gradient.
        assert_eq!(right.representative, 1);

        // An oversized radius merges the two distinct wells.
        assert_eq!(cluster_minima(&records, 5.0).unwrap().len(), 1);
        assert!(cluster_minima(&records, -1.0).is_err());
    }

    #[test]
    fn settings_validation_orders_tolerances() {
        let settings = ClassifierSettings {
            tol_pos: 1e-3,
            tol_zero: 1e-6,
            ..ClassifierSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(classify_batch(&Saddle, &[], &settings).is_err());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_batch_preserves_order() {
        let points: Vec<Vec<f64>> = (0..32).map(|i| vec![i as f64 * 0.1 - 1.6, 0.0]).collect();
        let settings = ClassifierSettings::default();
        let sequential = classify_batch(&DoubleWell, &points, &settings).unwrap();
        let parallel = classify_batch_par(&DoubleWell, &points, &settings).unwrap();
        let a: Vec<_> = sequential.iter().map(|r| (r.index, r.classification)).collect();
        let b: Vec<_> = parallel.iter().map(|r| (r.index, r.classification)).collect();
        assert_eq!(a, b);
    }
}
