//! Magnitude-based sparsification of monomial polynomials.
//!
//! [`sparsify`] is the cheap path: threshold the coefficients and estimate
//! the L2 mass of what was dropped. [`adaptive_threshold_search`] is the
//! expensive one: every candidate runs a full [`reoptimize`], so a search over
//! `k` candidates costs `O(log k)` extended-precision re-fits. Callers that
//! iterate quickly should stick to the heuristic.

use crate::basis::{Basis, MonomialSupport, MultiIndex};
use crate::error::{Error, Result};
use crate::polynomial::Polynomial;
use crate::precision::ExtendedScalar;
use crate::reoptimize::{reoptimize, ReoptimizationResult, ReoptimizeSettings};
use serde::{Deserialize, Serialize};

/// Retained/dropped mask over the term ordering of one monomial expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsityPattern {
    source_terms: Vec<MultiIndex>,
    mask: Vec<bool>,
    /// Relative threshold the pattern was derived with, if any.
    threshold: Option<f64>,
}

impl SparsityPattern {
    /// Caller-defined pattern over the terms of `polynomial`.
    pub fn from_mask(polynomial: &Polynomial, mask: Vec<bool>) -> Result<Self> {
        if mask.len() != polynomial.term_count() {
            return Err(Error::PatternMismatch {
                pattern_terms: mask.len(),
                polynomial_terms: polynomial.term_count(),
            });
        }
        Ok(Self {
            source_terms: polynomial.terms().to_vec(),
            mask,
            threshold: None,
        })
    }

    /// Keeps every term with `|c| ≥ cutoff`.
    fn from_cutoff(polynomial: &Polynomial, cutoff: f64, threshold: f64) -> Self {
        Self {
            source_terms: polynomial.terms().to_vec(),
            mask: polynomial
                .coefficients()
                .iter()
                .map(|c| c.abs() >= cutoff)
                .collect(),
            threshold: Some(threshold),
        }
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// Retained multi-indices, in the source ordering.
    pub fn active_terms(&self) -> Vec<MultiIndex> {
        self.source_terms
            .iter()
            .zip(&self.mask)
            .filter(|(_, keep)| **keep)
            .map(|(term, _)| term.clone())
            .collect()
    }

    pub fn retained(&self) -> usize {
        self.mask.iter().filter(|keep| **keep).count()
    }

    pub fn dropped(&self) -> usize {
        self.mask.len() - self.retained()
    }

    /// Fails unless `polynomial` has exactly the term ordering this pattern
    /// was derived from.
    pub fn check_compatible(&self, polynomial: &Polynomial) -> Result<()> {
        if self.source_terms.as_slice() != polynomial.terms() {
            return Err(Error::PatternMismatch {
                pattern_terms: self.source_terms.len(),
                polynomial_terms: polynomial.term_count(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SparsificationReport {
    pub pattern: SparsityPattern,
    /// `τ · max |c|`.
    pub threshold_abs: f64,
    /// L2 norm over the domain of the dropped part alone.
    pub dropped_l2_estimate: f64,
    /// `dropped_l2_estimate / ‖p‖`, zero for the zero polynomial.
    pub relative_dropped_l2: f64,
}

fn require_dense_monomial(polynomial: &Polynomial, operation: &'static str) -> Result<()> {
    match polynomial.basis() {
        Basis::Monomial(MonomialSupport::Dense) => Ok(()),
        _ => Err(Error::NotMonomial(operation)),
    }
}

/// Drops every term with `|c| < τ · max |c|`.
///
/// Deterministic in the coefficients, so repeated calls with the same `τ`
/// produce identical patterns. The dropped-mass estimate is a pre-screen
/// only; it says nothing about how well the retained terms can be re-fitted.
pub fn sparsify(polynomial: &Polynomial, tau: f64) -> Result<SparsificationReport> {
    require_dense_monomial(polynomial, "sparsify")?;
    if !(tau > 0.0 && tau < 1.0) {
        return Err(Error::InvalidThreshold(tau));
    }
    let threshold_abs = tau * polynomial.max_abs_coefficient();
    let pattern = SparsityPattern::from_cutoff(polynomial, threshold_abs, tau);

    let dropped_part = masked_copy(polynomial, &pattern, false)?;
    let dropped_l2_estimate = dropped_part.l2_norm();
    let total = polynomial.l2_norm();
    let relative_dropped_l2 = if total > 0.0 {
        dropped_l2_estimate / total
    } else {
        0.0
    };

    tracing::debug!(
        target: "sparsify",
        tau,
        threshold_abs,
        retained = pattern.retained(),
        dropped = pattern.dropped(),
        relative_dropped_l2,
        "thresholded monomial coefficients"
    );

    Ok(SparsificationReport {
        pattern,
        threshold_abs,
        dropped_l2_estimate,
        relative_dropped_l2,
    })
}

/// Dense copy that zeroes the coefficients whose mask entry differs from `keep`.
fn masked_copy(polynomial: &Polynomial, pattern: &SparsityPattern, keep: bool) -> Result<Polynomial> {
    let coefficients = polynomial
        .coefficients()
        .iter()
        .zip(pattern.mask())
        .map(|(c, &m)| if m == keep { *c } else { 0.0 })
        .collect();
    Polynomial::new(
        polynomial.basis().clone(),
        polynomial.degree().clone(),
        polynomial.terms().to_vec(),
        coefficients,
        polynomial.domain().clone(),
        polynomial.samples().clone(),
    )
}

/// Naive truncation: the retained terms with their original coefficients.
///
/// The baseline that re-optimization is measured against.
pub fn truncate(polynomial: &Polynomial, pattern: &SparsityPattern) -> Result<Polynomial> {
    require_dense_monomial(polynomial, "truncate")?;
    pattern.check_compatible(polynomial)?;
    let active = pattern.active_terms();
    if active.is_empty() {
        return Err(Error::EmptyPattern {
            total: pattern.len(),
        });
    }
    let coefficients = polynomial
        .coefficients()
        .iter()
        .zip(pattern.mask())
        .filter(|(_, keep)| **keep)
        .map(|(c, _)| *c)
        .collect();
    Polynomial::new(
        Basis::Monomial(MonomialSupport::Sparse(active.clone())),
        polynomial.degree().clone(),
        active,
        coefficients,
        polynomial.domain().clone(),
        polynomial.samples().clone(),
    )
}

/// Sorted (ascending) distinct relative magnitudes `|c| / max |c|` of the
/// nonzero coefficients. The last entry is always 1.
pub fn candidate_thresholds(polynomial: &Polynomial) -> Vec<f64> {
    let max = polynomial.max_abs_coefficient();
    if max == 0.0 {
        return Vec::new();
    }
    let mut magnitudes: Vec<f64> = polynomial
        .coefficients()
        .iter()
        .map(|c| c.abs())
        .filter(|m| *m > 0.0)
        .collect();
    magnitudes.sort_by(|a, b| a.total_cmp(b));
    magnitudes.dedup();
    magnitudes.into_iter().map(|m| m / max).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveSearchSettings {
    /// Largest acceptable L2 change; feasible means `|1 − ratio| ≤ max_degradation`,
    /// so an overshooting re-fit is rejected like a lossy one.
    pub max_degradation: f64,
    /// Upper bound on re-optimizations. `None` allows the full binary search.
    pub max_evaluations: Option<usize>,
    /// Coarse relative thresholds in (0, 1) to search instead of every
    /// distinct coefficient magnitude.
    pub candidates: Option<Vec<f64>>,
    pub reoptimize: ReoptimizeSettings,
}

impl Default for AdaptiveSearchSettings {
    fn default() -> Self {
        Self {
            max_degradation: 0.01,
            max_evaluations: None,
            candidates: None,
            reoptimize: ReoptimizeSettings::default(),
        }
    }
}

impl AdaptiveSearchSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_degradation >= 0.0 && self.max_degradation < 1.0) {
            return Err(Error::InvalidSettings(format!(
                "max_degradation must lie in [0, 1), got {}",
                self.max_degradation
            )));
        }
        if self.max_evaluations == Some(0) {
            return Err(Error::InvalidSettings(
                "max_evaluations must be at least 1".to_string(),
            ));
        }
        if let Some(candidates) = &self.candidates {
            if candidates.is_empty() {
                return Err(Error::InvalidSettings(
                    "candidate list must not be empty".to_string(),
                ));
            }
            if let Some(bad) = candidates.iter().find(|t| !(**t > 0.0 && **t < 1.0)) {
                return Err(Error::InvalidThreshold(*bad));
            }
        }
        self.reoptimize.validate()
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveSearchOutcome {
    /// Relative threshold in (0, 1); `sparsify(monomial, threshold)`
    /// reproduces `pattern`.
    pub threshold: f64,
    pub pattern: SparsityPattern,
    pub result: ReoptimizationResult,
    /// Number of full re-optimizations performed.
    pub evaluations: usize,
}

/// Ascending list of (relative threshold, pattern); later entries retain fewer terms.
fn candidate_patterns(
    monomial: &Polynomial,
    settings: &AdaptiveSearchSettings,
) -> Vec<(f64, SparsityPattern)> {
    let max = monomial.max_abs_coefficient();
    match &settings.candidates {
        Some(taus) => {
            let mut taus = taus.clone();
            taus.sort_by(|a, b| a.total_cmp(b));
            taus.dedup();
            taus.into_iter()
                .map(|tau| (tau, SparsityPattern::from_cutoff(monomial, tau * max, tau)))
                .collect()
        }
        None => {
            let relatives = candidate_thresholds(monomial);
            let below = std::iter::once(0.0).chain(relatives.iter().copied());
            relatives
                .iter()
                .zip(below)
                .map(|(&relative, previous)| {
                    // Cut at the magnitude itself so rounding in `relative * max`
                    // cannot drop the term that defines the candidate.
                    let cutoff = monomial
                        .coefficients()
                        .iter()
                        .map(|c| c.abs())
                        .filter(|m| *m / max >= relative)
                        .fold(f64::INFINITY, f64::min);
                    // Any τ strictly between neighbouring magnitudes selects the
                    // same terms; the midpoint is a valid `sparsify` argument.
                    let tau = 0.5 * (previous + relative);
                    (tau, SparsityPattern::from_cutoff(monomial, cutoff, tau))
                })
                .collect()
        }
    }
}

/// Most aggressive threshold whose re-optimized L2 ratio stays within
/// `max_degradation` of the original.
///
/// Binary search over candidate thresholds, assuming feasibility is
/// monotone in the threshold. Every candidate is a full extended-precision
/// re-optimization; a candidate that fails (for example on a rank-deficient
/// subset) counts as infeasible.
pub fn adaptive_threshold_search<S: ExtendedScalar>(
    original: &Polynomial,
    monomial: &Polynomial,
    settings: &AdaptiveSearchSettings,
) -> Result<AdaptiveSearchOutcome> {
    settings.validate()?;
    require_dense_monomial(monomial, "adaptive_threshold_search")?;
    let target = 1.0 - settings.max_degradation;
    let candidates = candidate_patterns(monomial, settings);
    let budget = settings.max_evaluations.unwrap_or(usize::MAX);

    let mut evaluations = 0usize;
    let mut best: Option<(usize, ReoptimizationResult)> = None;
    let mut best_ratio = f64::NAN;
    let (mut lo, mut hi) = (0usize, candidates.len());
    while lo < hi && evaluations < budget {
        let mid = lo + (hi - lo) / 2;
        let (tau, pattern) = &candidates[mid];
        evaluations += 1;
        match evaluate_candidate::<S>(original, monomial, *tau, pattern, &settings.reoptimize) {
            Some(result) => {
                best_ratio = closest_to_one(best_ratio, result.l2_ratio);
                if within_degradation(result.l2_ratio, settings.max_degradation) {
                    best = Some((mid, result));
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            None => hi = mid,
        }
    }

    finish_search(candidates, best, evaluations, target, best_ratio)
}

/// Parallel variant: re-optimizes every candidate concurrently and picks the
/// most aggressive feasible one. Costs `k` re-optimizations instead of
/// `O(log k)` but needs no monotonicity assumption. Memory grows with the
/// number of concurrent extended-precision solves.
#[cfg(feature = "parallel")]
pub fn adaptive_threshold_search_par<S: ExtendedScalar>(
    original: &Polynomial,
    monomial: &Polynomial,
    settings: &AdaptiveSearchSettings,
) -> Result<AdaptiveSearchOutcome> {
    use rayon::prelude::*;

    settings.validate()?;
    require_dense_monomial(monomial, "adaptive_threshold_search")?;
    let target = 1.0 - settings.max_degradation;
    let mut candidates = candidate_patterns(monomial, settings);
    if let Some(cap) = settings.max_evaluations {
        // Keep the most aggressive candidates when capped.
        let skip = candidates.len().saturating_sub(cap);
        candidates.drain(..skip);
    }
    let results: Vec<Option<ReoptimizationResult>> = candidates
        .par_iter()
        .map(|(tau, pattern)| {
            evaluate_candidate::<S>(original, monomial, *tau, pattern, &settings.reoptimize)
        })
        .collect();

    let evaluations = results.len();
    let best_ratio = results
        .iter()
        .flatten()
        .fold(f64::NAN, |acc, r| closest_to_one(acc, r.l2_ratio));
    let best = results
        .into_iter()
        .enumerate()
        .filter_map(|(index, result)| result.map(|r| (index, r)))
        .filter(|(_, r)| within_degradation(r.l2_ratio, settings.max_degradation))
        .last();

    finish_search(candidates, best, evaluations, target, best_ratio)
}

fn within_degradation(ratio: f64, max_degradation: f64) -> bool {
    (1.0 - ratio).abs() <= max_degradation
}

fn closest_to_one(current: f64, ratio: f64) -> f64 {
    if current.is_nan() || (1.0 - ratio).abs() < (1.0 - current).abs() {
        ratio
    } else {
        current
    }
}

fn evaluate_candidate<S: ExtendedScalar>(
    original: &Polynomial,
    monomial: &Polynomial,
    tau: f64,
    pattern: &SparsityPattern,
    settings: &ReoptimizeSettings,
) -> Option<ReoptimizationResult> {
    match reoptimize::<S>(original, monomial, pattern, settings) {
        Ok(result) => {
            tracing::debug!(
                target: "sparsify",
                tau,
                retained = result.retained_terms,
                ratio = result.l2_ratio,
                "adaptive search candidate"
            );
            Some(result)
        }
        Err(err) => {
            tracing::warn!(
                target: "sparsify",
                tau,
                retained = pattern.retained(),
                error = %err,
                "adaptive search candidate failed"
            );
            None
        }
    }
}

fn finish_search(
    candidates: Vec<(f64, SparsityPattern)>,
    best: Option<(usize, ReoptimizationResult)>,
    evaluations: usize,
    target: f64,
    best_ratio: f64,
) -> Result<AdaptiveSearchOutcome> {
    match best {
        Some((index, result)) => {
            let (threshold, pattern) = candidates
                .into_iter()
                .nth(index)
                .ok_or(Error::AdaptiveSearchExhausted { target, best_ratio })?;
            tracing::debug!(
                target: "sparsify",
                threshold,
                retained = result.retained_terms,
                ratio = result.l2_ratio,
                evaluations,
                "adaptive search selected threshold"
            );
            Ok(AdaptiveSearchOutcome {
                threshold,
                pattern,
                result,
                evaluations,
            })
        }
        None => Err(Error::AdaptiveSearchExhausted { target, best_ratio }),
    }
}
