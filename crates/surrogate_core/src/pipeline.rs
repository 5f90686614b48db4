//! Per-degree orchestration: fit, convert, sparsify, re-optimize.
//!
//! Runs synchronously on the caller's thread. Precision is whatever the
//! settings ask for; when the result comes back with a quality warning the
//! caller decides whether to retry with [`crate::precision::Precision::doubled`].

use crate::basis::{Basis, DegreeSpec};
use crate::classify::{Classification, CriticalPointRecord};
use crate::convert::to_monomial;
use crate::domain::Domain;
use crate::fit::{fit_polynomial, FitOutcome, FitSettings};
use crate::polynomial::{Polynomial, SampleSet};
use crate::precision::ExtendedScalar;
use crate::reoptimize::{
    reoptimize, QualityWarning, ReoptimizationResult, ReoptimizeSettings, SolverKind,
};
use crate::sparsify::{
    adaptive_threshold_search, sparsify, truncate, AdaptiveSearchSettings, SparsificationReport,
    SparsityPattern,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Sparsification {
    /// Single relative threshold τ.
    Fixed { tau: f64 },
    /// Binary search for the most aggressive threshold within a loss budget.
    /// Each candidate is a full re-optimization.
    Adaptive(AdaptiveSearchSettings),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// `chebyshev` or `legendre`.
    pub basis: String,
    pub normalized: bool,
    pub fit: FitSettings,
    pub sparsification: Sparsification,
    pub reoptimize: ReoptimizeSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            basis: "chebyshev".to_string(),
            normalized: false,
            fit: FitSettings::default(),
            sparsification: Sparsification::Fixed { tau: 1e-6 },
            reoptimize: ReoptimizeSettings::default(),
        }
    }
}

/// Per-degree output record for tabular export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegreeSummary {
    pub degree: DegreeSpec,
    pub basis: Basis,
    /// L2 norm of the fitted orthogonal polynomial over the domain.
    pub l2_norm: f64,
    pub fit_residual: f64,
    pub fit_condition: f64,
    pub threshold: Option<f64>,
    pub l2_ratio: f64,
    /// Ratio achieved by plain truncation of the same pattern, for comparison.
    pub truncated_l2_ratio: f64,
    pub original_terms: usize,
    pub retained_terms: usize,
    pub solver: SolverKind,
    pub precision_bits: u32,
    pub reoptimize_condition: f64,
    pub warnings: Vec<QualityWarning>,
}

#[derive(Debug, Clone)]
pub struct DegreeReport {
    pub fit: FitOutcome,
    pub monomial: Polynomial,
    /// Present for fixed-threshold runs.
    pub sparsification: Option<SparsificationReport>,
    pub pattern: SparsityPattern,
    pub reoptimized: ReoptimizationResult,
    pub summary: DegreeSummary,
}

impl DegreeReport {
    /// The sparse monomial polynomial handed to the root solver.
    pub fn sparse_polynomial(&self) -> &Polynomial {
        &self.reoptimized.polynomial
    }
}

/// Runs the surrogate pipeline for one degree.
pub fn run_degree<S: ExtendedScalar>(
    samples: Arc<SampleSet>,
    domain: Domain,
    degree: DegreeSpec,
    settings: &PipelineSettings,
) -> Result<DegreeReport> {
    let basis = Basis::from_name(&settings.basis, settings.normalized)
        .context("Invalid pipeline basis configuration.")?;
    if !basis.is_orthogonal() {
        bail!(
            "Pipeline basis must be an orthogonal family, got `{}`.",
            settings.basis
        );
    }

    let fit = fit_polynomial(samples, domain, basis.clone(), degree.clone(), &settings.fit)
        .context("Failed to fit the orthogonal surrogate.")?;
    let monomial =
        to_monomial(&fit.polynomial).context("Failed to expand the surrogate into monomials.")?;

    let (sparsification, pattern, reoptimized) = match &settings.sparsification {
        Sparsification::Fixed { tau } => {
            let report = sparsify(&monomial, *tau)
                .with_context(|| format!("Failed to sparsify at threshold {tau}."))?;
            let result =
                reoptimize::<S>(&fit.polynomial, &monomial, &report.pattern, &settings.reoptimize)
                    .context("Extended-precision re-optimization failed.")?;
            let pattern = report.pattern.clone();
            (Some(report), pattern, result)
        }
        Sparsification::Adaptive(search) => {
            let search = AdaptiveSearchSettings {
                reoptimize: settings.reoptimize,
                ..search.clone()
            };
            let outcome = adaptive_threshold_search::<S>(&fit.polynomial, &monomial, &search)
                .context("Adaptive threshold search failed.")?;
            (None, outcome.pattern, outcome.result)
        }
    };

    let truncated = truncate(&monomial, &pattern).context("Failed to truncate the expansion.")?;
    let truncated_l2_ratio = if reoptimized.original_l2 > 0.0 {
        truncated.l2_norm() / reoptimized.original_l2
    } else {
        1.0
    };

    let summary = DegreeSummary {
        degree,
        basis,
        l2_norm: reoptimized.original_l2,
        fit_residual: fit.residual_norm,
        fit_condition: fit.condition_number,
        threshold: pattern.threshold(),
        l2_ratio: reoptimized.l2_ratio,
        truncated_l2_ratio,
        original_terms: reoptimized.original_terms,
        retained_terms: reoptimized.retained_terms,
        solver: reoptimized.solver,
        precision_bits: reoptimized.precision.bits,
        reoptimize_condition: reoptimized.condition_number,
        warnings: reoptimized.warnings.clone(),
    };

    tracing::info!(
        target: "pipeline",
        degree = ?summary.degree,
        l2_ratio = summary.l2_ratio,
        truncated_l2_ratio = summary.truncated_l2_ratio,
        original_terms = summary.original_terms,
        retained_terms = summary.retained_terms,
        bits = summary.precision_bits,
        warnings = summary.warnings.len(),
        "degree complete"
    );

    Ok(DegreeReport {
        fit,
        monomial,
        sparsification,
        pattern,
        reoptimized,
        summary,
    })
}

/// Flat per-point row for tabular export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPointRow {
    pub index: usize,
    pub coordinates: Vec<f64>,
    pub classification: Classification,
    pub value: f64,
    pub gradient_norm: f64,
    pub eigenvalues: Vec<f64>,
    pub min_eigenvalue: f64,
    pub max_eigenvalue: f64,
    pub condition_number: f64,
    pub in_domain: Option<bool>,
    pub failure: Option<String>,
}

impl From<&CriticalPointRecord> for CriticalPointRow {
    fn from(record: &CriticalPointRecord) -> Self {
        Self {
            index: record.index,
            coordinates: record.coordinates.clone(),
            classification: record.classification,
            value: record.value,
            gradient_norm: record.gradient_norm,
            eigenvalues: record.eigenvalues.clone(),
            min_eigenvalue: record.min_eigenvalue,
            max_eigenvalue: record.max_eigenvalue,
            condition_number: record.condition_number,
            in_domain: record.in_domain,
            failure: record.failure.as_ref().map(|f| f.reason.clone()),
        }
    }
}
