use crate::basis::{enumerate_terms, Basis, DegreeSpec, MultiIndex};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::polynomial::{Polynomial, SampleSet};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitSolver {
    Qr,
    Lu,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FitSettings {
    pub solver: FitSolver,
    /// Gram systems with `cond(VᵀV) > 1 / singular_tolerance` are rejected.
    pub singular_tolerance: f64,
    /// Slack (normalized units) allowed for samples on the domain boundary.
    pub domain_tolerance: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            solver: FitSolver::Qr,
            singular_tolerance: 1e-13,
            domain_tolerance: 1e-12,
        }
    }
}

impl FitSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.singular_tolerance > 0.0 && self.singular_tolerance < 1.0) {
            return Err(Error::InvalidSettings(
                "singular_tolerance must lie in (0, 1)".to_string(),
            ));
        }
        if !(self.domain_tolerance >= 0.0 && self.domain_tolerance.is_finite()) {
            return Err(Error::InvalidSettings(
                "domain_tolerance must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub polynomial: Polynomial,
    /// 2-norm condition number of the design matrix `V`.
    pub condition_number: f64,
    /// `‖V c − y‖₂` on the sample grid.
    pub residual_norm: f64,
}

/// Least-squares fit of sampled values in an orthogonal basis.
///
/// Solves the normal equations `VᵀV c = Vᵀy` with the configured
/// factorization. A numerically singular Gram matrix is reported as
/// [`Error::DesignMatrixSingular`] and never regularized.
pub fn fit_polynomial(
    samples: Arc<SampleSet>,
    domain: Domain,
    basis: Basis,
    degree: DegreeSpec,
    settings: &FitSettings,
) -> Result<FitOutcome> {
    settings.validate()?;
    let (family, normalized) = match &basis {
        Basis::Orthogonal { family, normalized } => (*family, *normalized),
        Basis::Monomial(_) => return Err(Error::NotOrthogonal("fit_polynomial")),
    };
    let dim = domain.dimension();
    if samples.dimension() != dim {
        return Err(Error::DimensionMismatch {
            context: "sample dimension vs domain",
            expected: dim,
            found: samples.dimension(),
        });
    }
    let terms = enumerate_terms(dim, &degree)?;
    let rows = samples.len();
    let cols = terms.len();
    if rows < cols {
        return Err(Error::InsufficientSamples {
            required: cols,
            provided: rows,
        });
    }

    let mut normalized_points = Vec::with_capacity(rows);
    for (index, x) in samples.points().enumerate() {
        let u = domain.to_normalized(x);
        if let Some(axis) = u
            .iter()
            .position(|v| v.abs() > 1.0 + settings.domain_tolerance)
        {
            return Err(Error::SampleOutsideDomain {
                index,
                axis,
                value: x[axis],
            });
        }
        normalized_points.push(u);
    }

    let maxima: Vec<u32> = (0..dim).map(|axis| degree.max_exponent(axis)).collect();
    let mut design = DMatrix::zeros(rows, cols);
    for (i, u) in normalized_points.iter().enumerate() {
        let tables: Vec<Vec<f64>> = maxima
            .iter()
            .zip(u)
            .map(|(&max, &ui)| family.evaluate_all(max, ui, normalized))
            .collect();
        for (j, term) in terms.iter().enumerate() {
            design[(i, j)] = design_entry(term, &tables);
        }
    }
    let y = DVector::from_column_slice(samples.values());

    let singular_values = design.singular_values();
    let largest = singular_values.max();
    let smallest = singular_values.min();
    let condition_number = if smallest > 0.0 {
        largest / smallest
    } else {
        f64::INFINITY
    };
    let gram_condition = condition_number * condition_number;
    if !gram_condition.is_finite() || gram_condition > 1.0 / settings.singular_tolerance {
        return Err(Error::DesignMatrixSingular {
            rows,
            cols,
            condition: gram_condition,
        });
    }

    let gram = design.transpose() * &design;
    let rhs = design.transpose() * &y;
    let solution = match settings.solver {
        FitSolver::Qr => gram.qr().solve(&rhs),
        FitSolver::Lu => gram.lu().solve(&rhs),
    }
    .ok_or(Error::DesignMatrixSingular {
        rows,
        cols,
        condition: gram_condition,
    })?;

    let residual_norm = (&design * &solution - &y).norm();
    tracing::debug!(
        target: "fit",
        rows,
        cols,
        condition = condition_number,
        residual = residual_norm,
        solver = ?settings.solver,
        "fitted orthogonal surrogate"
    );

    let polynomial = Polynomial::new(
        basis,
        degree,
        terms,
        solution.iter().copied().collect(),
        domain,
        samples,
    )?;

    Ok(FitOutcome {
        polynomial,
        condition_number,
        residual_norm,
    })
}

fn design_entry(term: &MultiIndex, tables: &[Vec<f64>]) -> f64 {
    term.exponents()
        .iter()
        .zip(tables)
        .map(|(&e, table)| table[e as usize])
        .product()
}
