//! Expansion of orthogonal-basis polynomials into the monomial basis.
//!
//! Each orthogonal term `c · Π φ_{aᵢ}(uᵢ)` is a tensor product of univariate
//! expansions, so its monomial contributions are the outer product of the
//! rows of the per-family expansion tables. Contributions are accumulated per
//! exponent vector. The result is exact up to rounding of the table entries,
//! but its coefficients can span many orders of magnitude.

use crate::basis::{Basis, MonomialSupport, MultiIndex, OrthogonalFamily};
use crate::error::{Error, Result};
use crate::polynomial::Polynomial;
use crate::precision::{ExtendedScalar, Precision};
use std::collections::HashMap;

/// Monomial form of `polynomial`, accumulated in double precision.
pub fn to_monomial(polynomial: &Polynomial) -> Result<Polynomial> {
    to_monomial_with::<f64>(polynomial, Precision::DOUBLE)
}

/// Monomial form of `polynomial`, accumulated in `S` and rounded to `f64`
/// once at the end.
///
/// The output keeps the input's term ordering: both index sets are the
/// same downward-closed degree space.
pub fn to_monomial_with<S: ExtendedScalar>(
    polynomial: &Polynomial,
    precision: Precision,
) -> Result<Polynomial> {
    let (family, normalized) = match polynomial.basis() {
        Basis::Orthogonal { family, normalized } => (*family, *normalized),
        Basis::Monomial(_) => return Err(Error::NotOrthogonal("to_monomial")),
    };
    let maxima = polynomial.max_exponents();
    let global_max = maxima.iter().copied().max().unwrap_or(0);
    let table = family.monomial_expansion::<S>(global_max, normalized, precision);

    let mut accumulated: HashMap<MultiIndex, S> = HashMap::new();
    for (term, coefficient) in polynomial.terms().iter().zip(polynomial.coefficients()) {
        if *coefficient == 0.0 {
            continue;
        }
        let seed = S::from_f64(*coefficient, precision);
        expand_term(term, seed, &table, &mut accumulated);
    }

    let coefficients: Vec<f64> = polynomial
        .terms()
        .iter()
        .map(|term| accumulated.get(term).map(S::to_f64).unwrap_or(0.0))
        .collect();

    tracing::debug!(
        target: "convert",
        family = ?family,
        terms = polynomial.term_count(),
        bits = S::effective_precision(precision).bits,
        "expanded orthogonal polynomial into monomials"
    );

    Polynomial::new(
        Basis::Monomial(MonomialSupport::Dense),
        polynomial.degree().clone(),
        polynomial.terms().to_vec(),
        coefficients,
        polynomial.domain().clone(),
        polynomial.samples().clone(),
    )
}

/// Adds the monomial contributions of `seed · Π φ_{aᵢ}` to `out`.
fn expand_term<S: ExtendedScalar>(
    term: &MultiIndex,
    seed: S,
    table: &[Vec<S>],
    out: &mut HashMap<MultiIndex, S>,
) {
    // Partial products over the leading axes, one exponent prefix each.
    let mut partial: Vec<(Vec<u32>, S)> = vec![(Vec::with_capacity(term.dimension()), seed)];
    for &degree in term.exponents() {
        let row = &table[degree as usize];
        let mut next = Vec::with_capacity(partial.len() * row.len());
        for (prefix, value) in &partial {
            for (power, entry) in row.iter().enumerate() {
                if entry.is_zero() {
                    continue;
                }
                let mut exponents = prefix.clone();
                exponents.push(power as u32);
                next.push((exponents, value.clone() * entry.clone()));
            }
        }
        partial = next;
    }
    for (exponents, value) in partial {
        let key = MultiIndex::new(exponents);
        match out.get_mut(&key) {
            Some(existing) => *existing = existing.clone() + value,
            None => {
                out.insert(key, value);
            }
        }
    }
}

/// Largest single-term expansion coefficient for `family` up to `max_degree`.
///
/// A rough indicator of how far monomial coefficients can stray from the
/// orthogonal ones; grows like 2^(d−1) for Chebyshev.
pub fn expansion_growth(family: OrthogonalFamily, max_degree: u32, normalized: bool) -> f64 {
    family
        .monomial_expansion::<f64>(max_degree, normalized, Precision::DOUBLE)
        .iter()
        .flatten()
        .fold(0.0f64, |acc, c| acc.max(c.abs()))
}
