//! Error types for the surrogate pipeline.
//!
//! Structural failures (singular or rank-deficient systems, mismatched
//! inputs) are raised to the caller with the context needed to diagnose
//! them. Per-point Hessian failures and quality degradation are *not*
//! errors: they are recorded on the classifier records and the
//! re-optimization result respectively.

/// Errors raised by the fitting, conversion, sparsification and
/// re-optimization stages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The basis family name is not one of the supported families.
    #[error("Unknown basis family `{0}`; expected one of chebyshev, legendre, monomial")]
    UnknownBasis(String),

    /// An operation that relies on orthogonality was given a monomial polynomial.
    #[error("Operation `{0}` requires a polynomial in an orthogonal basis")]
    NotOrthogonal(&'static str),

    /// An operation that works on monomial coefficients was given an orthogonal polynomial.
    #[error("Operation `{0}` requires a polynomial in the monomial basis")]
    NotMonomial(&'static str),

    /// Fewer sample points than basis functions.
    #[error("Least-squares fit needs at least {required} samples, got {provided}")]
    InsufficientSamples { required: usize, provided: usize },

    /// A sample point lies outside the fitting domain.
    #[error("Sample {index} lies outside the fitting domain (coordinate {axis} = {value})")]
    SampleOutsideDomain { index: usize, axis: usize, value: f64 },

    /// Vectors or matrices whose sizes must agree do not.
    #[error("Dimension mismatch in {context}: expected {expected}, got {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// NaN or infinite values in caller-supplied data.
    #[error("Non-finite value in {0}")]
    NonFiniteInput(&'static str),

    /// The Gram matrix of the orthogonal design is numerically singular.
    #[error(
        "Design matrix (V^T V) is numerically singular [rows: {rows}, cols: {cols}, condition: {condition:e}]"
    )]
    DesignMatrixSingular {
        rows: usize,
        cols: usize,
        condition: f64,
    },

    /// The retained monomial terms are linearly dependent at the sample points.
    #[error(
        "Sparse monomial system is rank deficient (rank {rank} of {cols}) [rows: {rows}, cols: {cols}, condition: {condition:e}]"
    )]
    SparseSystemRankDeficient {
        rows: usize,
        cols: usize,
        rank: usize,
        condition: f64,
    },

    /// Relative threshold outside the open interval (0, 1).
    #[error("Relative threshold must lie in (0, 1), got {0}")]
    InvalidThreshold(f64),

    /// A sparsity pattern was applied to a polynomial with a different term ordering.
    #[error("Sparsity pattern was derived from a different term ordering ({pattern_terms} vs {polynomial_terms} terms)")]
    PatternMismatch {
        pattern_terms: usize,
        polynomial_terms: usize,
    },

    /// A sparsity pattern that retains no term at all.
    #[error("Sparsity pattern retains no terms ({total} dropped)")]
    EmptyPattern { total: usize },

    /// A settings struct failed validation.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// No candidate threshold met the requested degradation bound.
    #[error(
        "No candidate threshold satisfies the degradation bound (target ratio {target}, best observed {best_ratio})"
    )]
    AdaptiveSearchExhausted { target: f64, best_ratio: f64 },
}

/// Result alias for the surrogate pipeline.
pub type Result<T> = std::result::Result<T, Error>;
