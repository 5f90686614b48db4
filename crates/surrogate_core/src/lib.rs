//! The `surrogate_core` crate approximates a scalar objective on a box by a
//! polynomial surrogate and prepares it for polynomial root solving.
//! Fitting happens in a well-conditioned orthogonal basis; the surrogate is
//! then expanded exactly into monomials, thinned to a sparse term set, and
//! re-fitted over that set in extended precision.
//!
//! Key components:
//! - **Basis / Domain**: orthogonal families (Chebyshev, Legendre), the monomial basis, term orderings, and the map onto [-1, 1]ⁿ.
//! - **Fit**: least-squares fit of sampled values in an orthogonal basis (nalgebra).
//! - **Convert**: exact orthogonal-to-monomial expansion.
//! - **Sparsify / Reoptimize**: magnitude thresholding, adaptive threshold search, and the extended-precision re-fit over retained terms.
//! - **Precision / Linalg**: `ExtendedScalar` (f64 or `BigFloat`) with QR and Jacobi SVD solvers generic over it.
//! - **Autodiff / Classify**: hyper-dual numbers for exact Hessians and the eigenvalue-based critical-point classifier.
pub mod autodiff;
pub mod basis;
pub mod classify;
pub mod convert;
pub mod domain;
pub mod error;
pub mod fit;
pub mod linalg;
pub mod pipeline;
pub mod polynomial;
pub mod precision;
pub mod quadrature;
pub mod reoptimize;
pub mod sparsify;
pub mod traits;

pub use error::{Error, Result};
