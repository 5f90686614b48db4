use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that objectives can be evaluated in.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A scalar objective `f: Rⁿ → R`.
///
/// Implement it for `f64` to sample the objective and for
/// [`crate::autodiff::HyperDual`] to classify its critical points.
pub trait Objective<T: Scalar> {
    /// Returns the dimension of the input space.
    fn dimension(&self) -> usize;

    /// Evaluates the objective at `x`.
    fn value(&self, x: &[T]) -> T;
}
