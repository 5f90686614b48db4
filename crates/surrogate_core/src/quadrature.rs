//! Gauss–Legendre quadrature on [-1, 1] and its tensor products.

use std::f64::consts::PI;

const NEWTON_TOLERANCE: f64 = 1e-15;
const NEWTON_MAX_STEPS: usize = 100;

/// Nodes (ascending) and weights of the `n`-point Gauss–Legendre rule.
///
/// Exact for polynomials of degree ≤ 2n − 1 under unit weight.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    for i in 0..(n + 1) / 2 {
        // Chebyshev-like initial guess for the i-th largest root of Pₙ.
        let mut z = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut derivative = 1.0;
        for _ in 0..NEWTON_MAX_STEPS {
            let (value, slope) = legendre_with_derivative(n, z);
            derivative = slope;
            let step = value / slope;
            z -= step;
            if step.abs() < NEWTON_TOLERANCE {
                break;
            }
        }
        let (_, slope) = legendre_with_derivative(n, z);
        if slope.is_finite() {
            derivative = slope;
        }
        let weight = 2.0 / ((1.0 - z * z) * derivative * derivative);
        nodes[i] = -z;
        nodes[n - 1 - i] = z;
        weights[i] = weight;
        weights[n - 1 - i] = weight;
    }
    (nodes, weights)
}

/// `Pₙ(z)` and `Pₙ'(z)` for |z| < 1.
fn legendre_with_derivative(n: usize, z: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = 0.0;
    for j in 0..n {
        let p2 = p1;
        p1 = p0;
        let jf = j as f64;
        p0 = ((2.0 * jf + 1.0) * z * p1 - jf * p2) / (jf + 1.0);
    }
    let slope = n as f64 * (z * p0 - p1) / (z * z - 1.0);
    (p0, slope)
}

/// Tensor-product Gauss–Legendre rule with a per-axis node count.
#[derive(Debug, Clone)]
pub struct TensorQuadrature {
    axes: Vec<(Vec<f64>, Vec<f64>)>,
}

impl TensorQuadrature {
    pub fn new(nodes_per_axis: &[usize]) -> Self {
        Self {
            axes: nodes_per_axis
                .iter()
                .map(|&n| gauss_legendre(n.max(1)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.axes.iter().map(|(nodes, _)| nodes.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Σ wᵢ f(uᵢ) over [-1, 1]ⁿ.
    pub fn integrate<F>(&self, mut integrand: F) -> f64
    where
        F: FnMut(&[f64]) -> f64,
    {
        let dim = self.axes.len();
        if dim == 0 {
            return 0.0;
        }
        let mut cursor = vec![0usize; dim];
        let mut point = vec![0.0; dim];
        let mut total = 0.0;
        loop {
            let mut weight = 1.0;
            for (axis, &idx) in cursor.iter().enumerate() {
                point[axis] = self.axes[axis].0[idx];
                weight *= self.axes[axis].1[idx];
            }
            total += weight * integrand(&point);

            let mut axis = dim;
            loop {
                if axis == 0 {
                    return total;
                }
                axis -= 1;
                cursor[axis] += 1;
                if cursor[axis] < self.axes[axis].0.len() {
                    break;
                }
                cursor[axis] = 0;
            }
        }
    }
}
