//! Dense linear algebra over [`ExtendedScalar`].
//!
//! nalgebra covers the double-precision work; these routines exist because
//! the sparse monomial solve has to run in arbitrary precision. Matrices are
//! row-major and small (tens of columns), so the algorithms favour clarity
//! over blocking.

use crate::precision::{ExtendedScalar, Precision};

/// Row-major dense matrix.
#[derive(Debug, Clone)]
pub struct Matrix<S> {
    rows: usize,
    cols: usize,
    data: Vec<S>,
}

impl<S: ExtendedScalar> Matrix<S> {
    pub fn zeros(rows: usize, cols: usize, precision: Precision) -> Self {
        Self {
            rows,
            cols,
            data: vec![S::zero(precision); rows * cols],
        }
    }

    pub fn from_row_major(rows: usize, cols: usize, data: Vec<S>) -> Option<Self> {
        if data.len() != rows * cols {
            return None;
        }
        Some(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> &S {
        &self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: S) {
        self.data[row * self.cols + col] = value;
    }

    /// Normal-equations matrix `AᵀA`.
    pub fn gram(&self, precision: Precision) -> Matrix<S> {
        let n = self.cols;
        let mut gram = Matrix::zeros(n, n, precision);
        for j in 0..n {
            for k in j..n {
                let mut sum = S::zero(precision);
                for i in 0..self.rows {
                    sum = sum + self.get(i, j).clone() * self.get(i, k).clone();
                }
                gram.set(k, j, sum.clone());
                gram.set(j, k, sum);
            }
        }
        gram
    }

    /// `Aᵀy`.
    pub fn transpose_mul(&self, y: &[S], precision: Precision) -> Vec<S> {
        (0..self.cols)
            .map(|j| {
                (0..self.rows).fold(S::zero(precision), |acc, i| {
                    acc + self.get(i, j).clone() * y[i].clone()
                })
            })
            .collect()
    }
}

/// Outcome of a factorization-based solve.
///
/// `solution` is only meaningful when `rank == cols`; callers decide how a
/// deficient rank is reported.
#[derive(Debug, Clone)]
pub struct SolveOutcome<S> {
    pub solution: Vec<S>,
    pub rank: usize,
    pub cols: usize,
    /// Ratio of the largest to the smallest pivot (QR) or singular value (SVD).
    pub condition: f64,
    pub converged: bool,
}

impl<S> SolveOutcome<S> {
    pub fn is_full_rank(&self) -> bool {
        self.converged && self.rank == self.cols
    }
}

fn norm<S: ExtendedScalar>(values: &[S], precision: Precision) -> S {
    values
        .iter()
        .fold(S::zero(precision), |acc, v| acc + v.clone() * v.clone())
        .sqrt()
}

/// Solves `A x = b` (least squares when `A` is tall) with Householder QR.
///
/// A pivot `|Rᵢᵢ| ≤ tolerance · max |Rⱼⱼ|` counts as rank loss. The
/// condition value is the pivot ratio, a lower bound on the 2-norm
/// condition number of `A`.
pub fn householder_qr_solve<S: ExtendedScalar>(
    matrix: &Matrix<S>,
    rhs: &[S],
    tolerance: &S,
    precision: Precision,
) -> SolveOutcome<S> {
    let (m, n) = (matrix.rows, matrix.cols);
    let zero = S::zero(precision);
    let two = S::from_f64(2.0, precision);
    let mut a = matrix.clone();
    let mut b = rhs.to_vec();

    for k in 0..n.min(m) {
        let column: Vec<S> = (k..m).map(|i| a.get(i, k).clone()).collect();
        let column_norm = norm(&column, precision);
        if column_norm.is_zero() {
            continue;
        }
        let alpha = if column[0] < zero {
            column_norm
        } else {
            -column_norm
        };
        let mut v = column;
        v[0] = v[0].clone() - alpha.clone();
        let v_norm_sq = v
            .iter()
            .fold(zero.clone(), |acc, x| acc + x.clone() * x.clone());
        if v_norm_sq.is_zero() {
            continue;
        }
        for j in k..n {
            let dot = v
                .iter()
                .enumerate()
                .fold(zero.clone(), |acc, (offset, vi)| {
                    acc + vi.clone() * a.get(k + offset, j).clone()
                });
            let scale = two.clone() * dot / v_norm_sq.clone();
            for (offset, vi) in v.iter().enumerate() {
                let updated = a.get(k + offset, j).clone() - scale.clone() * vi.clone();
                a.set(k + offset, j, updated);
            }
        }
        let dot = v
            .iter()
            .enumerate()
            .fold(zero.clone(), |acc, (offset, vi)| {
                acc + vi.clone() * b[k + offset].clone()
            });
        let scale = two.clone() * dot / v_norm_sq;
        for (offset, vi) in v.iter().enumerate() {
            b[k + offset] = b[k + offset].clone() - scale.clone() * vi.clone();
        }
    }

    let pivots: Vec<S> = (0..n.min(m)).map(|i| a.get(i, i).abs()).collect();
    let largest = pivots
        .iter()
        .cloned()
        .fold(zero.clone(), |acc, p| if p > acc { p } else { acc });
    let smallest = pivots.iter().cloned().fold(largest.clone(), |acc, p| {
        if p < acc {
            p
        } else {
            acc
        }
    });
    let cutoff = largest.clone() * tolerance.clone();
    let rank = pivots.iter().filter(|p| **p > cutoff).count();
    let converged = pivots.iter().all(|p| p.is_finite());
    let condition = if n == 0 || smallest.is_zero() {
        f64::INFINITY
    } else {
        (largest / smallest).to_f64()
    };

    let mut solution = vec![zero.clone(); n];
    if rank == n && n <= m {
        for i in (0..n).rev() {
            let mut sum = b[i].clone();
            for j in (i + 1)..n {
                sum = sum - a.get(i, j).clone() * solution[j].clone();
            }
            solution[i] = sum / a.get(i, i).clone();
        }
    }

    SolveOutcome {
        solution,
        rank,
        cols: n,
        condition,
        converged,
    }
}

/// Singular values and right/left factors from one-sided Jacobi.
#[derive(Debug, Clone)]
pub struct JacobiSvd<S> {
    /// Columns of `A V`, normalized where the singular value is nonzero.
    pub u: Matrix<S>,
    pub singular_values: Vec<S>,
    pub v: Matrix<S>,
    pub sweeps: usize,
    pub converged: bool,
}

const MAX_JACOBI_SWEEPS: usize = 80;

/// One-sided (Hestenes) Jacobi SVD of an `m × n` matrix with `m ≥ n`.
///
/// Each sweep orthogonalizes every column pair; convergence is declared
/// when a full sweep performs no rotation above the roundoff level.
pub fn jacobi_svd<S: ExtendedScalar>(matrix: &Matrix<S>, precision: Precision) -> JacobiSvd<S> {
    let (m, n) = (matrix.rows, matrix.cols);
    let zero = S::zero(precision);
    let one = S::one(precision);
    let two = S::from_f64(2.0, precision);
    // Rounding noise in the column dot products grows with the row count.
    let epsilon = S::effective_precision(precision).epsilon::<S>()
        * S::from_f64((8 * m.max(1)) as f64, precision);
    let mut u = matrix.clone();
    let mut v = Matrix::zeros(n, n, precision);
    for i in 0..n {
        v.set(i, i, one.clone());
    }

    let mut sweeps = 0;
    let mut converged = false;
    while sweeps < MAX_JACOBI_SWEEPS {
        sweeps += 1;
        let mut rotated = false;
        for p in 0..n {
            for q in (p + 1)..n {
                let mut alpha = zero.clone();
                let mut beta = zero.clone();
                let mut gamma = zero.clone();
                for i in 0..m {
                    let up = u.get(i, p).clone();
                    let uq = u.get(i, q).clone();
                    alpha = alpha + up.clone() * up.clone();
                    beta = beta + uq.clone() * uq.clone();
                    gamma = gamma + up * uq;
                }
                if gamma.is_zero() {
                    continue;
                }
                let threshold = epsilon.clone() * (alpha.clone() * beta.clone()).sqrt();
                if gamma.abs() <= threshold {
                    continue;
                }
                rotated = true;
                let zeta = (beta - alpha) / (two.clone() * gamma);
                let root = (one.clone() + zeta.clone() * zeta.clone()).sqrt();
                let t = if zeta < zero {
                    -(one.clone() / (zeta.abs() + root))
                } else {
                    one.clone() / (zeta + root)
                };
                let c = one.clone() / (one.clone() + t.clone() * t.clone()).sqrt();
                let s = c.clone() * t;
                for i in 0..m {
                    let up = u.get(i, p).clone();
                    let uq = u.get(i, q).clone();
                    u.set(i, p, c.clone() * up.clone() - s.clone() * uq.clone());
                    u.set(i, q, s.clone() * up + c.clone() * uq);
                }
                for i in 0..n {
                    let vp = v.get(i, p).clone();
                    let vq = v.get(i, q).clone();
                    v.set(i, p, c.clone() * vp.clone() - s.clone() * vq.clone());
                    v.set(i, q, s.clone() * vp + c.clone() * vq);
                }
            }
        }
        if !rotated {
            converged = true;
            break;
        }
    }

    let mut singular_values = Vec::with_capacity(n);
    for j in 0..n {
        let column: Vec<S> = (0..m).map(|i| u.get(i, j).clone()).collect();
        let sigma = norm(&column, precision);
        if !sigma.is_zero() {
            for i in 0..m {
                let scaled = u.get(i, j).clone() / sigma.clone();
                u.set(i, j, scaled);
            }
        }
        singular_values.push(sigma);
    }

    JacobiSvd {
        u,
        singular_values,
        v,
        sweeps,
        converged,
    }
}

/// Least-squares solve through the SVD pseudo-inverse.
///
/// Singular values at or below `tolerance · σ_max` are truncated and reduce
/// the reported rank.
pub fn svd_solve<S: ExtendedScalar>(
    matrix: &Matrix<S>,
    rhs: &[S],
    tolerance: &S,
    precision: Precision,
) -> SolveOutcome<S> {
    let n = matrix.cols;
    let zero = S::zero(precision);
    let svd = jacobi_svd(matrix, precision);
    let largest = svd
        .singular_values
        .iter()
        .cloned()
        .fold(zero.clone(), |acc, s| if s > acc { s } else { acc });
    let smallest = svd
        .singular_values
        .iter()
        .cloned()
        .fold(largest.clone(), |acc, s| if s < acc { s } else { acc });
    let cutoff = largest.clone() * tolerance.clone();

    let mut solution = vec![zero.clone(); n];
    let mut rank = 0;
    for (j, sigma) in svd.singular_values.iter().enumerate() {
        if *sigma <= cutoff {
            continue;
        }
        rank += 1;
        let projection = (0..matrix.rows).fold(zero.clone(), |acc, i| {
            acc + svd.u.get(i, j).clone() * rhs[i].clone()
        });
        let weight = projection / sigma.clone();
        for (i, entry) in solution.iter_mut().enumerate() {
            *entry = entry.clone() + svd.v.get(i, j).clone() * weight.clone();
        }
    }

    let condition = if n == 0 || smallest.is_zero() {
        f64::INFINITY
    } else {
        (largest / smallest).to_f64()
    };

    SolveOutcome {
        solution,
        rank,
        cols: n,
        condition,
        converged: svd.converged,
    }
}
