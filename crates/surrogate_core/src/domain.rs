use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned box `center ± half_widths` on which a surrogate is fitted.
///
/// Polynomials are expressed in the normalized coordinate
/// `u = (x - center) / half_width`, which maps the box onto [-1, 1]ⁿ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    center: Vec<f64>,
    half_widths: Vec<f64>,
}

impl Domain {
    pub fn new(center: Vec<f64>, half_widths: Vec<f64>) -> Result<Self> {
        if center.is_empty() {
            return Err(Error::DimensionMismatch {
                context: "domain center",
                expected: 1,
                found: 0,
            });
        }
        if center.len() != half_widths.len() {
            return Err(Error::DimensionMismatch {
                context: "domain half-widths",
                expected: center.len(),
                found: half_widths.len(),
            });
        }
        if center.iter().any(|c| !c.is_finite()) {
            return Err(Error::NonFiniteInput("domain center"));
        }
        if half_widths.iter().any(|h| !h.is_finite() || *h <= 0.0) {
            return Err(Error::InvalidSettings(
                "domain half-widths must be positive and finite".to_string(),
            ));
        }
        Ok(Self {
            center,
            half_widths,
        })
    }

    /// The reference box [-1, 1]ⁿ.
    pub fn unit(dim: usize) -> Result<Self> {
        Self::new(vec![0.0; dim], vec![1.0; dim])
    }

    /// Box spanned by per-axis bounds.
    pub fn from_bounds(lower: &[f64], upper: &[f64]) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(Error::DimensionMismatch {
                context: "domain bounds",
                expected: lower.len(),
                found: upper.len(),
            });
        }
        let center = lower
            .iter()
            .zip(upper)
            .map(|(l, u)| 0.5 * (l + u))
            .collect();
        let half_widths = lower
            .iter()
            .zip(upper)
            .map(|(l, u)| 0.5 * (u - l))
            .collect();
        Self::new(center, half_widths)
    }

    pub fn dimension(&self) -> usize {
        self.center.len()
    }

    pub fn center(&self) -> &[f64] {
        &self.center
    }

    pub fn half_widths(&self) -> &[f64] {
        &self.half_widths
    }

    /// Lebesgue measure of the box.
    pub fn volume(&self) -> f64 {
        self.half_widths.iter().map(|h| 2.0 * h).product()
    }

    /// Jacobian of the map from normalized to physical coordinates.
    pub fn jacobian(&self) -> f64 {
        self.half_widths.iter().product()
    }

    pub fn to_normalized(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.center.iter().zip(&self.half_widths))
            .map(|(xi, (c, h))| (xi - c) / h)
            .collect()
    }

    pub fn to_physical(&self, u: &[f64]) -> Vec<f64> {
        u.iter()
            .zip(self.center.iter().zip(&self.half_widths))
            .map(|(ui, (c, h))| c + h * ui)
            .collect()
    }

    /// Membership test with a relative slack `tolerance` in normalized units.
    pub fn contains(&self, x: &[f64], tolerance: f64) -> bool {
        x.len() == self.dimension()
            && self
                .to_normalized(x)
                .iter()
                .all(|u| u.is_finite() && u.abs() <= 1.0 + tolerance)
    }
}
