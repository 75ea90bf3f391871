//! Axis-aligned N-dimensional bounding box in world coordinates.

use geo_types::{coord, Rect};

use crate::error::{CoverageError, Result};

/// World-coordinate envelope given by per-axis minimum and maximum.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl Envelope {
    /// Creates an envelope from its corners. Both corners must have the same
    /// dimension and `min[i] <= max[i]` on every axis.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Result<Self> {
        if min.len() != max.len() {
            return Err(CoverageError::mismatch(min.len(), max.len()));
        }
        for (i, (lo, hi)) in min.iter().zip(&max).enumerate() {
            if lo > hi {
                return Err(CoverageError::IllegalArgument(format!(
                    "envelope axis {i} has minimum {lo} greater than maximum {hi}"
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// Creates a two-dimensional envelope from a rectangle.
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            min: vec![rect.min().x, rect.min().y],
            max: vec![rect.max().x, rect.max().y],
        }
    }

    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    pub fn minimum(&self, axis: usize) -> f64 {
        self.min[axis]
    }

    pub fn maximum(&self, axis: usize) -> f64 {
        self.max[axis]
    }

    pub fn length(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    pub fn center(&self, axis: usize) -> f64 {
        0.5 * (self.min[axis] + self.max[axis])
    }

    /// Returns the first two axes as a rectangle, or `None` below two dimensions.
    pub fn to_rect(&self) -> Option<Rect<f64>> {
        if self.dimension() < 2 {
            return None;
        }
        Some(Rect::new(
            coord! { x: self.min[0], y: self.min[1] },
            coord! { x: self.max[0], y: self.max[1] },
        ))
    }

    /// Smallest envelope enclosing all `points` (packed, `dimension` ordinates
    /// each). NaN ordinates are ignored.
    pub(crate) fn enclosing(points: &[f64], dimension: usize) -> Option<Self> {
        if dimension == 0 || points.len() < dimension {
            return None;
        }
        let mut min = vec![f64::INFINITY; dimension];
        let mut max = vec![f64::NEG_INFINITY; dimension];
        for p in points.chunks_exact(dimension) {
            for (i, &v) in p.iter().enumerate() {
                min[i] = min[i].min(v);
                max[i] = max[i].max(v);
            }
        }
        if min.iter().zip(&max).any(|(lo, hi)| lo > hi) {
            return None;
        }
        Some(Self { min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_axis() {
        let err = Envelope::new(vec![0.0, 10.0], vec![5.0, 2.0]).unwrap_err();
        assert!(matches!(err, CoverageError::IllegalArgument(_)));
    }

    #[test]
    fn enclosing_skips_nan() {
        let env = Envelope::enclosing(&[1.0, 2.0, f64::NAN, 8.0, -3.0, 4.0], 2).unwrap();
        assert_eq!(env.minimum(0), -3.0);
        assert_eq!(env.maximum(0), 1.0);
        assert_eq!(env.minimum(1), 2.0);
        assert_eq!(env.maximum(1), 8.0);
    }
}
