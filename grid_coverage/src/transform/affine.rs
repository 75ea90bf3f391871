//! Two-dimensional affine transform.

use std::sync::Arc;

use nalgebra::{DMatrix, Matrix2, Matrix3};

use super::{packed_len, MathTransform, MathTransform2D};
use crate::error::{CoverageError, Result};
use crate::geometry::Point;

/// Affine map `x' = m00*x + m01*y + m02`, `y' = m10*x + m11*y + m12`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AffineTransform2D {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m11: f64,
    pub m02: f64,
    pub m12: f64,
}

impl Default for AffineTransform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform2D {
    /// Creates a transform from its coefficients, in column-major order.
    pub fn new(m00: f64, m10: f64, m01: f64, m11: f64, m02: f64, m12: f64) -> Self {
        Self {
            m00,
            m10,
            m01,
            m11,
            m02,
            m12,
        }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Counter-clockwise rotation about the origin, in radians.
    pub fn rotation(theta: f64) -> Self {
        let (sin, cos) = theta.sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// Builds a transform from the upper two rows of a 3x3 matrix.
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Self::new(m[(0, 0)], m[(1, 0)], m[(0, 1)], m[(1, 1)], m[(0, 2)], m[(1, 2)])
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.m00, self.m01, self.m02, //
            self.m10, self.m11, self.m12, //
            0.0, 0.0, 1.0,
        )
    }

    /// Linear part of the transform.
    pub fn linear(&self) -> Matrix2<f64> {
        Matrix2::new(self.m00, self.m01, self.m10, self.m11)
    }

    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.m00 * p.x + self.m01 * p.y + self.m02,
            self.m10 * p.x + self.m11 * p.y + self.m12,
        )
    }

    /// Applies only the linear part, ignoring the translation.
    pub fn apply_delta(&self, p: Point) -> Point {
        Point::new(
            self.m00 * p.x + self.m01 * p.y,
            self.m10 * p.x + self.m11 * p.y,
        )
    }

    /// Returns the inverse transform, or [`CoverageError::Noninvertible`] when
    /// the determinant is zero or not finite.
    pub fn invert(&self) -> Result<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(CoverageError::Noninvertible);
        }
        let m00 = self.m11 / det;
        let m10 = -self.m10 / det;
        let m01 = -self.m01 / det;
        let m11 = self.m00 / det;
        let m02 = (self.m01 * self.m12 - self.m11 * self.m02) / det;
        let m12 = (self.m10 * self.m02 - self.m00 * self.m12) / det;
        Ok(Self::new(m00, m10, m01, m11, m02, m12))
    }

    /// Maps `p` through the inverse transform without building it.
    pub fn inverse_apply(&self, p: Point) -> Result<Point> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(CoverageError::Noninvertible);
        }
        let dx = p.x - self.m02;
        let dy = p.y - self.m12;
        Ok(Point::new(
            (dx * self.m11 - dy * self.m01) / det,
            (dy * self.m00 - dx * self.m10) / det,
        ))
    }

    /// Returns `self ∘ other`: `other` is applied first.
    pub fn concatenate(&self, other: &AffineTransform2D) -> Self {
        Self::from_matrix(&(self.to_matrix() * other.to_matrix()))
    }

    /// Returns `other ∘ self`: `self` is applied first.
    pub fn pre_concatenate(&self, other: &AffineTransform2D) -> Self {
        other.concatenate(self)
    }
}

impl MathTransform for AffineTransform2D {
    fn source_dimensions(&self) -> usize {
        2
    }

    fn target_dimensions(&self) -> usize {
        2
    }

    fn transform(&self, src: &[f64], dst: &mut [f64]) -> Result<()> {
        packed_len(src, dst, 2, 2)?;
        for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
            let q = self.apply(Point::new(s[0], s[1]));
            d[0] = q.x;
            d[1] = q.y;
        }
        Ok(())
    }

    fn derivative(&self, _point: Option<&[f64]>) -> Result<DMatrix<f64>> {
        Ok(DMatrix::from_row_slice(
            2,
            2,
            &[self.m00, self.m01, self.m10, self.m11],
        ))
    }

    fn inverse(&self) -> Result<Arc<dyn MathTransform>> {
        Ok(Arc::new(self.invert()?))
    }

    fn is_identity(&self) -> bool {
        AffineTransform2D::is_identity(self)
    }

    fn matrix(&self) -> Option<DMatrix<f64>> {
        let m = self.to_matrix();
        Some(DMatrix::from_fn(3, 3, |r, c| m[(r, c)]))
    }

    fn into_2d(self: Arc<Self>) -> Option<Arc<dyn MathTransform2D>> {
        Some(self)
    }
}

impl MathTransform2D for AffineTransform2D {
    fn transform_point(&self, p: Point) -> Result<Point> {
        Ok(self.apply(p))
    }

    fn derivative_at(&self, _p: Point) -> Result<Matrix2<f64>> {
        Ok(self.linear())
    }

    fn inverse_2d(&self) -> Result<Arc<dyn MathTransform2D>> {
        Ok(Arc::new(self.invert()?))
    }
}
