//! N-dimensional affine transform backed by an augmented matrix.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use super::{packed_len, AffineTransform2D, MathTransform, MathTransform2D};
use crate::error::{CoverageError, Result};

/// Affine transform `y = A x + b` stored as the augmented
/// `(target+1) x (source+1)` matrix `[[A, b], [0, 1]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixTransform {
    matrix: DMatrix<f64>,
}

impl MatrixTransform {
    /// Wraps an augmented matrix. The last row must be `[0, .., 0, 1]`.
    pub fn new(matrix: DMatrix<f64>) -> Result<Self> {
        let (rows, cols) = matrix.shape();
        if rows < 2 || cols < 2 {
            return Err(CoverageError::IllegalArgument(format!(
                "augmented matrix must be at least 2x2, got {rows}x{cols}"
            )));
        }
        let last = matrix.row(rows - 1);
        let affine = last
            .iter()
            .enumerate()
            .all(|(c, &v)| if c + 1 == cols { v == 1.0 } else { v == 0.0 });
        if !affine {
            return Err(CoverageError::IllegalArgument(
                "last matrix row must be [0, .., 0, 1]".into(),
            ));
        }
        Ok(Self { matrix })
    }

    /// Axis-aligned transform `y_i = scale_i * x_i + offset_i`.
    pub fn diagonal(scales: &[f64], offsets: &[f64]) -> Result<Self> {
        if scales.len() != offsets.len() {
            return Err(CoverageError::mismatch(scales.len(), offsets.len()));
        }
        let n = scales.len();
        let mut m = DMatrix::<f64>::identity(n + 1, n + 1);
        for i in 0..n {
            m[(i, i)] = scales[i];
            m[(i, n)] = offsets[i];
        }
        Self::new(m)
    }

    pub fn identity(dimension: usize) -> Self {
        Self {
            matrix: DMatrix::identity(dimension + 1, dimension + 1),
        }
    }

    pub fn augmented(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Extracts the transform of the first two axes when output axes 0 and 1
    /// depend only on input axes 0 and 1.
    pub fn sub_transform_2d(&self) -> Option<AffineTransform2D> {
        let src = self.source_dimensions();
        let dst = self.target_dimensions();
        if src < 2 || dst < 2 {
            return None;
        }
        let m = &self.matrix;
        for row in 0..2 {
            if (2..src).any(|col| m[(row, col)] != 0.0) {
                return None;
            }
        }
        Some(AffineTransform2D::new(
            m[(0, 0)],
            m[(1, 0)],
            m[(0, 1)],
            m[(1, 1)],
            m[(0, src)],
            m[(1, src)],
        ))
    }
}

impl MathTransform for MatrixTransform {
    fn source_dimensions(&self) -> usize {
        self.matrix.ncols() - 1
    }

    fn target_dimensions(&self) -> usize {
        self.matrix.nrows() - 1
    }

    fn transform(&self, src: &[f64], dst: &mut [f64]) -> Result<()> {
        let s = self.source_dimensions();
        let t = self.target_dimensions();
        packed_len(src, dst, s, t)?;
        let linear = self.matrix.view((0, 0), (t, s)).into_owned();
        let offset: DVector<f64> = self.matrix.column(s).rows(0, t).into_owned();
        for (p, q) in src.chunks_exact(s).zip(dst.chunks_exact_mut(t)) {
            let y = &linear * DVector::from_column_slice(p) + &offset;
            q.copy_from_slice(y.as_slice());
        }
        Ok(())
    }

    fn derivative(&self, _point: Option<&[f64]>) -> Result<DMatrix<f64>> {
        let s = self.source_dimensions();
        let t = self.target_dimensions();
        Ok(self.matrix.view((0, 0), (t, s)).into_owned())
    }

    fn inverse(&self) -> Result<Arc<dyn MathTransform>> {
        if !self.matrix.is_square() {
            return Err(CoverageError::Noninvertible);
        }
        let mut inv = self
            .matrix
            .clone()
            .try_inverse()
            .ok_or(CoverageError::Noninvertible)?;
        if inv.iter().any(|v| !v.is_finite()) {
            return Err(CoverageError::Noninvertible);
        }
        // Clear rounding noise so the result passes the affine check.
        let n = inv.nrows() - 1;
        for c in 0..n {
            inv[(n, c)] = 0.0;
        }
        inv[(n, n)] = 1.0;
        Ok(Arc::new(MatrixTransform::new(inv)?))
    }

    fn is_identity(&self) -> bool {
        let (rows, cols) = self.matrix.shape();
        rows == cols && self.matrix == DMatrix::identity(rows, cols)
    }

    fn matrix(&self) -> Option<DMatrix<f64>> {
        Some(self.matrix.clone())
    }

    fn into_2d(self: Arc<Self>) -> Option<Arc<dyn MathTransform2D>> {
        if self.source_dimensions() != 2 || self.target_dimensions() != 2 {
            return None;
        }
        let affine = self.sub_transform_2d()?;
        Some(Arc::new(affine))
    }
}
