//! Coordinate transform capabilities.
//!
//! [`MathTransform`] is the general N-dimensional contract consumed by
//! [`GridGeometry`](crate::coverage::GridGeometry); [`MathTransform2D`] adds the
//! point-based API used when mapping pixels to world coordinates and back.

use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, Matrix2};

use crate::error::{CoverageError, Result};
use crate::geometry::Point;

pub mod affine;
pub mod matrix;

pub use affine::AffineTransform2D;
pub use matrix::MatrixTransform;

/// Transform between two coordinate spaces of possibly different dimensions.
pub trait MathTransform: fmt::Debug + Send + Sync {
    fn source_dimensions(&self) -> usize;

    fn target_dimensions(&self) -> usize;

    /// Transforms packed source points into `dst`.
    ///
    /// `src` holds `n * source_dimensions()` ordinates and `dst` must hold
    /// exactly `n * target_dimensions()`.
    fn transform(&self, src: &[f64], dst: &mut [f64]) -> Result<()>;

    /// Jacobian of the transform at `point`, `target x source`.
    ///
    /// With `None` the derivative must be location independent; transforms
    /// whose derivative varies return an error.
    fn derivative(&self, point: Option<&[f64]>) -> Result<DMatrix<f64>>;

    fn inverse(&self) -> Result<Arc<dyn MathTransform>>;

    fn is_identity(&self) -> bool {
        false
    }

    /// Augmented `(target+1) x (source+1)` matrix when the transform is affine.
    fn matrix(&self) -> Option<DMatrix<f64>> {
        None
    }

    /// Views this transform as a two-dimensional one, when it is.
    fn into_2d(self: Arc<Self>) -> Option<Arc<dyn MathTransform2D>> {
        None
    }
}

/// Two-dimensional transform with a point-based API.
pub trait MathTransform2D: MathTransform {
    fn transform_point(&self, p: Point) -> Result<Point>;

    /// 2x2 Jacobian at `p`.
    fn derivative_at(&self, p: Point) -> Result<Matrix2<f64>>;

    fn inverse_2d(&self) -> Result<Arc<dyn MathTransform2D>>;

    /// Transforms `num_pts` points of `buf` starting at `src_off` and writes
    /// them back into `buf` starting at `dst_off`. The two ranges may overlap.
    fn transform_within(
        &self,
        buf: &mut [f64],
        src_off: usize,
        dst_off: usize,
        num_pts: usize,
    ) -> Result<()> {
        map_within(buf, src_off, dst_off, num_pts, |p| self.transform_point(p))
    }
}

/// Number of points packed in `src`, checking that `dst` has a matching size.
pub(crate) fn packed_len(src: &[f64], dst: &[f64], src_dim: usize, dst_dim: usize) -> Result<usize> {
    if src_dim == 0 || src.len() % src_dim != 0 {
        return Err(CoverageError::mismatch(src_dim, src.len()));
    }
    let n = src.len() / src_dim;
    if dst.len() != n * dst_dim {
        return Err(CoverageError::mismatch(n * dst_dim, dst.len()));
    }
    Ok(n)
}

/// Applies `f` to `num_pts` packed points of `buf`, reading from `src_off` and
/// writing to `dst_off`.
///
/// Iterates backward when the destination starts after the source so that
/// overlapping ranges never overwrite points that are still to be read.
pub(crate) fn map_within<F>(
    buf: &mut [f64],
    src_off: usize,
    dst_off: usize,
    num_pts: usize,
    mut f: F,
) -> Result<()>
where
    F: FnMut(Point) -> Result<Point>,
{
    let span = num_pts * 2;
    for off in [src_off, dst_off] {
        if off + span > buf.len() {
            return Err(CoverageError::out_of_range(
                (off + span) as i64,
                buf.len() as i64 + 1,
            ));
        }
    }
    let backward = dst_off > src_off;
    for k in 0..num_pts {
        let i = if backward { num_pts - 1 - k } else { k };
        let s = src_off + 2 * i;
        let d = dst_off + 2 * i;
        let q = f(Point::new(buf[s], buf[s + 1]))?;
        buf[d] = q.x;
        buf[d + 1] = q.y;
    }
    Ok(())
}
