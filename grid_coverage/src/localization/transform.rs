//! Transform backed by a frozen localization grid.
//!
//! The forward direction interpolates bilinearly between the four grid nodes
//! surrounding a grid coordinate. The inverse direction has no closed form: it
//! starts from the global affine fit, then repeatedly inverts the local affine
//! transform of the current cell until the cell no longer changes.

use std::sync::Arc;

use log::{trace, warn};
use nalgebra::{DMatrix, Matrix2};

use crate::error::{CoverageError, Result};
use crate::fit::fit_affine;
use crate::geometry::{distance, Point};
use crate::settings::InverseSettings;
use crate::transform::{map_within, packed_len, AffineTransform2D, MathTransform, MathTransform2D};

/// Immutable state shared by a grid transform and its inverse.
#[derive(Debug)]
struct GridPayload {
    width: usize,
    height: usize,
    coords: Arc<Vec<f64>>,
    global: AffineTransform2D,
    settings: InverseSettings,
}

/// Clamps a floored ordinate to the valid cell range `0..=max`.
fn clamp_cell(v: f64, max: usize) -> usize {
    let v = v.floor();
    if !(v > 0.0) {
        0
    } else if v >= max as f64 {
        max
    } else {
        v as usize
    }
}

impl GridPayload {
    fn cell(&self, p: Point) -> (usize, usize) {
        (
            clamp_cell(p.x, self.width - 2),
            clamp_cell(p.y, self.height - 2),
        )
    }

    /// Offsets of the nodes `(col,row)`, `(col+1,row)`, `(col,row+1)` and
    /// `(col+1,row+1)`.
    fn corners(&self, col: usize, row: usize) -> [usize; 4] {
        let o00 = (col + row * self.width) * 2;
        let o01 = o00 + self.width * 2;
        [o00, o00 + 2, o01, o01 + 2]
    }

    fn forward(&self, p: Point) -> Point {
        let (col, row) = self.cell(p);
        let [o00, o10, o01, o11] = self.corners(col, row);
        let g = &self.coords;
        let mx = p.x - col as f64;
        let my = p.y - row as f64;
        let x0 = g[o00] + mx * (g[o10] - g[o00]);
        let y0 = g[o00 + 1] + mx * (g[o10 + 1] - g[o00 + 1]);
        let x1 = g[o01] + mx * (g[o11] - g[o01]);
        let y1 = g[o01 + 1] + mx * (g[o11 + 1] - g[o01 + 1]);
        Point::new(x0 + my * (x1 - x0), y0 + my * (y1 - y0))
    }

    /// Affine transform through the nodes `(col,row)`, `(col+1,row)` and
    /// `(col,row+1)`. Exact at those three nodes.
    fn local_affine(&self, col: usize, row: usize) -> AffineTransform2D {
        let col = col.min(self.width - 2);
        let row = row.min(self.height - 2);
        let [o00, o10, o01, _] = self.corners(col, row);
        let g = &self.coords;
        let (x00, y00) = (g[o00], g[o00 + 1]);
        let dx1 = g[o10] - x00;
        let dy1 = g[o10 + 1] - y00;
        let dx2 = g[o01] - x00;
        let dy2 = g[o01 + 1] - y00;
        let (c, r) = (col as f64, row as f64);
        AffineTransform2D::new(
            dx1,
            dy1,
            dx2,
            dy2,
            x00 - c * dx1 - r * dx2,
            y00 - c * dy1 - r * dy2,
        )
    }

    /// Exact Jacobian of the bilinear patch of cell `(col,row)` at `p`.
    fn bilinear_jacobian(&self, col: usize, row: usize, p: Point) -> AffineTransform2D {
        let [o00, o10, o01, o11] = self.corners(col, row);
        let g = &self.coords;
        let mx = p.x - col as f64;
        let my = p.y - row as f64;
        let d = |a: usize, b: usize, k: usize| g[b + k] - g[a + k];
        let xc = (1.0 - my) * d(o00, o10, 0) + my * d(o01, o11, 0);
        let yc = (1.0 - my) * d(o00, o10, 1) + my * d(o01, o11, 1);
        let xr = (1.0 - mx) * d(o00, o01, 0) + mx * d(o10, o11, 0);
        let yr = (1.0 - mx) * d(o00, o01, 1) + mx * d(o10, o11, 1);
        AffineTransform2D::new(xc, yc, xr, yr, 0.0, 0.0)
    }

    /// Maps world point `target` back to grid coordinates.
    ///
    /// `seed` carries the converged cell of the previous point of a batch; the
    /// first point starts from the global affine fit.
    fn inverse(&self, target: Point, seed: &mut Option<(usize, usize)>) -> Result<Point> {
        let max_iter = self.settings.max_iterations.max(1);
        let mut cell = match *seed {
            Some(cell) => cell,
            None => self.cell(self.global.inverse_apply(target)?),
        };
        for iter in 0..max_iter {
            let estimate = self.local_affine(cell.0, cell.1).inverse_apply(target)?;
            let next = self.cell(estimate);
            trace!(
                "inverse ({}, {}) iteration {}: cell {:?} -> {:?}",
                target.x,
                target.y,
                iter,
                cell,
                next
            );
            if next == cell {
                *seed = Some(cell);
                return Ok(self.polish(target, estimate));
            }
            cell = next;
        }
        warn!(
            "no convergence after {} iterations for ({}, {}), searching best candidate",
            max_iter, target.x, target.y
        );
        self.search_best(target, cell, seed)
    }

    /// Bounded search over the cells visited by the oscillating refinement,
    /// keeping the candidate whose forward image is closest to `target`.
    fn search_best(
        &self,
        target: Point,
        mut cell: (usize, usize),
        seed: &mut Option<(usize, usize)>,
    ) -> Result<Point> {
        let max_iter = self.settings.max_iterations.max(1);
        let mut visited = Vec::with_capacity(max_iter + 1);
        visited.push(cell);
        let mut best: Option<(Point, f64, (usize, usize))> = None;
        for _ in 0..max_iter {
            let candidate = self.local_affine(cell.0, cell.1).inverse_apply(target)?;
            let dist = self.forward(candidate).distance_sq(target);
            if best.map_or(true, |(_, d, _)| dist < d) {
                best = Some((candidate, dist, cell));
            }
            let next = self.cell(candidate);
            if visited.contains(&next) {
                return self.accept(target, best, seed);
            }
            visited.push(next);
            cell = next;
        }
        warn!("fallback search for ({}, {}) found no cycle", target.x, target.y);
        Err(CoverageError::NoConvergence {
            x: target.x,
            y: target.y,
        })
    }

    fn accept(
        &self,
        target: Point,
        best: Option<(Point, f64, (usize, usize))>,
        seed: &mut Option<(usize, usize)>,
    ) -> Result<Point> {
        let no_convergence = CoverageError::NoConvergence {
            x: target.x,
            y: target.y,
        };
        let Some((candidate, dist, cell)) = best else {
            return Err(no_convergence);
        };
        if dist.is_nan() {
            return Err(no_convergence);
        }
        let refined = self.polish(target, candidate);
        if let Some(limit) = self.settings.max_residual {
            let residual = distance(self.forward(refined), target);
            if residual > limit {
                warn!(
                    "best candidate for ({}, {}) is {} away, above limit {}",
                    target.x, target.y, residual, limit
                );
                return Err(no_convergence);
            }
        }
        *seed = Some(cell);
        Ok(refined)
    }

    /// Newton refinement on the piecewise bilinear surface. A step is kept
    /// only when it brings the forward image closer to `target`, so the
    /// result is never worse than `p`.
    fn polish(&self, target: Point, mut p: Point) -> Point {
        let mut err = self.forward(p).distance_sq(target);
        for _ in 0..self.settings.max_iterations {
            if !(err > 0.0) {
                break;
            }
            let (col, row) = self.cell(p);
            let f = self.forward(p);
            let residual = Point::new(f.x - target.x, f.y - target.y);
            let Ok(step) = self.bilinear_jacobian(col, row, p).inverse_apply(residual) else {
                break;
            };
            let mut improved = false;
            let mut scale = 1.0;
            for _ in 0..4 {
                let q = Point::new(p.x - scale * step.x, p.y - scale * step.y);
                let e = self.forward(q).distance_sq(target);
                if e < err {
                    p = q;
                    err = e;
                    improved = true;
                    break;
                }
                scale *= 0.5;
            }
            if !improved {
                break;
            }
        }
        p
    }
}

/// Forward transform of a localization grid: grid coordinates to world
/// coordinates.
///
/// Cloning is cheap; clones share the same frozen coordinate buffer.
#[derive(Debug, Clone)]
pub struct GridTransform2D {
    payload: Arc<GridPayload>,
}

/// Inverse of a [`GridTransform2D`]: world coordinates to grid coordinates.
#[derive(Debug, Clone)]
pub struct GridTransform2DInverse {
    payload: Arc<GridPayload>,
}

impl GridTransform2D {
    /// Wraps a frozen coordinate buffer. The caller guarantees that `coords`
    /// holds `width * height` packed `(x, y)` pairs.
    pub(crate) fn from_shared(
        width: usize,
        height: usize,
        coords: Arc<Vec<f64>>,
        global: AffineTransform2D,
    ) -> Self {
        Self {
            payload: Arc::new(GridPayload {
                width,
                height,
                coords,
                global,
                settings: InverseSettings::default(),
            }),
        }
    }

    /// Builds a transform from `width * height` packed `(x, y)` world
    /// coordinates stored row by row.
    pub fn new(width: usize, height: usize, coords: Vec<f64>) -> Result<Self> {
        if width < 2 || height < 2 {
            return Err(CoverageError::IllegalArgument(format!(
                "grid must be at least 2x2, got {width}x{height}"
            )));
        }
        if coords.len() != width * height * 2 {
            return Err(CoverageError::mismatch(width * height * 2, coords.len()));
        }
        let global = fit_affine(&coords, width, height);
        Ok(Self::from_shared(width, height, Arc::new(coords), global))
    }

    /// Returns a transform sharing this grid but using other inverse settings.
    pub fn with_settings(&self, settings: InverseSettings) -> Self {
        let p = &self.payload;
        Self {
            payload: Arc::new(GridPayload {
                width: p.width,
                height: p.height,
                coords: Arc::clone(&p.coords),
                global: p.global,
                settings,
            }),
        }
    }

    pub fn width(&self) -> usize {
        self.payload.width
    }

    pub fn height(&self) -> usize {
        self.payload.height
    }

    pub fn settings(&self) -> InverseSettings {
        self.payload.settings
    }

    /// Global affine transform fitted over the whole grid.
    pub fn global_affine(&self) -> AffineTransform2D {
        self.payload.global
    }

    /// Local affine approximation at cell `(col, row)`, clamped to the grid.
    pub fn local_affine(&self, col: usize, row: usize) -> AffineTransform2D {
        self.payload.local_affine(col, row)
    }

    /// Inverse of the transform. Cheap; shares the grid.
    pub fn inverse_transform(&self) -> GridTransform2DInverse {
        GridTransform2DInverse {
            payload: Arc::clone(&self.payload),
        }
    }
}

impl PartialEq for GridTransform2D {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (&self.payload, &other.payload);
        a.width == b.width
            && a.height == b.height
            && (Arc::ptr_eq(&a.coords, &b.coords) || a.coords == b.coords)
    }
}

impl MathTransform for GridTransform2D {
    fn source_dimensions(&self) -> usize {
        2
    }

    fn target_dimensions(&self) -> usize {
        2
    }

    fn transform(&self, src: &[f64], dst: &mut [f64]) -> Result<()> {
        packed_len(src, dst, 2, 2)?;
        for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
            let q = self.payload.forward(Point::new(s[0], s[1]));
            d[0] = q.x;
            d[1] = q.y;
        }
        Ok(())
    }

    fn derivative(&self, point: Option<&[f64]>) -> Result<DMatrix<f64>> {
        let p = point_arg(point)?;
        let m = self.derivative_at(p)?;
        Ok(DMatrix::from_fn(2, 2, |r, c| m[(r, c)]))
    }

    fn inverse(&self) -> Result<Arc<dyn MathTransform>> {
        Ok(Arc::new(self.inverse_transform()))
    }

    fn is_identity(&self) -> bool {
        let p = &self.payload;
        (0..p.height).all(|row| {
            (0..p.width).all(|col| {
                let o = (col + row * p.width) * 2;
                p.coords[o] == col as f64 && p.coords[o + 1] == row as f64
            })
        })
    }

    fn into_2d(self: Arc<Self>) -> Option<Arc<dyn MathTransform2D>> {
        Some(self)
    }
}

impl MathTransform2D for GridTransform2D {
    fn transform_point(&self, p: Point) -> Result<Point> {
        Ok(self.payload.forward(p))
    }

    /// Approximated by the local affine transform of the cell containing `p`.
    fn derivative_at(&self, p: Point) -> Result<Matrix2<f64>> {
        let (col, row) = self.payload.cell(p);
        Ok(self.payload.local_affine(col, row).linear())
    }

    fn inverse_2d(&self) -> Result<Arc<dyn MathTransform2D>> {
        Ok(Arc::new(self.inverse_transform()))
    }
}

impl GridTransform2DInverse {
    /// The forward transform this inverse belongs to.
    pub fn forward_transform(&self) -> GridTransform2D {
        GridTransform2D {
            payload: Arc::clone(&self.payload),
        }
    }
}

impl MathTransform for GridTransform2DInverse {
    fn source_dimensions(&self) -> usize {
        2
    }

    fn target_dimensions(&self) -> usize {
        2
    }

    fn transform(&self, src: &[f64], dst: &mut [f64]) -> Result<()> {
        packed_len(src, dst, 2, 2)?;
        let mut seed = None;
        for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
            let q = self.payload.inverse(Point::new(s[0], s[1]), &mut seed)?;
            d[0] = q.x;
            d[1] = q.y;
        }
        Ok(())
    }

    fn derivative(&self, point: Option<&[f64]>) -> Result<DMatrix<f64>> {
        let p = point_arg(point)?;
        let m = self.derivative_at(p)?;
        Ok(DMatrix::from_fn(2, 2, |r, c| m[(r, c)]))
    }

    fn inverse(&self) -> Result<Arc<dyn MathTransform>> {
        Ok(Arc::new(self.forward_transform()))
    }

    fn is_identity(&self) -> bool {
        self.forward_transform().is_identity()
    }

    fn into_2d(self: Arc<Self>) -> Option<Arc<dyn MathTransform2D>> {
        Some(self)
    }
}

impl MathTransform2D for GridTransform2DInverse {
    fn transform_point(&self, p: Point) -> Result<Point> {
        self.payload.inverse(p, &mut None)
    }

    fn derivative_at(&self, p: Point) -> Result<Matrix2<f64>> {
        let q = self.payload.inverse(p, &mut None)?;
        let (col, row) = self.payload.cell(q);
        let m = self.payload.local_affine(col, row).linear();
        m.try_inverse().ok_or(CoverageError::Noninvertible)
    }

    fn inverse_2d(&self) -> Result<Arc<dyn MathTransform2D>> {
        Ok(Arc::new(self.forward_transform()))
    }

    fn transform_within(
        &self,
        buf: &mut [f64],
        src_off: usize,
        dst_off: usize,
        num_pts: usize,
    ) -> Result<()> {
        let mut seed = None;
        map_within(buf, src_off, dst_off, num_pts, |p| {
            self.payload.inverse(p, &mut seed)
        })
    }
}

fn point_arg(point: Option<&[f64]>) -> Result<Point> {
    match point {
        Some(&[x, y]) => Ok(Point::new(x, y)),
        Some(other) => Err(CoverageError::mismatch(2, other.len())),
        None => Err(CoverageError::IllegalArgument(
            "derivative of a localization grid depends on the position".into(),
        )),
    }
}

#[cfg(test)]
pub(crate) fn shares_buffer(transform: &GridTransform2D, coords: &Arc<Vec<f64>>) -> bool {
    Arc::ptr_eq(&transform.payload.coords, coords)
}
