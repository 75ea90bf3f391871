//! Mutable grid of world coordinates used to build non-affine transforms.

use std::sync::Arc;

use geo_types::Rect;
use log::{debug, warn};
use once_cell::sync::OnceCell;

use super::polynomial::PolynomialTransform2D;
use super::transform::GridTransform2D;
use crate::error::{CoverageError, Result};
use crate::fit::fit_affine;
use crate::geometry::Point;
use crate::transform::AffineTransform2D;

const INCREASING: u8 = 1;
const DECREASING: u8 = 2;
const EQUALS: u8 = 4;

/// Dense `width x height` grid giving the world coordinate of every node.
///
/// Nodes start as NaN and are filled with [`set_point`](Self::set_point) or
/// in bulk with [`transform`](Self::transform). Transforms obtained from
/// [`math_transform`](Self::math_transform) share the coordinate buffer; the
/// grid copies the buffer before the next mutation, so issued transforms never
/// observe later changes.
#[derive(Debug, Clone)]
pub struct LocalizationGrid {
    width: usize,
    height: usize,
    coords: Arc<Vec<f64>>,
    global: OnceCell<AffineTransform2D>,
    transform: OnceCell<GridTransform2D>,
}

impl LocalizationGrid {
    /// Creates a grid of NaN nodes. Both sizes must be at least 2.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width < 2 || height < 2 {
            return Err(CoverageError::IllegalArgument(format!(
                "localization grid must be at least 2x2, got {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            coords: Arc::new(vec![f64::NAN; width * height * 2]),
            global: OnceCell::new(),
            transform: OnceCell::new(),
        })
    }

    /// Returns `(width, height)`.
    pub fn grid_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn offset(&self, col: usize, row: usize) -> Result<usize> {
        if col >= self.width {
            return Err(CoverageError::out_of_range(col as i64, self.width as i64));
        }
        if row >= self.height {
            return Err(CoverageError::out_of_range(row as i64, self.height as i64));
        }
        Ok((col + row * self.width) * 2)
    }

    /// Invalidates cached fits and returns a buffer no issued transform
    /// shares.
    fn coords_mut(&mut self) -> &mut Vec<f64> {
        let had_fit = self.global.take().is_some();
        let had_transform = self.transform.take().is_some();
        if had_fit || had_transform {
            debug!("localization grid changed, cached transforms cleared");
        }
        if Arc::strong_count(&self.coords) > 1 {
            debug!("coordinate buffer shared with an issued transform, copying");
        }
        Arc::make_mut(&mut self.coords)
    }

    pub fn point(&self, col: usize, row: usize) -> Result<Point> {
        let o = self.offset(col, row)?;
        Ok(Point::new(self.coords[o], self.coords[o + 1]))
    }

    /// Sets the world coordinate of node `(col, row)`.
    pub fn set_point(&mut self, col: usize, row: usize, x: f64, y: f64) -> Result<()> {
        let o = self.offset(col, row)?;
        let coords = self.coords_mut();
        coords[o] = x;
        coords[o + 1] = y;
        Ok(())
    }

    /// Applies `tr` in place to every node inside `region`, or to the whole
    /// grid when `region` is `None`. The region is half-open and clipped to
    /// the grid.
    pub fn transform(&mut self, tr: &AffineTransform2D, region: Option<Rect<i64>>) {
        let (cols, rows) = match region {
            Some(r) => (
                clip(r.min().x, r.max().x, self.width),
                clip(r.min().y, r.max().y, self.height),
            ),
            None => (0..self.width, 0..self.height),
        };
        let width = self.width;
        let coords = self.coords_mut();
        for row in rows {
            for col in cols.clone() {
                let o = (col + row * width) * 2;
                let p = tr.apply(Point::new(coords[o], coords[o + 1]));
                coords[o] = p.x;
                coords[o + 1] = p.y;
            }
        }
    }

    /// Returns `true` if any coordinate is NaN, meaning the grid is not fully
    /// populated.
    pub fn is_nan(&self) -> bool {
        self.coords.iter().any(|v| v.is_nan())
    }

    /// Checks that `x` is monotonic along every row and `y` along every
    /// column, with all rows agreeing on a direction and all columns agreeing
    /// on a direction. `strict` rejects equal neighbours. NaN nodes are
    /// skipped.
    pub fn is_monotonic(&self, strict: bool) -> bool {
        let initial = if strict {
            INCREASING | DECREASING
        } else {
            INCREASING | DECREASING | EQUALS
        };
        let (w, h) = (self.width, self.height);
        let g = &self.coords;
        let mut along_rows = initial;
        for row in 0..h {
            along_rows = order((0..w).map(|col| g[(col + row * w) * 2]), along_rows);
        }
        let mut along_cols = initial;
        for col in 0..w {
            along_cols = order((0..h).map(|row| g[(col + row * w) * 2 + 1]), along_cols);
        }
        along_rows & (INCREASING | DECREASING) != 0 && along_cols & (INCREASING | DECREASING) != 0
    }

    /// Replaces runs of equal values by a linear ramp toward the value that
    /// follows the run, for both channels along rows then along columns.
    /// `[7, 8, 8, 8, 11]` becomes `[7, 8, 9, 10, 11]`.
    pub fn remove_singularities(&mut self) {
        let (w, h) = (self.width, self.height);
        let coords = self.coords_mut();
        for channel in 0..2 {
            for row in 0..h {
                ramp_runs(coords, row * w * 2 + channel, w, 2);
            }
            for col in 0..w {
                ramp_runs(coords, col * 2 + channel, h, w * 2);
            }
        }
    }

    /// Global affine transform fitted by least squares over all nodes.
    pub fn affine_transform(&self) -> AffineTransform2D {
        *self
            .global
            .get_or_init(|| fit_affine(&self.coords, self.width, self.height))
    }

    /// Affine transform through nodes `(col, row)`, `(col+1, row)` and
    /// `(col, row+1)`. Cells on the last row or column reuse the previous one.
    pub fn local_affine(&self, col: usize, row: usize) -> Result<AffineTransform2D> {
        self.offset(col, row)?;
        Ok(self.math_transform().local_affine(col, row))
    }

    /// Frozen transform of the current grid content.
    pub fn math_transform(&self) -> GridTransform2D {
        self.transform
            .get_or_init(|| {
                if self.is_nan() {
                    warn!("building a grid transform from an incompletely populated grid");
                }
                GridTransform2D::from_shared(
                    self.width,
                    self.height,
                    Arc::clone(&self.coords),
                    self.affine_transform(),
                )
            })
            .clone()
    }

    /// Least-squares polynomial of `degree` (1 to 3) approximating the grid.
    pub fn polynomial_transform(&self, degree: usize) -> Result<PolynomialTransform2D> {
        let mut grid = Vec::with_capacity(self.width * self.height);
        let mut world = Vec::with_capacity(self.width * self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                let o = (col + row * self.width) * 2;
                grid.push(Point::new(col as f64, row as f64));
                world.push(Point::new(self.coords[o], self.coords[o + 1]));
            }
        }
        PolynomialTransform2D::fit(degree, &grid, &world)
    }

    #[cfg(test)]
    fn shares_buffer_with(&self, tr: &GridTransform2D) -> bool {
        super::transform::shares_buffer(tr, &self.coords)
    }
}

fn clip(min: i64, max: i64, len: usize) -> std::ops::Range<usize> {
    let lo = min.clamp(0, len as i64) as usize;
    let hi = max.clamp(0, len as i64) as usize;
    lo..hi.max(lo)
}

/// Updates `flags` with the ordering of `values`, ignoring NaN.
fn order(values: impl Iterator<Item = f64>, mut flags: u8) -> u8 {
    let mut previous: Option<f64> = None;
    for value in values.filter(|v| !v.is_nan()) {
        if let Some(prev) = previous {
            if value > prev {
                flags &= !DECREASING;
            } else if value < prev {
                flags &= !INCREASING;
            } else if flags & EQUALS == 0 {
                flags &= !(INCREASING | DECREASING);
            }
        }
        previous = Some(value);
    }
    flags
}

/// Linear ramp over every run of equal values among `count` values spaced
/// `step` apart from `start`. The first value of a run and the value after it
/// are kept; runs at the end of the sequence are left alone.
fn ramp_runs(coords: &mut [f64], start: usize, count: usize, step: usize) {
    let at = |k: usize| start + k * step;
    let mut i = 0;
    while i < count {
        let v = coords[at(i)];
        let mut j = i + 1;
        while j < count && coords[at(j)] == v {
            j += 1;
        }
        if j - i >= 2 && j < count {
            let end = coords[at(j)];
            if !end.is_nan() {
                let span = (j - i) as f64;
                for k in i + 1..j {
                    coords[at(k)] = v + (end - v) * (k - i) as f64 / span;
                }
            }
        }
        i = j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::MathTransform2D;

    fn filled(width: usize, height: usize, f: impl Fn(f64, f64) -> (f64, f64)) -> LocalizationGrid {
        let mut grid = LocalizationGrid::new(width, height).unwrap();
        for row in 0..height {
            for col in 0..width {
                let (x, y) = f(col as f64, row as f64);
                grid.set_point(col, row, x, y).unwrap();
            }
        }
        grid
    }

    #[test]
    fn rejects_degenerate_size() {
        assert!(LocalizationGrid::new(1, 5).is_err());
        assert!(LocalizationGrid::new(5, 1).is_err());
    }

    #[test]
    fn point_access_is_bounds_checked() {
        let mut grid = LocalizationGrid::new(3, 2).unwrap();
        assert!(matches!(
            grid.set_point(3, 0, 1.0, 1.0),
            Err(CoverageError::IndexOutOfRange { index: 3, bound: 3 })
        ));
        assert!(grid.point(0, 2).is_err());
        grid.set_point(2, 1, 4.0, 5.0).unwrap();
        assert_eq!(grid.point(2, 1).unwrap(), Point::new(4.0, 5.0));
    }

    #[test]
    fn nan_until_populated() {
        let mut grid = LocalizationGrid::new(2, 2).unwrap();
        assert!(grid.is_nan());
        for (c, r) in [(0, 0), (1, 0), (0, 1)] {
            grid.set_point(c, r, c as f64, r as f64).unwrap();
        }
        assert!(grid.is_nan());
        grid.set_point(1, 1, 1.0, 1.0).unwrap();
        assert!(!grid.is_nan());
    }

    #[test]
    fn singularities_become_ramps() {
        let xs = [7.0, 8.0, 8.0, 8.0, 11.0];
        let mut grid = filled(5, 2, |c, r| (xs[c as usize], r));
        grid.remove_singularities();
        for col in 0..5 {
            assert_eq!(grid.point(col, 0).unwrap().x, 7.0 + col as f64);
            assert_eq!(grid.point(col, 1).unwrap().x, 7.0 + col as f64);
        }
    }

    #[test]
    fn trailing_run_is_kept() {
        let mut values = vec![1.0, 2.0, 2.0, 2.0];
        ramp_runs(&mut values, 0, 4, 1);
        assert_eq!(values, vec![1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn strict_monotonicity_rejects_ties() {
        let mut grid = filled(4, 3, |c, r| (10.0 * c + r, 10.0 * r + c));
        assert!(grid.is_monotonic(true));
        // Row 1 of the x channel becomes 1, 11, 11, 31.
        grid.set_point(2, 1, 11.0, 12.0).unwrap();
        assert!(!grid.is_monotonic(true));
        assert!(grid.is_monotonic(false));
    }

    #[test]
    fn regular_grid_is_strictly_monotonic() {
        let mut grid = filled(3, 3, |c, r| (c, r));
        assert!(grid.is_monotonic(true));
        grid.set_point(1, 2, 0.0, 2.0).unwrap();
        assert!(!grid.is_monotonic(true));
        assert!(grid.is_monotonic(false));
    }

    #[test]
    fn reversal_breaks_monotonicity() {
        let mut grid = filled(4, 3, |c, r| (c, r));
        assert!(grid.is_monotonic(true));
        grid.set_point(2, 1, 0.5, 1.0).unwrap();
        assert!(!grid.is_monotonic(false));
    }

    #[test]
    fn rows_must_agree_on_direction() {
        // Row 0 increases, row 1 decreases.
        let grid = filled(3, 2, |c, r| (if r == 0.0 { c } else { 10.0 - c }, r));
        assert!(!grid.is_monotonic(false));
    }

    #[test]
    fn nan_nodes_are_skipped() {
        let mut grid = LocalizationGrid::new(3, 3).unwrap();
        for row in 1..3 {
            for col in 0..3 {
                grid.set_point(col, row, col as f64, row as f64).unwrap();
            }
        }
        assert!(grid.is_monotonic(true));
    }

    #[test]
    fn bulk_transform_on_region() {
        let mut grid = filled(4, 4, |c, r| (c, r));
        let shift = AffineTransform2D::translation(100.0, 0.0);
        let region = Rect::new(geo_types::coord! { x: 1, y: 1 }, geo_types::coord! { x: 3, y: 9 });
        grid.transform(&shift, Some(region));
        assert_eq!(grid.point(0, 1).unwrap(), Point::new(0.0, 1.0));
        assert_eq!(grid.point(1, 1).unwrap(), Point::new(101.0, 1.0));
        assert_eq!(grid.point(2, 3).unwrap(), Point::new(102.0, 3.0));
        assert_eq!(grid.point(3, 3).unwrap(), Point::new(3.0, 3.0));
        assert_eq!(grid.point(1, 0).unwrap(), Point::new(1.0, 0.0));
    }

    #[test]
    fn mutation_copies_shared_buffer() {
        let mut grid = filled(3, 3, |c, r| (2.0 * c, 3.0 * r));
        let first = grid.math_transform();
        assert!(grid.shares_buffer_with(&first));
        assert!(grid.shares_buffer_with(&grid.math_transform()));

        grid.set_point(1, 1, -50.0, -50.0).unwrap();
        assert!(!grid.shares_buffer_with(&first));
        let p = first.transform_point(Point::new(1.0, 1.0)).unwrap();
        assert_eq!(p, Point::new(2.0, 3.0));

        let second = grid.math_transform();
        assert_eq!(second.transform_point(Point::new(1.0, 1.0)).unwrap(), Point::new(-50.0, -50.0));
    }

    #[test]
    fn local_affine_of_last_column() {
        let grid = filled(3, 3, |c, r| (4.0 * c, 2.0 * r));
        let local = grid.local_affine(2, 2).unwrap();
        assert_eq!(local, AffineTransform2D::new(4.0, 0.0, 0.0, 2.0, 0.0, 0.0));
        assert!(grid.local_affine(3, 0).is_err());
    }

    #[test]
    fn affine_fit_is_cached_and_invalidated() {
        let mut grid = filled(3, 3, |c, r| (c, r));
        assert!((grid.affine_transform().m00 - 1.0).abs() < 1e-12);
        grid.transform(&AffineTransform2D::scale(2.0, 2.0), None);
        let fit = grid.affine_transform();
        assert!((fit.m00 - 2.0).abs() < 1e-12);
        assert!((fit.m11 - 2.0).abs() < 1e-12);
    }
}
