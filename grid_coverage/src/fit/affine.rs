//! Closed-form least-squares fit of a global affine transform over a grid.
//!
//! For every coordinate channel the plane `z = c + cx*col + cy*row` is fitted
//! over all grid nodes. The sums over `col` and `row` are arithmetic series
//! and are evaluated in closed form, so the fit costs a single pass over the
//! coordinate values.

use crate::transform::AffineTransform2D;

/// Coefficients of a fitted plane `z = c + cx*col + cy*row`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneFit {
    pub cx: f64,
    pub cy: f64,
    pub c: f64,
}

/// Fits a plane to channel `channel` of a packed `(x, y)` grid of
/// `width * height` nodes stored row by row.
pub fn fit_plane(coords: &[f64], width: usize, height: usize, channel: usize) -> PlaneFit {
    debug_assert!(coords.len() >= width * height * 2);
    let mut z = 0.0;
    let mut zx = 0.0;
    let mut zy = 0.0;
    for row in 0..height {
        for col in 0..width {
            let zi = coords[(row * width + col) * 2 + channel];
            z += zi;
            zx += zi * col as f64;
            zy += zi * row as f64;
        }
    }
    let n = (width * height) as f64;
    let w = width as f64;
    let h = height as f64;
    let x = n * (w - 1.0) / 2.0;
    let y = n * (h - 1.0) / 2.0;
    let mut xx = n * (w - 1.0) * (2.0 * w - 1.0) / 6.0;
    let mut yy = n * (h - 1.0) * (2.0 * h - 1.0) / 6.0;
    let mut xy = n * (w - 1.0) * (h - 1.0) / 4.0;

    // Centered normal equations:
    //   zx = cx*xx + cy*xy
    //   zy = cx*xy + cy*yy
    zx -= z * x / n;
    zy -= z * y / n;
    xx -= x * x / n;
    xy -= x * y / n;
    yy -= y * y / n;
    let det = xx * yy - xy * xy;
    let cx = (zx * yy - zy * xy) / det;
    let cy = (zy * xx - zx * xy) / det;
    let c = (z - (cx * x + cy * y)) / n;
    PlaneFit { cx, cy, c }
}

/// Fits the global affine transform mapping `(col, row)` to `(x, y)`.
pub fn fit_affine(coords: &[f64], width: usize, height: usize) -> AffineTransform2D {
    let px = fit_plane(coords, width, height, 0);
    let py = fit_plane(coords, width, height, 1);
    AffineTransform2D::new(px.cx, py.cx, px.cy, py.cy, px.c, py.c)
}
