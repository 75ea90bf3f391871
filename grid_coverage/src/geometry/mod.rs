//! Basic geometry primitives for grid and world coordinates.

pub mod envelope;
pub mod point;

pub use envelope::Envelope;
pub use point::Point;

/// Calculates the Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    a.distance_sq(b).sqrt()
}

/// Returns the four corners of the rectangle `[xmin,xmax] x [ymin,ymax]`
/// packed as `(x, y)` pairs.
pub(crate) fn rect_corners(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> [f64; 8] {
    [xmin, ymin, xmax, ymin, xmax, ymax, xmin, ymax]
}
