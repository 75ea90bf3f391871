//! Basic 2D point type used for grid and world coordinates.

/// Representation of a 2D point.
///
/// Depending on context the point holds grid coordinates `(col, row)` or world
/// coordinates `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns `true` if either ordinate is NaN.
    pub fn is_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan()
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_sq(&self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl From<geo_types::Coord<f64>> for Point {
    fn from(c: geo_types::Coord<f64>) -> Self {
        Self::new(c.x, c.y)
    }
}

impl From<Point> for geo_types::Coord<f64> {
    fn from(p: Point) -> Self {
        geo_types::coord! { x: p.x, y: p.y }
    }
}
