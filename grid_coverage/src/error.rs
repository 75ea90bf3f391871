//! Error types shared by the grid and transform modules.

use thiserror::Error;

/// Failures raised while building or evaluating grid geometries.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Two objects that must share a dimension do not.
    #[error("mismatched dimension: expected {expected}, found {found}")]
    MismatchedDimension { expected: usize, found: usize },

    /// An axis index or grid coordinate is outside its valid range.
    #[error("index {index} is out of range 0..{bound}")]
    IndexOutOfRange { index: i64, bound: i64 },

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// An affine transform used during inversion is singular.
    #[error("transform is not invertible")]
    Noninvertible,

    /// The iterative inverse did not settle on a grid cell.
    #[error("no convergence while inverting ({x}, {y})")]
    NoConvergence { x: f64, y: f64 },

    /// A world point could not be resolved to a grid coordinate.
    #[error("point ({x}, {y}) is outside the coverage")]
    PointOutsideCoverage {
        x: f64,
        y: f64,
        #[source]
        source: Box<CoverageError>,
    },

    /// The first two axes of a transform depend on the remaining ones.
    #[error("grid geometry has no separable two-dimensional part")]
    NoTransform2D,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoverageError>;

impl CoverageError {
    pub(crate) fn mismatch(expected: usize, found: usize) -> Self {
        CoverageError::MismatchedDimension { expected, found }
    }

    pub(crate) fn out_of_range(index: i64, bound: i64) -> Self {
        CoverageError::IndexOutOfRange { index, bound }
    }
}
