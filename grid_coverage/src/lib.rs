//! Core library for georeferenced grid coverages.
//!
//! A [`GridGeometry`] ties a [`GridExtent`] of valid cell indices to a
//! transform from grid coordinates to world coordinates. That transform is
//! either affine or built from a [`LocalizationGrid`] of control points.

pub mod coverage;
pub mod crs;
pub mod error;
pub mod fit;
pub mod geometry;
pub mod grid;
pub mod localization;
pub mod settings;
pub mod transform;

pub use coverage::{ArraySampleGrid, GridCoverage, GridGeometry, SampleGrid};
pub use crs::{AxisDirection, CoordinateSystem};
pub use error::{CoverageError, Result};
pub use geometry::{Envelope, Point};
pub use grid::GridExtent;
pub use localization::{GridTransform2D, GridTransform2DInverse, LocalizationGrid, PolynomialTransform2D};
pub use settings::InverseSettings;
pub use transform::{AffineTransform2D, MathTransform, MathTransform2D, MatrixTransform};
