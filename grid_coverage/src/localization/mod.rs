//! Localization grids and the non-affine transforms built from them.

pub mod grid;
pub mod polynomial;
pub mod transform;

pub use grid::LocalizationGrid;
pub use polynomial::{PolynomialTransform2D, MAX_DEGREE};
pub use transform::{GridTransform2D, GridTransform2DInverse};
