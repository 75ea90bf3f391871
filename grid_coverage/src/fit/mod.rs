//! Fitting of global transforms to localization grids.

pub mod affine;
pub use affine::{fit_affine, fit_plane, PlaneFit};

pub mod least_squares;
pub use least_squares::{parametric_ls, LSResult};
