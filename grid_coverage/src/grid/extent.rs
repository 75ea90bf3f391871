//! Half-open N-dimensional range of grid indices.

use std::fmt;
use std::sync::{Arc, Mutex};

use geo_types::{coord, Rect};
use once_cell::sync::Lazy;

use super::intern::Interner;
use crate::error::{CoverageError, Result};

const EXTENT_POOL_CAPACITY: usize = 256;

static EXTENT_POOL: Lazy<Mutex<Interner<GridExtent>>> =
    Lazy::new(|| Mutex::new(Interner::new(EXTENT_POOL_CAPACITY)));

/// Valid grid indices `[lower_i, upper_i)` along every axis.
///
/// Bounds are packed as `[lower_0, .., lower_{n-1}, upper_0, .., upper_{n-1}]`
/// and `lower_i <= upper_i` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GridExtent {
    index: Vec<i64>,
}

impl GridExtent {
    /// Creates an extent from its lower (inclusive) and upper (exclusive)
    /// indices.
    pub fn new(lower: &[i64], upper: &[i64]) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(CoverageError::mismatch(lower.len(), upper.len()));
        }
        let mut index = Vec::with_capacity(lower.len() * 2);
        index.extend_from_slice(lower);
        index.extend_from_slice(upper);
        let extent = Self { index };
        extent.check_coherence()?;
        Ok(extent)
    }

    /// Creates an extent from image pixel bounds. Axes beyond the first two
    /// are set to `[0, 1)`.
    pub fn from_image_bounds(x: i64, y: i64, width: i64, height: i64, dimension: usize) -> Result<Self> {
        if dimension < 2 {
            return Err(CoverageError::mismatch(2, dimension));
        }
        let mut lower = vec![0; dimension];
        let mut upper = vec![1; dimension];
        lower[0] = x;
        lower[1] = y;
        upper[0] = x + width;
        upper[1] = y + height;
        Self::new(&lower, &upper)
    }

    /// Creates a two-dimensional extent covering `rect`.
    pub fn from_rect(rect: Rect<i64>) -> Self {
        let (min, max) = (rect.min(), rect.max());
        Self {
            index: vec![min.x, min.y, max.x, max.y],
        }
    }

    fn check_coherence(&self) -> Result<()> {
        for axis in 0..self.dimension() {
            if self.lower(axis) > self.upper(axis) {
                return Err(CoverageError::IllegalArgument(format!(
                    "axis {axis} has lower bound {} above upper bound {}",
                    self.lower(axis),
                    self.upper(axis)
                )));
            }
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.index.len() / 2
    }

    /// Inclusive lower index along `axis`.
    ///
    /// # Panics
    /// If `axis >= self.dimension()`.
    pub fn lower(&self, axis: usize) -> i64 {
        assert!(axis < self.dimension(), "axis {axis} out of range");
        self.index[axis]
    }

    /// Exclusive upper index along `axis`.
    ///
    /// # Panics
    /// If `axis >= self.dimension()`.
    pub fn upper(&self, axis: usize) -> i64 {
        assert!(axis < self.dimension(), "axis {axis} out of range");
        self.index[self.dimension() + axis]
    }

    pub fn length(&self, axis: usize) -> i64 {
        self.upper(axis) - self.lower(axis)
    }

    pub fn lowers(&self) -> &[i64] {
        &self.index[..self.dimension()]
    }

    pub fn uppers(&self) -> &[i64] {
        &self.index[self.dimension()..]
    }

    /// Projects this extent onto the axes `lower_dim..upper_dim`.
    pub fn sub_range(&self, lower_dim: usize, upper_dim: usize) -> Result<Self> {
        let dim = self.dimension();
        if lower_dim > dim {
            return Err(CoverageError::out_of_range(lower_dim as i64, dim as i64 + 1));
        }
        if upper_dim < lower_dim || upper_dim > dim {
            return Err(CoverageError::out_of_range(upper_dim as i64, dim as i64 + 1));
        }
        Self::new(
            &self.lowers()[lower_dim..upper_dim],
            &self.uppers()[lower_dim..upper_dim],
        )
    }

    /// Pixel bounds of the first two axes.
    pub fn to_rect(&self) -> Option<Rect<i64>> {
        if self.dimension() < 2 {
            return None;
        }
        Some(Rect::new(
            coord! { x: self.lower(0), y: self.lower(1) },
            coord! { x: self.upper(0), y: self.upper(1) },
        ))
    }

    /// Returns `true` if `index` lies inside the extent.
    pub fn contains(&self, index: &[i64]) -> bool {
        index.len() == self.dimension()
            && index
                .iter()
                .enumerate()
                .all(|(axis, &i)| i >= self.lower(axis) && i < self.upper(axis))
    }

    /// Returns the shared canonical instance equal to this extent.
    pub fn intern(self) -> Arc<GridExtent> {
        let mut pool = EXTENT_POOL.lock().unwrap_or_else(|e| e.into_inner());
        pool.intern(self)
    }
}

impl fmt::Display for GridExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GridExtent[")?;
        for axis in 0..self.dimension() {
            if axis != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}..{}", self.lower(axis), self.upper(axis))?;
        }
        write!(f, "]")
    }
}
