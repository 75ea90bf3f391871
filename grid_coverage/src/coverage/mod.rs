//! Georeferenced grids of sample values.

use std::sync::Arc;

use crate::crs::CoordinateSystem;
use crate::error::{CoverageError, Result};
use crate::geometry::{Envelope, Point};

pub mod geometry;

pub use geometry::GridGeometry;

/// Pixel access to the sample values of a coverage.
pub trait SampleGrid: Send + Sync {
    fn num_bands(&self) -> usize;
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn sample(&self, band: usize, col: usize, row: usize) -> Option<f64>;
}

/// In-memory samples stored band by band, each band row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySampleGrid {
    bands: usize,
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl ArraySampleGrid {
    pub fn new(bands: usize, width: usize, height: usize, data: Vec<f64>) -> Result<Self> {
        let expected = bands * width * height;
        if data.len() != expected {
            return Err(CoverageError::mismatch(expected, data.len()));
        }
        Ok(Self {
            bands,
            width,
            height,
            data,
        })
    }

    /// Builds a grid by evaluating `f(band, col, row)` for every sample.
    pub fn from_fn(
        bands: usize,
        width: usize,
        height: usize,
        f: impl Fn(usize, usize, usize) -> f64,
    ) -> Self {
        let mut data = Vec::with_capacity(bands * width * height);
        for band in 0..bands {
            for row in 0..height {
                for col in 0..width {
                    data.push(f(band, col, row));
                }
            }
        }
        Self {
            bands,
            width,
            height,
            data,
        }
    }
}

impl SampleGrid for ArraySampleGrid {
    fn num_bands(&self) -> usize {
        self.bands
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn sample(&self, band: usize, col: usize, row: usize) -> Option<f64> {
        if band >= self.bands || col >= self.width || row >= self.height {
            return None;
        }
        self.data
            .get((band * self.height + row) * self.width + col)
            .copied()
    }
}

/// Named sample grid placed in world coordinates by a [`GridGeometry`].
#[derive(Clone)]
pub struct GridCoverage {
    name: String,
    geometry: GridGeometry,
    samples: Arc<dyn SampleGrid>,
    crs: Option<CoordinateSystem>,
}

impl std::fmt::Debug for GridCoverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridCoverage")
            .field("name", &self.name)
            .field("extent", self.geometry.extent())
            .field("bands", &self.samples.num_bands())
            .field("crs", &self.crs)
            .finish()
    }
}

impl GridCoverage {
    /// The first two axes of the geometry extent must match the sample grid
    /// size, and the coordinate system, when given, the extent dimension.
    pub fn new(
        name: impl Into<String>,
        geometry: GridGeometry,
        samples: Arc<dyn SampleGrid>,
        crs: Option<CoordinateSystem>,
    ) -> Result<Self> {
        let extent = geometry.extent();
        if extent.dimension() < 2 {
            return Err(CoverageError::mismatch(2, extent.dimension()));
        }
        if extent.length(0) != samples.width() as i64 {
            return Err(CoverageError::mismatch(samples.width(), extent.length(0) as usize));
        }
        if extent.length(1) != samples.height() as i64 {
            return Err(CoverageError::mismatch(samples.height(), extent.length(1) as usize));
        }
        if let Some(cs) = &crs {
            if cs.dimension() != extent.dimension() {
                return Err(CoverageError::mismatch(extent.dimension(), cs.dimension()));
            }
        }
        Ok(Self {
            name: name.into(),
            geometry,
            samples,
            crs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn samples(&self) -> &Arc<dyn SampleGrid> {
        &self.samples
    }

    pub fn coordinate_system(&self) -> Option<&CoordinateSystem> {
        self.crs.as_ref()
    }

    pub fn envelope(&self) -> Result<Envelope> {
        self.geometry.envelope()
    }

    /// Values of every band in the cell containing `point`.
    pub fn evaluate(&self, point: Point) -> Result<Vec<f64>> {
        let grid = self.geometry.inverse_transform_point(point)?;
        let outside = || CoverageError::PointOutsideCoverage {
            x: point.x,
            y: point.y,
            source: Box::new(CoverageError::IllegalArgument(format!(
                "grid coordinate ({}, {}) is outside {}",
                grid.x,
                grid.y,
                self.geometry.extent()
            ))),
        };
        let extent = self.geometry.extent();
        // Cell `i` covers grid coordinates `[i - 0.5, i + 0.5)`.
        let col = (grid.x + 0.5).floor();
        let row = (grid.y + 0.5).floor();
        if !col.is_finite() || !row.is_finite() {
            return Err(outside());
        }
        let (col, row) = (col as i64, row as i64);
        let inside = col >= extent.lower(0)
            && col < extent.upper(0)
            && row >= extent.lower(1)
            && row < extent.upper(1);
        if !inside {
            return Err(outside());
        }
        let (col, row) = ((col - extent.lower(0)) as usize, (row - extent.lower(1)) as usize);
        Ok((0..self.samples.num_bands())
            .map(|band| self.samples.sample(band, col, row).unwrap_or(f64::NAN))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridExtent;

    fn coverage() -> GridCoverage {
        let extent = GridExtent::new(&[10, 20], &[14, 23]).unwrap();
        let envelope = Envelope::new(vec![0.0, 0.0], vec![40.0, 30.0]).unwrap();
        let geometry = GridGeometry::from_envelope(extent, &envelope, Some(&[false, true])).unwrap();
        let samples = ArraySampleGrid::from_fn(2, 4, 3, |b, c, r| (b * 100 + r * 10 + c) as f64);
        GridCoverage::new("elevation", geometry, Arc::new(samples), Some(CoordinateSystem::web_mercator()))
            .unwrap()
    }

    #[test]
    fn samples_are_laid_out_band_by_band() {
        let grid = ArraySampleGrid::new(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(grid.sample(1, 0, 0), Some(3.0));
        assert_eq!(grid.sample(0, 2, 0), None);
        assert!(ArraySampleGrid::new(1, 2, 2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn evaluate_picks_containing_cell() {
        let cov = coverage();
        assert_eq!(cov.name(), "elevation");
        // Upper-left cell spans x 0..10 and y 20..30.
        assert_eq!(cov.evaluate(Point::new(1.0, 29.0)).unwrap(), vec![0.0, 100.0]);
        assert_eq!(cov.evaluate(Point::new(35.0, 1.0)).unwrap(), vec![23.0, 123.0]);
        assert_eq!(cov.evaluate(Point::new(15.0, 15.0)).unwrap(), vec![11.0, 111.0]);
    }

    #[test]
    fn evaluate_outside_extent() {
        let cov = coverage();
        let err = cov.evaluate(Point::new(41.0, 15.0)).unwrap_err();
        assert!(matches!(err, CoverageError::PointOutsideCoverage { .. }));
    }

    #[test]
    fn envelope_edges_follow_half_open_cells() {
        let cov = coverage();
        assert_eq!(cov.evaluate(Point::new(0.0, 15.0)).unwrap(), vec![10.0, 110.0]);
        assert_eq!(cov.evaluate(Point::new(0.0, 30.0)).unwrap(), vec![0.0, 100.0]);
        let err = cov.evaluate(Point::new(40.0, 15.0)).unwrap_err();
        assert!(matches!(err, CoverageError::PointOutsideCoverage { .. }));
    }

    #[test]
    fn size_must_match_extent() {
        let extent = GridExtent::new(&[0, 0], &[5, 5]).unwrap();
        let envelope = Envelope::new(vec![0.0, 0.0], vec![5.0, 5.0]).unwrap();
        let geometry = GridGeometry::from_envelope(extent, &envelope, None).unwrap();
        let samples = ArraySampleGrid::from_fn(1, 4, 5, |_, _, _| 0.0);
        let err = GridCoverage::new("bad", geometry, Arc::new(samples), None).unwrap_err();
        assert!(matches!(err, CoverageError::MismatchedDimension { .. }));
    }

    #[test]
    fn envelope_matches_geometry() {
        let env = coverage().envelope().unwrap();
        assert_eq!(env.minimum(0), 0.0);
        assert_eq!(env.maximum(0), 40.0);
        assert_eq!(env.minimum(1), 0.0);
        assert_eq!(env.maximum(1), 30.0);
    }
}
