//! Mapping between grid indices and world coordinates.

use std::sync::Arc;

use geo_types::{coord, Rect};
use log::debug;

use crate::crs::CoordinateSystem;
use crate::error::{CoverageError, Result};
use crate::geometry::{rect_corners, Envelope, Point};
use crate::grid::GridExtent;
use crate::transform::{MathTransform, MathTransform2D, MatrixTransform};

/// Valid grid indices together with the transform from grid coordinates to
/// world coordinates.
///
/// Grid coordinates follow the pixel-center convention: the integer
/// coordinate `(i, j)` is the center of cell `(i, j)`, whose corners lie half
/// a unit away.
///
/// When output axes 0 and 1 of the transform depend only on input axes 0 and
/// 1, the geometry also keeps that two-dimensional part and its inverse ready
/// for pixel/world round trips.
#[derive(Debug, Clone)]
pub struct GridGeometry {
    extent: Arc<GridExtent>,
    grid_to_world: Arc<dyn MathTransform>,
    grid_to_world_2d: Option<Arc<dyn MathTransform2D>>,
    world_to_grid_2d: Option<Arc<dyn MathTransform2D>>,
}

impl GridGeometry {
    /// Combines `extent` with a grid-to-world transform of the same dimension.
    pub fn new(extent: GridExtent, grid_to_world: Arc<dyn MathTransform>) -> Result<Self> {
        let dim = extent.dimension();
        if grid_to_world.source_dimensions() != dim {
            return Err(CoverageError::mismatch(dim, grid_to_world.source_dimensions()));
        }
        if grid_to_world.target_dimensions() != dim {
            return Err(CoverageError::mismatch(dim, grid_to_world.target_dimensions()));
        }
        let grid_to_world_2d = separable_2d(&grid_to_world);
        let world_to_grid_2d = grid_to_world_2d.as_ref().and_then(|t| match t.inverse_2d() {
            Ok(inverse) => Some(inverse),
            Err(e) => {
                debug!("two-dimensional transform has no inverse: {e}");
                None
            }
        });
        Ok(Self {
            extent: extent.intern(),
            grid_to_world,
            grid_to_world_2d,
            world_to_grid_2d,
        })
    }

    /// Builds the axis-aligned affine transform mapping the cells of `extent`
    /// onto `envelope`.
    ///
    /// Along an axis flagged in `inverted` the grid index grows while the
    /// world coordinate decreases, as for the rows of a north-up image.
    pub fn from_envelope(
        extent: GridExtent,
        envelope: &Envelope,
        inverted: Option<&[bool]>,
    ) -> Result<Self> {
        let dim = extent.dimension();
        if envelope.dimension() != dim {
            return Err(CoverageError::mismatch(dim, envelope.dimension()));
        }
        if let Some(flags) = inverted {
            if flags.len() != dim {
                return Err(CoverageError::mismatch(dim, flags.len()));
            }
        }
        let mut scales = Vec::with_capacity(dim);
        let mut offsets = Vec::with_capacity(dim);
        for axis in 0..dim {
            let cells = extent.length(axis);
            if cells == 0 {
                return Err(CoverageError::IllegalArgument(format!(
                    "grid axis {axis} is empty"
                )));
            }
            let mut scale = envelope.length(axis) / cells as f64;
            let reference = if inverted.map_or(false, |flags| flags[axis]) {
                scale = -scale;
                envelope.maximum(axis)
            } else {
                envelope.minimum(axis)
            };
            scales.push(scale);
            offsets.push(reference - scale * (extent.lower(axis) as f64 - 0.5));
        }
        let transform = MatrixTransform::diagonal(&scales, &offsets)?;
        Self::new(extent, Arc::new(transform))
    }

    /// Like [`from_envelope`](Self::from_envelope), taking the axis inversion
    /// from the directions of `crs`.
    pub fn from_envelope_crs(
        extent: GridExtent,
        envelope: &Envelope,
        crs: &CoordinateSystem,
    ) -> Result<Self> {
        if crs.dimension() != envelope.dimension() {
            return Err(CoverageError::mismatch(envelope.dimension(), crs.dimension()));
        }
        let inverted = crs.default_axis_inversion();
        Self::from_envelope(extent, envelope, Some(&inverted))
    }

    pub fn extent(&self) -> &GridExtent {
        &self.extent
    }

    pub fn grid_to_world(&self) -> &Arc<dyn MathTransform> {
        &self.grid_to_world
    }

    /// Transform of the first two grid axes to the first two world axes.
    pub fn grid_to_world_2d(&self) -> Result<Arc<dyn MathTransform2D>> {
        self.grid_to_world_2d
            .clone()
            .ok_or(CoverageError::NoTransform2D)
    }

    /// Inverse of [`grid_to_world_2d`](Self::grid_to_world_2d).
    pub fn world_to_grid_2d(&self) -> Result<Arc<dyn MathTransform2D>> {
        if self.grid_to_world_2d.is_none() {
            return Err(CoverageError::NoTransform2D);
        }
        self.world_to_grid_2d
            .clone()
            .ok_or(CoverageError::Noninvertible)
    }

    /// Maps a grid coordinate to world coordinates.
    pub fn transform_point(&self, grid: Point) -> Result<Point> {
        self.grid_to_world_2d()?.transform_point(grid)
    }

    /// Maps a world point to grid coordinates. Any failure is reported as
    /// [`CoverageError::PointOutsideCoverage`] carrying the cause.
    pub fn inverse_transform_point(&self, world: Point) -> Result<Point> {
        self.world_to_grid_2d()
            .and_then(|inverse| inverse.transform_point(world))
            .map_err(|source| CoverageError::PointOutsideCoverage {
                x: world.x,
                y: world.y,
                source: Box::new(source),
            })
    }

    /// Smallest range of cells touched by a world rectangle, or `None` when
    /// it cannot be computed. Never fails.
    pub fn inverse_transform_rectangle(&self, world: Rect<f64>) -> Option<Rect<i64>> {
        let inverse = self.world_to_grid_2d.as_ref()?;
        let (min, max) = (world.min(), world.max());
        let corners = rect_corners(min.x, min.y, max.x, max.y);
        let mut grid = [0.0; 8];
        if let Err(e) = inverse.transform(&corners, &mut grid) {
            debug!("no pixel bounds for {world:?}: {e}");
            return None;
        }
        let bounds = Envelope::enclosing(&grid, 2)?;
        let xmin = (bounds.minimum(0) + 0.5).floor();
        let ymin = (bounds.minimum(1) + 0.5).floor();
        let xmax = (bounds.maximum(0) + 0.5).ceil();
        let ymax = (bounds.maximum(1) + 0.5).ceil();
        if ![xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(Rect::new(
            coord! { x: xmin as i64, y: ymin as i64 },
            coord! { x: xmax as i64, y: ymax as i64 },
        ))
    }

    /// Per axis, whether world coordinates decrease when grid indices grow.
    ///
    /// Only answered when the derivative of the transform is constant and
    /// diagonal.
    pub fn are_axes_inverted(&self) -> Option<Vec<bool>> {
        let d = self.grid_to_world.derivative(None).ok()?;
        if !d.is_square() {
            return None;
        }
        let n = d.nrows();
        for r in 0..n {
            for c in 0..n {
                if r != c && d[(r, c)] != 0.0 {
                    return None;
                }
            }
        }
        Some((0..n).map(|i| d[(i, i)] < 0.0).collect())
    }

    /// World bounds of the extent, from its cell corners.
    ///
    /// Exact for affine transforms; for grid transforms only the outer
    /// corners are considered.
    pub fn envelope(&self) -> Result<Envelope> {
        let dim = self.extent.dimension();
        let count = 1usize << dim;
        let mut corners = Vec::with_capacity(count * dim);
        for mask in 0..count {
            for axis in 0..dim {
                let index = if mask >> axis & 1 == 1 {
                    self.extent.upper(axis)
                } else {
                    self.extent.lower(axis)
                };
                corners.push(index as f64 - 0.5);
            }
        }
        let mut world = vec![0.0; corners.len()];
        self.grid_to_world.transform(&corners, &mut world)?;
        Envelope::enclosing(&world, dim).ok_or_else(|| {
            CoverageError::IllegalArgument("extent corners have no world position".into())
        })
    }
}

/// Two-dimensional part of `transform`, if axes 0 and 1 are separable.
fn separable_2d(transform: &Arc<dyn MathTransform>) -> Option<Arc<dyn MathTransform2D>> {
    if let Some(t) = Arc::clone(transform).into_2d() {
        return Some(t);
    }
    let sub = transform
        .matrix()
        .and_then(|m| MatrixTransform::new(m).ok())
        .and_then(|m| m.sub_transform_2d());
    match sub {
        Some(affine) => Some(Arc::new(affine)),
        None => {
            debug!(
                "no separable two-dimensional part in a {}-dimensional transform",
                transform.source_dimensions()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::GridTransform2D;
    use crate::transform::AffineTransform2D;
    use nalgebra::DMatrix;

    fn north_up() -> GridGeometry {
        let extent = GridExtent::new(&[0, 0], &[100, 50]).unwrap();
        let envelope = Envelope::new(vec![10.0, 20.0], vec![110.0, 70.0]).unwrap();
        GridGeometry::from_envelope(extent, &envelope, Some(&[false, true])).unwrap()
    }

    #[test]
    fn cell_corners_reach_envelope_corners() {
        let geom = north_up();
        let upper_left = geom.transform_point(Point::new(-0.5, -0.5)).unwrap();
        assert_eq!(upper_left, Point::new(10.0, 70.0));
        let lower_right = geom.transform_point(Point::new(99.5, 49.5)).unwrap();
        assert_eq!(lower_right, Point::new(110.0, 20.0));
        let first_center = geom.transform_point(Point::new(0.0, 0.0)).unwrap();
        assert_eq!(first_center, Point::new(10.5, 69.5));
    }

    #[test]
    fn envelope_round_trip() {
        let geom = north_up();
        let env = geom.envelope().unwrap();
        assert_eq!(env, Envelope::new(vec![10.0, 20.0], vec![110.0, 70.0]).unwrap());
        let rect = geom.inverse_transform_rectangle(env.to_rect().unwrap()).unwrap();
        assert_eq!(rect, geom.extent().to_rect().unwrap());
    }

    #[test]
    fn rectangle_touching_part_of_cells() {
        let geom = north_up();
        let world = Rect::new(coord! { x: 12.2, y: 60.0 }, coord! { x: 14.0, y: 69.9 });
        let rect = geom.inverse_transform_rectangle(world).unwrap();
        assert_eq!(rect.min(), coord! { x: 2, y: 0 });
        assert_eq!(rect.max(), coord! { x: 4, y: 10 });
    }

    #[test]
    fn axis_inversion_is_detected() {
        assert_eq!(north_up().are_axes_inverted(), Some(vec![false, true]));
        let rotated = GridGeometry::new(
            GridExtent::new(&[0, 0], &[4, 4]).unwrap(),
            Arc::new(AffineTransform2D::rotation(0.3)),
        )
        .unwrap();
        assert_eq!(rotated.are_axes_inverted(), None);
    }

    #[test]
    fn inverse_point() {
        let geom = north_up();
        let p = geom.inverse_transform_point(Point::new(60.5, 44.5)).unwrap();
        assert!((p.x - 50.0).abs() < 1e-12);
        assert!((p.y - 25.0).abs() < 1e-12);
    }

    #[test]
    fn crs_picks_inversion() {
        let extent = GridExtent::new(&[0, 0], &[360, 180]).unwrap();
        let envelope = Envelope::new(vec![-180.0, -90.0], vec![180.0, 90.0]).unwrap();
        let geom =
            GridGeometry::from_envelope_crs(extent, &envelope, &CoordinateSystem::wgs84()).unwrap();
        assert_eq!(geom.are_axes_inverted(), Some(vec![false, true]));
        assert_eq!(
            geom.transform_point(Point::new(-0.5, -0.5)).unwrap(),
            Point::new(-180.0, 90.0)
        );
    }

    #[test]
    fn dimensions_must_match() {
        let extent = GridExtent::from_image_bounds(0, 0, 10, 10, 3).unwrap();
        let err = GridGeometry::new(extent.clone(), Arc::new(AffineTransform2D::identity())).unwrap_err();
        assert!(matches!(err, CoverageError::MismatchedDimension { expected: 3, found: 2 }));

        let envelope = Envelope::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        assert!(matches!(
            GridGeometry::from_envelope(extent.clone(), &envelope, None),
            Err(CoverageError::MismatchedDimension { .. })
        ));
        let envelope = Envelope::new(vec![0.0; 3], vec![1.0; 3]).unwrap();
        assert!(matches!(
            GridGeometry::from_envelope(extent, &envelope, Some(&[false, true])),
            Err(CoverageError::MismatchedDimension { .. })
        ));
    }

    #[test]
    fn separable_axes_of_3d_geometry() {
        let extent = GridExtent::from_image_bounds(0, 0, 10, 20, 3).unwrap();
        let envelope = Envelope::new(vec![0.0, 0.0, 5.0], vec![10.0, 40.0, 6.0]).unwrap();
        let geom = GridGeometry::from_envelope(extent, &envelope, None).unwrap();
        let p = geom.transform_point(Point::new(1.0, 1.0)).unwrap();
        assert_eq!(p, Point::new(1.5, 3.0));
    }

    #[test]
    fn coupled_axes_have_no_2d_part() {
        let mut m = DMatrix::<f64>::identity(4, 4);
        m[(0, 2)] = 1.0;
        let tr = MatrixTransform::new(m).unwrap();
        let extent = GridExtent::from_image_bounds(0, 0, 10, 10, 3).unwrap();
        let geom = GridGeometry::new(extent, Arc::new(tr)).unwrap();
        assert!(matches!(geom.grid_to_world_2d(), Err(CoverageError::NoTransform2D)));
        let err = geom.inverse_transform_point(Point::new(1.0, 1.0)).unwrap_err();
        match err {
            CoverageError::PointOutsideCoverage { source, .. } => {
                assert!(matches!(*source, CoverageError::NoTransform2D))
            }
            other => panic!("unexpected error {other:?}"),
        }
        let world = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        assert!(geom.inverse_transform_rectangle(world).is_none());
    }

    #[test]
    fn singular_transform_gives_no_hint() {
        let geom = GridGeometry::new(
            GridExtent::new(&[0, 0], &[4, 4]).unwrap(),
            Arc::new(AffineTransform2D::scale(0.0, 1.0)),
        )
        .unwrap();
        assert!(geom.grid_to_world_2d().is_ok());
        assert!(matches!(geom.world_to_grid_2d(), Err(CoverageError::Noninvertible)));
        let world = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        assert!(geom.inverse_transform_rectangle(world).is_none());
    }

    #[test]
    fn grid_transform_geometry() {
        let coords = vec![0.0, 0.0, 2.0, 0.0, 0.0, 2.0, 2.5, 2.5];
        let tr = GridTransform2D::new(2, 2, coords).unwrap();
        let geom = GridGeometry::new(GridExtent::new(&[0, 0], &[2, 2]).unwrap(), Arc::new(tr)).unwrap();
        assert_eq!(geom.are_axes_inverted(), None);
        let world = geom.transform_point(Point::new(0.5, 0.5)).unwrap();
        let back = geom.inverse_transform_point(world).unwrap();
        assert!((back.x - 0.5).abs() < 1e-9 && (back.y - 0.5).abs() < 1e-9, "{back:?}");
    }

    #[test]
    fn extents_are_interned() {
        let a = north_up();
        let b = north_up();
        assert!(Arc::ptr_eq(&a.extent, &b.extent));
    }
}
