use std::sync::Arc;

use geo_types::{coord, Rect};
use grid_coverage::{
    ArraySampleGrid, CoordinateSystem, CoverageError, Envelope, GridCoverage, GridExtent,
    GridGeometry, InverseSettings, LocalizationGrid, Point,
};

#[test]
fn incoherent_extent_is_rejected() {
    let err = GridExtent::new(&[0, 0], &[5, -1]).unwrap_err();
    assert!(matches!(err, CoverageError::IllegalArgument(_)));
}

#[test]
fn full_sub_range_round_trip() {
    let extent = GridExtent::from_image_bounds(3, 4, 30, 40, 4).unwrap();
    assert_eq!(extent.sub_range(0, extent.dimension()).unwrap(), extent);
}

#[test]
fn north_up_pixel_centers() {
    let extent = GridExtent::new(&[0, 0], &[100, 50]).unwrap();
    let envelope = Envelope::new(vec![500.0, 1000.0], vec![600.0, 1100.0]).unwrap();
    let geom = GridGeometry::from_envelope(extent, &envelope, Some(&[false, true])).unwrap();

    // Cell (0, 0) is centered at grid (0, 0); its outer corner is at -0.5.
    let upper_left = geom.transform_point(Point::new(-0.5, -0.5)).unwrap();
    assert_eq!(upper_left, Point::new(500.0, 1100.0));
    let lower_right = geom.transform_point(Point::new(99.5, 49.5)).unwrap();
    assert!((lower_right.x - 600.0).abs() < 1e-9);
    assert!((lower_right.y - 1000.0).abs() < 1e-9);

    let center = geom.transform_point(Point::new(0.0, 0.0)).unwrap();
    assert_eq!(center, Point::new(500.5, 1099.0));
    assert_eq!(geom.are_axes_inverted(), Some(vec![false, true]));

    let back = geom.inverse_transform_point(center).unwrap();
    assert!(back.x.abs() < 1e-9 && back.y.abs() < 1e-9);
}

#[test]
fn prefetch_hint_covers_touched_cells() {
    let extent = GridExtent::new(&[0, 0], &[100, 50]).unwrap();
    let envelope = Envelope::new(vec![0.0, 0.0], vec![100.0, 50.0]).unwrap();
    let geom = GridGeometry::from_envelope(extent, &envelope, None).unwrap();
    let hint = geom
        .inverse_transform_rectangle(Rect::new(coord! { x: 10.0, y: 5.0 }, coord! { x: 20.5, y: 6.0 }))
        .unwrap();
    assert_eq!(hint, Rect::new(coord! { x: 10, y: 5 }, coord! { x: 21, y: 6 }));
}

#[test]
fn localization_grid_behind_a_geometry() {
    let mut grid = LocalizationGrid::new(4, 3).unwrap();
    for row in 0..3 {
        for col in 0..4 {
            let (c, r) = (col as f64, row as f64);
            grid.set_point(col, row, 20.0 + 0.5 * c + 0.01 * r, 45.0 - 0.5 * r + 0.02 * c * c)
                .unwrap();
        }
    }
    let transform = grid
        .math_transform()
        .with_settings(InverseSettings::with_max_residual(1e-6));
    let geometry = GridGeometry::new(GridExtent::new(&[0, 0], &[4, 3]).unwrap(), Arc::new(transform))
        .unwrap();
    assert!(geometry.grid_to_world_2d().is_ok());
    assert_eq!(geometry.are_axes_inverted(), None);

    let world = geometry.transform_point(Point::new(2.0, 1.0)).unwrap();
    let samples = ArraySampleGrid::from_fn(1, 4, 3, |_, c, r| (r * 4 + c) as f64);
    let coverage = GridCoverage::new(
        "swath",
        geometry,
        Arc::new(samples),
        Some(CoordinateSystem::wgs84()),
    )
    .unwrap();
    assert_eq!(coverage.evaluate(world).unwrap(), vec![6.0]);
    assert_eq!(coverage.coordinate_system().and_then(|cs| cs.epsg()), Some(4326));

    let outside = coverage.evaluate(Point::new(30.0, 45.0)).unwrap_err();
    assert!(matches!(outside, CoverageError::PointOutsideCoverage { .. }));
}
