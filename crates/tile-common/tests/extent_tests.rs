//! Tests for Extent parsing, validation and reprojection.

use tile_common::crs::{lonlat_to_mercator, mercator_to_lonlat};
use tile_common::{transform_extent, CrsCode, Extent, ExtentError, WEB_MERCATOR_MAX};

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_integer_values() {
    let e = Extent::parse("0,0,100,100").unwrap();
    assert_eq!(e, Extent::new(0.0, 0.0, 100.0, 100.0));
}

#[test]
fn test_parse_scientific_notation() {
    let e = Extent::parse("1e-6,2e-6,1e6,2e6").unwrap();
    assert!((e.min_x - 1e-6).abs() < 1e-10);
    assert!((e.max_y - 2e6).abs() < 0.001);
}

#[test]
fn test_parse_wrong_count() {
    assert!(matches!(
        Extent::parse("0,0,100"),
        Err(ExtentError::InvalidFormat(_))
    ));
    assert!(matches!(
        Extent::parse("0,0,100,100,5"),
        Err(ExtentError::InvalidFormat(_))
    ));
}

#[test]
fn test_parse_bad_number() {
    assert!(matches!(
        Extent::parse("0,zero,100,100"),
        Err(ExtentError::InvalidNumber(_))
    ));
}

#[test]
fn test_from_slice_arity() {
    assert!(matches!(
        Extent::from_slice(&[1.0, 2.0]),
        Err(ExtentError::WrongArity(2))
    ));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_zero_area_is_invalid() {
    assert!(!Extent::new(5.0, 5.0, 5.0, 10.0).is_valid());
    assert!(!Extent::new(5.0, 5.0, 10.0, 5.0).is_valid());
}

#[test]
fn test_nan_is_invalid() {
    assert!(matches!(
        Extent::new(f64::NAN, 0.0, 1.0, 1.0).validate(),
        Err(ExtentError::NotFinite)
    ));
}

// ============================================================================
// Geometry
// ============================================================================

#[test]
fn test_touching_extents_do_not_intersect() {
    let a = Extent::new(0.0, 0.0, 10.0, 10.0);
    let b = Extent::new(10.0, 0.0, 20.0, 10.0);
    assert!(!a.intersects(&b));
    assert!(a.intersection(&b).is_none());
}

#[test]
fn test_top_left() {
    assert_eq!(Extent::new(1.0, 2.0, 3.0, 4.0).top_left(), (1.0, 4.0));
}

// ============================================================================
// Reprojection
// ============================================================================

#[test]
fn test_identity_transform() {
    let e = Extent::new(1.0, 2.0, 3.0, 4.0);
    let crs = CrsCode::parse("EPSG:2056").unwrap();
    assert_eq!(transform_extent(&e, &crs, &crs).unwrap(), e);
}

#[test]
fn test_world_to_mercator() {
    let world = Extent::new(-180.0, -90.0, 180.0, 90.0);
    let merc = transform_extent(&world, &CrsCode::wgs84(), &CrsCode::web_mercator()).unwrap();
    assert!((merc.min_x + WEB_MERCATOR_MAX).abs() < 1e-6);
    assert!((merc.max_x - WEB_MERCATOR_MAX).abs() < 1e-6);
    // Latitudes are clamped to the square Mercator world.
    assert!((merc.max_y - WEB_MERCATOR_MAX).abs() < 1e-3);
    assert!((merc.min_y + WEB_MERCATOR_MAX).abs() < 1e-3);
}

#[test]
fn test_mercator_point_roundtrip() {
    let (x, y) = lonlat_to_mercator(8.5, 47.3);
    let (lon, lat) = mercator_to_lonlat(x, y);
    assert!((lon - 8.5).abs() < 1e-9);
    assert!((lat - 47.3).abs() < 1e-9);
}
