//! Grid resolution across schemes: span coverage, origin stability,
//! preset fallbacks and publish ranges.

use test_utils::{
    assert_approx_eq, assert_extent_approx_eq, extent, write_mercator_preset, TempCache, GEOGRAPHIC_PRESET_JSON,
    MERCATOR_PRESET_JSON, SCALE_PROFILES_JSON,
};
use tile_common::{CrsCode, Extent, WEB_MERCATOR_MAX};
use tile_grid::{
    GridRequest, GridStrategy, ScaleProfiles, Scheme, TileMatrixPreset, XyzMode,
};

// ============================================================================
// Helper functions
// ============================================================================

fn request(extent: Extent, zoom: (u32, u32)) -> GridRequest {
    GridRequest {
        tile_crs: CrsCode::web_mercator(),
        extent,
        zoom_min: zoom.0,
        zoom_max: zoom.1,
        publish_zoom_min: None,
        publish_zoom_max: None,
        fallback_set_id: "fixture:roads".to_string(),
    }
}

fn mercator_preset() -> TileMatrixPreset {
    TileMatrixPreset::from_json(MERCATOR_PRESET_JSON, "fallback").unwrap().0
}

fn coords(plan: &tile_grid::GridPlan) -> Vec<(u32, u32, u32)> {
    plan.levels
        .iter()
        .flat_map(|l| l.span.iter().map(move |(c, r)| (l.level(), c, r)))
        .collect()
}

// ============================================================================
// XYZ
// ============================================================================

#[test]
fn test_xyz_span_covers_exactly_intersecting_tiles() {
    let m = WEB_MERCATOR_MAX;
    let extents = [
        Extent::new(-1.5e7, -3.3e6, 2.1e6, 9.9e6),
        Extent::new(1234.5, 5678.9, 2.0e6, 3.0e6),
        Extent::new(-m, -m, m, m),
        Extent::new(-7.7e6, 1.1e6, -7.6e6, 1.2e6),
    ];
    let strategy = GridStrategy::Xyz {
        mode: XyzMode::Partial,
    };

    for extent in extents {
        let plan = strategy.resolve(&request(extent, (0, 5))).unwrap();
        for level in &plan.levels {
            let tiles = 1u32 << level.level();
            for col in 0..tiles {
                for row in 0..tiles {
                    let cell = level.matrix.tile_extent(col, row);
                    let in_span = (level.span.min_col..=level.span.max_col).contains(&col)
                        && (level.span.min_row..=level.span.max_row).contains(&row);
                    assert_eq!(
                        in_span,
                        cell.intersects(&extent),
                        "z={} col={} row={} extent={:?}",
                        level.level(),
                        col,
                        row,
                        extent
                    );
                }
            }
        }
    }
}

#[test]
fn test_xyz_world_mode_single_tile_at_zoom_zero() {
    let strategy = GridStrategy::Xyz {
        mode: XyzMode::World,
    };
    for e in [extent::CITY, extent::MERCATOR_NE, extent::MERCATOR_WORLD] {
        let plan = strategy.resolve(&request(extent::to_extent(e), (0, 0))).unwrap();
        assert_eq!(coords(&plan), vec![(0, 0, 0)]);
        assert_eq!(plan.expected_tile_count, 1);
    }

    // Even outside the world square.
    let m = WEB_MERCATOR_MAX;
    let plan = strategy
        .resolve(&request(Extent::new(2.0 * m, 0.0, 3.0 * m, 1.0), (0, 0)))
        .unwrap();
    assert_eq!(coords(&plan), vec![(0, 0, 0)]);
}

#[test]
fn test_xyz_world_mode_full_grid() {
    let strategy = GridStrategy::Xyz {
        mode: XyzMode::World,
    };
    let plan = strategy
        .resolve(&request(extent::to_extent(extent::CITY), (0, 2)))
        .unwrap();
    assert_eq!(plan.expected_tile_count, 1 + 4 + 16);
    assert!(plan.tile_matrix_set.is_none());
    assert_eq!(plan.published_zoom, (0, 2));
}

#[test]
fn test_xyz_rejects_excessive_zoom() {
    let strategy = GridStrategy::Xyz {
        mode: XyzMode::Partial,
    };
    let err = strategy
        .resolve(&request(extent::to_extent(extent::CITY), (0, 31)))
        .unwrap_err();
    assert!(err.is_fatal());
}

// ============================================================================
// Custom
// ============================================================================

#[test]
fn test_custom_two_levels() {
    let strategy = GridStrategy::Custom { tile_size: 256 };
    let plan = strategy
        .resolve(&request(Extent::new(0.0, 0.0, 100.0, 100.0), (0, 1)))
        .unwrap();

    assert_eq!(plan.scheme, Scheme::Custom);
    assert_eq!(plan.levels[0].tile_count(), 1);
    assert_eq!(plan.levels[1].tile_count(), 4);
    assert_eq!(plan.expected_tile_count, 5);
    assert_eq!(
        coords(&plan),
        vec![(0, 0, 0), (1, 0, 0), (1, 0, 1), (1, 1, 0), (1, 1, 1)]
    );
}

#[test]
fn test_invalid_extent_rejected_before_enumeration() {
    let strategy = GridStrategy::Custom { tile_size: 256 };
    let err = strategy
        .resolve(&request(Extent::new(10.0, 0.0, 10.0, 5.0), (0, 1)))
        .unwrap_err();
    assert!(err.is_fatal());
}

// ============================================================================
// WMTS: presets
// ============================================================================

#[test]
fn test_preset_origin_is_stable_across_extents() {
    let strategy = GridStrategy::WmtsPreset(mercator_preset());
    let a = strategy
        .resolve(&request(extent::to_extent(extent::CITY), (0, 2)))
        .unwrap();
    let b = strategy
        .resolve(&request(extent::to_extent(extent::MERCATOR_NE), (0, 2)))
        .unwrap();

    let m = WEB_MERCATOR_MAX;
    for (la, lb) in a.levels.iter().zip(&b.levels) {
        assert_eq!(la.matrix.origin, (-m, m));
        assert_eq!(la.matrix.origin, lb.matrix.origin);
        assert_eq!(la.matrix.resolution, lb.matrix.resolution);
    }
    let tms = a.tile_matrix_set.unwrap();
    assert_eq!(tms.id, "WebMercatorQuad");
    assert_eq!(tms.top_left_corner, [-m, m]);
}

#[test]
fn test_preset_span_matches_xyz_for_same_grid() {
    let m = WEB_MERCATOR_MAX;
    let strategy = GridStrategy::WmtsPreset(mercator_preset());
    let plan = strategy
        .resolve(&request(Extent::new(1.0, 1.0, m - 1.0, m - 1.0), (1, 2)))
        .unwrap();
    assert_eq!(plan.cached_zoom, (1, 2));
    let level1 = &plan.levels[0];
    assert_eq!((level1.span.min_col, level1.span.max_col), (1, 1));
    assert_eq!((level1.span.min_row, level1.span.max_row), (0, 0));
    assert_extent_approx_eq!(level1.matrix.tile_extent(1, 0), Extent::new(0.0, 0.0, m, m), 1e-6);
    assert_eq!(plan.levels[1].tile_count(), 4);
}

#[test]
fn test_preset_extent_miss_falls_back_to_full_matrix() {
    let m = WEB_MERCATOR_MAX;
    let strategy = GridStrategy::WmtsPreset(mercator_preset());
    let plan = strategy
        .resolve(&request(Extent::new(3.0 * m, 3.0 * m, 4.0 * m, 4.0 * m), (2, 2)))
        .unwrap();
    assert_eq!(plan.levels[0].tile_count(), 16);
    assert_eq!(plan.expected_tile_count, 16);
    assert!(!plan.warnings.is_empty());
}

#[test]
fn test_preset_zoom_outside_levels_renders_all() {
    let strategy = GridStrategy::WmtsPreset(mercator_preset());
    let plan = strategy
        .resolve(&request(extent::to_extent(extent::MERCATOR_WORLD), (7, 9)))
        .unwrap();
    assert_eq!(plan.levels.len(), 3);
    assert_eq!(plan.cached_zoom, (0, 2));
    assert_eq!(plan.expected_tile_count, 1 + 4 + 16);
}

#[test]
fn test_preset_publish_range() {
    let strategy = GridStrategy::WmtsPreset(mercator_preset());

    // Default publish range is every preset level.
    let plan = strategy
        .resolve(&request(extent::to_extent(extent::CITY), (1, 1)))
        .unwrap();
    assert_eq!(plan.cached_zoom, (1, 1));
    assert_eq!(plan.published_zoom, (0, 2));
    assert_eq!(plan.tile_matrix_set.unwrap().matrices.len(), 3);

    // Explicit publish range narrower than the preset still covers cached.
    let mut req = request(extent::to_extent(extent::CITY), (1, 2));
    req.publish_zoom_min = Some(2);
    req.publish_zoom_max = Some(2);
    let plan = strategy.resolve(&req).unwrap();
    assert_eq!(plan.published_zoom, (1, 2));
    let tms = plan.tile_matrix_set.unwrap();
    assert_eq!(tms.matrices.len(), 1);
    assert_eq!(tms.matrices[0].z, 2);
}

#[test]
fn test_geographic_preset_normalization() {
    let (preset, warnings) = TileMatrixPreset::from_json(GEOGRAPHIC_PRESET_JSON, "geo").unwrap();
    assert_eq!(preset.id, "WorldCRS84Quad");
    assert_eq!(preset.top_left_corner, (-180.0, 90.0));
    assert_eq!(preset.matrices.len(), 2);
    assert_eq!(warnings.len(), 1);
    assert!(preset.supports(&CrsCode::parse("CRS:84").unwrap()));
    assert_approx_eq!(preset.matrices[1].resolution, 139770566.00717944 * 0.00028, 1e-6);
}

#[test]
fn test_preset_lookup_on_disk() {
    let cache = TempCache::new();
    let grids = cache.grids_dir();
    write_mercator_preset(&grids);

    let (preset, _) = TileMatrixPreset::load("WebMercatorQuad", &grids).unwrap();
    assert_eq!(preset.levels(), vec![0, 1, 2]);
    assert!(preset.source_path.is_some());

    assert!(TileMatrixPreset::load("Missing", &grids).is_err());
    let found = TileMatrixPreset::find_for_crs(&CrsCode::web_mercator(), &grids).unwrap();
    assert_eq!(found.id, "WebMercatorQuad");
    assert!(TileMatrixPreset::find_for_crs(&CrsCode::wgs84(), &grids).is_none());
}

// ============================================================================
// WMTS: scale profiles and synthetic grids
// ============================================================================

#[test]
fn test_scale_profile_ladder() {
    let profiles = ScaleProfiles::from_json(SCALE_PROFILES_JSON).unwrap();
    let utm = CrsCode::parse("EPSG:25832").unwrap();
    let profile = profiles.find(&utm).unwrap().clone();
    assert_eq!(profile.level_count(), 4);

    let mut req = request(Extent::new(0.0, 0.0, 300_000.0, 100_000.0), (1, 2));
    req.tile_crs = utm;
    let plan = GridStrategy::WmtsScaleProfile(profile).resolve(&req).unwrap();

    assert_eq!(plan.cached_zoom, (1, 2));
    assert_eq!(plan.published_zoom, (0, 3));
    assert_eq!(plan.levels.len(), 2);
    let level1 = &plan.levels[0].matrix;
    assert_approx_eq!(level1.resolution, 560.0, 1e-6);
    assert_eq!((level1.matrix_width, level1.matrix_height), (3, 1));
    assert_eq!(level1.origin, (0.0, 100_000.0));
    assert_extent_approx_eq!(
        level1.tile_extent(2, 0),
        Extent::new(286_720.0, -43_360.0, 430_080.0, 100_000.0),
        1e-6
    );
    assert_eq!(plan.tile_matrix_set.unwrap().matrices.len(), 4);
}

#[test]
fn test_scale_profile_matched_by_bare_code() {
    let profiles = ScaleProfiles::from_json(SCALE_PROFILES_JSON).unwrap();
    let profile = profiles.find(&CrsCode::parse("EPSG:3035").unwrap()).unwrap();
    assert_eq!(profile.scales, vec![8_000_000.0, 4_000_000.0]);
}

#[test]
fn test_synthetic_grid_is_scoped_to_extent() {
    let strategy = GridStrategy::WmtsSynthetic { tile_size: 256 };
    let a = strategy
        .resolve(&request(Extent::new(0.0, 0.0, 1024.0, 1024.0), (0, 1)))
        .unwrap();
    let b = strategy
        .resolve(&request(Extent::new(100.0, 0.0, 1124.0, 2048.0), (0, 1)))
        .unwrap();
    assert_ne!(a.levels[0].matrix.origin, b.levels[0].matrix.origin);
    assert_eq!(a.tile_matrix_set.unwrap().id, "fixture:roads");
}

#[test]
fn test_wmts_ladders_reject_excessive_zoom() {
    let profiles = ScaleProfiles::from_json(SCALE_PROFILES_JSON).unwrap();
    let utm = CrsCode::parse("EPSG:25832").unwrap();
    let profile = profiles.find(&utm).unwrap().clone();
    let mut req = request(Extent::new(0.0, 0.0, 300_000.0, 100_000.0), (0, 31));
    req.tile_crs = utm;
    let err = GridStrategy::WmtsScaleProfile(profile).resolve(&req).unwrap_err();
    assert!(err.is_fatal());

    let synthetic = GridStrategy::WmtsSynthetic { tile_size: 256 };
    let err = synthetic
        .resolve(&request(Extent::new(0.0, 0.0, 1024.0, 1024.0), (0, 31)))
        .unwrap_err();
    assert!(err.is_fatal());

    // A publish range past the limit is caught too.
    let mut req = request(Extent::new(0.0, 0.0, 1024.0, 1024.0), (0, 1));
    req.publish_zoom_max = Some(40);
    let err = synthetic.resolve(&req).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.code(), "invalid_zoom");
}
