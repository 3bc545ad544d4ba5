//! Common test fixtures: extents, projects and tile-matrix presets.

use std::path::{Path, PathBuf};

/// Common extents, `(min_x, min_y, max_x, max_y)`.
pub mod extent {
    use tile_common::WEB_MERCATOR_MAX;

    /// The full Web Mercator square.
    pub const MERCATOR_WORLD: (f64, f64, f64, f64) = (
        -WEB_MERCATOR_MAX,
        -WEB_MERCATOR_MAX,
        WEB_MERCATOR_MAX,
        WEB_MERCATOR_MAX,
    );

    /// North-east quadrant of the Mercator square.
    pub const MERCATOR_NE: (f64, f64, f64, f64) = (0.0, 0.0, WEB_MERCATOR_MAX, WEB_MERCATOR_MAX);

    /// A small city-sized block near the Mercator origin.
    pub const CITY: (f64, f64, f64, f64) = (1000.0, 1000.0, 9000.0, 9000.0);

    /// Geographic world.
    pub const WGS84_WORLD: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    pub fn to_extent(e: (f64, f64, f64, f64)) -> tile_common::Extent {
        tile_common::Extent::new(e.0, e.1, e.2, e.3)
    }
}

/// Project with two local fill layers and a theme over both.
pub const LOCAL_PROJECT_YAML: &str = r#"
name: fixture
crs: EPSG:3857
extent: { min_x: 0, min_y: 0, max_x: 20037508.342789244, max_y: 20037508.342789244 }
layers:
  - id: land
    name: Land
    crs: EPSG:3857
    extent: { min_x: 0, min_y: 0, max_x: 20037508.342789244, max_y: 20037508.342789244 }
    provider: fill
    color: [200, 200, 180, 255]
  - id: parks
    name: Parks
    crs: EPSG:3857
    extent: { min_x: 1000, min_y: 1000, max_x: 9000, max_y: 9000 }
    provider: fill
    color: [40, 160, 60, 255]
  - id: hidden
    crs: EPSG:3857
    provider: fill
    color: [0, 0, 0, 255]
themes:
  - name: base
    layers:
      - { layer: land }
      - { layer: parks }
      - { layer: hidden, visible: false }
  - name: nothing
    layers:
      - { layer: hidden, visible: false }
"#;

/// Project with a single WMS-backed layer.
pub const REMOTE_PROJECT_YAML: &str = r#"
crs: EPSG:3857
layers:
  - id: ortho
    crs: EPSG:3857
    provider: wms
    url: http://127.0.0.1:9/wms
    wms_layers: ortho
"#;

/// A three-level Web Mercator preset (levels 0..=2).
pub const MERCATOR_PRESET_JSON: &str = r#"{
  "id": "WebMercatorQuad",
  "title": "Google Maps compatible",
  "supported_crs": ["EPSG:3857"],
  "top_left_corner": [-20037508.342789244, 20037508.342789244],
  "tile_width": 256,
  "tile_height": 256,
  "matrices": [
    { "identifier": "0", "resolution": 156543.03392804097, "matrix_width": 1, "matrix_height": 1 },
    { "identifier": "1", "resolution": 78271.51696402048, "matrix_width": 2, "matrix_height": 2 },
    { "identifier": "2", "resolution": 39135.75848201024, "matrix_width": 4, "matrix_height": 4 }
  ]
}"#;

/// A latitude-first geographic preset using legacy key names.
pub const GEOGRAPHIC_PRESET_JSON: &str = r#"{
  "name": "WorldCRS84Quad",
  "crs": "EPSG:4326",
  "axis_order": "yx",
  "top_left": [90.0, -180.0],
  "matrixSet": [
    { "identifier": 0, "scale_denominator": 279541132.0143589, "matrix_width": 2, "matrix_height": 1 },
    { "identifier": 1, "scale_denominator": 139770566.00717944, "matrix_width": 4, "matrix_height": 2 },
    { "identifier": 2, "matrix_width": 8, "matrix_height": 4 }
  ]
}"#;

/// Scale profiles keyed by CRS.
pub const SCALE_PROFILES_JSON: &str = r#"{
  "EPSG:25832": {
    "name": "UTM 32N",
    "tile_size": 256,
    "scales": [4000000, 2000000, 1000000, 500000]
  },
  "3035": {
    "scaleDenominators": ["8000000", "4000000"]
  }
}"#;

pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("Failed to create fixture dir");
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write fixture");
    path
}

pub fn write_local_project(dir: &Path) -> PathBuf {
    write_fixture(dir, "fixture.yaml", LOCAL_PROJECT_YAML)
}

pub fn write_mercator_preset(grids_dir: &Path) -> PathBuf {
    write_fixture(grids_dir, "WebMercatorQuad.json", MERCATOR_PRESET_JSON)
}
