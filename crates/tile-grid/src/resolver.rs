//! Turns a scheme, CRS, extent and zoom range into an enumeration plan.
//!
//! The plan is a list of `(TileMatrix, TileSpan)` pairs plus the counts and
//! zoom ranges the engine reports and records in the catalog. All grid
//! conventions are resolved here so the engine can iterate every scheme
//! with a single loop.

use crate::preset::TileMatrixPreset;
use crate::scale_profile::ScaleProfile;
use crate::scheme::{Scheme, XyzMode};
use tile_common::{
    AxisOrder, CacheError, CacheResult, CrsCode, Extent, MatrixDescriptor, RowOrigin, TileMatrix,
    TileMatrixSetDescriptor, TileSpan, DEFAULT_TILE_SIZE, WEB_MERCATOR_MAX,
};
use tracing::debug;

/// Highest level the power-of-two schemes accept.
pub const MAX_POW2_LEVEL: u32 = 30;

/// Inset applied at the far edges so an extent ending exactly on a tile
/// boundary does not pull in the neighbouring tile.
const EDGE_EPSILON: f64 = 1e-6;

/// Grid construction strategy, one variant per tiling convention.
#[derive(Debug, Clone)]
pub enum GridStrategy {
    /// Global Web-Mercator slippy-map grid.
    Xyz { mode: XyzMode },
    /// Explicit matrices from a preset; origin is never recomputed.
    WmtsPreset(TileMatrixPreset),
    /// Matrices derived from a CRS scale ladder, anchored at the extent.
    WmtsScaleProfile(ScaleProfile),
    /// Power-of-two ladder derived from the extent itself. Run-scoped.
    WmtsSynthetic { tile_size: u32 },
    /// `2^z x 2^z` subdivision of the literal extent.
    Custom { tile_size: u32 },
}

/// Inputs shared by every strategy.
#[derive(Debug, Clone)]
pub struct GridRequest {
    pub tile_crs: CrsCode,
    /// Cache extent, already in `tile_crs`.
    pub extent: Extent,
    pub zoom_min: u32,
    pub zoom_max: u32,
    pub publish_zoom_min: Option<u32>,
    pub publish_zoom_max: Option<u32>,
    /// Matrix set id used when no preset supplies one.
    pub fallback_set_id: String,
}

/// One level to render.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelPlan {
    pub matrix: TileMatrix,
    pub span: TileSpan,
}

impl LevelPlan {
    pub fn level(&self) -> u32 {
        self.matrix.level
    }

    pub fn tile_count(&self) -> u64 {
        self.span.tile_count()
    }
}

/// Enumeration plan for one run.
#[derive(Debug, Clone)]
pub struct GridPlan {
    pub scheme: Scheme,
    pub strategy: &'static str,
    pub levels: Vec<LevelPlan>,
    /// Never zero.
    pub expected_tile_count: u64,
    /// Levels rendered by this run.
    pub cached_zoom: (u32, u32),
    /// Levels announced in the catalog; always covers `cached_zoom`.
    pub published_zoom: (u32, u32),
    pub tile_matrix_set: Option<TileMatrixSetDescriptor>,
    pub warnings: Vec<String>,
}

impl GridStrategy {
    /// Pick the strategy for an already-resolved scheme.
    pub fn for_scheme(
        scheme: Scheme,
        xyz_mode: XyzMode,
        preset: Option<TileMatrixPreset>,
        profile: Option<ScaleProfile>,
    ) -> Self {
        match (scheme, preset, profile) {
            (_, Some(preset), _) => GridStrategy::WmtsPreset(preset),
            (Scheme::Xyz, None, _) => GridStrategy::Xyz { mode: xyz_mode },
            (Scheme::Wmts, None, Some(profile)) => GridStrategy::WmtsScaleProfile(profile),
            (Scheme::Wmts, None, None) => GridStrategy::WmtsSynthetic {
                tile_size: DEFAULT_TILE_SIZE,
            },
            (Scheme::Custom | Scheme::Auto, None, _) => GridStrategy::Custom {
                tile_size: DEFAULT_TILE_SIZE,
            },
        }
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            GridStrategy::Xyz { .. } => Scheme::Xyz,
            GridStrategy::WmtsPreset(_)
            | GridStrategy::WmtsScaleProfile(_)
            | GridStrategy::WmtsSynthetic { .. } => Scheme::Wmts,
            GridStrategy::Custom { .. } => Scheme::Custom,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GridStrategy::Xyz { .. } => "xyz",
            GridStrategy::WmtsPreset(_) => "wmts_preset",
            GridStrategy::WmtsScaleProfile(_) => "wmts_scale_profile",
            GridStrategy::WmtsSynthetic { .. } => "wmts_synthetic",
            GridStrategy::Custom { .. } => "custom",
        }
    }

    pub fn preset(&self) -> Option<&TileMatrixPreset> {
        match self {
            GridStrategy::WmtsPreset(p) => Some(p),
            _ => None,
        }
    }

    /// Build the enumeration plan.
    pub fn resolve(&self, request: &GridRequest) -> CacheResult<GridPlan> {
        request.extent.validate()?;
        if request.zoom_max < request.zoom_min {
            return Err(CacheError::InvalidZoom(format!(
                "zoom_max {} < zoom_min {}",
                request.zoom_max, request.zoom_min
            )));
        }

        let plan = match self {
            GridStrategy::Xyz { mode } => resolve_xyz(*mode, request)?,
            GridStrategy::WmtsPreset(preset) => resolve_preset(preset, request)?,
            GridStrategy::WmtsScaleProfile(profile) => resolve_scale_profile(profile, request)?,
            GridStrategy::WmtsSynthetic { tile_size } => resolve_synthetic(*tile_size, request)?,
            GridStrategy::Custom { tile_size } => resolve_custom(*tile_size, request)?,
        };

        debug!(
            strategy = plan.strategy,
            levels = plan.levels.len(),
            expected = plan.expected_tile_count,
            "Resolved tile grid"
        );
        Ok(plan)
    }
}

fn check_pow2_zoom(request: &GridRequest) -> CacheResult<()> {
    if request.zoom_max > MAX_POW2_LEVEL {
        return Err(CacheError::InvalidZoom(format!(
            "zoom_max {} exceeds {}",
            request.zoom_max, MAX_POW2_LEVEL
        )));
    }
    Ok(())
}

fn expected_count(levels: &[LevelPlan]) -> u64 {
    levels.iter().map(LevelPlan::tile_count).sum()
}

/// Union of two inclusive ranges.
fn widen(a: (u32, u32), b: (u32, u32)) -> (u32, u32) {
    (a.0.min(b.0), a.1.max(b.1))
}

/// Explicit publish range, defaulting each end to the zoom range.
fn explicit_publish(request: &GridRequest) -> (u32, u32) {
    let min = request.publish_zoom_min.unwrap_or(request.zoom_min);
    let max = request.publish_zoom_max.unwrap_or(request.zoom_max).max(min);
    (min, max)
}

fn publish_is_explicit(request: &GridRequest) -> bool {
    request.publish_zoom_min.is_some() || request.publish_zoom_max.is_some()
}

// ============================================================================
// XYZ
// ============================================================================

fn resolve_xyz(mode: XyzMode, request: &GridRequest) -> CacheResult<GridPlan> {
    check_pow2_zoom(request)?;
    let m = WEB_MERCATOR_MAX;
    let world = Extent::new(-m, -m, m, m);
    let clamped = request.extent.clamp_to(&world);
    if mode == XyzMode::Partial && !clamped.is_valid() {
        return Err(CacheError::InvalidExtent(format!(
            "extent {:?} collapses after clamping to the Web-Mercator world",
            request.extent.to_array()
        )));
    }

    let mut levels = Vec::new();
    for z in request.zoom_min..=request.zoom_max {
        let tiles = 1u32 << z;
        let resolution = 2.0 * m / (tiles as f64 * DEFAULT_TILE_SIZE as f64);
        let matrix = TileMatrix::top_left(
            z,
            resolution,
            (DEFAULT_TILE_SIZE, DEFAULT_TILE_SIZE),
            (tiles, tiles),
            (-m, m),
        );

        let span = match mode {
            XyzMode::World => Some(matrix.full_span()),
            XyzMode::Partial => xyz_span(&clamped, tiles),
        };
        if let Some(span) = span {
            levels.push(LevelPlan { matrix, span });
        }
    }

    let cached = (request.zoom_min, request.zoom_max);
    Ok(GridPlan {
        scheme: Scheme::Xyz,
        strategy: "xyz",
        expected_tile_count: expected_count(&levels).max(1),
        levels,
        cached_zoom: cached,
        published_zoom: cached,
        tile_matrix_set: None,
        warnings: Vec::new(),
    })
}

/// Slippy-map column/row range of an extent already clamped to the world.
pub fn xyz_span(extent: &Extent, tiles: u32) -> Option<TileSpan> {
    let m = WEB_MERCATOR_MAX;
    let n = tiles as f64;
    let col = |x: f64| (((x + m) / (2.0 * m)) * n).floor() as i64;
    let row = |y: f64| (((m - y) / (2.0 * m)) * n).floor() as i64;

    let x0 = col(extent.min_x);
    let x1 = col(extent.max_x - EDGE_EPSILON);
    let y0 = row(extent.max_y - EDGE_EPSILON);
    let y1 = row(extent.min_y + EDGE_EPSILON);
    TileSpan::clamped((x0, x1), (y0, y1), tiles, tiles)
}

// ============================================================================
// WMTS: preset
// ============================================================================

fn resolve_preset(preset: &TileMatrixPreset, request: &GridRequest) -> CacheResult<GridPlan> {
    let all_levels = preset.levels();
    let (Some(&first), Some(&last)) = (all_levels.first(), all_levels.last()) else {
        return Err(CacheError::Preset(format!("preset {} has no matrices", preset.id)));
    };
    let mut warnings = Vec::new();

    let mut selected = preset.matrices_in(request.zoom_min, request.zoom_max);
    if selected.is_empty() {
        warnings.push(format!(
            "preset {} has no level in {}..={}, rendering all levels",
            preset.id, request.zoom_min, request.zoom_max
        ));
        selected = preset.matrices.iter().collect();
    }

    let mut levels = Vec::with_capacity(selected.len());
    for matrix in &selected {
        let span = match matrix.span_for(&request.extent) {
            Some(span) => span,
            None => {
                warnings.push(format!(
                    "extent misses preset level {}, rendering the full matrix",
                    matrix.source_level
                ));
                matrix.full_span()
            }
        };
        levels.push(LevelPlan {
            matrix: (*matrix).clone(),
            span,
        });
    }

    let cached = level_range(&selected).unwrap_or((first, last));
    let requested_publish = if publish_is_explicit(request) {
        explicit_publish(request)
    } else {
        (first, last)
    };
    let mut publish_matrices = preset.matrices_in(requested_publish.0, requested_publish.1);
    if publish_matrices.is_empty() {
        publish_matrices = preset.matrices.iter().collect();
    }
    let published = widen(
        level_range(&publish_matrices).unwrap_or((first, last)),
        cached,
    );

    let descriptor = TileMatrixSetDescriptor {
        id: preset.id.clone(),
        supported_crs: preset.primary_crs().to_string(),
        tile_width: preset.tile_width,
        tile_height: preset.tile_height,
        axis_order: preset.axis_order,
        top_left_corner: [preset.top_left_corner.0, preset.top_left_corner.1],
        matrices: publish_matrices
            .iter()
            .map(|m| MatrixDescriptor::from(*m))
            .collect(),
    };

    let expected = match expected_count(&levels) {
        0 => selected
            .iter()
            .map(|m| m.full_span().tile_count())
            .sum::<u64>()
            .max(1),
        n => n,
    };

    Ok(GridPlan {
        scheme: Scheme::Wmts,
        strategy: "wmts_preset",
        levels,
        expected_tile_count: expected,
        cached_zoom: cached,
        published_zoom: published,
        tile_matrix_set: Some(descriptor),
        warnings,
    })
}

fn level_range(matrices: &[&TileMatrix]) -> Option<(u32, u32)> {
    let min = matrices.iter().map(|m| m.source_level).min()?;
    let max = matrices.iter().map(|m| m.source_level).max()?;
    Some((min, max))
}

// ============================================================================
// WMTS: scale profile and synthetic ladders
// ============================================================================

/// Matrix anchored at the extent's top-left corner, sized to cover it.
fn extent_matrix(level: u32, resolution: f64, scale: Option<f64>, tile_size: u32, extent: &Extent) -> TileMatrix {
    let span = tile_size as f64 * resolution;
    let mw = (extent.width() / span).ceil().max(1.0) as u32;
    let mh = (extent.height() / span).ceil().max(1.0) as u32;
    let mut matrix = TileMatrix::top_left(
        level,
        resolution,
        (tile_size, tile_size),
        (mw, mh),
        extent.top_left(),
    );
    if let Some(scale) = scale {
        matrix.scale_denominator = scale;
    }
    matrix
}

/// Render levels in `render` and publish every matrix in the plan.
fn ladder_plan(
    strategy: &'static str,
    matrices: Vec<TileMatrix>,
    render: (u32, u32),
    tile_size: u32,
    request: &GridRequest,
) -> GridPlan {
    let levels: Vec<LevelPlan> = matrices
        .iter()
        .filter(|m| (render.0..=render.1).contains(&m.level))
        .map(|m| LevelPlan {
            matrix: m.clone(),
            span: m.full_span(),
        })
        .collect();
    let published = matrices
        .iter()
        .map(|m| m.level)
        .fold(render, |acc, l| widen(acc, (l, l)));
    let top_left = request.extent.top_left();

    GridPlan {
        scheme: Scheme::Wmts,
        strategy,
        expected_tile_count: expected_count(&levels).max(1),
        levels,
        cached_zoom: render,
        published_zoom: published,
        tile_matrix_set: Some(TileMatrixSetDescriptor {
            id: request.fallback_set_id.clone(),
            supported_crs: request.tile_crs.to_string(),
            tile_width: tile_size,
            tile_height: tile_size,
            axis_order: AxisOrder::Xy,
            top_left_corner: [top_left.0, top_left.1],
            matrices: matrices.iter().map(MatrixDescriptor::from).collect(),
        }),
        warnings: Vec::new(),
    }
}

fn resolve_scale_profile(profile: &ScaleProfile, request: &GridRequest) -> CacheResult<GridPlan> {
    check_pow2_zoom(request)?;
    if profile.scales.is_empty() {
        return Err(CacheError::Preset(format!("scale profile {} is empty", profile.id)));
    }
    let zoom = (
        profile.clamp_level(request.zoom_min),
        profile.clamp_level(request.zoom_max),
    );
    let publish = if publish_is_explicit(request) {
        let (a, b) = explicit_publish(request);
        (profile.clamp_level(a), profile.clamp_level(b))
    } else {
        (0, profile.level_count() - 1)
    };
    let range = widen(publish, zoom);

    let matrices = (range.0..=range.1)
        .filter_map(|z| {
            let scale = profile.scales.get(z as usize).copied()?;
            let res = profile.resolution(z)?;
            Some(extent_matrix(z, res, Some(scale), profile.tile_size, &request.extent))
        })
        .collect();

    let mut plan = ladder_plan(
        "wmts_scale_profile",
        matrices,
        zoom,
        profile.tile_size,
        request,
    );
    if (zoom.0, zoom.1) != (request.zoom_min, request.zoom_max) {
        plan.warnings.push(format!(
            "zoom range clamped to {}..={} by scale profile {}",
            zoom.0, zoom.1, profile.id
        ));
    }
    Ok(plan)
}

fn resolve_synthetic(tile_size: u32, request: &GridRequest) -> CacheResult<GridPlan> {
    check_pow2_zoom(request)?;
    let extent = &request.extent;
    let zoom = (request.zoom_min, request.zoom_max);
    let range = widen(explicit_publish(request), zoom);
    if range.1 > MAX_POW2_LEVEL {
        return Err(CacheError::InvalidZoom(format!(
            "publish_zoom_max {} exceeds {}",
            range.1, MAX_POW2_LEVEL
        )));
    }
    let res0 = extent.width().max(extent.height()) / tile_size as f64;

    let matrices = (range.0..=range.1)
        .map(|z| {
            let res = res0 / 2f64.powi(z as i32 - zoom.0 as i32);
            extent_matrix(z, res, None, tile_size, extent)
        })
        .collect();

    Ok(ladder_plan("wmts_synthetic", matrices, zoom, tile_size, request))
}

// ============================================================================
// Custom subdivision
// ============================================================================

fn resolve_custom(tile_size: u32, request: &GridRequest) -> CacheResult<GridPlan> {
    check_pow2_zoom(request)?;
    let extent = &request.extent;

    let levels: Vec<LevelPlan> = (request.zoom_min..=request.zoom_max)
        .map(|z| {
            let tiles = 1u32 << z;
            let res_x = extent.width() / tiles as f64 / tile_size as f64;
            let res_y = extent.height() / tiles as f64 / tile_size as f64;
            let matrix = TileMatrix {
                resolution_y: res_y,
                origin: (extent.min_x, extent.min_y),
                row_origin: RowOrigin::Bottom,
                ..TileMatrix::top_left(z, res_x, (tile_size, tile_size), (tiles, tiles), (0.0, 0.0))
            };
            LevelPlan {
                span: matrix.full_span(),
                matrix,
            }
        })
        .collect();

    let cached = (request.zoom_min, request.zoom_max);
    Ok(GridPlan {
        scheme: Scheme::Custom,
        strategy: "custom",
        expected_tile_count: expected_count(&levels).max(1),
        levels,
        cached_zoom: cached,
        published_zoom: cached,
        tile_matrix_set: None,
        warnings: Vec::new(),
    })
}
