//! Single-tile mode: render one `z/x/y` tile outside the batch loop.
//!
//! The tile goes through the same skip, render and save path as a batch
//! tile. The catalog is not touched.

use crate::config::{GeneratorConfig, SingleTileRequest};
use crate::engine::{CacheEngine, TileOutcome, TileTask};
use crate::job::{reproject_or_keep, ResolvedTarget};
use renderer::ProjectDocument;
use storage::TileLayout;
use tile_common::{
    CacheError, CacheResult, CrsCode, Event, EventSink, Extent, TileCoord, TileMatrix,
    DEFAULT_TILE_SIZE, WEB_MERCATOR_MAX,
};
use tile_grid::{TileMatrixPreset, MAX_POW2_LEVEL};
use tracing::{debug, info};

/// Bounding boxes with coordinates beyond this are taken to be Web Mercator.
const MERCATOR_BBOX_THRESHOLD: f64 = 9.0e6;

/// Where a single tile lands and what it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleTilePlan {
    pub coord: TileCoord,
    pub crs: CrsCode,
    pub extent: Extent,
    pub size: (u32, u32),
}

/// Render and save one tile. Emits a final `status` record either way.
pub async fn render_single(
    engine: &CacheEngine,
    config: &GeneratorConfig,
    project: &ProjectDocument,
    request: &SingleTileRequest,
    events: &dyn EventSink,
) -> CacheResult<TileOutcome> {
    let resolved = ResolvedTarget::resolve(config, project, events)?;
    let crs = resolved.tile_crs(config, project);
    let plan = plan_single(config, request, crs, events)?;

    let layout = TileLayout::new(&config.output_dir, &resolved.target, config.tile_format.extension());
    let path = layout.tile_path(&plan.coord);
    let layers = resolved.layer_ids();
    info!(
        tile = %plan.coord.path_key(),
        storage = layout.storage_name(),
        crs = %plan.crs,
        "Rendering single tile"
    );

    let outcome = engine
        .process_tile(&TileTask {
            layers: &layers,
            crs: &plan.crs,
            extent: plan.extent,
            size: plan.size,
            path: path.clone(),
            timeout: resolved.render_timeout,
        })
        .await;

    let record = match &outcome {
        TileOutcome::Saved(saved) => Event::status("ok")
            .with("path", &saved.path)
            .with("bytes", saved.bytes),
        TileOutcome::Skipped => Event::status("ok")
            .with("path", &path)
            .with("skipped", true),
        TileOutcome::Failed { error, attempts } => Event::error("tile_failed")
            .with("path", &path)
            .with("reason", error.code())
            .with("message", error.to_string())
            .with("attempts", attempts),
        TileOutcome::Cancelled => Event::status("aborted").with("path", &path),
    };
    events.emit(
        record
            .with("z", plan.coord.z)
            .with("x", plan.coord.x)
            .with("y", plan.coord.y)
            .with("extent", plan.extent.to_array()),
    );
    Ok(outcome)
}

/// Process exit code for a single-tile outcome.
pub fn single_exit_code(outcome: &TileOutcome) -> u8 {
    match outcome {
        TileOutcome::Saved(_) | TileOutcome::Skipped => 0,
        TileOutcome::Failed { .. } => 2,
        TileOutcome::Cancelled => 130,
    }
}

/// Work out the tile extent.
///
/// An explicit bbox wins. Otherwise the tile is looked up in the configured
/// preset (or one found for the CRS), falling back to the XYZ tile in Web
/// Mercator reprojected to `crs`.
pub fn plan_single(
    config: &GeneratorConfig,
    request: &SingleTileRequest,
    crs: CrsCode,
    events: &dyn EventSink,
) -> CacheResult<SingleTilePlan> {
    let coord = TileCoord::new(request.z, request.x, request.y);
    let square = (DEFAULT_TILE_SIZE, DEFAULT_TILE_SIZE);

    if let Some(bbox) = request.bbox {
        bbox.validate()?;
        let extent = if bbox.max_abs() > MERCATOR_BBOX_THRESHOLD && !crs.is_web_mercator() {
            debug!(bbox = ?bbox.to_array(), "Treating bbox as Web Mercator");
            reproject_or_keep(&bbox, &CrsCode::web_mercator(), &crs, events)
        } else {
            bbox
        };
        return Ok(SingleTilePlan { coord, crs, extent, size: square });
    }

    let preset = match &config.tile_matrix_preset {
        Some(reference) => Some(TileMatrixPreset::load(reference, &config.tile_grids_dir)?.0),
        None => TileMatrixPreset::find_for_crs(&crs, &config.tile_grids_dir),
    };
    if let Some(preset) = preset {
        let matrix = preset.matrix_for_level(request.z).ok_or_else(|| {
            CacheError::InvalidZoom(format!("level {} not in preset {}", request.z, preset.id))
        })?;
        if request.x >= matrix.matrix_width || request.y >= matrix.matrix_height {
            return Err(CacheError::InvalidZoom(format!(
                "tile {} outside {}x{} matrix of preset {}",
                coord.path_key(),
                matrix.matrix_width,
                matrix.matrix_height,
                preset.id
            )));
        }
        return Ok(SingleTilePlan {
            coord,
            crs,
            extent: matrix.tile_extent(request.x, request.y),
            size: (matrix.tile_width, matrix.tile_height),
        });
    }

    if request.z > MAX_POW2_LEVEL {
        return Err(CacheError::InvalidZoom(format!(
            "zoom {} exceeds {}",
            request.z, MAX_POW2_LEVEL
        )));
    }
    let tiles = 1u32 << request.z;
    if request.x >= tiles || request.y >= tiles {
        return Err(CacheError::InvalidZoom(format!(
            "tile {} outside {}x{} grid",
            coord.path_key(),
            tiles,
            tiles
        )));
    }
    let resolution = 2.0 * WEB_MERCATOR_MAX / (tiles as f64 * DEFAULT_TILE_SIZE as f64);
    let matrix = TileMatrix::top_left(
        request.z,
        resolution,
        square,
        (tiles, tiles),
        (-WEB_MERCATOR_MAX, WEB_MERCATOR_MAX),
    );
    let mercator = matrix.tile_extent(request.x, request.y);
    let extent = if crs.is_web_mercator() {
        mercator
    } else {
        reproject_or_keep(&mercator, &CrsCode::web_mercator(), &crs, events)
    };
    Ok(SingleTilePlan { coord, crs, extent, size: square })
}
