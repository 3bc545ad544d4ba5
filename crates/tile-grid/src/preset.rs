//! Tile-matrix presets: named grid definitions with explicit per-level
//! matrices, shared by every layer that publishes under them.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tile_common::{AxisOrder, CrsCode, TileMatrix, DEFAULT_TILE_SIZE, STANDARD_PIXEL_SIZE};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("Tile matrix preset not found: {0}")]
    NotFound(String),

    #[error("Failed to read preset {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("Preset {0} has no usable matrices")]
    NoMatrices(String),
}

impl From<PresetError> for tile_common::CacheError {
    fn from(err: PresetError) -> Self {
        tile_common::CacheError::Preset(err.to_string())
    }
}

/// A normalized preset.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrixPreset {
    pub id: String,
    pub title: Option<String>,
    pub supported_crs: Vec<String>,
    pub axis_order: AxisOrder,
    /// Preset-level origin in x/y order.
    pub top_left_corner: (f64, f64),
    pub tile_width: u32,
    pub tile_height: u32,
    pub matrices: Vec<TileMatrix>,
    /// File the preset was loaded from, if any.
    pub source_path: Option<PathBuf>,
}

impl TileMatrixPreset {
    /// Parse and normalize a preset document.
    ///
    /// Returns the preset plus human-readable warnings for matrices that
    /// had to be dropped.
    pub fn from_json(data: &str, fallback_id: &str) -> Result<(Self, Vec<String>), PresetError> {
        let raw: RawPreset = serde_json::from_str(data).map_err(|e| PresetError::Unreadable {
            path: fallback_id.to_string(),
            message: e.to_string(),
        })?;
        Ok(raw.normalize(fallback_id))
    }

    /// Load a preset by name or path.
    ///
    /// An absolute path is used as is. Otherwise `<grids_dir>/<name>.json`,
    /// `<grids_dir>/<name>` and `<cwd>/<name>` are tried in order.
    pub fn load(reference: &str, grids_dir: &Path) -> Result<(Self, Vec<String>), PresetError> {
        let mut warnings = Vec::new();
        for candidate in preset_candidates(reference, grids_dir) {
            if !candidate.is_file() {
                continue;
            }
            let result = std::fs::read_to_string(&candidate)
                .map_err(|e| PresetError::Unreadable {
                    path: candidate.display().to_string(),
                    message: e.to_string(),
                })
                .and_then(|data| Self::from_json(&data, reference));

            match result {
                Ok((mut preset, preset_warnings)) => {
                    debug!(path = %candidate.display(), id = %preset.id, "Loaded tile matrix preset");
                    preset.source_path = Some(candidate);
                    warnings.extend(preset_warnings);
                    if preset.matrices.is_empty() {
                        return Err(PresetError::NoMatrices(preset.id));
                    }
                    return Ok((preset, warnings));
                }
                Err(e) => {
                    warn!(candidate = %candidate.display(), error = %e, "Preset candidate unreadable");
                    warnings.push(e.to_string());
                }
            }
        }
        Err(PresetError::NotFound(reference.to_string()))
    }

    /// Scan `grids_dir` for a preset that declares support for `crs`.
    pub fn find_for_crs(crs: &CrsCode, grids_dir: &Path) -> Option<Self> {
        let entries = std::fs::read_dir(grids_dir).ok()?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        for path in paths {
            let Ok(data) = std::fs::read_to_string(&path) else {
                continue;
            };
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("preset")
                .to_string();
            let Ok((mut preset, _)) = Self::from_json(&data, &stem) else {
                continue;
            };
            if preset.supports(crs) && !preset.matrices.is_empty() {
                preset.source_path = Some(path);
                return Some(preset);
            }
        }
        None
    }

    pub fn supports(&self, crs: &CrsCode) -> bool {
        self.supported_crs
            .iter()
            .filter_map(|s| CrsCode::parse(s).ok())
            .any(|c| &c == crs)
    }

    /// Primary supported CRS, as written in the preset.
    pub fn primary_crs(&self) -> &str {
        self.supported_crs
            .first()
            .map(String::as_str)
            .unwrap_or("EPSG:3857")
    }

    /// Sorted, deduplicated source levels.
    pub fn levels(&self) -> Vec<u32> {
        let mut levels: Vec<u32> = self.matrices.iter().map(|m| m.source_level).collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    /// Matrices whose source level lies in `[min, max]`.
    pub fn matrices_in(&self, min: u32, max: u32) -> Vec<&TileMatrix> {
        self.matrices
            .iter()
            .filter(|m| (min..=max).contains(&m.source_level))
            .collect()
    }

    pub fn matrix_for_level(&self, level: u32) -> Option<&TileMatrix> {
        self.matrices.iter().find(|m| m.source_level == level)
    }
}

fn preset_candidates(reference: &str, grids_dir: &Path) -> Vec<PathBuf> {
    let raw = Path::new(reference);
    if raw.is_absolute() {
        return vec![raw.to_path_buf()];
    }
    let mut candidates = vec![
        grids_dir.join(format!("{}.json", reference)),
        grids_dir.join(reference),
    ];
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(reference));
    }
    candidates
}

// ============================================================================
// Raw document
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPreset {
    id: Option<String>,
    name: Option<String>,
    identifier: Option<String>,
    title: Option<String>,
    supported_crs: Option<OneOrMany>,
    crs: Option<OneOrMany>,
    axis_order: Option<String>,
    top_left_corner: Option<Vec<f64>>,
    top_left: Option<Vec<f64>>,
    tile_width: Option<u32>,
    tile_height: Option<u32>,
    matrices: Option<Vec<RawMatrix>>,
    #[serde(rename = "matrixSet")]
    matrix_set: Option<Vec<RawMatrix>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawMatrix {
    identifier: Option<Value>,
    #[serde(alias = "z")]
    source_level: Option<u32>,
    axis_order: Option<String>,
    top_left_corner: Option<Vec<f64>>,
    top_left: Option<Vec<f64>>,
    scale_denominator: Option<f64>,
    resolution: Option<f64>,
    tile_width: Option<u32>,
    tile_height: Option<u32>,
    matrix_width: Option<u32>,
    matrix_height: Option<u32>,
}

fn pair(values: &[f64]) -> Option<(f64, f64)> {
    match values {
        [a, b, ..] => Some((*a, *b)),
        _ => None,
    }
}

impl RawPreset {
    fn normalize(self, fallback_id: &str) -> (TileMatrixPreset, Vec<String>) {
        let mut warnings = Vec::new();
        let axis_order = self
            .axis_order
            .as_deref()
            .and_then(AxisOrder::parse)
            .unwrap_or_default();
        let origin = self
            .top_left_corner
            .as_deref()
            .or(self.top_left.as_deref())
            .and_then(pair)
            .map(|p| axis_order.to_xy(p))
            .unwrap_or((0.0, 0.0));
        let tile_width = self.tile_width.filter(|w| *w > 0).unwrap_or(DEFAULT_TILE_SIZE);
        let tile_height = self.tile_height.filter(|h| *h > 0).unwrap_or(DEFAULT_TILE_SIZE);

        let id = self
            .id
            .or(self.name.clone())
            .or(self.identifier)
            .unwrap_or_else(|| fallback_id.to_string());
        let supported_crs = match self.supported_crs.or(self.crs) {
            Some(OneOrMany::One(s)) => vec![s],
            Some(OneOrMany::Many(v)) if !v.is_empty() => v,
            _ => vec!["EPSG:3857".to_string()],
        };

        let raw_matrices = self.matrices.or(self.matrix_set).unwrap_or_default();
        let mut matrices = Vec::with_capacity(raw_matrices.len());
        for (idx, entry) in raw_matrices.into_iter().enumerate() {
            let identifier = match &entry.identifier {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => idx.to_string(),
            };
            let source_level = entry
                .source_level
                .or_else(|| identifier.parse().ok())
                .unwrap_or(idx as u32);
            let entry_axis = entry
                .axis_order
                .as_deref()
                .and_then(AxisOrder::parse)
                .unwrap_or(axis_order);
            let entry_origin = entry
                .top_left_corner
                .as_deref()
                .or(entry.top_left.as_deref())
                .and_then(pair)
                .map(|p| entry_axis.to_xy(p))
                .unwrap_or(origin);

            let resolution = entry
                .resolution
                .or_else(|| entry.scale_denominator.map(|s| s * STANDARD_PIXEL_SIZE))
                .filter(|r| *r > 0.0 && r.is_finite());
            let Some(resolution) = resolution else {
                warnings.push(format!(
                    "preset {}: matrix {} has no positive resolution, skipped",
                    id, identifier
                ));
                continue;
            };
            let scale_denominator = entry
                .scale_denominator
                .filter(|s| *s > 0.0)
                .unwrap_or(resolution / STANDARD_PIXEL_SIZE);

            matrices.push(TileMatrix {
                level: source_level,
                identifier,
                source_level,
                resolution,
                resolution_y: resolution,
                scale_denominator,
                tile_width: entry.tile_width.filter(|w| *w > 0).unwrap_or(tile_width),
                tile_height: entry.tile_height.filter(|h| *h > 0).unwrap_or(tile_height),
                matrix_width: entry.matrix_width.unwrap_or(1).max(1),
                matrix_height: entry.matrix_height.unwrap_or(1).max(1),
                origin: entry_origin,
                axis_order: entry_axis,
                row_origin: tile_common::RowOrigin::Top,
            });
        }

        for w in &warnings {
            warn!(preset = %id, "{}", w);
        }

        let preset = TileMatrixPreset {
            id,
            title: self.title.or(self.name),
            supported_crs,
            axis_order,
            top_left_corner: origin,
            tile_width,
            tile_height,
            matrices,
            source_path: None,
        };
        (preset, warnings)
    }
}
