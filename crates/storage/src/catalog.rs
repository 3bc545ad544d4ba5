//! Cache catalog (`index.json`): what has been cached per layer or theme.
//!
//! The catalog is read, merged and rewritten once per run. Merging never
//! shrinks recorded zoom coverage: published and cached ranges of the
//! previous entry are unioned with the new ones. A corrupt file is not
//! fatal; the run starts from an empty catalog and reports a warning.

use crate::tile_writer::ensure_dir;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tile_common::{CacheError, CacheResult, CacheTarget, TargetKind, TileMatrixSetDescriptor};
use tracing::{debug, warn};
use uuid::Uuid;

/// One cached layer or theme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_kind")]
    pub kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
    #[serde(default)]
    pub tile_crs: Option<String>,
    #[serde(default)]
    pub extent: Option<[f64; 4]>,
    #[serde(default)]
    pub project_crs: Option<String>,
    #[serde(default)]
    pub project_extent: Option<[f64; 4]>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub zoom_min: Option<u32>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub zoom_max: Option<u32>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub published_zoom_min: Option<u32>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub published_zoom_max: Option<u32>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub cached_zoom_min: Option<u32>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub cached_zoom_max: Option<u32>,
    #[serde(default)]
    pub tile_format: Option<String>,
    /// Absolute tile directory.
    #[serde(default)]
    pub path: Option<String>,
    /// Timestamp of the run that wrote this entry.
    #[serde(default)]
    pub generated: Option<String>,
    #[serde(default)]
    pub tile_count: Option<u64>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub xyz_mode: Option<String>,
    #[serde(default)]
    pub tile_matrix_preset: Option<String>,
    #[serde(default)]
    pub source_layers: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_descriptor"
    )]
    pub tile_matrix_set: Option<TileMatrixSetDescriptor>,
    /// Fields written by other tools (e.g. `tile_profile_source`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogEntry {
    pub fn new(target: &CacheTarget) -> Self {
        let mut entry = Self {
            name: target.name.clone(),
            kind: target.kind,
            generated: Some(Utc::now().to_rfc3339()),
            ..Self::default()
        };
        match target.kind {
            TargetKind::Layer => entry.layer = Some(target.name.clone()),
            TargetKind::Theme => entry.theme = Some(target.name.clone()),
        }
        entry
    }

    pub fn key_matches(&self, name: &str, kind: TargetKind) -> bool {
        self.name == name && self.kind == kind
    }

    /// Sets the published range; `zoom_min/zoom_max` mirror it.
    pub fn set_published(&mut self, min: u32, max: u32) {
        self.published_zoom_min = Some(min);
        self.published_zoom_max = Some(max);
        self.zoom_min = Some(min);
        self.zoom_max = Some(max);
    }

    pub fn set_cached(&mut self, min: u32, max: u32) {
        self.cached_zoom_min = Some(min);
        self.cached_zoom_max = Some(max);
    }

    /// Published range, falling back to the legacy `zoom_min/zoom_max`.
    pub fn published_range(&self) -> (Option<u32>, Option<u32>) {
        match (self.published_zoom_min, self.published_zoom_max) {
            (None, None) => (self.zoom_min, self.zoom_max),
            pair => pair,
        }
    }

    /// Cached range, falling back to the legacy `zoom_min/zoom_max`.
    pub fn cached_range(&self) -> (Option<u32>, Option<u32>) {
        match (self.cached_zoom_min, self.cached_zoom_max) {
            (None, None) => (self.zoom_min, self.zoom_max),
            pair => pair,
        }
    }
}

/// Union of two possibly partial ranges: min of all bounds, max of all bounds.
pub fn merge_range(
    a: (Option<u32>, Option<u32>),
    b: (Option<u32>, Option<u32>),
) -> Option<(u32, u32)> {
    let values = [a.0, a.1, b.0, b.1];
    let min = values.iter().flatten().min()?;
    let max = values.iter().flatten().max()?;
    Some((*min, *max))
}

/// The whole `index.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheCatalog {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub layers: Vec<CatalogEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CacheCatalog {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            created: Some(Utc::now().to_rfc3339()),
            ..Self::default()
        }
    }

    /// Strict load; errors are reported as catalog corruption.
    pub fn load(path: &Path) -> CacheResult<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| CacheError::CatalogCorruption(format!("{}: {}", path.display(), e)))
    }

    /// Load an existing catalog or start a new one.
    ///
    /// An absent file yields a fresh catalog. An unreadable or unparseable
    /// one also yields a fresh catalog, plus a warning for the caller.
    pub fn load_or_create(path: &Path, project: &str) -> (Self, Option<String>) {
        if !path.exists() {
            return (Self::new(project), None);
        }
        match Self::load(path) {
            Ok(mut catalog) => {
                if catalog.project.is_none() {
                    catalog.project = Some(project.to_string());
                }
                if catalog.created.is_none() {
                    catalog.created = Some(Utc::now().to_rfc3339());
                }
                debug!(path = %path.display(), entries = catalog.layers.len(), "Loaded catalog");
                (catalog, None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Catalog unreadable, starting fresh");
                (Self::new(project), Some(e.to_string()))
            }
        }
    }

    pub fn find(&self, name: &str, kind: TargetKind) -> Option<&CatalogEntry> {
        self.layers.iter().find(|e| e.key_matches(name, kind))
    }

    /// Merge `entry` into the catalog under its `(name, kind)` key.
    ///
    /// With a previous entry: zoom ranges are unioned, unknown fields it
    /// carried are kept, and when `extent_override` is set its stored extent
    /// wins over the new one.
    pub fn merge(&mut self, mut entry: CatalogEntry, extent_override: bool) -> &CatalogEntry {
        let Some(pos) = self
            .layers
            .iter()
            .position(|e| e.key_matches(&entry.name, entry.kind))
        else {
            self.layers.push(entry);
            let last = self.layers.len() - 1;
            return &self.layers[last];
        };

        let previous = &self.layers[pos];
        if extent_override && previous.extent.is_some() {
            entry.extent = previous.extent;
        }
        for (key, value) in &previous.extra {
            if !entry.extra.contains_key(key) {
                entry.extra.insert(key.clone(), value.clone());
            }
        }
        if let Some((min, max)) = merge_range(previous.published_range(), entry.published_range()) {
            entry.set_published(min, max);
        }
        if let Some((min, max)) = merge_range(previous.cached_range(), entry.cached_range()) {
            entry.set_cached(min, max);
        }

        self.layers[pos] = entry;
        &self.layers[pos]
    }

    /// Drop the entry for `(name, kind)`.
    pub fn remove(&mut self, name: &str, kind: TargetKind) -> Option<CatalogEntry> {
        let pos = self.layers.iter().position(|e| e.key_matches(name, kind))?;
        Some(self.layers.remove(pos))
    }

    /// Rewrite the whole catalog via a sibling temp file.
    pub async fn save(&self, path: &Path) -> CacheResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent).await?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index.json".to_string());
        let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::Persistence(format!(
                "cannot replace {}: {}",
                path.display(),
                e
            )));
        }
        debug!(path = %path.display(), entries = self.layers.len(), "Catalog written");
        Ok(())
    }
}

fn lenient_kind<'de, D: Deserializer<'de>>(d: D) -> Result<TargetKind, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value.as_ref().and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("theme") => TargetKind::Theme,
        _ => TargetKind::Layer,
    })
}

/// Integers, numeric strings and floats; negatives clamp to 0.
fn lenient_level<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    let number = value.as_ref().and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    });
    Ok(number.map(|n| n.clamp(0, u32::MAX as i64) as u32))
}

fn lenient_descriptor<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<TileMatrixSetDescriptor>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}
