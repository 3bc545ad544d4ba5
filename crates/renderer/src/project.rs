//! Map project documents: the layers and themes a cache is rendered from.
//!
//! Projects are YAML (or JSON, which YAML accepts):
//!
//! ```yaml
//! name: city
//! crs: EPSG:3857
//! layers:
//!   - id: parks
//!     name: Parks
//!     crs: EPSG:3857
//!     extent: { min_x: 0, min_y: 0, max_x: 1000, max_y: 1000 }
//!     provider: fill
//!     color: [40, 160, 60, 255]
//!   - id: ortho
//!     crs: EPSG:3857
//!     provider: wms
//!     url: https://maps.example.org/wms
//!     wms_layers: ortho2024
//! themes:
//!   - name: base
//!     layers:
//!       - { layer: ortho, visible: true }
//!       - { layer: parks, visible: false }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tile_common::{transform_extent, CacheError, CrsCode, Extent};

fn default_true() -> bool {
    true
}

fn default_wms_version() -> String {
    "1.3.0".to_string()
}

fn default_wms_format() -> String {
    "image/png".to_string()
}

/// Where a layer's pixels come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LayerSource {
    /// Solid color over the layer extent (or everywhere).
    Fill { color: [u8; 4] },
    /// OGC WMS GetMap.
    Wms {
        url: String,
        wms_layers: String,
        #[serde(default)]
        styles: String,
        #[serde(default = "default_wms_version")]
        version: String,
        #[serde(default = "default_wms_format")]
        format: String,
    },
}

impl LayerSource {
    pub fn provider(&self) -> &'static str {
        match self {
            LayerSource::Fill { .. } => "fill",
            LayerSource::Wms { .. } => "wms",
        }
    }

    /// Network-backed providers.
    pub fn is_remote(&self) -> bool {
        matches!(self, LayerSource::Wms { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectLayer {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub crs: CrsCode,
    #[serde(default)]
    pub extent: Option<Extent>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(flatten)]
    pub source: LayerSource,
}

impl ProjectLayer {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_remote(&self) -> bool {
        self.source.is_remote()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeLayerState {
    pub layer: String,
    #[serde(default = "default_true")]
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    #[serde(default)]
    pub layers: Vec<ThemeLayerState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    #[serde(default)]
    pub name: Option<String>,
    pub crs: CrsCode,
    #[serde(default)]
    pub extent: Option<Extent>,
    #[serde(default)]
    pub layers: Vec<ProjectLayer>,
    #[serde(default)]
    pub themes: Vec<Theme>,
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl ProjectDocument {
    /// Parse a YAML or JSON project.
    pub fn parse(data: &str) -> Result<Self, CacheError> {
        serde_yaml::from_str(data).map_err(|e| CacheError::ProjectUnreadable(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            CacheError::ProjectUnreadable(format!("{}: {}", path.display(), e))
        })?;
        let mut doc = Self::parse(&data).map_err(|e| {
            CacheError::ProjectUnreadable(format!("{}: {}", path.display(), e))
        })?;
        doc.path = Some(path.to_path_buf());
        Ok(doc)
    }

    /// File stem of the project path, or its name.
    pub fn stem(&self) -> String {
        self.path
            .as_deref()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| "project".to_string())
    }

    /// Look a layer up by id, then by display name.
    pub fn find_layer(&self, name: &str) -> Option<&ProjectLayer> {
        self.layers
            .iter()
            .find(|l| l.id == name)
            .or_else(|| self.layers.iter().find(|l| l.name.as_deref() == Some(name)))
    }

    pub fn find_theme(&self, name: &str) -> Option<&Theme> {
        self.themes.iter().find(|t| t.name == name)
    }

    /// Visible layers of a theme, in project order, without duplicates.
    ///
    /// An unknown theme resolves to no layers.
    pub fn resolve_theme(&self, name: &str) -> Vec<&ProjectLayer> {
        let Some(theme) = self.find_theme(name) else {
            return Vec::new();
        };
        let wanted: HashSet<&str> = theme
            .layers
            .iter()
            .filter(|s| s.visible)
            .map(|s| s.layer.as_str())
            .collect();

        self.layers
            .iter()
            .filter(|l| {
                wanted.contains(l.id.as_str())
                    || l.name.as_deref().is_some_and(|n| wanted.contains(n))
            })
            .collect()
    }

    /// Union of the extents of local (non-remote) layers, reprojected into
    /// `crs`. Extents that cannot be reprojected are used as they are.
    pub fn local_extent_union<'a>(
        layers: impl IntoIterator<Item = &'a ProjectLayer>,
        crs: &CrsCode,
    ) -> Option<Extent> {
        layers
            .into_iter()
            .filter(|l| !l.is_remote())
            .filter_map(|l| {
                let extent = l.extent?;
                Some(transform_extent(&extent, &l.crs, crs).unwrap_or(extent))
            })
            .filter(Extent::is_valid)
            .reduce(|a, b| a.union(&b))
    }
}
