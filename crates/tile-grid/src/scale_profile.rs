//! CRS scale profiles: a scale-denominator ladder per CRS, used to build
//! WMTS matrices when no preset applies.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tile_common::{CrsCode, DEFAULT_TILE_SIZE, STANDARD_PIXEL_SIZE};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleProfile {
    pub id: String,
    pub name: Option<String>,
    pub tile_size: u32,
    /// Scale denominators, level 0 first.
    pub scales: Vec<f64>,
}

impl ScaleProfile {
    pub fn level_count(&self) -> u32 {
        self.scales.len() as u32
    }

    pub fn resolution(&self, level: u32) -> Option<f64> {
        self.scales
            .get(level as usize)
            .map(|s| s * STANDARD_PIXEL_SIZE)
    }

    /// Clamp a level into the profile.
    pub fn clamp_level(&self, level: u32) -> u32 {
        level.min(self.level_count().saturating_sub(1))
    }
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    id: Option<String>,
    name: Option<String>,
    title: Option<String>,
    tile_size: Option<u32>,
    #[serde(rename = "tileSize")]
    tile_size_camel: Option<u32>,
    scales: Option<Vec<Value>>,
    scale_denominators: Option<Vec<Value>>,
    #[serde(rename = "scaleDenominators")]
    scale_denominators_camel: Option<Vec<Value>>,
}

/// Scale profiles keyed by upper-cased CRS key.
#[derive(Debug, Clone, Default)]
pub struct ScaleProfiles {
    profiles: HashMap<String, ScaleProfile>,
}

impl ScaleProfiles {
    /// Parse a profiles document. Entries without positive scales are
    /// ignored.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, Value> = serde_json::from_str(data)?;
        let mut profiles = HashMap::new();

        for (key, value) in raw {
            let Ok(entry) = serde_json::from_value::<RawProfile>(value) else {
                continue;
            };
            let scales: Vec<f64> = entry
                .scales
                .or(entry.scale_denominators)
                .or(entry.scale_denominators_camel)
                .unwrap_or_default()
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                })
                .filter(|s| *s > 0.0 && s.is_finite())
                .collect();
            if scales.is_empty() {
                continue;
            }

            let key = key.to_uppercase();
            profiles.insert(
                key.clone(),
                ScaleProfile {
                    id: entry.id.or(entry.name.clone()).unwrap_or_else(|| key.clone()),
                    name: entry.name.or(entry.title),
                    tile_size: entry
                        .tile_size
                        .or(entry.tile_size_camel)
                        .filter(|t| *t > 0)
                        .unwrap_or(DEFAULT_TILE_SIZE),
                    scales,
                },
            );
        }
        Ok(Self { profiles })
    }

    /// Load from disk. A missing or unreadable file yields an empty set;
    /// unreadable files are logged.
    pub fn load(path: &Path) -> Self {
        if !path.is_file() {
            return Self::default();
        }
        match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|d| Self::from_json(&d).map_err(|e| e.to_string()))
        {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load CRS scale presets");
                Self::default()
            }
        }
    }

    /// Match by full authority id, then by the bare EPSG number.
    pub fn find(&self, crs: &CrsCode) -> Option<&ScaleProfile> {
        self.profiles
            .get(crs.as_str())
            .or_else(|| crs.epsg_number().and_then(|n| self.profiles.get(&n.to_string())))
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }
}
