//! Job setup: everything resolved before the first tile is attempted.
//!
//! A [`CacheJob`] pins down the target and its layers, the cache extent in
//! both project and tile CRS, the scheme and the grid plan. Every problem
//! found here is a fatal input error.

use crate::config::{GeneratorConfig, REMOTE_MIN_TIMEOUT};
use renderer::{ProjectDocument, ProjectLayer, TileFormat};
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::TileLayout;
use tile_common::{
    transform_extent, CacheError, CacheResult, CacheTarget, CrsCode, Event, EventSink, Extent,
    TargetKind,
};
use tile_grid::{
    GridPlan, GridRequest, GridStrategy, ScaleProfiles, Scheme, TileMatrixPreset, XyzMode,
};
use tracing::{debug, info, warn};

/// A fully resolved generation job.
#[derive(Debug, Clone)]
pub struct CacheJob {
    pub target: CacheTarget,
    /// Layer ids handed to the renderer, bottom to top.
    pub layer_ids: Vec<String>,
    /// Display names recorded in the catalog.
    pub source_layers: Vec<String>,
    pub has_remote: bool,
    pub project_path: String,
    pub project_crs: CrsCode,
    /// Cache extent in the project CRS.
    pub project_extent: Extent,
    pub tile_crs: CrsCode,
    /// Cache extent in the tile CRS.
    pub tile_extent: Extent,
    /// The extent came from an explicit override.
    pub extent_override: bool,
    pub render_timeout: Duration,
    pub scheme: Scheme,
    pub xyz_mode: XyzMode,
    pub preset_id: Option<String>,
    pub plan: GridPlan,
    pub layout: TileLayout,
    pub tile_format: TileFormat,
    pub index_path: PathBuf,
    pub job_id: Option<String>,
}

/// Target, layers and timeout shared by batch and single-tile mode.
#[derive(Debug, Clone)]
pub struct ResolvedTarget<'a> {
    pub target: CacheTarget,
    pub layers: Vec<&'a ProjectLayer>,
    pub has_remote: bool,
    pub render_timeout: Duration,
}

impl<'a> ResolvedTarget<'a> {
    /// Resolve the configured target against the project and apply the
    /// remote-provider guard.
    pub fn resolve(
        config: &GeneratorConfig,
        project: &'a ProjectDocument,
        events: &dyn EventSink,
    ) -> CacheResult<Self> {
        let target = config.target()?;
        if target.needs_sanitizing() {
            warn!(name = %target.name, storage = %target.storage_name(), "Target name sanitized");
            events.emit(
                Event::warning("storage_name_sanitized")
                    .with("name", &target.name)
                    .with("storage_name", target.storage_name()),
            );
        }

        let layers = match target.kind {
            TargetKind::Layer => vec![project
                .find_layer(&target.name)
                .ok_or_else(|| CacheError::LayerNotFound(target.name.clone()))?],
            TargetKind::Theme => {
                let layers = project.resolve_theme(&target.name);
                if layers.is_empty() {
                    return Err(CacheError::ThemeEmpty(target.name.clone()));
                }
                layers
            }
        };

        let remote: Vec<&str> = layers
            .iter()
            .filter(|l| l.is_remote())
            .map(|l| l.id.as_str())
            .collect();
        let has_remote = !remote.is_empty();
        if has_remote && !config.allow_remote {
            return Err(CacheError::RemoteNotAllowed(remote.join(", ")));
        }

        let mut render_timeout = config.render_timeout();
        if has_remote && render_timeout < REMOTE_MIN_TIMEOUT {
            debug!(
                configured_ms = config.render_timeout_ms,
                "Raising render timeout for remote layers"
            );
            render_timeout = REMOTE_MIN_TIMEOUT;
        }

        Ok(Self {
            target,
            layers,
            has_remote,
            render_timeout,
        })
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.id.clone()).collect()
    }

    /// Tiling CRS: the configured one, else the first layer's.
    pub fn tile_crs(&self, config: &GeneratorConfig, project: &ProjectDocument) -> CrsCode {
        config
            .tile_crs
            .clone()
            .or_else(|| self.layers.first().map(|l| l.crs.clone()))
            .unwrap_or_else(|| project.crs.clone())
    }
}

impl CacheJob {
    pub fn prepare(
        config: &GeneratorConfig,
        project: &ProjectDocument,
        events: &dyn EventSink,
    ) -> CacheResult<Self> {
        config.validate()?;
        let resolved = ResolvedTarget::resolve(config, project, events)?;

        let project_crs = project.crs.clone();
        let (project_extent, extent_override) = resolve_extent(config, project, &resolved, events)?;
        let tile_crs = resolved.tile_crs(config, project);
        let tile_extent = reproject_or_keep(&project_extent, &project_crs, &tile_crs, events);
        tile_extent.validate()?;

        let preset = match &config.tile_matrix_preset {
            Some(reference) => {
                let (preset, warnings) = TileMatrixPreset::load(reference, &config.tile_grids_dir)?;
                for message in warnings {
                    events.emit(Event::warning("preset_warning").with("message", message));
                }
                if !preset.supports(&tile_crs) {
                    events.emit(
                        Event::warning("preset_crs_mismatch")
                            .with("preset", &preset.id)
                            .with("tile_crs", tile_crs.as_str()),
                    );
                }
                Some(preset)
            }
            None => None,
        };
        let preset_id = preset.as_ref().map(|p| p.id.clone());

        let scheme = config
            .scheme
            .resolve(preset.is_some(), &tile_crs, config.prefer_wmts);
        let profile = match (scheme, &preset, &config.crs_scale_presets) {
            (Scheme::Wmts, None, Some(path)) => ScaleProfiles::load(path).find(&tile_crs).cloned(),
            _ => None,
        };
        let strategy = GridStrategy::for_scheme(scheme, config.xyz_mode, preset, profile);

        let storage_name = resolved.target.storage_name();
        let plan = strategy.resolve(&GridRequest {
            tile_crs: tile_crs.clone(),
            extent: tile_extent,
            zoom_min: config.zoom_min,
            zoom_max: config.zoom_max,
            publish_zoom_min: config.publish_zoom_min,
            publish_zoom_max: config.publish_zoom_max,
            fallback_set_id: format!("{}:{}", project.stem(), storage_name),
        })?;
        for message in &plan.warnings {
            events.emit(Event::warning("grid_warning").with("message", message));
        }

        let layout = TileLayout::new(
            &config.output_dir,
            &resolved.target,
            config.tile_format.extension(),
        );

        let job = Self {
            layer_ids: resolved.layer_ids(),
            source_layers: resolved
                .layers
                .iter()
                .map(|l| l.display_name().to_string())
                .collect(),
            has_remote: resolved.has_remote,
            render_timeout: resolved.render_timeout,
            target: resolved.target,
            project_path: project_path(project, &config.project),
            project_crs,
            project_extent,
            tile_crs,
            tile_extent,
            extent_override,
            scheme: plan.scheme,
            xyz_mode: config.xyz_mode,
            preset_id,
            plan,
            layout,
            tile_format: config.tile_format,
            index_path: config.index_path(),
            job_id: config.job_id.clone(),
        };

        info!(
            cache_target = %job.target,
            scheme = %job.scheme,
            strategy = job.plan.strategy,
            expected = job.plan.expected_tile_count,
            "Job prepared"
        );
        events.emit(job.start_record());
        Ok(job)
    }

    /// The `start_generate` debug record.
    pub fn start_record(&self) -> Event {
        Event::debug("start_generate")
            .with("job_id", &self.job_id)
            .with("name", &self.target.name)
            .with("kind", self.target.kind)
            .with("layers", &self.layer_ids)
            .with("project_crs", self.project_crs.as_str())
            .with("project_extent", self.project_extent.to_array())
            .with("tile_crs", self.tile_crs.as_str())
            .with("extent", self.tile_extent.to_array())
            .with("scheme", self.scheme)
            .with("strategy", self.plan.strategy)
            .with("tile_matrix_preset", &self.preset_id)
            .with("zoom_min", self.plan.cached_zoom.0)
            .with("zoom_max", self.plan.cached_zoom.1)
            .with("expected_total", self.plan.expected_tile_count)
            .with("render_timeout_ms", self.render_timeout.as_millis() as u64)
            .with("output", self.layout.target_dir())
    }
}

/// Cache extent in the project CRS, and whether it came from an override.
fn resolve_extent(
    config: &GeneratorConfig,
    project: &ProjectDocument,
    resolved: &ResolvedTarget<'_>,
    events: &dyn EventSink,
) -> CacheResult<(Extent, bool)> {
    if let Some(extent) = config.project_extent {
        let from = config.extent_crs.clone().unwrap_or_else(|| project.crs.clone());
        let extent = reproject_or_keep(&extent, &from, &project.crs, events);
        extent.validate()?;
        return Ok((extent, true));
    }

    let own_extent = resolved.layers.first().and_then(|layer| {
        let extent = layer.extent?;
        Some(reproject_or_keep(&extent, &layer.crs, &project.crs, events))
    });
    if resolved.target.kind == TargetKind::Layer && !config.use_project_extent {
        if let Some(extent) = own_extent {
            extent.validate()?;
            return Ok((extent, false));
        }
    }

    let union = match resolved.target.kind {
        TargetKind::Theme => {
            ProjectDocument::local_extent_union(resolved.layers.iter().copied(), &project.crs)
        }
        TargetKind::Layer => ProjectDocument::local_extent_union(&project.layers, &project.crs),
    };
    let extent = union
        .or(project.extent)
        .or(own_extent)
        .ok_or_else(|| {
            CacheError::InvalidExtent(format!("no extent available for {}", resolved.target))
        })?;
    extent.validate()?;
    Ok((extent, false))
}

/// Reproject, falling back to the untransformed extent with a warning.
pub(crate) fn reproject_or_keep(
    extent: &Extent,
    from: &CrsCode,
    to: &CrsCode,
    events: &dyn EventSink,
) -> Extent {
    match transform_extent(extent, from, to) {
        Ok(extent) => extent,
        Err(e) => {
            warn!(from = %from, to = %to, error = %e, "Extent left untransformed");
            events.emit(
                Event::warning("extent_not_transformed")
                    .with("from", from.as_str())
                    .with("to", to.as_str())
                    .with("message", e.to_string()),
            );
            *extent
        }
    }
}

fn project_path(project: &ProjectDocument, configured: &Path) -> String {
    project
        .path
        .as_deref()
        .unwrap_or(configured)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{LOCAL_PROJECT_YAML, REMOTE_PROJECT_YAML};
    use tile_common::MemorySink;

    fn local() -> ProjectDocument {
        ProjectDocument::parse(LOCAL_PROJECT_YAML).unwrap()
    }

    fn config_for_layer(name: &str) -> GeneratorConfig {
        GeneratorConfig {
            layer: Some(name.to_string()),
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_layer_uses_own_extent() {
        let sink = MemorySink::new();
        let job = CacheJob::prepare(&config_for_layer("parks"), &local(), &sink).unwrap();
        assert_eq!(job.project_extent, Extent::new(1000.0, 1000.0, 9000.0, 9000.0));
        assert!(!job.extent_override);
        assert_eq!(job.scheme, Scheme::Xyz);
        assert_eq!(sink.named("start_generate").len(), 1);
    }

    #[test]
    fn test_use_project_extent_takes_union() {
        let sink = MemorySink::new();
        let config = GeneratorConfig {
            use_project_extent: true,
            ..config_for_layer("parks")
        };
        let job = CacheJob::prepare(&config, &local(), &sink).unwrap();
        assert_eq!(job.project_extent.min_x, 0.0);
        assert!(job.project_extent.max_x > 2.0e7);
    }

    #[test]
    fn test_theme_layers_and_override() {
        let sink = MemorySink::new();
        let config = GeneratorConfig {
            theme: Some("base".to_string()),
            project_extent: Some(Extent::new(0.0, 0.0, 10.0, 10.0)),
            extent_crs: Some(CrsCode::wgs84()),
            ..GeneratorConfig::default()
        };
        let job = CacheJob::prepare(&config, &local(), &sink).unwrap();
        assert_eq!(job.layer_ids, vec!["land", "parks"]);
        assert_eq!(job.source_layers, vec!["Land", "Parks"]);
        assert!(job.extent_override);
        // Reprojected from degrees into the project's Web-Mercator CRS.
        assert!(job.project_extent.max_x > 1_000_000.0);
        assert_eq!(job.layout.target_dir(), PathBuf::from("cache/_themes/base"));
    }

    #[test]
    fn test_fatal_targets() {
        let sink = MemorySink::new();
        let err = CacheJob::prepare(&config_for_layer("roads"), &local(), &sink).unwrap_err();
        assert!(matches!(err, CacheError::LayerNotFound(_)));

        let config = GeneratorConfig {
            theme: Some("nothing".to_string()),
            ..GeneratorConfig::default()
        };
        let err = CacheJob::prepare(&config, &local(), &sink).unwrap_err();
        assert!(matches!(err, CacheError::ThemeEmpty(_)));
    }

    #[test]
    fn test_remote_guard() {
        let sink = MemorySink::new();
        let project = ProjectDocument::parse(REMOTE_PROJECT_YAML).unwrap();
        let config = GeneratorConfig {
            project_extent: Some(Extent::new(0.0, 0.0, 1000.0, 1000.0)),
            ..config_for_layer("ortho")
        };
        let err = CacheJob::prepare(&config, &project, &sink).unwrap_err();
        assert!(matches!(err, CacheError::RemoteNotAllowed(_)));

        let allowed = GeneratorConfig {
            allow_remote: true,
            ..config
        };
        let job = CacheJob::prepare(&allowed, &project, &sink).unwrap();
        assert!(job.has_remote);
        assert_eq!(job.render_timeout, REMOTE_MIN_TIMEOUT);
    }

    #[test]
    fn test_auto_scheme_for_projected_crs_is_custom() {
        let sink = MemorySink::new();
        let config = GeneratorConfig {
            tile_crs: Some(CrsCode::parse("EPSG:25832").unwrap()),
            ..config_for_layer("parks")
        };
        let job = CacheJob::prepare(&config, &local(), &sink).unwrap();
        assert_eq!(job.scheme, Scheme::Custom);
        // No transform to EPSG:25832: the extent is kept and a warning emitted.
        assert_eq!(job.tile_extent, job.project_extent);
        assert_eq!(sink.named("extent_not_transformed").len(), 1);
    }

    #[test]
    fn test_sanitized_name_warns() {
        let sink = MemorySink::new();
        let project = ProjectDocument::parse(
            r#"
crs: EPSG:3857
layers:
  - id: "a/b"
    crs: EPSG:3857
    extent: { min_x: 0, min_y: 0, max_x: 10, max_y: 10 }
    provider: fill
    color: [1, 2, 3, 255]
"#,
        )
        .unwrap();
        let job = CacheJob::prepare(&config_for_layer("a/b"), &project, &sink).unwrap();
        assert_eq!(job.layout.storage_name(), "a_b");
        assert_eq!(sink.named("storage_name_sanitized").len(), 1);
    }
}
