//! The generation loop.
//!
//! One driver iterates every scheme: the grid plan supplies `(matrix, span)`
//! pairs, and each tile goes through the same sequence of skip check,
//! supervised render attempts, encode and atomic save. A failed tile is
//! counted and reported, never fatal. The cancellation token is checked at
//! every tile boundary and before each render submission; a tile whose
//! render already finished is allowed to finish saving.

use crate::config::GeneratorConfig;
use crate::job::CacheJob;
use metrics::counter;
use renderer::{
    RenderOutcome, RenderRequest, RenderSupervisor, Renderer, SupervisorConfig, TileEncoder,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storage::{CacheCatalog, CatalogEntry, SavedTile, TileWriter};
use tile_common::{CacheError, CacheResult, CrsCode, Event, EventSink, Extent, TileCoord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Aborted,
    /// Nothing was generated and at least one tile failed.
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
            RunStatus::Error => "error",
        }
    }

    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::Error => 2,
            RunStatus::Aborted => 130,
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Tiles present after the run: rendered plus skipped.
    pub generated: u64,
    pub rendered: u64,
    pub skipped: u64,
    pub errors: u64,
    pub expected: u64,
    /// Lowest and highest level with at least one generated tile.
    pub levels_generated: Option<(u32, u32)>,
    pub status: RunStatus,
}

impl RunSummary {
    fn record_generated(&mut self, z: u32) {
        self.generated += 1;
        self.levels_generated = Some(match self.levels_generated {
            Some((min, max)) => (min.min(z), max.max(z)),
            None => (z, z),
        });
    }
}

/// Retry, skip and pacing rules applied to every tile.
#[derive(Debug, Clone, Copy)]
pub struct TilePolicy {
    pub retries: u32,
    pub throttle: Duration,
    pub skip_existing: bool,
}

impl TilePolicy {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            retries: config.tile_retries,
            throttle: config.throttle(),
            skip_existing: config.skip_existing,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// One tile to render and save.
#[derive(Debug, Clone)]
pub struct TileTask<'a> {
    pub layers: &'a [String],
    pub crs: &'a CrsCode,
    pub extent: Extent,
    pub size: (u32, u32),
    pub path: PathBuf,
    pub timeout: Duration,
}

/// What happened to one tile.
#[derive(Debug)]
pub enum TileOutcome {
    Saved(SavedTile),
    Skipped,
    /// The error from the last attempt.
    Failed { error: CacheError, attempts: u32 },
    Cancelled,
}

pub struct CacheEngine {
    supervisor: RenderSupervisor,
    writer: TileWriter,
    encoder: TileEncoder,
    policy: TilePolicy,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl CacheEngine {
    /// Build an engine. Fails when the renderer lacks a required capability.
    pub fn new(
        renderer: Arc<dyn Renderer>,
        events: Arc<dyn EventSink>,
        cancel: CancellationToken,
        config: &GeneratorConfig,
    ) -> CacheResult<Self> {
        Self::with_supervisor_config(renderer, events, cancel, config, SupervisorConfig::default())
    }

    pub fn with_supervisor_config(
        renderer: Arc<dyn Renderer>,
        events: Arc<dyn EventSink>,
        cancel: CancellationToken,
        config: &GeneratorConfig,
        supervisor_config: SupervisorConfig,
    ) -> CacheResult<Self> {
        let supervisor = RenderSupervisor::new(renderer, Arc::clone(&events), supervisor_config)?;
        let writer = TileWriter::new(config.min_tile_bytes)
            .with_quarantine_dir(config.output_dir.join(storage::QUARANTINE_DIR));

        Ok(Self {
            supervisor,
            writer,
            encoder: TileEncoder::new(config.tile_format, config.png_compression),
            policy: TilePolicy::from_config(config),
            events,
            cancel,
        })
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Generate every tile of the plan, then merge the run into the catalog.
    #[instrument(skip(self, job), fields(name = %job.target.name, kind = %job.target.kind))]
    pub async fn run(&self, job: &CacheJob) -> CacheResult<RunSummary> {
        let plan = &job.plan;
        let expected = plan.expected_tile_count;
        let mut summary = RunSummary {
            generated: 0,
            rendered: 0,
            skipped: 0,
            errors: 0,
            expected,
            levels_generated: None,
            status: RunStatus::Completed,
        };
        let mut aborted = false;

        info!(levels = plan.levels.len(), expected, "Starting tile generation");

        'levels: for level in &plan.levels {
            let z = level.level();
            let mut generated_level = 0u64;

            for (col, row) in level.span.iter() {
                if self.cancel.is_cancelled() {
                    aborted = true;
                    break 'levels;
                }

                let coord = TileCoord::new(z, col, row);
                let task = TileTask {
                    layers: &job.layer_ids,
                    crs: &job.tile_crs,
                    extent: level.matrix.tile_extent(col, row),
                    size: (level.matrix.tile_width, level.matrix.tile_height),
                    path: job.layout.tile_path(&coord),
                    timeout: job.render_timeout,
                };

                match self.process_tile(&task).await {
                    TileOutcome::Saved(_) => {
                        counter!("tiles_rendered_total").increment(1);
                        summary.rendered += 1;
                        summary.record_generated(z);
                        generated_level += 1;
                    }
                    TileOutcome::Skipped => {
                        counter!("tiles_skipped_total").increment(1);
                        summary.skipped += 1;
                        summary.record_generated(z);
                        generated_level += 1;
                        continue;
                    }
                    TileOutcome::Failed { error, attempts } => {
                        counter!("tiles_failed_total").increment(1);
                        summary.errors += 1;
                        warn!(tile = %coord.path_key(), error = %error, attempts, "Tile failed");
                        self.events.emit(
                            Event::warning("tile_skipped")
                                .with("z", z)
                                .with("x", col)
                                .with("y", row)
                                .with("path", &task.path)
                                .with("reason", error.code())
                                .with("class", error.class().as_str())
                                .with("message", error.to_string())
                                .with("attempts", attempts),
                        );
                    }
                    TileOutcome::Cancelled => {
                        aborted = true;
                        break 'levels;
                    }
                }

                self.throttle().await;
            }

            self.events.emit(
                Event::progress("level_done")
                    .with("z", z)
                    .with("generated_level", generated_level)
                    .with("total_generated", summary.generated)
                    .with("expected_total", expected)
                    .with("percent", percent(summary.generated, expected)),
            );
        }

        summary.status = if aborted {
            RunStatus::Aborted
        } else if expected > 0 && summary.generated == 0 && summary.errors > 0 {
            RunStatus::Error
        } else {
            RunStatus::Completed
        };

        self.write_catalog(job, &summary).await?;

        info!(
            status = summary.status.as_str(),
            generated = summary.generated,
            errors = summary.errors,
            "Tile generation finished"
        );
        self.events.emit(
            Event::status(summary.status.as_str())
                .with("job_id", &job.job_id)
                .with("tiles_generated", summary.generated)
                .with("errors", summary.errors)
                .with("expected_total", expected),
        );
        Ok(summary)
    }

    /// Skip check, then up to `retries + 1` render-and-save attempts.
    pub async fn process_tile(&self, task: &TileTask<'_>) -> TileOutcome {
        if self.policy.skip_existing && tokio::fs::try_exists(&task.path).await.unwrap_or(false) {
            debug!(path = %task.path.display(), "Tile exists, skipped");
            return TileOutcome::Skipped;
        }

        let attempts = self.policy.attempts();
        let mut last_error = None;
        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return TileOutcome::Cancelled;
            }

            let request = RenderRequest::new(
                task.layers.to_vec(),
                task.crs.clone(),
                task.extent,
                task.size,
            );
            let image = match self.supervisor.render(request, task.timeout, &self.cancel).await {
                RenderOutcome::Rendered(image) => image,
                RenderOutcome::Cancelled => return TileOutcome::Cancelled,
                outcome => {
                    debug!(attempt, reason = outcome.reason(), "Render attempt failed");
                    last_error = outcome.into_error(task.timeout);
                    continue;
                }
            };

            let bytes = match self.encoder.encode(&image) {
                Ok(bytes) => bytes,
                Err(e) => {
                    last_error = Some(CacheError::RenderFailed(e.to_string()));
                    continue;
                }
            };
            match self.writer.save(&bytes, &task.path).await {
                Ok(saved) => return TileOutcome::Saved(saved),
                Err(e) => {
                    debug!(attempt, reason = e.reason(), error = %e, "Save attempt failed");
                    last_error = Some(CacheError::from(e));
                }
            }
        }

        TileOutcome::Failed {
            error: last_error
                .unwrap_or_else(|| CacheError::RenderFailed("no render attempt made".to_string())),
            attempts,
        }
    }

    async fn throttle(&self) {
        if self.policy.throttle.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.policy.throttle) => {}
        }
    }

    /// Merge this run's coverage into the catalog and rewrite it.
    async fn write_catalog(&self, job: &CacheJob, summary: &RunSummary) -> CacheResult<()> {
        let index_path = &job.index_path;
        let (mut catalog, warning) = CacheCatalog::load_or_create(index_path, &job.project_path);
        if let Some(message) = warning {
            self.events.emit(
                Event::warning("catalog_unreadable")
                    .with("index_path", index_path)
                    .with("message", message),
            );
        }

        let merged = catalog.merge(catalog_entry(job, summary), job.extent_override);
        debug!(
            published = ?merged.published_range(),
            cached = ?merged.cached_range(),
            "Catalog entry merged"
        );
        catalog.save(index_path).await?;

        self.events.emit(
            Event::debug("index_written")
                .with("index_path", index_path)
                .with("tiles_generated", summary.generated)
                .with("status", summary.status.as_str())
                .with("expected_total", summary.expected)
                .with("errors", summary.errors),
        );
        Ok(())
    }
}

/// The catalog entry describing this run before merging.
pub fn catalog_entry(job: &CacheJob, summary: &RunSummary) -> CatalogEntry {
    let plan = &job.plan;
    let cached = summary.levels_generated.unwrap_or(plan.cached_zoom);
    let published = (
        plan.published_zoom.0.min(cached.0),
        plan.published_zoom.1.max(cached.1),
    );

    let mut entry = CatalogEntry::new(&job.target);
    entry.crs = Some(job.tile_crs.to_string());
    entry.tile_crs = Some(job.tile_crs.to_string());
    entry.extent = Some(job.tile_extent.to_array());
    entry.project_crs = Some(job.project_crs.to_string());
    entry.project_extent = Some(job.project_extent.to_array());
    entry.set_published(published.0, published.1);
    entry.set_cached(cached.0, cached.1);
    entry.tile_format = Some(job.tile_format.as_str().to_string());
    entry.path = Some(absolute(&job.layout.target_dir()).display().to_string());
    entry.tile_count = Some(summary.generated);
    entry.scheme = Some(job.scheme.as_str().to_string());
    entry.xyz_mode = (job.scheme == tile_grid::Scheme::Xyz).then(|| job.xyz_mode.as_str().to_string());
    entry.tile_matrix_preset = job.preset_id.clone();
    entry.source_layers = job.source_layers.clone();
    entry.tile_matrix_set = plan.tile_matrix_set.clone();
    entry
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Percentage rounded to two decimals.
fn percent(done: u64, expected: u64) -> f64 {
    let expected = expected.max(1) as f64;
    (done as f64 * 100.0 / expected * 100.0).round() / 100.0
}
