//! Render supervision: one render attempt under a deadline.
//!
//! The supervisor submits a request, then polls the job at a short fixed
//! interval until it finishes, the deadline passes, or the run is cancelled.
//! While waiting it emits a low-frequency `render_wait` heartbeat so a
//! supervising process can tell a slow renderer from a dead one.

use crate::raster::RenderedImage;
use crate::job::{RenderJob, RenderRequest, Renderer, RendererCapabilities};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tile_common::{CacheError, Event, EventSink};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Polling and heartbeat cadence.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(25),
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

/// Result of one render attempt.
#[derive(Debug)]
pub enum RenderOutcome {
    Rendered(RenderedImage),
    TimedOut,
    /// The run's cancellation token fired.
    Cancelled,
    Failed(String),
}

impl RenderOutcome {
    /// Short reason string for failure records.
    pub fn reason(&self) -> &str {
        match self {
            RenderOutcome::Rendered(_) => "rendered",
            RenderOutcome::TimedOut => "timeout",
            RenderOutcome::Cancelled => "cancelled",
            RenderOutcome::Failed(msg) => msg,
        }
    }

    /// The failure as a tile error. `None` for an image or a cancellation.
    pub fn into_error(self, timeout: Duration) -> Option<CacheError> {
        match self {
            RenderOutcome::TimedOut => Some(CacheError::RenderTimeout(timeout.as_millis() as u64)),
            RenderOutcome::Failed(msg) => Some(CacheError::RenderFailed(msg)),
            RenderOutcome::Rendered(_) | RenderOutcome::Cancelled => None,
        }
    }
}

pub struct RenderSupervisor {
    renderer: Arc<dyn Renderer>,
    capabilities: RendererCapabilities,
    config: SupervisorConfig,
    events: Arc<dyn EventSink>,
}

impl RenderSupervisor {
    /// Resolve the renderer's capabilities once; fail if any required one
    /// is missing.
    pub fn new(
        renderer: Arc<dyn Renderer>,
        events: Arc<dyn EventSink>,
        config: SupervisorConfig,
    ) -> Result<Self, CacheError> {
        let capabilities = renderer.capabilities();
        let missing = capabilities.missing();
        if !missing.is_empty() {
            return Err(CacheError::MissingCapability(format!(
                "{}: {}",
                capabilities.name,
                missing.join(", ")
            )));
        }
        debug!(renderer = %capabilities.name, "Renderer capabilities resolved");

        Ok(Self {
            renderer,
            capabilities,
            config,
            events,
        })
    }

    pub fn capabilities(&self) -> &RendererCapabilities {
        &self.capabilities
    }

    /// Render one request within `timeout`.
    pub async fn render(
        &self,
        request: RenderRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> RenderOutcome {
        if cancel.is_cancelled() {
            return RenderOutcome::Cancelled;
        }
        let max = self.capabilities.max_output_size;
        if request.width > max || request.height > max {
            return RenderOutcome::Failed(format!(
                "output size {}x{} exceeds renderer limit {}",
                request.width, request.height, max
            ));
        }

        let extent = request.extent;
        let mut job = match self.renderer.start(request) {
            Ok(job) => job,
            Err(e) => return RenderOutcome::Failed(e.to_string()),
        };

        let started = Instant::now();
        let mut next_heartbeat = self.config.heartbeat_interval;
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    job.cancel();
                    debug!("Render cancelled");
                    return RenderOutcome::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            if self.capabilities.requires_event_pump {
                job.pump_events().await;
            }
            if job.is_finished() || !job.is_active() {
                break;
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                job.cancel();
                counter!("render_timeouts_total").increment(1);
                warn!(timeout_ms = timeout.as_millis() as u64, "Render timed out");
                self.events.emit(
                    Event::warning("render_timeout")
                        .with("timeout_ms", timeout.as_millis() as u64)
                        .with("extent", extent.to_array()),
                );
                return RenderOutcome::TimedOut;
            }
            if elapsed >= next_heartbeat {
                self.events.emit(
                    Event::progress("render_wait")
                        .with("elapsed_ms", elapsed.as_millis() as u64)
                        .with("timeout_ms", timeout.as_millis() as u64)
                        .with("extent", extent.to_array()),
                );
                next_heartbeat += self.config.heartbeat_interval;
            }
        }

        collect(job).await
    }
}

async fn collect(job: Box<dyn RenderJob>) -> RenderOutcome {
    match job.finish().await {
        Ok(Some(image)) => RenderOutcome::Rendered(image),
        Ok(None) => RenderOutcome::Failed("renderer returned no image".to_string()),
        Err(e) => RenderOutcome::Failed(e.to_string()),
    }
}
