//! Renderer collaborator contract.
//!
//! A [`Renderer`] accepts a request and hands back a cancellable
//! [`RenderJob`]. Jobs are polled, never awaited blindly, so the supervisor
//! can enforce its own deadline and observe cancellation.

use crate::error::RenderError;
use crate::raster::RenderedImage;
use async_trait::async_trait;
use serde::Serialize;
use tile_common::{CrsCode, Extent};

/// What to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRequest {
    /// Layer ids, bottom to top.
    pub layers: Vec<String>,
    pub crs: CrsCode,
    pub extent: Extent,
    pub width: u32,
    pub height: u32,
}

impl RenderRequest {
    pub fn new(layers: Vec<String>, crs: CrsCode, extent: Extent, size: (u32, u32)) -> Self {
        Self {
            layers,
            crs,
            extent,
            width: size.0,
            height: size.1,
        }
    }
}

/// Fixed description of what a renderer can do, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RendererCapabilities {
    pub name: String,
    /// Jobs honour `cancel`.
    pub cancellable: bool,
    /// Jobs report `is_active` truthfully while running.
    pub reports_activity: bool,
    /// `pump_events` must be called for the job to make progress.
    pub requires_event_pump: bool,
    /// Largest width/height accepted.
    pub max_output_size: u32,
}

impl RendererCapabilities {
    /// Names of required capabilities this renderer lacks.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.cancellable {
            missing.push("cancel");
        }
        if !self.reports_activity {
            missing.push("is_active");
        }
        if self.max_output_size == 0 {
            missing.push("max_output_size");
        }
        missing
    }
}

/// A render in progress.
#[async_trait]
pub trait RenderJob: Send {
    /// Still working.
    fn is_active(&self) -> bool;

    /// Completed, successfully or not.
    fn is_finished(&self) -> bool;

    /// Let the backend process pending events. Only called when the
    /// renderer declares `requires_event_pump`.
    async fn pump_events(&mut self) {}

    /// Request cancellation. Idempotent.
    fn cancel(&mut self);

    /// Collect the result. `Ok(None)` means the backend produced no image.
    async fn finish(self: Box<Self>) -> Result<Option<RenderedImage>, RenderError>;
}

/// Rendering backend.
pub trait Renderer: Send + Sync {
    fn capabilities(&self) -> RendererCapabilities;

    /// Submit a request. Errors here are synchronous rejections.
    fn start(&self, request: RenderRequest) -> Result<Box<dyn RenderJob>, RenderError>;
}
