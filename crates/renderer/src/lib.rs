//! Tile rendering for the cache generator.
//!
//! - [`job`]: the renderer contract (`Renderer` / `RenderJob`)
//! - [`supervisor`]: deadline, cancellation and heartbeat handling
//! - [`project`] and [`project_renderer`]: the project-file backed renderer
//! - [`png`] and [`raster`]: images and tile encodings

pub mod error;
pub mod job;
pub mod png;
pub mod project;
pub mod project_renderer;
pub mod raster;
pub mod supervisor;

pub use error::RenderError;
pub use job::{RenderJob, RenderRequest, Renderer, RendererCapabilities};
pub use png::PngEncoder;
pub use project::{LayerSource, ProjectDocument, ProjectLayer, Theme, ThemeLayerState};
pub use project_renderer::{wms_bbox, ProjectRenderer, MAX_OUTPUT_SIZE};
pub use raster::{RenderedImage, TileEncoder, TileFormat};
pub use supervisor::{RenderOutcome, RenderSupervisor, SupervisorConfig};
