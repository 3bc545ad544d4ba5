//! Raster tile cache generator.
//!
//! Renders a project layer or theme into a `z/x/y` tile tree on disk for a
//! zoom range, under one of the XYZ, WMTS or custom-origin schemes, and
//! keeps a JSON catalog of what each target's cache covers.

pub mod config;
pub mod engine;
pub mod job;
pub mod logging;
pub mod single;

pub use config::{Args, GeneratorConfig, SingleTileRequest};
pub use engine::{catalog_entry, CacheEngine, RunStatus, RunSummary, TileOutcome, TilePolicy, TileTask};
pub use job::{CacheJob, ResolvedTarget};
pub use single::{plan_single, render_single, single_exit_code, SingleTilePlan};
