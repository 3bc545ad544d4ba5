//! Tile grid resolution for the cache generator.
//!
//! Converts a tiling scheme, CRS, extent and zoom range into an enumerable
//! set of tile matrices and per-matrix tile spans.

pub mod preset;
pub mod resolver;
pub mod scale_profile;
pub mod scheme;

pub use preset::{PresetError, TileMatrixPreset};
pub use resolver::{xyz_span, GridPlan, GridRequest, GridStrategy, LevelPlan, MAX_POW2_LEVEL};
pub use scale_profile::{ScaleProfile, ScaleProfiles};
pub use scheme::{Scheme, XyzMode};
