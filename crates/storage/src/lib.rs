//! Tile and catalog persistence for the cache generator.
//!
//! - [`TileWriter`]: atomic tile writes with size validation and quarantine
//! - [`TileLayout`]: canonical tile paths under the cache root
//! - [`CacheCatalog`]: the merged `index.json` catalog

pub mod catalog;
pub mod error;
pub mod layout;
pub mod tile_writer;

pub use catalog::{merge_range, CacheCatalog, CatalogEntry};
pub use error::SaveError;
pub use layout::{TileLayout, QUARANTINE_DIR, THEMES_DIR};
pub use tile_writer::{ensure_dir, SavedTile, TileWriter};
