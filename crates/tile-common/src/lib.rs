//! Common types shared across the tile cache generator crates.

pub mod crs;
pub mod error;
pub mod events;
pub mod extent;
pub mod target;
pub mod tile;

pub use crs::{transform_extent, AxisOrder, CrsCode, CrsParseError, WEB_MERCATOR_MAX};
pub use error::{CacheError, CacheResult, ErrorClass};
pub use events::{Event, EventKind, EventSink, MemorySink, StdioSink};
pub use extent::{Extent, ExtentError};
pub use target::{sanitize_storage_name, CacheTarget, TargetKind};
pub use tile::{
    MatrixDescriptor, RowOrigin, TileCoord, TileMatrix, TileMatrixSetDescriptor, TileSpan,
    DEFAULT_TILE_SIZE, STANDARD_PIXEL_SIZE,
};
