//! Tile matrix, tile span and tile-matrix-set descriptor types.
//!
//! Follows the OGC WMTS tile matrix concepts, generalized so that the same
//! types describe slippy-map XYZ grids, preset WMTS matrices and ad-hoc
//! subdivision grids.

use crate::{AxisOrder, Extent};
use serde::{Deserialize, Serialize};

/// Standard rendering pixel size in meters (0.28mm, OGC WMTS).
pub const STANDARD_PIXEL_SIZE: f64 = 0.00028;

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level (matrix index)
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Relative storage path fragment `z/x/y`.
    pub fn path_key(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Which edge row 0 sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOrigin {
    /// Row 0 is the top row; origin is the top-left corner (XYZ, WMTS).
    #[default]
    Top,
    /// Row 0 is the bottom row; origin is the bottom-left corner.
    Bottom,
}

/// A single tile matrix (zoom level) definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMatrix {
    /// Level used in the storage path.
    pub level: u32,

    /// Identifier (usually the level as string)
    pub identifier: String,

    /// Level number the grid definition calls this matrix.
    pub source_level: u32,

    /// CRS units per pixel along x
    pub resolution: f64,

    /// CRS units per pixel along y. Equal to `resolution` except for
    /// subdivision grids over non-square extents.
    pub resolution_y: f64,

    pub scale_denominator: f64,

    pub tile_width: u32,
    pub tile_height: u32,

    /// Number of tile columns
    pub matrix_width: u32,

    /// Number of tile rows
    pub matrix_height: u32,

    /// Origin corner in x/y order.
    pub origin: (f64, f64),

    /// Axis order of the grid definition this matrix came from.
    pub axis_order: AxisOrder,

    #[serde(default)]
    pub row_origin: RowOrigin,
}

impl TileMatrix {
    /// Matrix with a top-left origin; scale denominator derived from the
    /// resolution.
    pub fn top_left(
        level: u32,
        resolution: f64,
        tile_size: (u32, u32),
        dims: (u32, u32),
        origin: (f64, f64),
    ) -> Self {
        Self {
            level,
            identifier: level.to_string(),
            source_level: level,
            resolution,
            resolution_y: resolution,
            scale_denominator: resolution / STANDARD_PIXEL_SIZE,
            tile_width: tile_size.0,
            tile_height: tile_size.1,
            matrix_width: dims.0.max(1),
            matrix_height: dims.1.max(1),
            origin,
            axis_order: AxisOrder::Xy,
            row_origin: RowOrigin::Top,
        }
    }

    /// Width of one tile in CRS units.
    pub fn tile_span_x(&self) -> f64 {
        self.resolution * self.tile_width as f64
    }

    /// Height of one tile in CRS units.
    pub fn tile_span_y(&self) -> f64 {
        self.resolution_y * self.tile_height as f64
    }

    /// Get the extent covered by one tile.
    pub fn tile_extent(&self, col: u32, row: u32) -> Extent {
        let w = self.tile_span_x();
        let h = self.tile_span_y();
        let min_x = self.origin.0 + col as f64 * w;
        let max_x = min_x + w;

        match self.row_origin {
            RowOrigin::Top => {
                let max_y = self.origin.1 - row as f64 * h;
                Extent::new(min_x, max_y - h, max_x, max_y)
            }
            RowOrigin::Bottom => {
                let min_y = self.origin.1 + row as f64 * h;
                Extent::new(min_x, min_y, max_x, min_y + h)
            }
        }
    }

    /// The columns/rows whose cells intersect `extent`, clamped to the
    /// matrix. `None` when the extent misses the matrix entirely.
    pub fn span_for(&self, extent: &Extent) -> Option<TileSpan> {
        let w = self.tile_span_x();
        let h = self.tile_span_y();
        if !(w > 0.0 && h > 0.0) {
            return None;
        }

        let (ox, oy) = self.origin;
        let col0 = ((extent.min_x - ox) / w).floor() as i64;
        let col1 = ((extent.max_x - ox) / w).ceil() as i64 - 1;
        let (row0, row1) = match self.row_origin {
            RowOrigin::Top => (
                ((oy - extent.max_y) / h).floor() as i64,
                ((oy - extent.min_y) / h).ceil() as i64 - 1,
            ),
            RowOrigin::Bottom => (
                ((extent.min_y - oy) / h).floor() as i64,
                ((extent.max_y - oy) / h).ceil() as i64 - 1,
            ),
        };

        TileSpan::clamped(
            (col0, col1),
            (row0, row1),
            self.matrix_width,
            self.matrix_height,
        )
    }

    /// Span covering every tile of the matrix.
    pub fn full_span(&self) -> TileSpan {
        TileSpan {
            min_col: 0,
            max_col: self.matrix_width.saturating_sub(1),
            min_row: 0,
            max_row: self.matrix_height.saturating_sub(1),
        }
    }

    /// Top-left corner in x/y order, whatever the row origin.
    pub fn top_left_corner(&self) -> (f64, f64) {
        match self.row_origin {
            RowOrigin::Top => self.origin,
            RowOrigin::Bottom => (
                self.origin.0,
                self.origin.1 + self.matrix_height as f64 * self.tile_span_y(),
            ),
        }
    }
}

/// Inclusive `[min_col, max_col] x [min_row, max_row]` subset of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSpan {
    pub min_col: u32,
    pub max_col: u32,
    pub min_row: u32,
    pub max_row: u32,
}

impl TileSpan {
    /// Clamp raw index ranges into `[0, width-1] x [0, height-1]`.
    ///
    /// Returns `None` when a range is inverted or lies fully outside the
    /// matrix.
    pub fn clamped(cols: (i64, i64), rows: (i64, i64), width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as i64, height as i64);
        if w < 1 || h < 1 {
            return None;
        }
        if cols.1 < 0 || rows.1 < 0 || cols.0 >= w || rows.0 >= h {
            return None;
        }

        let min_col = cols.0.clamp(0, w - 1);
        let max_col = cols.1.clamp(0, w - 1);
        let min_row = rows.0.clamp(0, h - 1);
        let max_row = rows.1.clamp(0, h - 1);
        if min_col > max_col || min_row > max_row {
            return None;
        }

        Some(Self {
            min_col: min_col as u32,
            max_col: max_col as u32,
            min_row: min_row as u32,
            max_row: max_row as u32,
        })
    }

    pub fn columns(&self) -> u64 {
        (self.max_col - self.min_col) as u64 + 1
    }

    pub fn rows(&self) -> u64 {
        (self.max_row - self.min_row) as u64 + 1
    }

    pub fn tile_count(&self) -> u64 {
        self.columns() * self.rows()
    }

    /// Iterate `(col, row)` column by column.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.min_col..=self.max_col)
            .flat_map(move |col| (self.min_row..=self.max_row).map(move |row| (col, row)))
    }
}

// ============================================================================
// Tile matrix set descriptor (catalog metadata)
// ============================================================================

/// One matrix as published in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixDescriptor {
    pub identifier: String,
    pub z: u32,
    pub source_level: u32,
    pub scale_denominator: f64,
    pub resolution: f64,
    pub matrix_width: u32,
    pub matrix_height: u32,
    pub top_left: [f64; 2],
}

impl From<&TileMatrix> for MatrixDescriptor {
    fn from(m: &TileMatrix) -> Self {
        let (x, y) = m.top_left_corner();
        Self {
            identifier: m.identifier.clone(),
            z: m.level,
            source_level: m.source_level,
            scale_denominator: m.scale_denominator,
            resolution: m.resolution,
            matrix_width: m.matrix_width,
            matrix_height: m.matrix_height,
            top_left: [x, y],
        }
    }
}

/// Tile matrix set description written alongside WMTS catalog entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMatrixSetDescriptor {
    pub id: String,
    pub supported_crs: String,
    pub tile_width: u32,
    pub tile_height: u32,
    pub axis_order: AxisOrder,
    pub top_left_corner: [f64; 2],
    pub matrices: Vec<MatrixDescriptor>,
}

impl TileMatrixSetDescriptor {
    pub fn get_matrix(&self, z: u32) -> Option<&MatrixDescriptor> {
        self.matrices.iter().find(|m| m.z == z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_matrix(row_origin: RowOrigin) -> TileMatrix {
        TileMatrix {
            row_origin,
            ..TileMatrix::top_left(1, 1.0, (10, 10), (4, 4), (0.0, 40.0))
        }
    }

    #[test]
    fn test_tile_extent_top_left() {
        let m = unit_matrix(RowOrigin::Top);
        assert_eq!(m.tile_extent(0, 0), Extent::new(0.0, 30.0, 10.0, 40.0));
        assert_eq!(m.tile_extent(3, 3), Extent::new(30.0, 0.0, 40.0, 10.0));
    }

    #[test]
    fn test_tile_extent_bottom_origin() {
        let m = TileMatrix {
            origin: (0.0, 0.0),
            ..unit_matrix(RowOrigin::Bottom)
        };
        assert_eq!(m.tile_extent(0, 0), Extent::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(m.top_left_corner(), (0.0, 40.0));
    }

    #[test]
    fn test_span_exact_edges() {
        let m = unit_matrix(RowOrigin::Top);
        let span = m.span_for(&Extent::new(10.0, 10.0, 20.0, 30.0)).unwrap();
        assert_eq!((span.min_col, span.max_col), (1, 1));
        assert_eq!((span.min_row, span.max_row), (1, 2));
    }

    #[test]
    fn test_span_clamped_and_missing() {
        let m = unit_matrix(RowOrigin::Top);
        let span = m.span_for(&Extent::new(-100.0, -100.0, 100.0, 100.0)).unwrap();
        assert_eq!(span, m.full_span());
        assert!(m.span_for(&Extent::new(50.0, 0.0, 60.0, 10.0)).is_none());
    }

    #[test]
    fn test_span_iteration_order() {
        let span = TileSpan {
            min_col: 0,
            max_col: 1,
            min_row: 0,
            max_row: 1,
        };
        let tiles: Vec<_> = span.iter().collect();
        assert_eq!(tiles, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(span.tile_count(), 4);
    }
}
