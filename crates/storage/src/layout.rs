//! On-disk tile layout.
//!
//! ```text
//! <root>/<storage>/<level>/<column>/<row>.<ext>           layers
//! <root>/_themes/<storage>/<level>/<column>/<row>.<ext>   themes
//! <root>/_bad_tiles/                                      quarantine
//! ```

use std::path::{Path, PathBuf};
use tile_common::{CacheTarget, TargetKind, TileCoord};

pub const THEMES_DIR: &str = "_themes";
pub const QUARANTINE_DIR: &str = "_bad_tiles";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    root: PathBuf,
    storage_name: String,
    kind: TargetKind,
    extension: String,
}

impl TileLayout {
    pub fn new(root: impl Into<PathBuf>, target: &CacheTarget, extension: &str) -> Self {
        Self {
            root: root.into(),
            storage_name: target.storage_name(),
            kind: target.kind,
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Directory holding every level of this target.
    pub fn target_dir(&self) -> PathBuf {
        match self.kind {
            TargetKind::Layer => self.root.join(&self.storage_name),
            TargetKind::Theme => self.root.join(THEMES_DIR).join(&self.storage_name),
        }
    }

    pub fn tile_path(&self, coord: &TileCoord) -> PathBuf {
        self.target_dir()
            .join(coord.z.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.{}", coord.y, self.extension))
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.root.join(QUARANTINE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_path() {
        let layout = TileLayout::new("/cache", &CacheTarget::layer("roads"), "png");
        assert_eq!(
            layout.tile_path(&TileCoord::new(3, 4, 5)),
            PathBuf::from("/cache/roads/3/4/5.png")
        );
    }

    #[test]
    fn test_theme_path_is_sanitized() {
        let layout = TileLayout::new("/cache", &CacheTarget::theme("a/b"), ".jpg");
        assert_eq!(
            layout.tile_path(&TileCoord::new(0, 0, 0)),
            PathBuf::from("/cache/_themes/a_b/0/0/0.jpg")
        );
        assert_eq!(layout.quarantine_dir(), PathBuf::from("/cache/_bad_tiles"));
    }
}
