//! Temporary cache directories for tests.
//!
//! A [`TempCache`] owns a scratch directory laid out like a real run:
//! a cache root for tiles, a grids directory for presets and a spot for the
//! project file. Everything is removed when it is dropped.

use std::path::{Path, PathBuf};

pub struct TempCache {
    dir: tempfile::TempDir,
}

impl Default for TempCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TempCache {
    pub fn new() -> Self {
        let dir = tempfile::Builder::new()
            .prefix("tile_cache_test_")
            .tempdir()
            .expect("Failed to create temporary test directory");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where tiles are written.
    pub fn cache_root(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    /// Where presets are looked up.
    pub fn grids_dir(&self) -> PathBuf {
        let dir = self.dir.path().join("grids");
        std::fs::create_dir_all(&dir).expect("Failed to create grids dir");
        dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.cache_root().join("index.json")
    }

    /// `<cache>/<storage>/<z>/<x>/<y>.<ext>`
    pub fn tile_path(&self, storage: &str, z: u32, x: u32, y: u32, ext: &str) -> PathBuf {
        self.cache_root()
            .join(storage)
            .join(z.to_string())
            .join(x.to_string())
            .join(format!("{}.{}", y, ext))
    }

    /// Write `contents` at `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, contents).expect("Failed to write test file");
        path
    }

    /// All files under `root` with extension `ext`, sorted.
    pub fn files_with_extension(&self, root: &Path, ext: &str) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_files(root, ext, &mut found);
        found.sort();
        found
    }

    pub fn count_tiles(&self, storage: &str, ext: &str) -> usize {
        self.files_with_extension(&self.cache_root().join(storage), ext)
            .len()
    }
}

fn collect_files(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, ext, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some(ext) {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_path_layout() {
        let cache = TempCache::new();
        let path = cache.tile_path("roads", 3, 4, 5, "png");
        assert!(path.ends_with("cache/roads/3/4/5.png"));
    }

    #[test]
    fn test_count_tiles() {
        let cache = TempCache::new();
        cache.write("cache/roads/0/0/0.png", "x");
        cache.write("cache/roads/1/0/1.png", "x");
        cache.write("cache/roads/1/0/1.png.tmp", "x");
        assert_eq!(cache.count_tiles("roads", "png"), 2);
        assert_eq!(cache.count_tiles("missing", "png"), 0);
    }
}
