//! Cache targets (a layer or a theme) and their on-disk storage names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters that are unsafe in a directory name on common filesystems.
const HOSTILE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Kind of cache target. Catalog entries without a kind are layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Layer,
    Theme,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Layer => "layer",
            TargetKind::Theme => "theme",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named layer or theme whose tiles are cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheTarget {
    pub name: String,
    pub kind: TargetKind,
}

impl CacheTarget {
    pub fn layer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::Layer,
        }
    }

    pub fn theme(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::Theme,
        }
    }

    /// Directory name used under the cache root.
    pub fn storage_name(&self) -> String {
        sanitize_storage_name(&self.name)
    }

    /// True when the name had to be rewritten for the filesystem.
    pub fn needs_sanitizing(&self) -> bool {
        self.storage_name() != self.name
    }
}

impl fmt::Display for CacheTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Replace filesystem-hostile characters and `..` with `_`.
///
/// An empty result becomes `cache_item`.
pub fn sanitize_storage_name(name: &str) -> String {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| if HOSTILE_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let replaced = replaced.replace("..", "_");
    if replaced.is_empty() {
        "cache_item".to_string()
    } else {
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_storage_name("roads"), "roads");
        assert_eq!(sanitize_storage_name("a/b:c"), "a_b_c");
        assert_eq!(sanitize_storage_name("../etc"), "__etc");
        assert_eq!(sanitize_storage_name("  "), "cache_item");
    }

    #[test]
    fn test_target_storage_name() {
        let t = CacheTarget::theme("Base map?");
        assert_eq!(t.storage_name(), "Base map_");
        assert!(t.needs_sanitizing());
        assert!(!CacheTarget::layer("ortho").needs_sanitizing());
    }
}
