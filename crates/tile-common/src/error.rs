//! Error types for the tile cache generator.

use thiserror::Error;

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;

/// Primary error type for cache generation.
#[derive(Debug, Error)]
pub enum CacheError {
    // === Fatal input errors (abort before any tile work) ===
    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    #[error("Invalid zoom range: {0}")]
    InvalidZoom(String),

    #[error("Project unreadable: {0}")]
    ProjectUnreadable(String),

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Theme has no visible layers: {0}")]
    ThemeEmpty(String),

    #[error("Remote layers require --allow-remote: {0}")]
    RemoteNotAllowed(String),

    #[error("Tile matrix preset error: {0}")]
    Preset(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Renderer missing required capability: {0}")]
    MissingCapability(String),

    // === Transient render errors (retried per tile) ===
    #[error("Render timed out after {0} ms")]
    RenderTimeout(u64),

    #[error("Rendering failed: {0}")]
    RenderFailed(String),

    #[error("Tile too small: {actual} bytes < {minimum}")]
    TileTooSmall { actual: u64, minimum: u64 },

    // === Persistence errors ===
    #[error("Failed to persist tile: {0}")]
    Persistence(String),

    // === Catalog errors (recovered, never fatal) ===
    #[error("Catalog unreadable: {0}")]
    CatalogCorruption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error classes that drive the engine's reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    FatalInput,
    TransientRender,
    Persistence,
    CatalogCorruption,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::FatalInput => "fatal_input",
            ErrorClass::TransientRender => "transient_render",
            ErrorClass::Persistence => "persistence",
            ErrorClass::CatalogCorruption => "catalog_corruption",
        }
    }
}

impl CacheError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CacheError::InvalidExtent(_)
            | CacheError::InvalidZoom(_)
            | CacheError::ProjectUnreadable(_)
            | CacheError::LayerNotFound(_)
            | CacheError::ThemeEmpty(_)
            | CacheError::RemoteNotAllowed(_)
            | CacheError::Preset(_)
            | CacheError::Config(_)
            | CacheError::MissingCapability(_) => ErrorClass::FatalInput,

            CacheError::RenderTimeout(_)
            | CacheError::RenderFailed(_)
            | CacheError::TileTooSmall { .. } => ErrorClass::TransientRender,

            CacheError::Persistence(_) | CacheError::Io(_) => ErrorClass::Persistence,

            CacheError::CatalogCorruption(_) | CacheError::Json(_) => {
                ErrorClass::CatalogCorruption
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::FatalInput
    }

    /// Short machine-readable code used in event records.
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::InvalidExtent(_) => "invalid_extent",
            CacheError::InvalidZoom(_) => "invalid_zoom",
            CacheError::ProjectUnreadable(_) => "project_unreadable",
            CacheError::LayerNotFound(_) => "layer_not_found",
            CacheError::ThemeEmpty(_) => "theme_empty",
            CacheError::RemoteNotAllowed(_) => "remote_not_allowed",
            CacheError::Preset(_) => "preset_error",
            CacheError::Config(_) => "invalid_config",
            CacheError::MissingCapability(_) => "missing_capability",
            CacheError::RenderTimeout(_) => "render_timeout",
            CacheError::RenderFailed(_) => "render_failed",
            CacheError::TileTooSmall { .. } => "tile_too_small",
            CacheError::Persistence(_) => "persistence_failed",
            CacheError::CatalogCorruption(_) => "catalog_corrupt",
            CacheError::Io(_) => "io_error",
            CacheError::Json(_) => "json_error",
        }
    }
}

impl From<crate::extent::ExtentError> for CacheError {
    fn from(err: crate::extent::ExtentError) -> Self {
        CacheError::InvalidExtent(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(CacheError::LayerNotFound("roads".into()).is_fatal());
        assert_eq!(
            CacheError::RenderTimeout(100).class(),
            ErrorClass::TransientRender
        );
        assert_eq!(
            CacheError::Persistence("rename".into()).class(),
            ErrorClass::Persistence
        );
        assert!(!CacheError::CatalogCorruption("bad".into()).is_fatal());
    }

    #[test]
    fn test_tile_failure_codes() {
        let timeout = CacheError::RenderTimeout(50);
        assert_eq!(timeout.code(), "render_timeout");
        assert_eq!(timeout.class().as_str(), "transient_render");

        let small = CacheError::TileTooSmall {
            actual: 10,
            minimum: 100,
        };
        assert_eq!(small.code(), "tile_too_small");
        assert!(!small.is_fatal());
        assert_eq!(small.to_string(), "Tile too small: 10 bytes < 100");
    }
}
