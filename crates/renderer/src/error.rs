//! Renderer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering failed: {0}")]
    Failed(String),

    #[error("Render job was cancelled")]
    Cancelled,

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode tile: {0}")]
    Encode(String),

    #[error("Invalid render request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        RenderError::Http(err.to_string())
    }
}

impl From<image::ImageError> for RenderError {
    fn from(err: image::ImageError) -> Self {
        RenderError::Decode(err.to_string())
    }
}
