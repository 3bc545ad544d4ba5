//! Rendered images and tile encodings.

use crate::error::RenderError;
use crate::png::PngEncoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An RGBA8 raster, straight (non-premultiplied) alpha, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderedImage {
    /// Fully transparent image.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Image filled with one color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut img = Self::transparent(width, height);
        for px in img.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        img
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, RenderError> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(RenderError::InvalidRequest(format!(
                "{} bytes for a {}x{} RGBA image",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.pixels.chunks_exact(4).all(|p| p[3] == 0)
    }
}

/// On-disk tile format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    Png,
    Jpeg,
}

impl TileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpeg",
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" | "image/png" => Ok(TileFormat::Png),
            "jpg" | "jpeg" | "image/jpeg" => Ok(TileFormat::Jpeg),
            other => Err(format!("unsupported tile format '{}'", other)),
        }
    }
}

/// Encodes rendered images into tile bytes.
#[derive(Debug, Clone, Copy)]
pub struct TileEncoder {
    pub format: TileFormat,
    pub png: PngEncoder,
    pub jpeg_quality: u8,
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self {
            format: TileFormat::Png,
            png: PngEncoder::default(),
            jpeg_quality: 85,
        }
    }
}

impl TileEncoder {
    pub fn new(format: TileFormat, png_compression: u32) -> Self {
        Self {
            format,
            png: PngEncoder::new(png_compression),
            ..Self::default()
        }
    }

    pub fn encode(&self, image: &RenderedImage) -> Result<Vec<u8>, RenderError> {
        match self.format {
            TileFormat::Png => self.png.encode(&image.pixels, image.width, image.height),
            TileFormat::Jpeg => self.encode_jpeg(image),
        }
    }

    /// JPEG has no alpha: composite onto white first.
    fn encode_jpeg(&self, image: &RenderedImage) -> Result<Vec<u8>, RenderError> {
        let rgb: Vec<u8> = image
            .pixels
            .chunks_exact(4)
            .flat_map(|p| {
                let a = p[3] as u32;
                let blend = |c: u8| ((c as u32 * a + 255 * (255 - a)) / 255) as u8;
                [blend(p[0]), blend(p[1]), blend(p[2])]
            })
            .collect();

        let mut out = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
        encoder
            .encode(&rgb, image.width, image.height, image::ColorType::Rgb8)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(out)
    }
}
