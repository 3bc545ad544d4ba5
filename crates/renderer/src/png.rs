//! PNG tile encoding.
//!
//! Tiles with at most 256 distinct RGBA values are written as indexed PNG
//! (color type 3, with a tRNS chunk when any entry is translucent); all
//! others as 8-bit RGBA (color type 6). Indexed output is typically several
//! times smaller for flat map renderings.

use crate::error::RenderError;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::io::Write;

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Minimum pixels to benefit from parallel palette extraction
const PARALLEL_THRESHOLD: usize = 65_536;

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

type Rgba = [u8; 4];

/// PNG encoder with a fixed zlib compression level (0-9).
#[derive(Debug, Clone, Copy)]
pub struct PngEncoder {
    compression: u32,
}

impl Default for PngEncoder {
    fn default() -> Self {
        Self { compression: 6 }
    }
}

impl PngEncoder {
    pub fn new(compression: u32) -> Self {
        Self {
            compression: compression.min(9),
        }
    }

    pub fn compression(&self) -> u32 {
        self.compression
    }

    /// Encode RGBA pixels, choosing indexed output when possible.
    pub fn encode(&self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RenderError::Encode(format!(
                "pixel buffer is {} bytes, expected {} for {}x{}",
                pixels.len(),
                expected,
                width,
                height
            )));
        }

        match extract_palette(pixels) {
            Some((palette, indices)) => self.encode_indexed(width, height, &palette, &indices),
            None => self.encode_rgba(pixels, width, height),
        }
    }

    /// Indexed PNG from a palette and one index byte per pixel.
    pub fn encode_indexed(
        &self,
        width: u32,
        height: u32,
        palette: &[Rgba],
        indices: &[u8],
    ) -> Result<Vec<u8>, RenderError> {
        let mut png = Vec::with_capacity(indices.len() / 2 + 1024);
        png.extend_from_slice(&PNG_SIGNATURE);
        write_chunk(&mut png, b"IHDR", &ihdr(width, height, 3));

        let plte: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
        write_chunk(&mut png, b"PLTE", &plte);

        if palette.iter().any(|c| c[3] < 255) {
            let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
            write_chunk(&mut png, b"tRNS", &trns);
        }

        let idat = self.deflate_scanlines(indices, width as usize, height as usize)?;
        write_chunk(&mut png, b"IDAT", &idat);
        write_chunk(&mut png, b"IEND", &[]);
        Ok(png)
    }

    /// Full-color RGBA PNG.
    pub fn encode_rgba(&self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
        let mut png = Vec::with_capacity(pixels.len() / 2 + 1024);
        png.extend_from_slice(&PNG_SIGNATURE);
        write_chunk(&mut png, b"IHDR", &ihdr(width, height, 6));

        let idat = self.deflate_scanlines(pixels, width as usize * 4, height as usize)?;
        write_chunk(&mut png, b"IDAT", &idat);
        write_chunk(&mut png, b"IEND", &[]);
        Ok(png)
    }

    /// Prefix each row with filter byte 0 and zlib-compress.
    fn deflate_scanlines(&self, data: &[u8], row_bytes: usize, rows: usize) -> Result<Vec<u8>, RenderError> {
        let mut raw = Vec::with_capacity(rows * (row_bytes + 1));
        for row in data.chunks_exact(row_bytes).take(rows) {
            raw.push(0);
            raw.extend_from_slice(row);
        }

        let mut encoder = flate2::write::ZlibEncoder::new(
            Vec::with_capacity(raw.len() / 2),
            flate2::Compression::new(self.compression),
        );
        encoder
            .write_all(&raw)
            .and_then(|_| encoder.finish())
            .map_err(|e| RenderError::Encode(format!("IDAT compression failed: {}", e)))
    }
}

fn ihdr(width: u32, height: u32, color_type: u8) -> [u8; 13] {
    let mut data = [0u8; 13];
    data[0..4].copy_from_slice(&width.to_be_bytes());
    data[4..8].copy_from_slice(&height.to_be_bytes());
    data[8] = 8; // bit depth
    data[9] = color_type;
    // compression, filter and interlace methods stay 0
    data
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Palette and per-pixel indices, or `None` past 256 colors.
fn extract_palette(pixels: &[u8]) -> Option<(Vec<Rgba>, Vec<u8>)> {
    let unique = if pixels.len() / 4 >= PARALLEL_THRESHOLD {
        unique_colors_parallel(pixels)?
    } else {
        unique_colors_sequential(pixels)?
    };

    let lookup: HashMap<Rgba, u8> = unique
        .iter()
        .enumerate()
        .map(|(i, c)| (*c, i as u8))
        .collect();
    let indices = pixels
        .chunks_exact(4)
        .map(|p| lookup.get(&[p[0], p[1], p[2], p[3]]).copied().unwrap_or(0))
        .collect();
    Some((unique, indices))
}

fn unique_colors_sequential(pixels: &[u8]) -> Option<Vec<Rgba>> {
    let mut seen = HashSet::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    for p in pixels.chunks_exact(4) {
        let c = [p[0], p[1], p[2], p[3]];
        if seen.insert(c) {
            if palette.len() >= MAX_PALETTE_SIZE {
                return None;
            }
            palette.push(c);
        }
    }
    Some(palette)
}

fn unique_colors_parallel(pixels: &[u8]) -> Option<Vec<Rgba>> {
    let chunk_size = (pixels.len() / 4 / rayon::current_num_threads()).max(1024) * 4;
    let partial: Vec<Option<Vec<Rgba>>> = pixels
        .par_chunks(chunk_size)
        .map(unique_colors_sequential)
        .collect();

    let mut seen = HashSet::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    for chunk in partial {
        for c in chunk? {
            if seen.insert(c) {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                palette.push(c);
            }
        }
    }
    Some(palette)
}
