//! Thumbnail decoding into mosaic tiles.
//!
//! Thumbnail payloads come straight off the network, so every decode is
//! bounded by [`TileLimits`] and reports failure as a [`DecodeError`]
//! instead of panicking. Callers treat a failed decode as "no tile".

use std::fmt;
use std::io::Cursor;

use image::{ImageReader, Limits, RgbImage};
use rayon::prelude::*;

/// Runtime-configurable decode limits for untrusted thumbnails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileLimits {
    /// Maximum encoded payload size in bytes.
    pub max_input_bytes: usize,
    /// Maximum decoded width or height in pixels.
    pub max_dimension: u32,
    /// Maximum bytes the decoder may allocate.
    pub max_alloc_bytes: u64,
}

impl Default for TileLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: 16 * 1024 * 1024,
            max_dimension: 8192,
            max_alloc_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Why a thumbnail could not be turned into a tile.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// Payload was empty
    Empty,
    /// Payload exceeded [`TileLimits::max_input_bytes`]
    TooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Format could not be recognized from the leading bytes
    UnknownFormat,
    /// Decoder rejected the data (corrupt, truncated, over limits)
    Corrupt(String),
    /// Image decoded to zero width or height
    ZeroSized,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty image payload"),
            DecodeError::TooLarge { size, max } => {
                write!(f, "image payload of {} bytes exceeds limit of {}", size, max)
            }
            DecodeError::UnknownFormat => write!(f, "unrecognized image format"),
            DecodeError::Corrupt(msg) => write!(f, "image decode failed: {}", msg),
            DecodeError::ZeroSized => write!(f, "image has zero width or height"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// One decoded thumbnail, ready to be cropped into a mosaic cell.
#[derive(Clone, Debug)]
pub struct Tile {
    pixels: RgbImage,
}

impl Tile {
    /// Wrap an already decoded RGB buffer.
    pub fn from_rgb(pixels: RgbImage) -> Result<Self, DecodeError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(DecodeError::ZeroSized);
        }
        Ok(Self { pixels })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Original width / height ratio.
    pub fn aspect_ratio(&self) -> f64 {
        self.pixels.width() as f64 / self.pixels.height() as f64
    }

    /// Decoded pixels.
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Decode a thumbnail payload with default limits.
pub fn load_tile(bytes: &[u8]) -> Result<Tile, DecodeError> {
    load_tile_with_limits(bytes, TileLimits::default())
}

/// Decode a thumbnail payload with explicit limits.
pub fn load_tile_with_limits(bytes: &[u8], limits: TileLimits) -> Result<Tile, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() > limits.max_input_bytes {
        return Err(DecodeError::TooLarge {
            size: bytes.len(),
            max: limits.max_input_bytes,
        });
    }

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::Corrupt(e.to_string()))?;
    if reader.format().is_none() {
        return Err(DecodeError::UnknownFormat);
    }

    let mut decode_limits = Limits::default();
    decode_limits.max_image_width = Some(limits.max_dimension);
    decode_limits.max_image_height = Some(limits.max_dimension);
    decode_limits.max_alloc = Some(limits.max_alloc_bytes);
    reader.limits(decode_limits);

    let image = reader
        .decode()
        .map_err(|e| DecodeError::Corrupt(e.to_string()))?;
    Tile::from_rgb(image.to_rgb8())
}

/// Decode many payloads in parallel, preserving input order.
///
/// Each result is independent; one corrupt payload never affects the others.
pub fn load_tiles(payloads: &[&[u8]]) -> Vec<Result<Tile, DecodeError>> {
    payloads.par_iter().map(|bytes| load_tile(bytes)).collect()
}
