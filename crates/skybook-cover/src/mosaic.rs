//! Mosaic cover composition.
//!
//! Tiles are center-cropped into a two-column grid that spans the whole
//! canvas, then a translucent band with the title is drawn over the
//! bottom edge. With no tiles at all a plain text cover is produced.

use std::fmt;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use rayon::prelude::*;

use crate::layout::{center_crop, grid_cells, CellRect, COVER_HEIGHT, COVER_WIDTH};
use crate::text::{contrast_colors, draw_block, fit_text, mean_luma, COVER_FONT};
use crate::tile::Tile;

/// Height of the title band drawn across the bottom of a mosaic.
pub const BAND_HEIGHT: u32 = 200;
/// Opacity of the title band (0..=255).
pub const BAND_ALPHA: u8 = 180;
/// Mosaic background, visible only in the blank trailing cell.
pub const MOSAIC_BACKGROUND: Rgb<u8> = Rgb([0x1a, 0x1a, 0x1a]);
/// Background of the text-only fallback cover.
pub const FALLBACK_BACKGROUND: Rgb<u8> = Rgb([0x2c, 0x3e, 0x50]);

const BAND_PADDING: u32 = 16;
const TEXT_SPACING: u32 = 10;
const FALLBACK_MARGIN: u32 = 80;

/// Cover composition settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverOptions {
    /// Main title text.
    pub title: String,
    /// Optional smaller line under the title.
    pub subtitle: Option<String>,
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// JPEG quality (1..=100).
    pub jpeg_quality: u8,
    /// Upper bound on tiles placed in the grid; extra tiles are ignored.
    pub max_tiles: usize,
}

impl Default for CoverOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            subtitle: None,
            width: COVER_WIDTH,
            height: COVER_HEIGHT,
            jpeg_quality: 95,
            max_tiles: 20,
        }
    }
}

impl CoverOptions {
    /// Options with the given title and default geometry.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the subtitle line.
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Set the JPEG quality, clamped to 1..=100.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Set the maximum tile count.
    pub fn with_max_tiles(mut self, max_tiles: usize) -> Self {
        self.max_tiles = max_tiles;
        self
    }
}

/// Fatal cover composition failures.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoverError {
    /// Canvas buffer could not be allocated
    CanvasAllocation {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// JPEG encoding failed
    Encode(String),
}

impl fmt::Display for CoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverError::CanvasAllocation { width, height } => {
                write!(f, "cannot allocate {}x{} cover canvas", width, height)
            }
            CoverError::Encode(msg) => write!(f, "cover encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for CoverError {}

/// Allocate a filled canvas, reporting allocation failure instead of aborting.
pub fn allocate_canvas(width: u32, height: u32, fill: Rgb<u8>) -> Result<RgbImage, CoverError> {
    let err = || CoverError::CanvasAllocation { width, height };
    if width == 0 || height == 0 {
        return Err(err());
    }
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(err)?;
    let len = pixels.checked_mul(3).ok_or_else(err)?;

    let mut raw: Vec<u8> = Vec::new();
    raw.try_reserve_exact(len).map_err(|_| err())?;
    for _ in 0..pixels {
        raw.extend_from_slice(&fill.0);
    }
    RgbImage::from_raw(width, height, raw).ok_or_else(err)
}

/// Compose the cover canvas from decoded tiles.
///
/// Always returns a `width x height` canvas; the only error is a failed
/// canvas allocation.
pub fn compose_cover(tiles: &[Tile], options: &CoverOptions) -> Result<RgbImage, CoverError> {
    let tiles = &tiles[..tiles.len().min(options.max_tiles)];
    if tiles.is_empty() {
        log::info!("[COVER] No tiles available, rendering text-only cover");
        return render_fallback(options);
    }

    let mut canvas = allocate_canvas(options.width, options.height, MOSAIC_BACKGROUND)?;
    let cells = grid_cells(tiles.len(), options.width, options.height);
    log::debug!(
        "[COVER] Placing {} tiles into {} cells",
        tiles.len(),
        cells.len()
    );

    let rendered: Vec<RgbImage> = tiles
        .par_iter()
        .zip(cells.par_iter())
        .map(|(tile, cell)| fit_tile(tile, *cell))
        .collect();
    for (cell_image, cell) in rendered.iter().zip(&cells) {
        imageops::replace(&mut canvas, cell_image, cell.x as i64, cell.y as i64);
    }

    draw_title_band(&mut canvas, options);
    Ok(canvas)
}

/// Center-crop a tile and scale it to exactly fill `cell`.
pub fn fit_tile(tile: &Tile, cell: CellRect) -> RgbImage {
    let plan = center_crop((tile.width(), tile.height()), (cell.width, cell.height));
    let cropped =
        imageops::crop_imm(tile.pixels(), plan.left, plan.top, plan.width, plan.height).to_image();
    imageops::resize(&cropped, cell.width, cell.height, FilterType::Lanczos3)
}

/// Darken the bottom band and draw the title (and subtitle) centered on it.
fn draw_title_band(canvas: &mut RgbImage, options: &CoverOptions) {
    let band_height = BAND_HEIGHT.min(canvas.height());
    let band = CellRect {
        x: 0,
        y: canvas.height() - band_height,
        width: canvas.width(),
        height: band_height,
    };

    let keep = 255 - BAND_ALPHA as u32;
    for y in band.y..band.y + band.height {
        for x in 0..band.width {
            let p = canvas.get_pixel_mut(x, y);
            for channel in p.0.iter_mut() {
                *channel = (*channel as u32 * keep / 255) as u8;
            }
        }
    }

    let (title_color, subtitle_color) = contrast_colors(mean_luma(canvas, band));
    let inner = CellRect {
        x: band.x + BAND_PADDING,
        y: band.y + BAND_PADDING,
        width: band.width.saturating_sub(2 * BAND_PADDING),
        height: band.height.saturating_sub(2 * BAND_PADDING),
    };
    draw_stacked_text(canvas, inner, options, 3, 1, title_color, subtitle_color);
}

/// Plain background with the title centered on the whole canvas.
fn render_fallback(options: &CoverOptions) -> Result<RgbImage, CoverError> {
    let mut canvas = allocate_canvas(options.width, options.height, FALLBACK_BACKGROUND)?;
    let (title_color, subtitle_color) = contrast_colors(mean_luma(
        &canvas,
        CellRect {
            x: 0,
            y: 0,
            width: 1,
            height: 1,
        },
    ));
    let margin = FALLBACK_MARGIN.min(options.width / 4).min(options.height / 4);
    let inner = CellRect {
        x: margin,
        y: margin,
        width: options.width - 2 * margin,
        height: options.height - 2 * margin,
    };
    draw_stacked_text(&mut canvas, inner, options, 6, 2, title_color, subtitle_color);
    Ok(canvas)
}

/// Title above an optional subtitle, vertically centered as one group.
fn draw_stacked_text(
    canvas: &mut RgbImage,
    area: CellRect,
    options: &CoverOptions,
    title_scale: u32,
    subtitle_scale: u32,
    title_color: Rgb<u8>,
    subtitle_color: Rgb<u8>,
) {
    let subtitle = options
        .subtitle
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| fit_text(s, area.width, COVER_FONT.character_size.height * subtitle_scale, subtitle_scale));
    let reserved = subtitle
        .as_ref()
        .map(|block| block.height() + TEXT_SPACING)
        .unwrap_or(0);
    let title = fit_text(
        &options.title,
        area.width,
        area.height.saturating_sub(reserved),
        title_scale,
    );

    let total = title.height() + reserved;
    let top = area.y + area.height.saturating_sub(total) / 2;
    draw_block(canvas, area, top, &title, title_color);
    if let Some(block) = subtitle {
        let sub_top = top + title.height() + TEXT_SPACING;
        draw_block(canvas, area, sub_top, &block, subtitle_color);
    }
}

/// Encode a canvas as baseline JPEG.
pub fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Vec<u8>, CoverError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(
            canvas.as_raw(),
            canvas.width(),
            canvas.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CoverError::Encode(e.to_string()))?;
    Ok(out)
}

/// Compose the cover and encode it as JPEG in one step.
pub fn render_cover_jpeg(tiles: &[Tile], options: &CoverOptions) -> Result<Vec<u8>, CoverError> {
    let canvas = compose_cover(tiles, options)?;
    encode_jpeg(&canvas, options.jpeg_quality)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_tile(width: u32, height: u32, color: [u8; 3]) -> Tile {
        Tile::from_rgb(RgbImage::from_pixel(width, height, Rgb(color))).unwrap()
    }

    #[test]
    fn test_allocate_canvas_rejects_zero() {
        assert_eq!(
            allocate_canvas(0, 10, Rgb([0, 0, 0])).unwrap_err(),
            CoverError::CanvasAllocation {
                width: 0,
                height: 10
            }
        );
    }

    #[test]
    fn test_fit_tile_exact_cell_size() {
        let tile = solid_tile(1200, 630, [10, 200, 30]);
        let cell = CellRect {
            x: 0,
            y: 0,
            width: 632,
            height: 840,
        };
        let out = fit_tile(&tile, cell);
        assert_eq!(out.dimensions(), (632, 840));
        assert!(out.pixels().all(|p| p[1] > 150));
    }

    #[test]
    fn test_fit_tile_extreme_aspect_ratios() {
        let cell = CellRect {
            x: 0,
            y: 0,
            width: 632,
            height: 168,
        };
        for (w, h) in [(1, 8192), (8192, 1)] {
            let tile = solid_tile(w, h, [10, 200, 30]);
            let out = fit_tile(&tile, cell);
            assert_eq!(out.dimensions(), (632, 168));
            assert!(out.pixels().all(|p| p[1] > 150));
        }
    }

    #[test]
    fn test_compose_with_sliver_tiles() {
        let options = CoverOptions::new("Slivers");
        let tiles: Vec<Tile> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    solid_tile(1, 8192, [250, 0, 0])
                } else {
                    solid_tile(8192, 1, [250, 0, 0])
                }
            })
            .collect();
        let canvas = compose_cover(&tiles, &options).unwrap();
        assert_eq!(canvas.dimensions(), (COVER_WIDTH, COVER_HEIGHT));
        assert!(canvas.get_pixel(10, 10)[0] >= 240);
    }

    #[test]
    fn test_compose_dimensions_for_all_counts() {
        let options = CoverOptions::new("Count");
        for count in 0..=5 {
            let tiles: Vec<Tile> = (0..count).map(|_| solid_tile(64, 36, [90, 90, 90])).collect();
            let canvas = compose_cover(&tiles, &options).unwrap();
            assert_eq!(canvas.dimensions(), (COVER_WIDTH, COVER_HEIGHT));
        }
    }

    #[test]
    fn test_max_tiles_caps_grid() {
        let options = CoverOptions::new("Cap").with_max_tiles(2);
        let tiles: Vec<Tile> = (0..5).map(|_| solid_tile(10, 10, [250, 0, 0])).collect();
        let canvas = compose_cover(&tiles, &options).unwrap();
        // Two tiles fill a single full-height row
        assert!(canvas.get_pixel(100, 400)[0] >= 240);
        assert!(canvas.get_pixel(1000, 400)[0] >= 240);
    }

    #[test]
    fn test_band_darkens_bottom() {
        let options = CoverOptions::new("");
        let tiles = vec![solid_tile(100, 100, [200, 200, 200])];
        let canvas = compose_cover(&tiles, &options).unwrap();
        let above = canvas.get_pixel(10, COVER_HEIGHT - BAND_HEIGHT - 1)[0];
        let inside = canvas.get_pixel(10, COVER_HEIGHT - 2)[0];
        assert!(above.abs_diff(200) <= 2);
        assert!(inside < 100);
    }

    #[test]
    fn test_fallback_draws_title_pixels() {
        let options = CoverOptions::new("Fallback Title").with_subtitle("Created today");
        let canvas = compose_cover(&[], &options).unwrap();
        assert_eq!(canvas.dimensions(), (COVER_WIDTH, COVER_HEIGHT));
        let white = canvas.pixels().filter(|p| p.0 == [255, 255, 255]).count();
        assert!(white > 0);
        assert_eq!(*canvas.get_pixel(0, 0), FALLBACK_BACKGROUND);
    }

    #[test]
    fn test_fallback_survives_hostile_titles() {
        for title in [
            String::new(),
            "x".repeat(10_000),
            "日本語のタイトル 🚀🚀🚀".to_string(),
            "\n\t\r".to_string(),
        ] {
            let canvas = compose_cover(&[], &CoverOptions::new(title)).unwrap();
            assert_eq!(canvas.dimensions(), (COVER_WIDTH, COVER_HEIGHT));
        }
    }

    #[test]
    fn test_encode_jpeg_magic() {
        let canvas = allocate_canvas(32, 32, Rgb([1, 2, 3])).unwrap();
        let bytes = encode_jpeg(&canvas, 90).unwrap();
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
    }
}
