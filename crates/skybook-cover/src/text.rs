//! Title text rendering onto an RGB canvas via `embedded-graphics`.
//!
//! Glyphs come from the built-in Latin-1 mono font and are upscaled by an
//! integer factor, so no font files are needed at runtime. Characters
//! outside Latin-1 render as the font's replacement glyph.

use core::convert::Infallible;

use embedded_graphics::{
    mono_font::{iso_8859_1::FONT_10X20, MonoFont, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use image::{Rgb, RgbImage};

use crate::layout::CellRect;

/// Font used for every cover string.
pub(crate) const COVER_FONT: &MonoFont<'static> = &FONT_10X20;

/// Extra rows of logical pixels between wrapped lines.
const LINE_GAP: u32 = 2;

/// Draw target that maps each logical pixel to a `scale x scale` block
/// inside a region of an [`RgbImage`].
struct ScaledRegion<'a> {
    image: &'a mut RgbImage,
    region: CellRect,
    scale: u32,
}

impl OriginDimensions for ScaledRegion<'_> {
    fn size(&self) -> Size {
        Size::new(self.region.width / self.scale, self.region.height / self.scale)
    }
}

impl DrawTarget for ScaledRegion<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let color = |c: Rgb888| Rgb([c.r(), c.g(), c.b()]);
        for Pixel(point, c) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let base_x = self.region.x + point.x as u32 * self.scale;
            let base_y = self.region.y + point.y as u32 * self.scale;
            for dy in 0..self.scale {
                for dx in 0..self.scale {
                    let (x, y) = (base_x + dx, base_y + dy);
                    if self.region.contains(x, y) {
                        self.image.put_pixel(x, y, color(c));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A string broken into lines at a chosen glyph scale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextBlock {
    /// Wrapped lines, top to bottom.
    pub lines: Vec<String>,
    /// Integer upscale factor applied to the base font.
    pub scale: u32,
}

impl TextBlock {
    /// Rendered height in canvas pixels.
    pub fn height(&self) -> u32 {
        let line = line_height(self.scale);
        (self.lines.len() as u32 * line).saturating_sub(LINE_GAP * self.scale)
    }
}

fn glyph_width(scale: u32) -> u32 {
    (COVER_FONT.character_size.width + COVER_FONT.character_spacing) * scale
}

fn line_height(scale: u32) -> u32 {
    (COVER_FONT.character_size.height + LINE_GAP) * scale
}

/// Greedy word wrap to at most `columns` characters per line.
///
/// Words longer than a line are hard-split.
pub fn wrap_words(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > columns {
            if current_len > 0 {
                lines.push(core::mem::take(&mut current));
                current_len = 0;
            }
            lines.push(chars.drain(..columns).collect());
        }
        if chars.is_empty() {
            continue;
        }

        let needed = if current_len == 0 {
            chars.len()
        } else {
            current_len + 1 + chars.len()
        };
        if needed > columns {
            lines.push(core::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(chars.iter());
        current_len += chars.len();
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Pick the largest scale (up to `max_scale`) at which `text` fits in the
/// given box, wrapping as needed.
///
/// Always succeeds: at scale 1, lines that still do not fit are dropped
/// and the last kept line ends with an ellipsis.
pub fn fit_text(text: &str, max_width: u32, max_height: u32, max_scale: u32) -> TextBlock {
    for scale in (1..=max_scale.max(1)).rev() {
        let columns = (max_width / glyph_width(scale)) as usize;
        if columns == 0 {
            continue;
        }
        let lines = wrap_words(text, columns);
        let block = TextBlock { lines, scale };
        if block.height() <= max_height {
            return block;
        }
    }

    let columns = ((max_width / glyph_width(1)) as usize).max(1);
    let mut lines = wrap_words(text, columns);
    let max_lines = ((max_height + LINE_GAP) / line_height(1)).max(1) as usize;
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            let keep = columns.saturating_sub(3);
            *last = last.chars().take(keep).collect::<String>() + "...";
        }
    }
    TextBlock { lines, scale: 1 }
}

/// Draw a block horizontally centered, with its top at `top`, inside `region`.
pub(crate) fn draw_block(
    image: &mut RgbImage,
    region: CellRect,
    top: u32,
    block: &TextBlock,
    color: Rgb<u8>,
) {
    let region = CellRect {
        x: region.x,
        y: top,
        width: region.width,
        height: (region.y + region.height).saturating_sub(top),
    };
    let mut target = ScaledRegion {
        image,
        region,
        scale: block.scale,
    };
    let logical_width = region.width / block.scale;
    let style = MonoTextStyle::new(COVER_FONT, Rgb888::new(color[0], color[1], color[2]));
    let layout = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Top)
        .build();

    let step = (COVER_FONT.character_size.height + LINE_GAP) as i32;
    for (idx, line) in block.lines.iter().enumerate() {
        let origin = Point::new((logical_width / 2) as i32, idx as i32 * step);
        // Infallible target
        let _ = Text::with_text_style(line, origin, style, layout).draw(&mut target);
    }
}

/// Mean luma of a canvas region, 0..=255.
pub(crate) fn mean_luma(image: &RgbImage, region: CellRect) -> u8 {
    let mut total: u64 = 0;
    let mut count: u64 = 0;
    for y in region.y..(region.y + region.height).min(image.height()) {
        for x in region.x..(region.x + region.width).min(image.width()) {
            let p = image.get_pixel(x, y);
            total += (299 * p[0] as u64 + 587 * p[1] as u64 + 114 * p[2] as u64) / 1000;
            count += 1;
        }
    }
    if count == 0 {
        0
    } else {
        (total / count) as u8
    }
}

/// Title and subtitle colors that stay readable on a background of the
/// given luma.
pub(crate) fn contrast_colors(background_luma: u8) -> (Rgb<u8>, Rgb<u8>) {
    if background_luma < 140 {
        (Rgb([255, 255, 255]), Rgb([200, 200, 200]))
    } else {
        (Rgb([16, 16, 16]), Rgb([60, 60, 60]))
    }
}
