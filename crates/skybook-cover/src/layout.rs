//! Pure grid and crop calculations for the mosaic.
//!
//! Nothing here touches pixels, so every rule of the layout can be tested
//! without decoding or rendering an image.

/// Cover width in pixels (portrait e-reader resolution).
pub const COVER_WIDTH: u32 = 1264;
/// Cover height in pixels.
pub const COVER_HEIGHT: u32 = 1680;
/// The mosaic always uses two equal-width columns.
pub const GRID_COLUMNS: u32 = 2;

/// A cell rectangle on the canvas, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl CellRect {
    /// Whether the pixel `(px, py)` lies inside this cell.
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// Number of grid rows needed for `tile_count` tiles.
pub fn grid_rows(tile_count: usize) -> u32 {
    (tile_count as u32).div_ceil(GRID_COLUMNS)
}

/// Lay out the full two-column grid for `tile_count` tiles.
///
/// Returns `rows * 2` cells in reading order (left-to-right, top-to-bottom).
/// When `tile_count` is odd the last cell has no tile and stays blank.
/// Row boundaries are spread with integer division so the cells tile the
/// canvas exactly, with no leftover strip at the bottom.
pub fn grid_cells(tile_count: usize, canvas_width: u32, canvas_height: u32) -> Vec<CellRect> {
    let rows = grid_rows(tile_count);
    if rows == 0 {
        return Vec::new();
    }

    let mut cells = Vec::with_capacity((rows * GRID_COLUMNS) as usize);
    for row in 0..rows {
        let top = row * canvas_height / rows;
        let bottom = (row + 1) * canvas_height / rows;
        for col in 0..GRID_COLUMNS {
            let left = col * canvas_width / GRID_COLUMNS;
            let right = (col + 1) * canvas_width / GRID_COLUMNS;
            cells.push(CellRect {
                x: left,
                y: top,
                width: right - left,
                height: bottom - top,
            });
        }
    }
    cells
}

/// Center-crop rectangle in source pixels, at the target's aspect ratio.
///
/// Resizing the rectangle to the target fills it exactly. The rectangle is
/// never larger than the source, so fitting a tile allocates no more than
/// the source plus one target-sized buffer whatever the aspect ratios.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropPlan {
    /// Horizontal offset into the source.
    pub left: u32,
    /// Vertical offset into the source.
    pub top: u32,
    /// Crop width in source pixels (1..=source width).
    pub width: u32,
    /// Crop height in source pixels (1..=source height).
    pub height: u32,
}

/// Compute a center-crop of `source` for filling `target`.
///
/// The longer axis (relative to the target's aspect ratio) is trimmed
/// evenly from both sides; the other axis is kept whole.
///
/// ```
/// # use skybook_cover::layout::center_crop;
/// // 16:9 landscape into a 632x560 cell: full height, trimmed width.
/// let plan = center_crop((1600, 900), (632, 560));
/// assert_eq!(plan.height, 900);
/// assert_eq!(plan.width, 1016);
/// assert_eq!(plan.left, (1600 - 1016) / 2);
/// assert_eq!(plan.top, 0);
/// ```
pub fn center_crop(source: (u32, u32), target: (u32, u32)) -> CropPlan {
    let (src_w, src_h) = (source.0.max(1), source.1.max(1));
    let (tgt_w, tgt_h) = (target.0.max(1), target.1.max(1));

    // Compare src_w / src_h with tgt_w / tgt_h without rounding
    let src_cross = src_w as u64 * tgt_h as u64;
    let tgt_cross = tgt_w as u64 * src_h as u64;

    let (width, height) = if src_cross > tgt_cross {
        // Wider than the cell: keep height, trim width
        let w = (src_h as f64 * tgt_w as f64 / tgt_h as f64).round() as u32;
        (w.clamp(1, src_w), src_h)
    } else {
        // Taller than the cell: keep width, trim height
        let h = (src_w as f64 * tgt_h as f64 / tgt_w as f64).round() as u32;
        (src_w, h.clamp(1, src_h))
    };

    CropPlan {
        left: (src_w - width) / 2,
        top: (src_h - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_rows() {
        assert_eq!(grid_rows(0), 0);
        assert_eq!(grid_rows(1), 1);
        assert_eq!(grid_rows(2), 1);
        assert_eq!(grid_rows(3), 2);
        assert_eq!(grid_rows(20), 10);
    }

    #[test]
    fn test_grid_cells_cover_canvas_exactly() {
        for count in 1..=20 {
            let cells = grid_cells(count, COVER_WIDTH, COVER_HEIGHT);
            assert_eq!(cells.len() as u32, grid_rows(count) * 2);
            let area: u64 = cells
                .iter()
                .map(|c| c.width as u64 * c.height as u64)
                .sum();
            assert_eq!(area, COVER_WIDTH as u64 * COVER_HEIGHT as u64);
            let last = cells.last().unwrap();
            assert_eq!(last.x + last.width, COVER_WIDTH);
            assert_eq!(last.y + last.height, COVER_HEIGHT);
        }
    }

    #[test]
    fn test_grid_cells_reading_order() {
        let cells = grid_cells(3, COVER_WIDTH, COVER_HEIGHT);
        assert_eq!(cells.len(), 4);
        assert_eq!((cells[0].x, cells[0].y), (0, 0));
        assert_eq!((cells[1].x, cells[1].y), (632, 0));
        assert_eq!((cells[2].x, cells[2].y), (0, 840));
        assert_eq!((cells[3].x, cells[3].y), (632, 840));
        assert!(cells.iter().all(|c| c.width == 632 && c.height == 840));
    }

    #[test]
    fn test_grid_cells_uneven_height() {
        // 1680 / 9 rows does not divide evenly
        let cells = grid_cells(17, COVER_WIDTH, COVER_HEIGHT);
        for pair in cells.chunks(2).collect::<Vec<_>>().windows(2) {
            assert_eq!(pair[0][0].y + pair[0][0].height, pair[1][0].y);
        }
    }

    #[test]
    fn test_center_crop_landscape_into_portrait_cell() {
        let plan = center_crop((1200, 630), (632, 840));
        assert_eq!(plan.height, 630);
        assert_eq!(plan.width, 474);
        assert_eq!(plan.top, 0);
        assert_eq!(plan.left, (1200 - 474) / 2);
    }

    #[test]
    fn test_center_crop_portrait_into_landscape_cell() {
        let plan = center_crop((300, 900), (632, 168));
        assert_eq!(plan.width, 300);
        assert_eq!(plan.height, 80);
        assert_eq!(plan.left, 0);
        assert_eq!(plan.top, (900 - 80) / 2);
    }

    #[test]
    fn test_center_crop_same_aspect_no_crop() {
        let plan = center_crop((316, 420), (632, 840));
        assert_eq!(
            plan,
            CropPlan {
                left: 0,
                top: 0,
                width: 316,
                height: 420
            }
        );
    }

    #[test]
    fn test_center_crop_stays_inside_source() {
        for src in [(1, 1), (1, 1000), (1000, 1), (7, 3), (641, 479), (1, 8192), (8192, 1)] {
            for target in [(632, 210), (632, 168), (1264, 1680)] {
                let plan = center_crop(src, target);
                assert!(plan.width >= 1 && plan.height >= 1);
                assert!(plan.left + plan.width <= src.0);
                assert!(plan.top + plan.height <= src.1);
            }
        }
    }

    #[test]
    fn test_center_crop_extreme_aspect_is_bounded_by_source() {
        let plan = center_crop((1, 8192), (632, 168));
        assert_eq!((plan.width, plan.height), (1, 1));
        assert_eq!(plan.top, 8191 / 2);

        let plan = center_crop((8192, 1), (632, 168));
        assert_eq!((plan.width, plan.height), (4, 1));
        assert_eq!(plan.left, (8192 - 4) / 2);
    }
}
