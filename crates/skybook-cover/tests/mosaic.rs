use image::{ImageEncoder, Rgb, RgbImage};
use skybook_cover::{
    compose_cover, grid_cells, load_tiles, CoverOptions, Tile, COVER_HEIGHT, COVER_WIDTH,
    MOSAIC_BACKGROUND,
};

fn gradient_tile(width: u32, height: u32, seed: u8) -> Tile {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            128u8.wrapping_add(seed),
            (64 + (x % 64)) as u8,
            (64 + (y % 64)) as u8,
        ])
    });
    Tile::from_rgb(img).unwrap()
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([220, 120, 40]));
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

fn is_background(p: &Rgb<u8>) -> bool {
    *p == MOSAIC_BACKGROUND
}

#[test]
fn test_canvas_size_is_fixed_for_every_tile_count() {
    let options = CoverOptions::new("Any Count");
    for count in 0..=21 {
        let tiles: Vec<Tile> = (0..count)
            .map(|i| gradient_tile(160, 90, i as u8))
            .collect();
        let canvas = compose_cover(&tiles, &options).unwrap();
        assert_eq!(canvas.dimensions(), (COVER_WIDTH, COVER_HEIGHT), "count {}", count);
    }
}

#[test]
fn test_filled_cells_have_no_background_at_edges() {
    let options = CoverOptions::new("");
    for count in [1usize, 2, 4, 7] {
        let tiles: Vec<Tile> = (0..count)
            .map(|i| gradient_tile(300 + 40 * i as u32, 170, i as u8))
            .collect();
        let canvas = compose_cover(&tiles, &options).unwrap();
        let cells = grid_cells(count, COVER_WIDTH, COVER_HEIGHT);
        // Sample cell edges above the title band
        let band_top = COVER_HEIGHT - skybook_cover::mosaic::BAND_HEIGHT;
        for cell in cells.iter().take(count) {
            let right = cell.x + cell.width - 1;
            let bottom = (cell.y + cell.height - 1).min(band_top - 1);
            if cell.y >= band_top {
                continue;
            }
            for (x, y) in [
                (cell.x, cell.y),
                (right, cell.y),
                (cell.x, bottom),
                (right, bottom),
                (cell.x + cell.width / 2, cell.y),
                (cell.x, cell.y + (bottom - cell.y) / 2),
            ] {
                assert!(
                    !is_background(canvas.get_pixel(x, y)),
                    "background at ({}, {}) with {} tiles",
                    x,
                    y,
                    count
                );
            }
        }
    }
}

#[test]
fn test_five_articles_three_thumbnails_scenario() {
    let thumb = jpeg_bytes(320, 180);
    // Two of the five articles have no thumbnail at all
    let payloads = [thumb.as_slice(), thumb.as_slice(), thumb.as_slice()];
    let tiles: Vec<Tile> = load_tiles(&payloads)
        .into_iter()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(tiles.len(), 3);

    let canvas = compose_cover(&tiles, &CoverOptions::new("Scenario")).unwrap();
    let cells = grid_cells(tiles.len(), COVER_WIDTH, COVER_HEIGHT);
    assert_eq!(cells.len(), 4);

    for cell in &cells[..3] {
        let p = canvas.get_pixel(cell.x + cell.width / 2, cell.y + 10);
        assert!(p[0] > 180, "tile missing at {:?}", cell);
    }
    let blank = &cells[3];
    assert!(is_background(canvas.get_pixel(blank.x + 5, blank.y + 5)));
    assert!(is_background(
        canvas.get_pixel(blank.x + blank.width - 5, blank.y + 100)
    ));
}

#[test]
fn test_fallback_cover_never_fails() {
    let long = "very long title ".repeat(300);
    for title in ["", "Title", long.as_str()] {
        let canvas = compose_cover(&[], &CoverOptions::new(title).with_subtitle("sub")).unwrap();
        assert_eq!(canvas.dimensions(), (COVER_WIDTH, COVER_HEIGHT));
    }
}
