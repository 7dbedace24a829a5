//! Mosaic cover composition for skybook.
//!
//! Turns article thumbnails into a single portrait cover image:
//!
//! - [`tile`] decodes untrusted thumbnail bytes into [`Tile`]s
//! - [`layout`] holds the pure grid and center-crop math
//! - [`mosaic`] places tiles, draws the title band, and encodes JPEG
//! - [`text`] renders titles with the built-in `embedded-graphics` mono font

pub mod layout;
pub mod mosaic;
pub mod text;
pub mod tile;

pub use layout::{center_crop, grid_cells, CellRect, CropPlan, COVER_HEIGHT, COVER_WIDTH};
pub use mosaic::{
    compose_cover, encode_jpeg, render_cover_jpeg, CoverError, CoverOptions, FALLBACK_BACKGROUND,
    MOSAIC_BACKGROUND,
};
pub use tile::{load_tile, load_tile_with_limits, load_tiles, DecodeError, Tile, TileLimits};
