//! Binary tag catalog and grid decoding.
//!
//! This crate focuses on:
//! - pure tile helpers (`Tile::encode`, `Tile::rotate90`),
//! - an immutable, rotation-invariant catalog mapping tile encodings to tag ids,
//! - reducing a pixel window to a binary tile,
//! - decoding every cell of a rectified grid image.
//!
//! It does **not** locate the grid. It expects an image that has already been
//! rectified to the region of interest (see `taggrid_core::Rectifier`).

mod catalog;
mod decode;
mod pattern;
mod reduce;
mod tile;

pub use catalog::{CatalogError, Collision, TagCatalog, TagId, TagMatch};
pub use decode::{render_tiles, DecodedGrid, GridDecoder, GridScan};
pub use pattern::{PatternError, TagPattern, TagSource};
pub use reduce::TileReducer;
pub use tile::{Tile, MAX_TILE_BITS};
