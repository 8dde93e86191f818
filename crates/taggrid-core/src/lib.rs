//! Core types and utilities for tag-grid scanning.
//!
//! This crate is intentionally small and free of any camera or threading
//! concerns. It provides:
//! - grayscale image containers,
//! - the perspective primitives used to rectify the region of interest,
//! - area-averaging resize and Otsu binarization,
//! - the gap-aware grid geometry that splits a rectified image into cells.

mod grid;
mod homography;
mod image;
mod logger;
mod rectify;
mod resize;
mod threshold;

pub use grid::{cell_window, CellWindow, GridShape, GridSpec, GridSpecError, RelGaps, TileSize};
pub use homography::{homography_from_4pt, warp_perspective_gray, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};
pub use rectify::{HomographyRectifier, Quad, Rectifier};
pub use resize::resize_area;
pub use threshold::{binarize, otsu_threshold};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, init_with_targets};
