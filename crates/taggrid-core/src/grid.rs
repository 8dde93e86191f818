//! Gap-aware geometry of a uniform tag grid inside a rectified ROI.
//!
//! Inter-cell gaps are modelled as insertions proportional to the image
//! size: with a relative gap `g` along an axis of length `dim` split into
//! `count` cells, every cell plus its trailing gap spans
//! `(dim + dim·g) / count` pixels, of which the trailing `dim·g` are gap.
//! Boundaries are truncated with `floor`, never rounded.

use serde::{Deserialize, Serialize};

/// Number of cells in the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

/// Tile (tag bitmap) size in bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileSize {
    pub width: usize,
    pub height: usize,
}

impl TileSize {
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.width * self.height
    }
}

/// Gap between neighbouring cells relative to the image size, per axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelGaps {
    pub x: f64,
    pub y: f64,
}

/// Grid validation errors.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GridSpecError {
    #[error("grid must have at least one row and one column (got {rows}x{cols})")]
    EmptyGrid { rows: usize, cols: usize },
    #[error("tile size must be at least 1x1 (got {width}x{height})")]
    EmptyTile { width: usize, height: usize },
    #[error("relative gap {axis} = {value} is outside [0, 1)")]
    InvalidGap { axis: char, value: f64 },
}

/// Complete description of the tag grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub shape: GridShape,
    pub tile: TileSize,
    #[serde(default)]
    pub gaps: RelGaps,
}

impl GridSpec {
    pub fn validate(&self) -> Result<(), GridSpecError> {
        if self.shape.rows == 0 || self.shape.cols == 0 {
            return Err(GridSpecError::EmptyGrid {
                rows: self.shape.rows,
                cols: self.shape.cols,
            });
        }
        if self.tile.width == 0 || self.tile.height == 0 {
            return Err(GridSpecError::EmptyTile {
                width: self.tile.width,
                height: self.tile.height,
            });
        }
        for (axis, value) in [('x', self.gaps.x), ('y', self.gaps.y)] {
            if !(0.0..1.0).contains(&value) {
                return Err(GridSpecError::InvalidGap { axis, value });
            }
        }
        Ok(())
    }

    /// Window of cell `(row, col)` in an image of `width × height` pixels.
    #[inline]
    pub fn cell_window(&self, width: usize, height: usize, row: usize, col: usize) -> CellWindow {
        cell_window(width, height, row, col, self.shape, self.gaps)
    }
}

/// Half-open pixel window `[x0, x1) × [y0, y1)` of one grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellWindow {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl CellWindow {
    #[inline]
    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0)
    }

    /// A window with zero area cannot be reduced to a tile.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    /// Shrink the window around its centre to `fx × fy` of its size.
    ///
    /// Factors are clamped to `(0, 1]`; a non-degenerate window keeps at
    /// least one pixel per axis.
    pub fn crop(&self, fx: f64, fy: f64) -> CellWindow {
        if self.is_degenerate() {
            return *self;
        }
        let (x0, x1) = crop_axis(self.x0, self.x1, fx);
        let (y0, y1) = crop_axis(self.y0, self.y1, fy);
        CellWindow { x0, y0, x1, y1 }
    }
}

fn crop_axis(start: usize, end: usize, factor: f64) -> (usize, usize) {
    let factor = if factor.is_finite() {
        factor.clamp(f64::MIN_POSITIVE, 1.0)
    } else {
        1.0
    };
    let len = end - start;
    let keep = ((len as f64 * factor).round() as usize).clamp(1, len);
    let offset = (len - keep) / 2;
    (start + offset, start + offset + keep)
}

/// Start and end of cell `index` along one axis.
fn axis_span(dim: usize, count: usize, index: usize, rel_gap: f64) -> (usize, usize) {
    let dim_f = dim as f64;
    let gap = dim_f * rel_gap;
    let with_gap = (dim_f + gap) / count as f64;
    let last = dim.saturating_sub(1);

    let tile = with_gap - gap;
    let start = ((index as f64 * with_gap).floor() as usize).min(last);
    let end = ((index as f64 * with_gap + tile).floor() as usize).min(last);
    (start, end)
}

/// Pixel window of cell `(row, col)` in an image of `width × height`.
///
/// The result may be degenerate (`x1 <= x0` or `y1 <= y0`) for very small
/// images or large gaps; callers treat such cells as unmatched.
pub fn cell_window(
    width: usize,
    height: usize,
    row: usize,
    col: usize,
    grid: GridShape,
    gaps: RelGaps,
) -> CellWindow {
    let (y0, y1) = axis_span(height, grid.rows.max(1), row, gaps.y);
    let (x0, x1) = axis_span(width, grid.cols.max(1), col, gaps.x);
    CellWindow { x0, y0, x1, y1 }
}
