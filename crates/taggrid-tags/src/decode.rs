//! Whole-grid decoding on a rectified ROI image.

use std::sync::Arc;

use crate::{TagCatalog, TagMatch, Tile, TileReducer};
use serde::{Serialize, Serializer};
use taggrid_core::{CellWindow, GrayImage, GrayImageView, GridShape, RelGaps};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// `rows × cols` decoding result, compared by value between cycles.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DecodedGrid {
    shape: GridShape,
    cells: Vec<TagMatch>,
}

impl DecodedGrid {
    /// Grid with every cell unmatched.
    pub fn unmatched(shape: GridShape) -> Self {
        Self {
            shape,
            cells: vec![TagMatch::Unmatched; shape.cell_count()],
        }
    }

    /// Build from row-major cells; `None` if the count does not fit `shape`.
    pub fn from_cells(shape: GridShape, cells: Vec<TagMatch>) -> Option<Self> {
        (cells.len() == shape.cell_count()).then_some(Self { shape, cells })
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> TagMatch {
        self.cells[row * self.shape.cols + col]
    }

    pub fn cells(&self) -> &[TagMatch] {
        &self.cells
    }

    pub fn matched_count(&self) -> usize {
        self.cells.iter().filter(|c| c.id().is_some()).count()
    }

    /// Nested rows of ids with `-1` for unmatched cells.
    pub fn to_wire(&self) -> Vec<Vec<i64>> {
        self.cells
            .chunks(self.shape.cols.max(1))
            .map(|row| row.iter().map(|c| c.to_wire()).collect())
            .collect()
    }
}

impl Serialize for DecodedGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

/// Per-cell intermediate data of one decode pass.
#[derive(Clone, Debug)]
pub struct GridScan {
    pub grid: DecodedGrid,
    /// Window used for every cell, row-major.
    pub windows: Vec<CellWindow>,
    /// Reduced tile for every cell, `None` where the window was degenerate.
    pub tiles: Vec<Option<Tile>>,
}

impl GridScan {
    /// `(row, col)` of cells whose window had zero area.
    pub fn degenerate_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let cols = self.grid.shape().cols.max(1);
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_none())
            .map(move |(i, _)| (i / cols, i % cols))
    }
}

/// Decodes every cell of a rectified grid: geometry, tile reduction and
/// catalog lookup.
#[derive(Clone, Debug)]
pub struct GridDecoder {
    shape: GridShape,
    gaps: RelGaps,
    crop: (f64, f64),
    catalog: Arc<TagCatalog>,
}

impl GridDecoder {
    pub fn new(shape: GridShape, gaps: RelGaps, catalog: Arc<TagCatalog>) -> Self {
        Self {
            shape,
            gaps,
            crop: (1.0, 1.0),
            catalog,
        }
    }

    /// Keep only the central `fx × fy` fraction of every cell window.
    pub fn with_crop(mut self, fx: f64, fy: f64) -> Self {
        self.crop = (fx, fy);
        self
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    #[inline]
    pub fn catalog(&self) -> &Arc<TagCatalog> {
        &self.catalog
    }

    /// Swap in a freshly built catalog; the tile size follows the catalog.
    pub fn set_catalog(&mut self, catalog: Arc<TagCatalog>) {
        self.catalog = catalog;
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, rect), fields(w = rect.width, h = rect.height))
    )]
    pub fn decode(&self, rect: &GrayImageView<'_>) -> GridScan {
        let reducer = TileReducer::new(self.catalog.tile_size());
        let n = self.shape.cell_count();
        let mut windows = Vec::with_capacity(n);
        let mut tiles = Vec::with_capacity(n);
        let mut cells = Vec::with_capacity(n);

        for row in 0..self.shape.rows {
            for col in 0..self.shape.cols {
                let window = taggrid_core::cell_window(
                    rect.width,
                    rect.height,
                    row,
                    col,
                    self.shape,
                    self.gaps,
                )
                .crop(self.crop.0, self.crop.1);

                let tile = if window.is_degenerate() {
                    None
                } else {
                    let pixels = crop_view(rect, &window);
                    reducer.reduce(&pixels.view())
                };
                let result = tile
                    .as_ref()
                    .map_or(TagMatch::Unmatched, |t| self.catalog.match_tile(t));

                windows.push(window);
                tiles.push(tile);
                cells.push(result);
            }
        }

        GridScan {
            grid: DecodedGrid {
                shape: self.shape,
                cells,
            },
            windows,
            tiles,
        }
    }
}

fn crop_view(src: &GrayImageView<'_>, w: &CellWindow) -> GrayImage {
    let x1 = w.x1.min(src.width);
    let y1 = w.y1.min(src.height);
    let width = x1.saturating_sub(w.x0);
    let height = y1.saturating_sub(w.y0);
    GrayImage::from_fn(width, height, |x, y| {
        src.data[(w.y0 + y) * src.width + w.x0 + x]
    })
}

/// Lay out the reduced tiles of a scan as one image, every bit drawn as a
/// `scale × scale` block (bright = 255, dark = 0, missing tile = 128).
pub fn render_tiles(scan: &GridScan, scale: usize) -> GrayImage {
    let shape = scan.grid.shape();
    let (tw, th) = scan
        .tiles
        .iter()
        .flatten()
        .next()
        .map_or((1, 1), |t| (t.width(), t.height()));
    let scale = scale.max(1);
    let cell_w = tw * scale;
    let cell_h = th * scale;

    GrayImage::from_fn(shape.cols * cell_w, shape.rows * cell_h, |x, y| {
        let (col, row) = (x / cell_w, y / cell_h);
        match &scan.tiles[row * shape.cols + col] {
            Some(tile) if tile.width() == tw && tile.height() == th => {
                let bx = (x % cell_w) / scale;
                let by = (y % cell_h) / scale;
                if tile.get(bx, by) {
                    255
                } else {
                    0
                }
            }
            _ => 128,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TagPattern;
    use taggrid_core::TileSize;

    const SIZE: TileSize = TileSize {
        width: 3,
        height: 3,
    };

    fn catalog() -> Arc<TagCatalog> {
        let tags = [
            TagPattern::parse("a", "110100000", SIZE).expect("valid"),
            TagPattern::parse("b", "010111000", SIZE).expect("valid"),
        ];
        Arc::new(TagCatalog::build(&tags, SIZE).expect("catalog"))
    }

    fn paint(img: &mut GrayImage, w: &CellWindow, tile: &Tile) {
        for y in w.y0..w.y1 {
            for x in w.x0..w.x1 {
                let bx = (x - w.x0) * tile.width() / w.width();
                let by = (y - w.y0) * tile.height() / w.height();
                img.set(x, y, if tile.get(bx, by) { 240 } else { 15 });
            }
        }
    }

    #[test]
    fn decodes_row_of_cells() {
        let shape = GridShape { rows: 1, cols: 2 };
        let gaps = RelGaps { x: 0.1, y: 0.0 };
        let decoder = GridDecoder::new(shape, gaps, catalog());
        let mut img = GrayImage::filled(66, 30, 128);
        let a = TagPattern::parse("a", "110100000", SIZE).expect("valid").tile;
        let b = TagPattern::parse("b", "010111000", SIZE).expect("valid").tile;
        let (left, right) = (
            decoder_window(&img, shape, gaps, 0),
            decoder_window(&img, shape, gaps, 1),
        );
        paint(&mut img, &left, &a.rotate90());
        paint(&mut img, &right, &b);

        let scan = decoder.decode(&img.view());
        assert_eq!(scan.grid.to_wire(), vec![vec![0, 1]]);
        assert_eq!(scan.degenerate_cells().count(), 0);
        assert_eq!(serde_json::to_string(&scan.grid).expect("json"), "[[0,1]]");
    }

    fn decoder_window(img: &GrayImage, shape: GridShape, gaps: RelGaps, col: usize) -> CellWindow {
        taggrid_core::cell_window(img.width, img.height, 0, col, shape, gaps)
    }

    #[test]
    fn degenerate_cells_are_unmatched() {
        let shape = GridShape { rows: 2, cols: 2 };
        let decoder = GridDecoder::new(shape, RelGaps::default(), catalog());
        let img = GrayImage::filled(2, 2, 0);
        let scan = decoder.decode(&img.view());
        assert_eq!(scan.grid, DecodedGrid::unmatched(shape));
        assert!(scan.degenerate_cells().count() > 0);
    }

    #[test]
    fn mosaic_has_one_block_per_bit() {
        let shape = GridShape { rows: 1, cols: 2 };
        let tile = Tile::from_fn(3, 3, |x, _| x == 0);
        let scan = GridScan {
            grid: DecodedGrid::unmatched(shape),
            windows: vec![],
            tiles: vec![Some(tile), None],
        };
        let img = render_tiles(&scan, 2);
        assert_eq!((img.width, img.height), (12, 6));
        assert_eq!(img.get(0, 0), 255);
        assert_eq!(img.get(2, 0), 0);
        assert_eq!(img.get(8, 3), 128);
    }
}
