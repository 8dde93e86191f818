#![allow(dead_code)]

use std::path::Path;

use taggrid::core::{cell_window, GrayImage, GridShape, RelGaps};
use taggrid::ScannerConfig;

pub const P0: &str = "1100100000010000";
pub const P1: &str = "0110101100011100";
/// `P1` turned a quarter turn counter-clockwise.
pub const P1_ROT90: &str = "0110110010010101";
/// Matches neither tag in any rotation.
pub const NOISE: &str = "1010010110100101";

pub const EXPECTED: [[i64; 2]; 2] = [[0, 1], [1, -1]];

const SHAPE: GridShape = GridShape { rows: 2, cols: 2 };
const GAPS: RelGaps = RelGaps { x: 0.05, y: 0.05 };

/// A 200x200 frame holding a 2x2 grid of 4x4 tags on a grey background:
/// `P0`, `P1` / rotated `P1`, noise.
pub fn grid_frame() -> GrayImage {
    let mut img = GrayImage::filled(200, 200, 128);
    for (index, bits) in [P0, P1, P1_ROT90, NOISE].into_iter().enumerate() {
        let (row, col) = (index / 2, index % 2);
        let w = cell_window(200, 200, row, col, SHAPE, GAPS);
        let bits = bits.as_bytes();
        for y in w.y0..w.y1 {
            for x in w.x0..w.x1 {
                let by = (y - w.y0) * 4 / w.height();
                let bx = (x - w.x0) * 4 / w.width();
                let v = if bits[by * 4 + bx] == b'1' { 240 } else { 15 };
                img.set(x, y, v);
            }
        }
    }
    img
}

/// `grid_frame` pasted at (50, 50) into a 300x300 grey frame.
pub fn offset_frame() -> GrayImage {
    let grid = grid_frame();
    let mut img = GrayImage::filled(300, 300, 128);
    for y in 0..grid.height {
        for x in 0..grid.width {
            img.set(x + 50, y + 50, grid.get(x, y));
        }
    }
    img
}

pub fn config_json(filename: &Path) -> serde_json::Value {
    serde_json::json!({
        "camera": { "filename": filename, "reconnection_delay": 0.05 },
        "dimensions": {
            "grid": { "rows": 2, "cols": 2 },
            "tile": { "width": 4, "height": 4 },
            "gap": { "x": 0.05, "y": 0.05 }
        },
        "tags": [P0, { "name": "door", "bits": P1 }],
        "scan": { "rate": 20.0, "display_rate": 100.0 }
    })
}

pub fn config(filename: &Path) -> ScannerConfig {
    serde_json::from_value(config_json(filename)).expect("config")
}
