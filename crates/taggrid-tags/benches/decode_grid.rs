use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use taggrid_core::{GrayImage, GridShape, RelGaps, TileSize};
use taggrid_tags::{GridDecoder, TagCatalog, TagPattern, Tile, TileReducer};

const TILE: TileSize = TileSize {
    width: 4,
    height: 4,
};

fn catalog(count: usize) -> Arc<TagCatalog> {
    let patterns: Vec<TagPattern> = (0..count)
        .map(|i| TagPattern {
            name: format!("tag{i}"),
            tile: Tile::decode((i as u128 * 2_654_435_761) & 0xffff, TILE),
        })
        .collect();
    Arc::new(TagCatalog::build(&patterns, TILE).expect("catalog"))
}

fn board(shape: GridShape, px: usize) -> GrayImage {
    let side_w = shape.cols * TILE.width * px;
    let side_h = shape.rows * TILE.height * px;
    GrayImage::from_fn(side_w, side_h, |x, y| {
        let code = ((x / px) * 31 + (y / px) * 17) % 7;
        if code < 3 {
            235
        } else {
            20
        }
    })
}

fn bench_reduce(c: &mut Criterion) {
    let reducer = TileReducer::new(TILE);
    let window = board(GridShape { rows: 1, cols: 1 }, 24);
    c.bench_function("reduce_96px_to_4x4", |b| {
        b.iter(|| reducer.reduce(black_box(&window.view())))
    });
}

fn bench_decode(c: &mut Criterion) {
    let shape = GridShape { rows: 6, cols: 8 };
    let decoder = GridDecoder::new(shape, RelGaps { x: 0.02, y: 0.02 }, catalog(64));
    let img = board(shape, 10);
    c.bench_function("decode_6x8_grid", |b| {
        b.iter(|| decoder.decode(black_box(&img.view())))
    });
}

criterion_group!(benches, bench_reduce, bench_decode);
criterion_main!(benches);
