use crate::Tile;
use taggrid_core::{binarize, resize_area, GrayImageView, TileSize};

/// Reduces a cell's pixel window to a binary tile: area-average downsample to
/// the tile size, then an Otsu threshold computed for that tile alone.
///
/// No threshold is carried between calls, so the result depends only on the
/// window content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileReducer {
    size: TileSize,
}

impl TileReducer {
    pub fn new(size: TileSize) -> Self {
        Self { size }
    }

    #[inline]
    pub fn size(&self) -> TileSize {
        self.size
    }

    /// Returns `None` for an empty window.
    pub fn reduce(&self, window: &GrayImageView<'_>) -> Option<Tile> {
        if window.is_empty() || self.size.bit_count() == 0 {
            return None;
        }
        let small = resize_area(window, self.size.width, self.size.height);
        let bw = binarize(&small.view());
        Some(Tile::from_binary_image(&bw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TagCatalog, TagMatch, TagPattern};
    use taggrid_core::GrayImage;

    const SIZE: TileSize = TileSize {
        width: 4,
        height: 4,
    };

    fn render(tile: &Tile, px: usize, lo: u8, hi: u8) -> GrayImage {
        GrayImage::from_fn(tile.width() * px, tile.height() * px, |x, y| {
            if tile.get(x / px, y / px) {
                hi
            } else {
                lo
            }
        })
    }

    #[test]
    fn recovers_rendered_tile() {
        let tile = Tile::from_fn(4, 4, |x, y| (x * 3 + y) % 4 == 1);
        let img = render(&tile, 9, 30, 220);
        assert_eq!(TileReducer::new(SIZE).reduce(&img.view()), Some(tile));
    }

    #[test]
    fn lighting_level_does_not_change_result() {
        let tile = Tile::from_fn(4, 4, |x, y| x == y || x == 0);
        let reducer = TileReducer::new(SIZE);
        let dim = render(&tile, 5, 5, 60);
        let bright = render(&tile, 5, 170, 250);
        assert_eq!(reducer.reduce(&dim.view()), Some(tile.clone()));
        assert_eq!(reducer.reduce(&bright.view()), Some(tile));
    }

    #[test]
    fn rotated_image_reduces_to_rotated_tile() {
        let tile = Tile::from_fn(4, 4, |x, y| (x + 2 * y) % 5 < 2);
        let img = render(&tile, 7, 0, 255).rotate90();
        let reduced = TileReducer::new(SIZE).reduce(&img.view());
        assert_eq!(reduced, Some(tile.rotate90()));
    }

    #[test]
    fn rotated_images_match_the_same_tag() {
        let tags = [
            TagPattern::parse("corner", "1100100000100011", SIZE).expect("valid"),
            TagPattern::parse("zigzag", "0110110010010101", SIZE).expect("valid"),
        ];
        let catalog = TagCatalog::build(&tags, SIZE).expect("catalog");
        let reducer = TileReducer::new(SIZE);

        for (id, tag) in tags.iter().enumerate() {
            let mut img = render(&tag.tile, 6, 20, 230);
            for quarter in 1..=3 {
                img = img.rotate90();
                let tile = reducer.reduce(&img.view()).expect("tile");
                assert_eq!(
                    catalog.match_tile(&tile),
                    TagMatch::Matched(id),
                    "{} rotated {} quarter turns",
                    tag.name,
                    quarter
                );
            }
        }
    }

    #[test]
    fn empty_window_has_no_tile() {
        let img = GrayImage::filled(0, 0, 0);
        assert_eq!(TileReducer::new(SIZE).reduce(&img.view()), None);
    }
}
