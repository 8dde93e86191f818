//! Binary tiles and the pure helpers the catalog is built from.

use taggrid_core::{GrayImage, TileSize};

/// Largest tile (in bits) whose encoding fits the catalog key.
pub const MAX_TILE_BITS: usize = u128::BITS as usize;

/// `width × height` binary matrix, row-major, `true` = bright.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tile {
    width: usize,
    height: usize,
    bits: Vec<bool>,
}

impl Tile {
    /// Returns `None` when `bits.len() != width * height`.
    pub fn new(width: usize, height: usize, bits: Vec<bool>) -> Option<Self> {
        (bits.len() == width * height).then_some(Self {
            width,
            height,
            bits,
        })
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut bits = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    /// Any non-zero pixel becomes a set bit.
    pub fn from_binary_image(img: &GrayImage) -> Self {
        Self {
            width: img.width,
            height: img.height,
            bits: img.data.iter().map(|&v| v != 0).collect(),
        }
    }

    /// Inverse of [`Tile::encode`] for a given size.
    pub fn decode(code: u128, size: TileSize) -> Self {
        let n = size.bit_count();
        Self::from_fn(size.width, size.height, |x, y| {
            let idx = y * size.width + x;
            (code >> (n - 1 - idx)) & 1 == 1
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn size(&self) -> TileSize {
        TileSize {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.bits[y * self.width + x]
    }

    #[inline]
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Row-major, most-significant-bit-first integer encoding.
    ///
    /// Only meaningful for tiles of at most [`MAX_TILE_BITS`] bits; the
    /// catalog rejects larger tile sizes up front.
    pub fn encode(&self) -> u128 {
        self.bits
            .iter()
            .fold(0u128, |code, &bit| (code << 1) | u128::from(bit))
    }

    /// Rotate by 90° counter-clockwise (transpose, then reverse row order).
    pub fn rotate90(&self) -> Tile {
        let (w, h) = (self.width, self.height);
        Tile::from_fn(h, w, |x, y| self.get(w - 1 - y, x))
    }

    /// The tile followed by its 90°, 180° and 270° rotations.
    pub fn rotations(&self) -> [Tile; 4] {
        let r1 = self.rotate90();
        let r2 = r1.rotate90();
        let r3 = r2.rotate90();
        [self.clone(), r1, r2, r3]
    }

    /// `'0'`/`'1'` string in encoding order.
    pub fn to_bit_string(&self) -> String {
        self.bits.iter().map(|&b| if b { '1' } else { '0' }).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tile(rows: &[&str]) -> Tile {
        let height = rows.len();
        let width = rows[0].len();
        Tile::from_fn(width, height, |x, y| rows[y].as_bytes()[x] == b'1')
    }

    #[test]
    fn encode_is_msb_first_row_major() {
        let t = tile(&["10", "01"]);
        assert_eq!(t.encode(), 0b1001);
        let t = tile(&["0001"]);
        assert_eq!(t.encode(), 1);
    }

    #[test]
    fn rotate90_is_counter_clockwise() {
        let t = tile(&["110", "000"]);
        let r = t.rotate90();
        assert_eq!((r.width(), r.height()), (2, 3));
        assert_eq!(r, tile(&["00", "10", "10"]));
    }

    #[test]
    fn four_rotations_return_to_start() {
        let t = tile(&["1100", "1000", "0001", "0000"]);
        let [_, _, _, r3] = t.rotations();
        assert_eq!(r3.rotate90(), t);
    }

    #[test]
    fn full_width_encoding_keeps_every_bit() {
        let size = TileSize {
            width: 16,
            height: 8,
        };
        let t = Tile::from_fn(16, 8, |x, y| (x + y) % 3 == 0);
        assert_eq!(Tile::decode(t.encode(), size), t);
    }

    proptest! {
        #[test]
        fn encoding_is_injective_for_4x4(a in 0u32..(1 << 16), b in 0u32..(1 << 16)) {
            let size = TileSize { width: 4, height: 4 };
            let ta = Tile::decode(a as u128, size);
            let tb = Tile::decode(b as u128, size);
            prop_assert_eq!(ta.encode(), a as u128);
            prop_assert_eq!(ta == tb, a == b);
        }
    }

    #[test]
    fn encoding_is_a_bijection_over_3x3() {
        let size = TileSize {
            width: 3,
            height: 3,
        };
        let mut seen = std::collections::HashSet::new();
        for code in 0u128..(1 << 9) {
            let t = Tile::decode(code, size);
            assert_eq!(t.encode(), code);
            assert!(seen.insert(t));
        }
    }
}
