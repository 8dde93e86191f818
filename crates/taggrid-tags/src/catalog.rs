//! Rotation-invariant lookup from tile encodings to tag ids.

use std::collections::HashMap;

use crate::{TagPattern, Tile, MAX_TILE_BITS};
use log::debug;
use serde::{Deserialize, Serialize};
use taggrid_core::TileSize;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Index of a pattern in the registration list.
pub type TagId = usize;

/// Outcome of matching one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagMatch {
    Matched(TagId),
    Unmatched,
}

impl TagMatch {
    #[inline]
    pub fn id(self) -> Option<TagId> {
        match self {
            TagMatch::Matched(id) => Some(id),
            TagMatch::Unmatched => None,
        }
    }

    /// Integer form used in notifications: the id, or `-1` when unmatched.
    #[inline]
    pub fn to_wire(self) -> i64 {
        match self {
            TagMatch::Matched(id) => id as i64,
            TagMatch::Unmatched => -1,
        }
    }
}

/// Two registrations produced the same encoding; the later one won.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Collision {
    pub code: u128,
    pub previous: TagId,
    pub replaced_by: TagId,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("tile size {width}x{height} has {bits} bits, at most {max} are supported")]
    TileTooLarge {
        width: usize,
        height: usize,
        bits: usize,
        max: usize,
    },
    #[error("tile size must be at least 1x1")]
    EmptyTile,
    #[error("pattern {index} is {got_w}x{got_h}, catalog tile size is {width}x{height}")]
    SizeMismatch {
        index: usize,
        width: usize,
        height: usize,
        got_w: usize,
        got_h: usize,
    },
}

/// Immutable catalog of registered tags.
///
/// Every pattern is registered under the encodings of its four rotations.
/// When two registrations share an encoding the later one wins, and the
/// overwrite is recorded in [`TagCatalog::collisions`].
/// Changing the pattern list or tile size means building a new catalog.
#[derive(Clone, Debug)]
pub struct TagCatalog {
    tile_size: TileSize,
    names: Vec<String>,
    lookup: HashMap<u128, TagId>,
    collisions: Vec<Collision>,
}

impl TagCatalog {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(patterns), fields(patterns = patterns.len()))
    )]
    pub fn build(patterns: &[TagPattern], tile_size: TileSize) -> Result<Self, CatalogError> {
        let bits = tile_size.bit_count();
        if bits == 0 {
            return Err(CatalogError::EmptyTile);
        }
        if bits > MAX_TILE_BITS {
            return Err(CatalogError::TileTooLarge {
                width: tile_size.width,
                height: tile_size.height,
                bits,
                max: MAX_TILE_BITS,
            });
        }

        let mut lookup = HashMap::with_capacity(patterns.len() * 4);
        let mut collisions = Vec::new();

        for (id, pattern) in patterns.iter().enumerate() {
            if pattern.tile.size() != tile_size {
                return Err(CatalogError::SizeMismatch {
                    index: id,
                    width: tile_size.width,
                    height: tile_size.height,
                    got_w: pattern.tile.width(),
                    got_h: pattern.tile.height(),
                });
            }

            for rotated in pattern.tile.rotations() {
                let code = rotated.encode();
                match lookup.insert(code, id) {
                    Some(previous) if previous != id => {
                        collisions.push(Collision {
                            code,
                            previous,
                            replaced_by: id,
                        });
                    }
                    _ => {}
                }
            }
        }

        debug!(
            "catalog: {} tags, {} encodings, {} collisions",
            patterns.len(),
            lookup.len(),
            collisions.len()
        );
        Ok(Self {
            tile_size,
            names: patterns.iter().map(|p| p.name.clone()).collect(),
            lookup,
            collisions,
        })
    }

    /// Match an observed tile against every registered rotation.
    pub fn match_tile(&self, tile: &Tile) -> TagMatch {
        if tile.size() != self.tile_size {
            return TagMatch::Unmatched;
        }
        self.match_code(tile.encode())
    }

    #[inline]
    pub fn match_code(&self, code: u128) -> TagMatch {
        self.lookup
            .get(&code)
            .map_or(TagMatch::Unmatched, |&id| TagMatch::Matched(id))
    }

    #[inline]
    pub fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    /// Number of registered patterns.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of distinct encodings in the lookup.
    #[inline]
    pub fn encoding_count(&self) -> usize {
        self.lookup.len()
    }

    pub fn name(&self, id: TagId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }
}
