//! Registered tag bitmaps.

use crate::Tile;
use serde::{Deserialize, Serialize};
use taggrid_core::TileSize;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PatternError {
    #[error("tag {name:?} has {got} bits, tile size {width}x{height} needs {expected}")]
    WrongLength {
        name: String,
        width: usize,
        height: usize,
        expected: usize,
        got: usize,
    },
    #[error("tag {name:?} has invalid character {ch:?} at position {index} (expected '0' or '1')")]
    InvalidChar {
        name: String,
        ch: char,
        index: usize,
    },
}

/// How a tag is written in configuration files: either a bare bit string or
/// a bit string with a display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagSource {
    Bits(String),
    Named { name: String, bits: String },
}

impl TagSource {
    pub fn bits(&self) -> &str {
        match self {
            TagSource::Bits(bits) | TagSource::Named { bits, .. } => bits,
        }
    }

    /// Explicit name, or the tag index when none was given.
    pub fn name(&self, index: usize) -> String {
        match self {
            TagSource::Bits(_) => index.to_string(),
            TagSource::Named { name, .. } => name.clone(),
        }
    }
}

/// A named `width × height` bitmap; its position in the registration list
/// is its tag id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagPattern {
    pub name: String,
    pub tile: Tile,
}

impl TagPattern {
    /// Parse a row-major `'0'`/`'1'` string (`'1'` = bright).
    pub fn parse(name: impl Into<String>, bits: &str, size: TileSize) -> Result<Self, PatternError> {
        let name = name.into();
        let expected = size.bit_count();
        let got = bits.chars().count();
        if got != expected {
            return Err(PatternError::WrongLength {
                name,
                width: size.width,
                height: size.height,
                expected,
                got,
            });
        }

        let mut values = Vec::with_capacity(expected);
        for (index, ch) in bits.chars().enumerate() {
            match ch {
                '0' => values.push(false),
                '1' => values.push(true),
                _ => return Err(PatternError::InvalidChar { name, ch, index }),
            }
        }

        let tile = Tile::from_fn(size.width, size.height, |x, y| values[y * size.width + x]);
        Ok(Self { name, tile })
    }

    pub fn from_sources(sources: &[TagSource], size: TileSize) -> Result<Vec<Self>, PatternError> {
        sources
            .iter()
            .enumerate()
            .map(|(i, src)| Self::parse(src.name(i), src.bits(), size))
            .collect()
    }
}
