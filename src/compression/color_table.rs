use super::color::PackedColor;
use super::error::CompressionError;
use std::collections::HashMap;

/// A palette that assigns every distinct color the next free index, in the
/// order in which the colors are first observed.
pub struct ColorTable {
    entries: Vec<PackedColor>,
    lookup: HashMap<PackedColor, u32>,
    limit: usize,
}

impl ColorTable {
    /// Creates an empty table that holds fewer than `limit` colors.
    pub fn with_limit(limit: usize) -> ColorTable {
        ColorTable {
            entries: Vec::new(),
            lookup: HashMap::new(),
            limit,
        }
    }

    /// Returns the index of `color`, assigning it a new one if the color was
    /// not observed before.
    ///
    /// Fails if the new color would make the table reach its limit.
    pub fn observe(&mut self, color: PackedColor) -> Result<u32, CompressionError> {
        if let Some(&index) = self.lookup.get(&color) {
            return Ok(index);
        }
        let index = self.entries.len();
        if index + 1 >= self.limit {
            return Err(CompressionError::SizeLimitExceeded {
                what: "the number of distinct colors",
                value: index + 1,
                max: self.limit - 1,
            });
        }
        let index = index as u32;
        self.entries.push(color);
        self.lookup.insert(color, index);
        Ok(index)
    }

    pub fn index_of(&self, color: PackedColor) -> Option<u32> {
        self.lookup.get(&color).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(color, index)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (PackedColor, u32)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, &color)| (color, index as u32))
    }
}
