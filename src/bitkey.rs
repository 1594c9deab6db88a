//! Column bit sets for star schemas
//!
//! A [`BitKey`] records which columns of a star participate in a constraint
//! or a grouping. Bit N is set when the star column with bit position N is
//! involved. BitKeys are part of cache-key identity and are also used to
//! group tuples that constrain the same set of columns.
//!
//! # Equality
//!
//! Equality, hashing and ordering only look at the set bits. A key created
//! for a 3-column star and a key created for a 200-column star compare equal
//! when they have the same bits set; in particular every empty key is equal
//! to every other empty key, regardless of the size it was created with.
//!
//! # Example
//!
//! ```rust
//! use starcache::bitkey::BitKey;
//!
//! let mut country_state = BitKey::new(3);
//! country_state.set(0);
//! country_state.set(1);
//!
//! let city = BitKey::from_positions(3, [2]);
//! let all = country_state.or(&city);
//! assert_eq!(all.cardinality(), 3);
//! assert!(all.is_superset_of(&city));
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A set of star column ordinals
///
/// Uses a vector of u64 words, where each bit represents one column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BitKey {
    /// Bitmap words (64 bits each), least significant word first
    words: Vec<u64>,

    /// Number of columns this key was sized for
    size: usize,
}

impl BitKey {
    /// Create an empty key sized for a star with `size` columns
    pub fn new(size: usize) -> Self {
        Self {
            words: vec![0; size.div_ceil(64)],
            size,
        }
    }

    /// Create a key with the given bit positions set
    pub fn from_positions<I: IntoIterator<Item = usize>>(size: usize, positions: I) -> Self {
        let mut key = Self::new(size);
        for pos in positions {
            key.set(pos);
        }
        key
    }

    /// Number of columns the key was sized for
    pub fn size(&self) -> usize {
        self.size
    }

    /// Set a bit
    ///
    /// Positions beyond the sized range grow the key.
    pub fn set(&mut self, pos: usize) {
        let word_idx = pos / 64;
        if word_idx >= self.words.len() {
            self.words.resize(word_idx + 1, 0);
        }
        self.words[word_idx] |= 1u64 << (pos % 64);
        if pos >= self.size {
            self.size = pos + 1;
        }
    }

    /// Clear a bit
    pub fn clear_bit(&mut self, pos: usize) {
        let word_idx = pos / 64;
        if let Some(word) = self.words.get_mut(word_idx) {
            *word &= !(1u64 << (pos % 64));
        }
    }

    /// Clear every bit
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Check if a bit is set
    pub fn get(&self, pos: usize) -> bool {
        self.words
            .get(pos / 64)
            .map(|w| w & (1u64 << (pos % 64)) != 0)
            .unwrap_or(false)
    }

    /// Number of bits set
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Check if no bit is set
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Bitwise OR (union)
    pub fn or(&self, other: &BitKey) -> BitKey {
        let max_len = self.words.len().max(other.words.len());
        let words = (0..max_len)
            .map(|i| {
                self.words.get(i).copied().unwrap_or(0) | other.words.get(i).copied().unwrap_or(0)
            })
            .collect();
        BitKey {
            words,
            size: self.size.max(other.size),
        }
    }

    /// Bitwise AND (intersection)
    pub fn and(&self, other: &BitKey) -> BitKey {
        let min_len = self.words.len().min(other.words.len());
        let words = (0..min_len)
            .map(|i| self.words[i] & other.words[i])
            .collect();
        BitKey {
            words,
            size: self.size.max(other.size),
        }
    }

    /// Bitwise AND-NOT (self AND NOT other)
    pub fn and_not(&self, other: &BitKey) -> BitKey {
        let words = self
            .words
            .iter()
            .enumerate()
            .map(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0))
            .collect();
        BitKey {
            words,
            size: self.size,
        }
    }

    /// Whether every bit set in `other` is also set in `self`
    pub fn is_superset_of(&self, other: &BitKey) -> bool {
        other.and_not(self).is_empty()
    }

    /// Whether the two keys share at least one bit
    pub fn intersects(&self, other: &BitKey) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Position of the lowest set bit
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// Iterate set bit positions in ascending order
    pub fn iter(&self) -> BitKeyIter<'_> {
        BitKeyIter {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Words with trailing zero words removed
    fn significant_words(&self) -> &[u64] {
        let len = self
            .words
            .iter()
            .rposition(|w| *w != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.words[..len]
    }
}

impl PartialEq for BitKey {
    fn eq(&self, other: &Self) -> bool {
        self.significant_words() == other.significant_words()
    }
}

impl Eq for BitKey {}

impl Hash for BitKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_words().hash(state);
    }
}

impl Ord for BitKey {
    /// Compares keys as unsigned integers, highest bit first
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.significant_words();
        let b = other.significant_words();
        a.len()
            .cmp(&b.len())
            .then_with(|| a.iter().rev().cmp(b.iter().rev()))
    }
}

impl PartialOrd for BitKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BitKey {
    /// Renders `0x` followed by the significant words, most significant first
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        let words = self.significant_words();
        if words.is_empty() {
            return write!(f, "{:016x}", 0u64);
        }
        for word in words.iter().rev() {
            write!(f, "{:016x}", word)?;
        }
        Ok(())
    }
}

/// Iterator over set bit positions
pub struct BitKeyIter<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for BitKeyIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
            if self.word_idx >= self.words.len() {
                return None;
            }
            self.current = self.words[self.word_idx];
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
