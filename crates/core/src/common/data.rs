//! 64-byte data blocks.
//!
//! This module defines the payload carried by data-bearing caches:
//! 1. **`DataBlock`:** A plain 8×u64 value with masked word writes.
//! 2. **`DataSlot`:** A shared array cell wrapping a block behind a short-lived
//!    guard, so ports at different levels can exchange payloads through
//!    references without holding each other's guards across calls.

use std::fmt;
use std::sync::Mutex;

use super::addr::BLOCK_WORDS;
use crate::sync::guard;

/// A 64-byte cache block payload (8×u64, little-endian word order).
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct DataBlock {
    words: [u64; BLOCK_WORDS],
}

impl DataBlock {
    /// Creates a zero-filled block.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a block from eight words.
    #[inline]
    pub fn from_words(words: [u64; BLOCK_WORDS]) -> Self {
        Self { words }
    }

    /// Creates a block with every word set to `value`; convenient in tests.
    #[inline]
    pub fn splat(value: u64) -> Self {
        Self {
            words: [value; BLOCK_WORDS],
        }
    }

    /// Reads the 64-bit word at `index`.
    #[inline]
    pub fn read(&self, index: usize) -> u64 {
        self.words[index]
    }

    /// Writes the 64-bit word at `index` under a write mask: only bits set in
    /// `wmask` are taken from `wdata`.
    #[inline]
    pub fn write(&mut self, index: usize, wdata: u64, wmask: u64) {
        self.words[index] = (self.words[index] & !wmask) | (wdata & wmask);
    }

    /// Replaces the whole block.
    #[inline]
    pub fn fill(&mut self, words: &[u64; BLOCK_WORDS]) {
        self.words = *words;
    }

    /// Returns the raw words.
    #[inline]
    pub fn words(&self) -> &[u64; BLOCK_WORDS] {
        &self.words
    }

    /// Zeroes the block.
    #[inline]
    pub fn reset(&mut self) {
        self.words = [0; BLOCK_WORDS];
    }
}

impl fmt::Debug for DataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, w) in self.words.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{w:016x}")?;
        }
        Ok(())
    }
}

/// A shared cell holding one [`DataBlock`].
///
/// Array cells and staging buffers are exchanged between cache levels by
/// reference; each access takes a short-lived internal guard so no level holds
/// another level's data locked across a port call.
#[derive(Default)]
pub struct DataSlot {
    block: Mutex<DataBlock>,
}

impl DataSlot {
    /// Creates a zero-filled slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the block.
    #[inline]
    pub fn get(&self) -> DataBlock {
        *guard(&self.block)
    }

    /// Replaces the block.
    #[inline]
    pub fn set(&self, block: &DataBlock) {
        *guard(&self.block) = *block;
    }

    /// Copies the content of another slot into this one.
    #[inline]
    pub fn copy_from(&self, other: &DataSlot) {
        let src = other.get();
        *guard(&self.block) = src;
    }

    /// Reads one word.
    #[inline]
    pub fn read(&self, index: usize) -> u64 {
        guard(&self.block).read(index)
    }

    /// Writes one word under a mask.
    #[inline]
    pub fn write(&self, index: usize, wdata: u64, wmask: u64) {
        guard(&self.block).write(index, wdata, wmask);
    }

    /// Zeroes the block.
    #[inline]
    pub fn reset(&self) {
        guard(&self.block).reset();
    }
}

impl fmt::Debug for DataSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataSlot({:?})", self.get())
    }
}
