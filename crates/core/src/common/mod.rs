//! Common utilities and types used throughout the cache-hierarchy simulator.
//!
//! This module provides fundamental building blocks shared across all
//! components of the simulator. It includes:
//! 1. **Block Constants:** Cache-block geometry (64-byte blocks, 6-bit offset).
//! 2. **Data Blocks:** The 64-byte payload type and its shared array cell.
//! 3. **Error Handling:** The construction-time error taxonomy.

/// Cache-block geometry constants and address helpers.
pub mod addr;

/// 64-byte data blocks and their shared cells.
pub mod data;

/// Construction-time error types.
pub mod error;

pub use addr::{block_align, BLOCK_BYTES, BLOCK_OFFSET, BLOCK_WORDS};
pub use data::{DataBlock, DataSlot};
pub use error::BuildError;
