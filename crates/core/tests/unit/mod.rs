//! Unit test tree.

/// Cache substrate: metadata, replacement, indexers.
pub mod cache;

/// Coherence protocol: boundary scenarios, properties, variants.
pub mod coherence;

/// Configuration parsing and defaults.
pub mod config;

/// The memory leaf.
pub mod memory;

/// Slice-address hashing.
pub mod slicehash;

/// Concurrency substrate: gates, pending tables, pools.
pub mod sync;
