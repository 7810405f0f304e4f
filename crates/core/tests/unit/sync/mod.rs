//! Concurrency substrate tests.

/// Per-set priority gates.
pub mod gate;

/// Pending-transaction tables.
pub mod pending;

/// Buffer pools.
pub mod pool;
