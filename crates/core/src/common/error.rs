//! Construction-time error taxonomy.
//!
//! All runtime failures in the simulator are invariant violations and abort
//! the process with a diagnostic naming the cache and address; there are no
//! recoverable runtime errors. Structural misconfiguration, in contrast, is
//! detected while the hierarchy is being built and reported through
//! [`BuildError`], naming the mis-wired node.

use thiserror::Error;

/// Errors raised while constructing or wiring a cache hierarchy.
#[derive(Debug, Error)]
pub enum BuildError {
    /// More cached children connected to a level than the sharer bitmap can
    /// track.
    #[error("cache `{name}`: {count} cached children exceed the 63-child sharer limit")]
    TooManyChildren {
        /// Name of the over-connected cache.
        name: String,
        /// Number of cached children after the attempted connect.
        count: usize,
    },

    /// A cache's outer port was connected to a second parent.
    #[error("cache `{name}`: outer port is already connected")]
    AlreadyConnected {
        /// Name of the doubly-connected cache.
        name: String,
    },

    /// A cache was configured with zero ways or zero sets.
    #[error("cache `{name}`: sets and ways must be non-zero")]
    EmptyGeometry {
        /// Name of the empty cache.
        name: String,
    },

    /// The MSHR depth cannot stage an eviction and a fetch at the same time.
    #[error("cache `{name}`: MSHR depth {mshr} is below the required minimum of 2")]
    MshrTooSmall {
        /// Name of the under-buffered cache.
        name: String,
        /// Configured MSHR depth.
        mshr: usize,
    },

    /// A directory policy was paired with a cache that has no extended ways
    /// or directory metadata.
    #[error("cache `{name}`: policy `{policy}` requires directory support")]
    PolicyNeedsDirectory {
        /// Name of the mis-paired cache.
        name: String,
        /// The offending policy variant.
        policy: String,
    },

    /// The Intel CAS slice hasher only supports 1, 2, 4, or 8 slices.
    #[error("slice dispatcher: {slices} slices unsupported by the CAS hash (use 1, 2, 4, or 8)")]
    UnsupportedSliceCount {
        /// Requested slice count.
        slices: usize,
    },

    /// The slice dispatcher's slices disagreed on the child identifier
    /// assigned to a connecting client.
    #[error("slice dispatcher: slices assigned inconsistent child ids to `{client}`")]
    InconsistentSliceIds {
        /// Name of the connecting client cache.
        client: String,
    },

    /// A hierarchy description that cannot be realized.
    #[error("config: {0}")]
    Config(String),
}
