//! Cache status published to consumers.

use crate::error::ResolveError;

/// Lifecycle phase of a cache instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePhase {
    /// Nothing resolved yet and nothing in flight.
    Empty,
    /// A batch resolution is in flight.
    Resolving,
    /// Entries come from the latest resolution, which succeeded.
    Ready,
    /// The latest resolution failed; entries are from an earlier success.
    Stale,
}

/// Aggregate status of a cache instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStatus {
    /// Current lifecycle phase
    pub phase: CachePhase,
    /// True while a resolution is in flight
    pub loading: bool,
    /// Error from the most recent failed resolution, cleared on success
    pub error: Option<ResolveError>,
    /// Number of keys with a cached URL
    pub count: usize,
}

impl CacheStatus {
    /// Status of a freshly created cache.
    pub fn empty() -> Self {
        Self {
            phase: CachePhase::Empty,
            loading: false,
            error: None,
            count: 0,
        }
    }
}

impl Default for CacheStatus {
    fn default() -> Self {
        Self::empty()
    }
}

/// What a visibility notification did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityOutcome {
    /// Not a hidden→visible transition, or nothing to resolve.
    Ignored,
    /// Became visible but the cache was still fresh.
    SkippedFresh,
    /// Became visible and a resolution was run (or joined).
    Refreshed,
}
