//! Configuration defaults for PRESIGN.
//!
//! Every value here is only a default; callers override them through
//! `CacheConfig` and `ResolverConfig`.

// ═══════════════════════════════════════════════════════════════════════════════
// FRESHNESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default validity window requested for minted URLs (1 hour).
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Default minimum spacing between visibility-driven refreshes (60 seconds).
/// Guards against refresh storms when a view flips hidden/visible quickly.
pub const DEFAULT_MIN_REFETCH_INTERVAL_MS: u64 = 60_000;

/// Default fraction of the TTL after which the background timer refreshes.
/// Refreshing at 90% keeps served URLs inside their validity window.
pub const DEFAULT_REFRESH_FRACTION: f64 = 0.9;

/// Proactive refresh is enabled unless a caller opts out.
pub const DEFAULT_AUTO_REFRESH_ENABLED: bool = true;

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Default request timeout for the signing backend, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Current snapshot file format version.
/// Increment when making breaking changes to the snapshot layout.
pub const SNAPSHOT_VERSION: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_fraction_in_range() {
        assert!(DEFAULT_REFRESH_FRACTION > 0.0);
        assert!(DEFAULT_REFRESH_FRACTION < 1.0);
    }

    #[test]
    fn test_min_interval_below_ttl() {
        assert!(DEFAULT_MIN_REFETCH_INTERVAL_MS < DEFAULT_TTL_SECONDS * 1000);
    }
}
