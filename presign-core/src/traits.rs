//! Common traits for PRESIGN.
//!
//! These traits define the seams between the cache and its external
//! collaborators, enabling alternative backends and testing.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ResolveError;
use crate::types::ResourcePath;

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH RESOLVER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Mapping from requested path to its signed URL.
pub type UrlMap = HashMap<ResourcePath, String>;

/// Interface to a backend that mints signed URLs for many paths at once.
///
/// Implementations might use:
/// - An HTTP signing endpoint (see `presign-resolver`)
/// - An in-process signer (for testing/development)
///
/// # Contract
///
/// - One invocation makes at most one outbound call, whatever `paths.len()` is.
/// - An empty `paths` set returns an empty map without any outbound call.
/// - The returned map may omit requested paths; that is not an error.
/// - No retries happen inside `resolve`; the caller owns retry timing.
#[async_trait]
pub trait BatchResolver: Send + Sync {
    /// Resolves every path in `paths` to a URL valid for `ttl`.
    async fn resolve(
        &self,
        paths: &BTreeSet<ResourcePath>,
        ttl: Duration,
    ) -> std::result::Result<UrlMap, ResolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Unreachable;

    #[async_trait]
    impl BatchResolver for Unreachable {
        async fn resolve(
            &self,
            _paths: &BTreeSet<ResourcePath>,
            _ttl: Duration,
        ) -> std::result::Result<UrlMap, ResolveError> {
            Err(ResolveError::transport("unreachable"))
        }
    }

    #[test]
    fn test_resolver_is_object_safe() {
        let resolver: Arc<dyn BatchResolver> = Arc::new(Unreachable);
        assert_eq!(Arc::strong_count(&resolver), 1);
    }
}
