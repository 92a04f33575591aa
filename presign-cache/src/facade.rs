//! Consumer-facing read interface.

use tokio::sync::watch;

use presign_core::error::ResolveError;
use presign_core::types::CacheStatus;

use crate::cache::SignedUrlCache;

/// Read/refresh handle handed to consumers.
///
/// Consumers address resources by logical key only; the key→path→URL
/// indirection stays inside the cache. Every query is valid before the first
/// resolution and simply reports nothing yet.
#[derive(Clone)]
pub struct CacheFacade {
    cache: SignedUrlCache,
}

impl CacheFacade {
    pub(crate) fn new(cache: SignedUrlCache) -> Self {
        Self { cache }
    }

    /// Signed URL for `key`, if one is known.
    pub fn get_url_for(&self, key: &str) -> Option<String> {
        self.cache.get_url(key)
    }

    /// True while a resolution is in flight.
    pub fn loading(&self) -> bool {
        self.cache.status().loading
    }

    /// Error from the most recent failed resolution.
    pub fn error(&self) -> Option<ResolveError> {
        self.cache.status().error
    }

    /// Number of keys with a cached URL.
    pub fn loaded_count(&self) -> usize {
        self.cache.status().count
    }

    /// Returns true if `key` has a URL still inside its validity window.
    pub fn is_usable(&self, key: &str) -> bool {
        self.cache.is_usable(key)
    }

    /// Aggregate status.
    pub fn status(&self) -> CacheStatus {
        self.cache.status()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<CacheStatus> {
        self.cache.subscribe()
    }

    /// Manual refresh. Completes when the (possibly shared) resolution does.
    pub async fn refresh(&self) {
        self.cache.refresh().await;
    }
}
