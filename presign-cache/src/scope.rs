//! Scoped ownership of a cache instance and its background tasks.
//!
//! A [`CacheScope`] is the only way to run a cache with triggers attached.
//! It owns two tasks:
//!
//! - the refresh timer, which sleeps until the next scheduled refresh and
//!   re-plans whenever the cache status changes;
//! - the visibility listener, which forwards visibility changes to the cache.
//!
//! Dropping the scope tears everything down: the cache is marked dead (so a
//! resolution still in flight is discarded on arrival), both tasks are
//! aborted and the visibility subscription goes with the listener.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tracing::{debug, info, warn};

use presign_core::error::Result;
use presign_core::traits::BatchResolver;
use presign_core::types::{CacheStatus, ResourceDescriptor};

use crate::cache::SignedUrlCache;
use crate::config::CacheConfig;
use crate::facade::CacheFacade;
use crate::visibility::{VisibilitySource, VisibilitySubscription};

/// Aborts every registered task when dropped.
#[derive(Default)]
struct TaskGuard {
    handles: Vec<JoinHandle<()>>,
}

impl TaskGuard {
    fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Owner of one [`SignedUrlCache`] and the tasks that drive it.
pub struct CacheScope {
    cache: SignedUrlCache,
    _tasks: TaskGuard,
}

impl CacheScope {
    /// Opens a scope.
    ///
    /// Restores the snapshot if one is configured, starts the refresh timer
    /// when auto-refresh is enabled, and subscribes to `visibility` if given.
    /// If any step fails, whatever was already started is released.
    pub async fn open(
        config: CacheConfig,
        resolver: Arc<dyn BatchResolver>,
        visibility: Option<&dyn VisibilitySource>,
    ) -> Result<Self> {
        let cache = SignedUrlCache::new(&config, resolver)?;

        if let Some(store) = cache.snapshot_store() {
            match store.load(cache.ttl(), Utc::now()).await {
                Ok(entries) => {
                    let kept = cache.restore(entries);
                    info!(kept, "Restored signed URLs from snapshot");
                }
                Err(e) => {
                    warn!(error = %e, path = ?store.path(), "Ignoring unusable snapshot");
                }
            }
        }

        let mut tasks = TaskGuard::default();

        if config.auto_refresh_enabled {
            tasks.push(tokio::spawn(run_refresh_timer(cache.clone(), cache.subscribe())));
        }

        if let Some(source) = visibility {
            let subscription = source.subscribe()?;
            cache.set_initial_visibility(subscription.is_visible());
            tasks.push(tokio::spawn(run_visibility_listener(cache.clone(), subscription)));
        }

        debug!(
            auto_refresh = config.auto_refresh_enabled,
            visibility = visibility.is_some(),
            "Cache scope opened"
        );

        Ok(Self {
            cache,
            _tasks: tasks,
        })
    }

    /// The cache owned by this scope.
    pub fn cache(&self) -> &SignedUrlCache {
        &self.cache
    }

    /// A consumer handle onto the cache.
    pub fn facade(&self) -> CacheFacade {
        CacheFacade::new(self.cache.clone())
    }

    /// Replaces the set of currently relevant resources.
    pub async fn set_resources<'a, I>(&self, resources: I)
    where
        I: IntoIterator<Item = &'a ResourceDescriptor>,
    {
        self.cache.set_resources(resources).await;
    }

    /// Tears the scope down. Same as dropping it.
    pub fn close(self) {}
}

impl Drop for CacheScope {
    fn drop(&mut self) {
        self.cache.shutdown();
        debug!("Cache scope torn down");
    }
}

async fn run_refresh_timer(cache: SignedUrlCache, mut changes: watch::Receiver<CacheStatus>) {
    while !cache.is_torn_down() {
        match cache.next_scheduled_refresh() {
            Some(at) => {
                tokio::select! {
                    _ = sleep_until(at) => {
                        debug!("Scheduled refresh due");
                        cache.refresh().await;
                    }
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            None => {
                if changes.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn run_visibility_listener(cache: SignedUrlCache, mut subscription: VisibilitySubscription) {
    while let Some(visible) = subscription.changed().await {
        if cache.is_torn_down() {
            break;
        }
        let outcome = cache.notify_visibility(visible).await;
        debug!(visible, ?outcome, "Visibility changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use presign_core::error::{PresignError, ResolveError};
    use tempfile::tempdir;
    use tokio::time::advance;

    use crate::test_support::{settle, FakeResolver};
    use crate::visibility::ManualVisibility;

    fn node(key: &str, path: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(key, path)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_refreshes_before_expiry() {
        let resolver = FakeResolver::with_urls(&[("p1", "https://x/p1")]);
        let config = CacheConfig::default().with_ttl_seconds(100);
        let scope = CacheScope::open(config, resolver.clone(), None).await.unwrap();

        scope.set_resources(&[node("k1", "p1")]).await;
        assert_eq!(resolver.calls(), 1);

        advance(Duration::from_secs(89)).await;
        settle().await;
        assert_eq!(resolver.calls(), 1);

        advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_resolution_retried_after_min_interval() {
        let resolver = FakeResolver::with_urls(&[("p1", "https://x/p1")]);
        resolver.fail_with(ResolveError::transport("timeout"));
        let scope = CacheScope::open(CacheConfig::default(), resolver.clone(), None)
            .await
            .unwrap();

        scope.set_resources(&[node("k1", "p1")]).await;
        assert_eq!(resolver.calls(), 1);

        resolver.succeed();
        advance(Duration::from_secs(59)).await;
        settle().await;
        assert_eq!(resolver.calls(), 1);

        advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(resolver.calls(), 2);
        assert!(scope.facade().error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_disabled() {
        let resolver = FakeResolver::with_urls(&[("p1", "https://x/p1")]);
        let config = CacheConfig::default().with_ttl_seconds(100).no_auto_refresh();
        let scope = CacheScope::open(config, resolver.clone(), None).await.unwrap();

        scope.set_resources(&[node("k1", "p1")]).await;
        advance(Duration::from_secs(500)).await;
        settle().await;

        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_listener_refreshes_when_due() {
        let resolver = FakeResolver::with_urls(&[("p1", "https://x/p1")]);
        let source = ManualVisibility::new(true);
        let scope = CacheScope::open(CacheConfig::default(), resolver.clone(), Some(&source))
            .await
            .unwrap();
        scope.set_resources(&[node("k1", "p1")]).await;

        source.hide();
        settle().await;
        advance(Duration::from_secs(10)).await;
        source.show();
        settle().await;
        assert_eq!(resolver.calls(), 1);

        source.hide();
        settle().await;
        advance(Duration::from_secs(80)).await;
        source.show();
        settle().await;
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_hide_and_show_still_refreshes() {
        let resolver = FakeResolver::with_urls(&[("p1", "https://x/p1")]);
        let source = ManualVisibility::new(true);
        let scope = CacheScope::open(CacheConfig::default(), resolver.clone(), Some(&source))
            .await
            .unwrap();
        scope.set_resources(&[node("k1", "p1")]).await;

        advance(Duration::from_secs(120)).await;
        source.hide();
        source.show();
        settle().await;

        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_survives_unrepresentable_refresh_point() {
        let resolver = FakeResolver::with_urls(&[("p1", "https://x/p1")]);
        let config = CacheConfig::default().with_ttl_seconds(u64::MAX);
        let scope = CacheScope::open(config, resolver.clone(), None).await.unwrap();

        scope.set_resources(&[node("k1", "p1")]).await;
        settle().await;
        assert_eq!(resolver.calls(), 1);

        resolver.fail_with(ResolveError::transport("timeout"));
        scope.cache().refresh().await;
        assert_eq!(resolver.calls(), 2);

        resolver.succeed();
        advance(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(resolver.calls(), 3);
        assert!(scope.facade().error().is_none());
    }

    #[tokio::test]
    async fn test_drop_during_resolution_discards_result() {
        let resolver = FakeResolver::gated(&[("p1", "https://x/p1?old")]);
        let scope = CacheScope::open(CacheConfig::default(), resolver.clone(), None)
            .await
            .unwrap();
        let cache = scope.cache().clone();

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.set_resources(&[node("k1", "p1")]).await })
        };
        settle().await;
        assert!(cache.status().loading);

        drop(scope);
        resolver.release(1);
        pending.await.unwrap();
        settle().await;

        assert_eq!(resolver.calls(), 1);
        assert_eq!(cache.get_url("k1"), None);
        assert!(!cache.status().loading);

        let next_resolver = FakeResolver::with_urls(&[("p1", "https://x/p1?new")]);
        let next = CacheScope::open(CacheConfig::default(), next_resolver.clone(), None)
            .await
            .unwrap();
        next.set_resources(&[node("k1", "p1")]).await;

        assert_eq!(next_resolver.calls(), 1);
        assert_eq!(next.facade().get_url_for("k1").as_deref(), Some("https://x/p1?new"));
        assert_eq!(cache.get_url("k1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_scope_stops_triggers() {
        let resolver = FakeResolver::with_urls(&[("p1", "https://x/p1")]);
        let source = ManualVisibility::new(true);
        let config = CacheConfig::default().with_ttl_seconds(100);
        let scope = CacheScope::open(config, resolver.clone(), Some(&source)).await.unwrap();
        scope.set_resources(&[node("k1", "p1")]).await;
        assert_eq!(resolver.calls(), 1);

        drop(scope);
        settle().await;

        advance(Duration::from_secs(200)).await;
        settle().await;
        source.hide();
        source.show();
        settle().await;

        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let resolver = FakeResolver::with_urls(&[]);
        let source = ManualVisibility::default();
        let scope = CacheScope::open(CacheConfig::default(), resolver.clone(), Some(&source))
            .await
            .unwrap();
        assert_eq!(source.subscriber_count(), 1);

        let cache = scope.cache().clone();
        drop(scope);
        settle().await;

        assert!(cache.is_torn_down());
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_subscription_releases_timer() {
        let resolver = FakeResolver::with_urls(&[]);
        let source = ManualVisibility::default();
        source.close();

        let result =
            CacheScope::open(CacheConfig::default(), resolver.clone(), Some(&source)).await;
        assert!(matches!(result, Err(PresignError::SubscriptionFailed(_))));

        settle().await;
        assert_eq!(Arc::strong_count(&resolver), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let resolver = FakeResolver::with_urls(&[]);
        let config = CacheConfig::default().with_ttl_seconds(0);
        let result = CacheScope::open(config, resolver, None).await;
        assert!(matches!(result, Err(PresignError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let first_resolver = FakeResolver::with_urls(&[("p1", "https://x/p1?a")]);
        let second_resolver = FakeResolver::with_urls(&[("p1", "https://x/p1?b")]);

        let first = CacheScope::open(CacheConfig::default(), first_resolver.clone(), None)
            .await
            .unwrap();
        let second = CacheScope::open(CacheConfig::default(), second_resolver.clone(), None)
            .await
            .unwrap();

        first.set_resources(&[node("k1", "p1")]).await;
        second.set_resources(&[node("k1", "p1")]).await;
        first.close();
        settle().await;

        let facade = second.facade();
        assert_eq!(facade.get_url_for("k1").as_deref(), Some("https://x/p1?b"));
        facade.refresh().await;
        assert_eq!(second_resolver.calls(), 2);
        assert_eq!(first_resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_restored_on_open() {
        let dir = tempdir().unwrap();
        let config = CacheConfig::default().with_snapshot(dir.path().join("urls.json"));

        let first_resolver = FakeResolver::with_urls(&[("p1", "https://x/p1?sig=1")]);
        let first = CacheScope::open(config.clone(), first_resolver, None).await.unwrap();
        first.set_resources(&[node("k1", "p1")]).await;
        drop(first);

        let second_resolver = FakeResolver::with_urls(&[("p1", "https://x/p1?sig=2")]);
        let second = CacheScope::open(config, second_resolver.clone(), None).await.unwrap();
        second.set_resources(&[node("k1", "p1")]).await;

        assert_eq!(second_resolver.calls(), 0);
        assert_eq!(
            second.facade().get_url_for("k1").as_deref(),
            Some("https://x/p1?sig=1")
        );
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("urls.json");
        std::fs::write(&path, b"{").unwrap();

        let resolver = FakeResolver::with_urls(&[("p1", "https://x/p1")]);
        let config = CacheConfig::default().with_snapshot(&path);
        let scope = CacheScope::open(config, resolver.clone(), None).await.unwrap();
        scope.set_resources(&[node("k1", "p1")]).await;

        assert_eq!(resolver.calls(), 1);
    }
}
