//! Scripted resolver shared by the cache tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use presign_core::error::ResolveError;
use presign_core::traits::{BatchResolver, UrlMap};
use presign_core::types::ResourcePath;

pub(crate) struct FakeResolver {
    urls: HashMap<ResourcePath, String>,
    failure: Mutex<Option<ResolveError>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<BTreeSet<ResourcePath>>>,
    last_ttl: Mutex<Option<Duration>>,
    held: AtomicBool,
    panic_next: AtomicBool,
    gate: Semaphore,
}

impl FakeResolver {
    /// Answers every call with the matching subset of `urls`.
    pub(crate) fn with_urls(urls: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            urls: urls
                .iter()
                .map(|(p, u)| (ResourcePath::from(*p), u.to_string()))
                .collect(),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            last_ttl: Mutex::new(None),
            held: AtomicBool::new(false),
            panic_next: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    /// Like [`with_urls`](Self::with_urls), but every call blocks until released.
    pub(crate) fn gated(urls: &[(&str, &str)]) -> Arc<Self> {
        let resolver = Self::with_urls(urls);
        resolver.hold();
        resolver
    }

    pub(crate) fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Lets `n` blocked (or future) calls through.
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Makes the next call panic instead of answering.
    pub(crate) fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_with(&self, err: ResolveError) {
        *self.failure.lock() = Some(err);
    }

    pub(crate) fn succeed(&self) {
        *self.failure.lock() = None;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<BTreeSet<ResourcePath>> {
        self.requests.lock().clone()
    }

    pub(crate) fn last_ttl(&self) -> Option<Duration> {
        *self.last_ttl.lock()
    }
}

#[async_trait]
impl BatchResolver for FakeResolver {
    async fn resolve(
        &self,
        paths: &BTreeSet<ResourcePath>,
        ttl: Duration,
    ) -> Result<UrlMap, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(paths.clone());
        *self.last_ttl.lock() = Some(ttl);

        if self.held.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("resolver blew up");
        }

        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }

        Ok(paths
            .iter()
            .filter_map(|p| self.urls.get(p).map(|u| (p.clone(), u.clone())))
            .collect())
    }
}

/// Lets spawned tasks run up to their next blocking point.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
