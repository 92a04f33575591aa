//! Signed-URL cache state machine.
//!
//! `Empty → Resolving → Ready`, `Ready → Resolving` on any trigger, and
//! `Resolving → Stale` when a resolution fails after an earlier success.
//!
//! # In-flight guard
//!
//! At most one batch resolution runs per instance. It executes on its own
//! task and is published as a shared future; every trigger that arrives
//! while it runs awaits that same future instead of starting a second call.
//! A trigger needing keys the running call does not cover waits for it and
//! then starts (or joins) exactly one follow-up call.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use presign_core::error::{ResolveError, Result};
use presign_core::traits::BatchResolver;
use presign_core::types::{
    CachePhase, CacheStatus, LogicalKey, ResourceDescriptor, ResourcePath, VisibilityOutcome,
};

use crate::config::CacheConfig;
use crate::freshness::FreshnessPolicy;
use crate::projector::{project, Projection};
use crate::snapshot::{SnapshotEntry, SnapshotStore};

/// One cached URL.
#[derive(Clone, Debug, PartialEq, Eq)]
struct CacheEntry {
    key: LogicalKey,
    /// Path the URL was minted for
    path: ResourcePath,
    url: String,
    /// Start of the batch call that produced `url`
    resolved_at: Instant,
    /// Wall-clock counterpart of `resolved_at`, kept for snapshots
    resolved_at_wall: DateTime<Utc>,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<LogicalKey, CacheEntry>,
    projection: Projection,
    /// Key → path covered by the latest successful resolution, including
    /// keys the backend omitted.
    requested: HashMap<LogicalKey, ResourcePath>,
    last_fetch: Option<Instant>,
    last_failure: Option<Instant>,
    last_error: Option<ResolveError>,
    in_flight: bool,
    visible: bool,
}

impl CacheState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            projection: Projection::default(),
            requested: HashMap::new(),
            last_fetch: None,
            last_failure: None,
            last_error: None,
            in_flight: false,
            visible: true,
        }
    }

    fn status(&self) -> CacheStatus {
        let phase = if self.in_flight {
            CachePhase::Resolving
        } else if self.last_fetch.is_none() {
            CachePhase::Empty
        } else if self.last_error.is_some() {
            CachePhase::Stale
        } else {
            CachePhase::Ready
        };

        CacheStatus {
            phase,
            loading: self.in_flight,
            error: self.last_error.clone(),
            count: self.entries.len(),
        }
    }

    /// Entry for `key`, unless the key now points at a different path.
    fn current_entry(&self, key: &str) -> Option<&CacheEntry> {
        let entry = self.entries.get(key)?;
        match self.projection.path_for(key) {
            Some(path) if *path != entry.path => None,
            _ => Some(entry),
        }
    }

    fn has_unrequested_keys(&self) -> bool {
        self.projection
            .key_to_path()
            .iter()
            .any(|(key, path)| self.requested.get(key) != Some(path))
    }
}

type InFlight = Shared<BoxFuture<'static, ()>>;

struct Inner {
    resolver: Arc<dyn BatchResolver>,
    policy: FreshnessPolicy,
    ttl: Duration,
    snapshot: Option<SnapshotStore>,
    state: RwLock<CacheState>,
    in_flight: Mutex<Option<InFlight>>,
    torn_down: AtomicBool,
    batches: AtomicU64,
    status_tx: watch::Sender<CacheStatus>,
}

/// Clears the in-flight slot and the loading flag when the resolution task
/// ends, however it ends.
struct InFlightSlot<'a>(&'a Inner);

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        // Flag first: once the slot is empty a new resolution may set it again.
        let was_loading = std::mem::replace(&mut self.0.state.write().in_flight, false);
        if was_loading {
            self.0.publish();
        }
        *self.0.in_flight.lock() = None;
    }
}

impl Inner {
    fn publish(&self) {
        let status = self.state.read().status();
        self.status_tx.send_replace(status);
    }

    async fn run_resolution(self: Arc<Self>) {
        let _slot = InFlightSlot(&self);

        let request: Vec<(LogicalKey, ResourcePath)> = {
            let mut state = self.state.write();
            if state.projection.is_empty() {
                return;
            }
            state.in_flight = true;
            state
                .projection
                .key_to_path()
                .iter()
                .map(|(k, p)| (k.clone(), p.clone()))
                .collect()
        };
        self.publish();

        let paths: BTreeSet<ResourcePath> = request.iter().map(|(_, p)| p.clone()).collect();
        let batch = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        let started_wall = Utc::now();

        info!(batch, keys = request.len(), paths = paths.len(), "Resolving signed URLs");
        let result = self.resolver.resolve(&paths, self.ttl).await;

        if self.torn_down.load(Ordering::SeqCst) {
            debug!(batch, "Scope torn down; discarding resolution result");
            return;
        }

        let saved = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            state.in_flight = false;

            match result {
                Ok(urls) => {
                    for (key, path) in &request {
                        match urls.get(path) {
                            Some(url) => {
                                state.entries.insert(
                                    key.clone(),
                                    CacheEntry {
                                        key: key.clone(),
                                        path: path.clone(),
                                        url: url.clone(),
                                        resolved_at: started,
                                        resolved_at_wall: started_wall,
                                    },
                                );
                            }
                            None => {
                                state.entries.remove(key);
                            }
                        }
                        state.requested.insert(key.clone(), path.clone());
                    }

                    let projection = &state.projection;
                    for path in paths.iter().filter(|p| !urls.contains_key(*p)) {
                        debug!(batch, %path, keys = ?projection.keys_for(path), "No URL returned");
                    }
                    state.entries.retain(|key, _| projection.contains(key.as_str()));
                    state.requested.retain(|key, _| projection.contains(key.as_str()));
                    state.last_fetch = Some(started);
                    state.last_error = None;

                    info!(
                        batch,
                        resolved = urls.len(),
                        cached = state.entries.len(),
                        "Signed URLs refreshed"
                    );
                    Some(snapshot_entries(&state.entries))
                }
                Err(err) => {
                    warn!(
                        batch,
                        error = %err,
                        cached = state.entries.len(),
                        "Resolution failed; keeping previous URLs"
                    );
                    state.last_failure = Some(Instant::now());
                    state.last_error = Some(err);
                    None
                }
            }
        };
        self.publish();

        // Still holding the slot, so snapshot writes never overlap.
        if let (Some(store), Some(entries)) = (&self.snapshot, saved) {
            if let Err(e) = store.save(&entries).await {
                warn!(error = %e, "Failed to write snapshot");
            }
        }
    }
}

fn snapshot_entries(entries: &HashMap<LogicalKey, CacheEntry>) -> Vec<SnapshotEntry> {
    let mut out: Vec<SnapshotEntry> = entries
        .values()
        .map(|e| SnapshotEntry {
            key: e.key.clone(),
            path: e.path.clone(),
            url: e.url.clone(),
            resolved_at: e.resolved_at_wall,
        })
        .collect();
    out.sort_by(|a, b| a.key.cmp(&b.key));
    out
}

/// Batched, expiry-aware signed-URL cache.
///
/// Cheap to clone; clones share one state. The owning
/// [`CacheScope`](crate::CacheScope) runs the background triggers and tears
/// the instance down.
#[derive(Clone)]
pub struct SignedUrlCache {
    inner: Arc<Inner>,
}

impl SignedUrlCache {
    /// Creates an empty cache.
    pub fn new(config: &CacheConfig, resolver: Arc<dyn BatchResolver>) -> Result<Self> {
        config.validate()?;

        let (status_tx, _) = watch::channel(CacheStatus::empty());
        Ok(Self {
            inner: Arc::new(Inner {
                resolver,
                policy: config.policy(),
                ttl: config.ttl(),
                snapshot: config.snapshot_path.as_ref().map(SnapshotStore::new),
                state: RwLock::new(CacheState::new()),
                in_flight: Mutex::new(None),
                torn_down: AtomicBool::new(false),
                batches: AtomicU64::new(0),
                status_tx,
            }),
        })
    }

    /// Last known URL for `key`. Never triggers a fetch.
    ///
    /// `None` if the key was never resolved, the backend omitted it, or its
    /// path changed since it was resolved.
    pub fn get_url(&self, key: &str) -> Option<String> {
        self.inner.state.read().current_entry(key).map(|e| e.url.clone())
    }

    /// True if `key` has a URL still inside its validity window.
    pub fn is_usable(&self, key: &str) -> bool {
        let state = self.inner.state.read();
        let now = Instant::now();
        state
            .current_entry(key)
            .is_some_and(|e| self.inner.policy.is_usable(e.resolved_at, now, self.inner.ttl))
    }

    /// Aggregate status.
    pub fn status(&self) -> CacheStatus {
        self.inner.state.read().status()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<CacheStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Returns true once the owning scope has been torn down.
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    /// Replaces the set of currently relevant resources.
    ///
    /// Resolves the whole current key set in one call if a key is new or now
    /// points at a different path, and returns once that call completed.
    pub async fn set_resources<'a, I>(&self, resources: I)
    where
        I: IntoIterator<Item = &'a ResourceDescriptor>,
    {
        if self.is_torn_down() {
            debug!("Ignoring resource update on torn-down cache");
            return;
        }

        let projection = project(resources);
        let needs_resolution = {
            let mut guard = self.inner.state.write();
            let state = &mut *guard;

            // A key leaving the set without a URL must be asked for again
            // when it returns.
            let entries = &state.entries;
            state
                .requested
                .retain(|key, _| projection.contains(key.as_str()) || entries.contains_key(key));

            let needs = projection
                .changed_since(&state.projection)
                .into_iter()
                .any(|(key, path)| state.requested.get(key) != Some(path));
            debug!(keys = projection.len(), needs, "Resource set updated");
            state.projection = projection;
            needs
        };

        if needs_resolution {
            self.resolve_missing().await;
        }
    }

    /// Manual refresh. Joins the running resolution if there is one.
    pub async fn refresh(&self) {
        if self.is_torn_down() {
            return;
        }
        self.run_or_join().await;
    }

    /// Feeds a visibility change.
    ///
    /// A hidden→visible transition refreshes only when the policy says the
    /// last fetch is old enough.
    pub async fn notify_visibility(&self, visible: bool) -> VisibilityOutcome {
        let (became_visible, last_fetch, nothing_to_resolve) = {
            let mut state = self.inner.state.write();
            let was_visible = std::mem::replace(&mut state.visible, visible);
            (
                !was_visible && visible,
                state.last_fetch,
                state.projection.is_empty(),
            )
        };

        if !became_visible || nothing_to_resolve || self.is_torn_down() {
            return VisibilityOutcome::Ignored;
        }

        if !self.inner.policy.needs_refresh(last_fetch, Instant::now()) {
            info!("Visible again; skipped: still fresh");
            return VisibilityOutcome::SkippedFresh;
        }

        debug!("Visible again; refreshing");
        self.run_or_join().await;
        VisibilityOutcome::Refreshed
    }

    /// When the background timer should fire next.
    pub(crate) fn next_scheduled_refresh(&self) -> Option<Instant> {
        let state = self.inner.state.read();
        if state.projection.is_empty() {
            return None;
        }
        self.inner
            .policy
            .next_refresh_at(state.last_fetch, state.last_failure, self.inner.ttl)
    }

    pub(crate) fn set_initial_visibility(&self, visible: bool) {
        self.inner.state.write().visible = visible;
    }

    pub(crate) fn snapshot_store(&self) -> Option<&SnapshotStore> {
        self.inner.snapshot.as_ref()
    }

    pub(crate) fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Seeds the cache from snapshot entries. Returns how many were kept.
    pub(crate) fn restore(&self, restored: Vec<SnapshotEntry>) -> usize {
        let now = Instant::now();
        let now_wall = Utc::now();
        let ttl = self.inner.ttl;

        let mut state = self.inner.state.write();
        let mut oldest: Option<Instant> = None;
        let mut kept = 0;

        for e in restored {
            let age = e.age(now_wall);
            if age >= ttl {
                continue;
            }
            let Some(resolved_at) = now.checked_sub(age) else {
                continue;
            };

            oldest = Some(oldest.map_or(resolved_at, |o| o.min(resolved_at)));
            state.requested.insert(e.key.clone(), e.path.clone());
            state.entries.insert(
                e.key.clone(),
                CacheEntry {
                    key: e.key,
                    path: e.path,
                    url: e.url,
                    resolved_at,
                    resolved_at_wall: e.resolved_at,
                },
            );
            kept += 1;
        }

        if oldest.is_some() {
            state.last_fetch = oldest;
        }
        drop(state);

        self.inner.publish();
        kept
    }

    /// Marks the instance dead. Results arriving afterwards are discarded.
    pub(crate) fn shutdown(&self) {
        self.inner.torn_down.store(true, Ordering::SeqCst);
    }

    fn current_in_flight(&self) -> Option<InFlight> {
        self.inner.in_flight.lock().clone()
    }

    async fn resolve_missing(&self) {
        if let Some(running) = self.current_in_flight() {
            running.await;
        }
        let pending = self.inner.state.read().has_unrequested_keys();
        if pending && !self.is_torn_down() {
            self.run_or_join().await;
        }
    }

    fn run_or_join(&self) -> InFlight {
        let mut slot = self.inner.in_flight.lock();
        if let Some(running) = slot.as_ref() {
            debug!("Joining in-flight resolution");
            return running.clone();
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(inner.run_resolution());
        let shared = task.map(|_| ()).boxed().shared();
        *slot = Some(shared.clone());
        shared
    }
}
