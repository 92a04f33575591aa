//! Visibility signal consumed by the cache.
//!
//! The consuming surface reports whether it is visible through a
//! [`VisibilitySource`]. Each subscription is a `watch` receiver; dropping the
//! [`VisibilitySubscription`] is what unsubscribes.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use presign_core::error::{PresignError, Result};

/// Source of visibility transitions (e.g. a window or tab visibility API).
pub trait VisibilitySource: Send + Sync {
    /// Subscribes to visibility changes.
    fn subscribe(&self) -> Result<VisibilitySubscription>;
}

/// Live subscription to a visibility source. Dropping it unsubscribes.
#[derive(Debug)]
pub struct VisibilitySubscription {
    rx: watch::Receiver<bool>,
    /// Last value handed out by [`changed`](Self::changed).
    last: bool,
    /// Second half of a round trip that landed back on `last`.
    replay: Option<bool>,
}

impl VisibilitySubscription {
    /// Wraps a watch receiver carrying "is visible".
    pub fn new(mut rx: watch::Receiver<bool>) -> Self {
        let last = *rx.borrow_and_update();
        Self {
            rx,
            last,
            replay: None,
        }
    }

    /// Current visibility.
    pub fn is_visible(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for the next change. `None` once the source is gone.
    ///
    /// Rapid flips collapse into the latest value, except that a change
    /// which lands back on the last reported value is reported as the round
    /// trip it was: hide then show yields `false` followed by `true`.
    pub async fn changed(&mut self) -> Option<bool> {
        if let Some(visible) = self.replay.take() {
            self.last = visible;
            return Some(visible);
        }

        self.rx.changed().await.ok()?;
        let visible = *self.rx.borrow_and_update();
        if visible == self.last {
            self.replay = Some(visible);
            self.last = !visible;
            return Some(!visible);
        }
        self.last = visible;
        Some(visible)
    }
}

/// In-process visibility source driven by explicit calls.
///
/// Used by tests and by the CLI, where stdin commands stand in for a real
/// visibility API.
#[derive(Debug)]
pub struct ManualVisibility {
    tx: watch::Sender<bool>,
    closed: AtomicBool,
}

impl ManualVisibility {
    /// Creates a source with the given initial visibility.
    pub fn new(visible: bool) -> Self {
        let (tx, _) = watch::channel(visible);
        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Reports the surface as visible.
    pub fn show(&self) {
        self.set_visible(true);
    }

    /// Reports the surface as hidden.
    pub fn hide(&self) {
        self.set_visible(false);
    }

    /// Reports the given visibility. Repeating the current value is a no-op.
    pub fn set_visible(&self, visible: bool) {
        self.tx.send_if_modified(|current| {
            let modified = *current != visible;
            *current = visible;
            modified
        });
    }

    /// Current visibility.
    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Refuses further subscriptions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for ManualVisibility {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VisibilitySource for ManualVisibility {
    fn subscribe(&self) -> Result<VisibilitySubscription> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PresignError::SubscriptionFailed("visibility source is closed".into()));
        }
        Ok(VisibilitySubscription::new(self.tx.subscribe()))
    }
}
