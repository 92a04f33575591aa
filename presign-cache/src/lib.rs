//! Batched, expiry-aware signed-URL cache.
//!
//! Coalesces every outstanding lookup into one [`BatchResolver`] call, keeps
//! the resulting key→URL mapping with a freshness contract tied to the URL
//! TTL, and decides when a refresh is due (scheduled timer, visibility
//! regained) versus redundant.
//!
//! # Example
//!
//! ```rust,ignore
//! use presign_cache::{CacheConfig, CacheScope, ManualVisibility};
//! use presign_core::ResourceDescriptor;
//!
//! let visibility = ManualVisibility::default();
//! let scope = CacheScope::open(CacheConfig::default(), resolver, Some(&visibility)).await?;
//!
//! scope.set_resources(&[ResourceDescriptor::new("node-1", "media/node-1.png")]).await;
//! let url = scope.facade().get_url_for("node-1");
//! ```
//!
//! [`BatchResolver`]: presign_core::BatchResolver

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

mod cache;
mod config;
mod facade;
mod freshness;
mod projector;
mod scope;
mod snapshot;
mod visibility;

#[cfg(test)]
mod test_support;

pub use cache::SignedUrlCache;
pub use config::CacheConfig;
pub use facade::CacheFacade;
pub use freshness::FreshnessPolicy;
pub use projector::{project, Projection};
pub use scope::CacheScope;
pub use snapshot::{SnapshotEntry, SnapshotStore};
pub use visibility::{ManualVisibility, VisibilitySource, VisibilitySubscription};
