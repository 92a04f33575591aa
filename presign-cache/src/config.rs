//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use presign_core::constants::{
    DEFAULT_AUTO_REFRESH_ENABLED, DEFAULT_MIN_REFETCH_INTERVAL_MS, DEFAULT_REFRESH_FRACTION,
    DEFAULT_TTL_SECONDS,
};
use presign_core::error::{PresignError, Result};

use crate::freshness::FreshnessPolicy;

/// Cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Validity window requested for minted URLs, in seconds
    pub ttl_seconds: u64,
    /// Minimum spacing between visibility-driven refreshes, in milliseconds
    pub min_refetch_interval_ms: u64,
    /// Whether the background timer refreshes entries before they expire
    pub auto_refresh_enabled: bool,
    /// Fraction of the TTL after which the background timer fires
    pub refresh_fraction: f64,
    /// Optional best-effort snapshot file
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            min_refetch_interval_ms: DEFAULT_MIN_REFETCH_INTERVAL_MS,
            auto_refresh_enabled: DEFAULT_AUTO_REFRESH_ENABLED,
            refresh_fraction: DEFAULT_REFRESH_FRACTION,
            snapshot_path: None,
        }
    }
}

impl CacheConfig {
    /// Sets the URL TTL.
    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Sets the minimum spacing between visibility-driven refreshes.
    pub fn with_min_refetch_interval_ms(mut self, interval_ms: u64) -> Self {
        self.min_refetch_interval_ms = interval_ms;
        self
    }

    /// Persists a best-effort snapshot at `path`.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Disables the background refresh timer.
    pub fn no_auto_refresh(mut self) -> Self {
        self.auto_refresh_enabled = false;
        self
    }

    /// URL TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Minimum refetch interval as a duration.
    pub fn min_refetch_interval(&self) -> Duration {
        Duration::from_millis(self.min_refetch_interval_ms)
    }

    /// Freshness policy derived from this configuration.
    pub fn policy(&self) -> FreshnessPolicy {
        FreshnessPolicy::new(self.min_refetch_interval(), self.refresh_fraction)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == 0 {
            return Err(PresignError::ConfigError("ttl_seconds must be > 0".into()));
        }
        if !(self.refresh_fraction > 0.0 && self.refresh_fraction < 1.0) {
            return Err(PresignError::ConfigError(format!(
                "refresh_fraction must be in (0, 1), got {}",
                self.refresh_fraction
            )));
        }
        Ok(())
    }
}
