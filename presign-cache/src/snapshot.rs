//! Best-effort snapshot of resolved URLs.
//!
//! Lets a new scope start with still-valid URLs instead of an empty cache.
//! The cache never depends on the snapshot: load and save failures are
//! reported to the caller, which logs them and carries on.
//!
//! # File Format
//!
//! ```text
//! {
//!   "version": 1,
//!   "saved_at": "2026-10-15T09:30:00Z",
//!   "entries": [ { "key", "path", "url", "resolved_at" }, ... ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use presign_core::constants::SNAPSHOT_VERSION;
use presign_core::error::{PresignError, Result};
use presign_core::types::{LogicalKey, ResourcePath};

/// One persisted URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Caller-facing key
    pub key: LogicalKey,
    /// Path the URL was minted for
    pub path: ResourcePath,
    /// Signed URL
    pub url: String,
    /// Wall-clock time of the batch call that produced the URL
    pub resolved_at: DateTime<Utc>,
}

impl SnapshotEntry {
    /// Age of the entry at `now`; zero if `resolved_at` is in the future.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.resolved_at).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u8,
    saved_at: DateTime<Utc>,
    entries: Vec<SnapshotEntry>,
}

/// Snapshot file on disk.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Creates a store backed by `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads entries still younger than `ttl` at `now`.
    ///
    /// A missing file is an empty snapshot.
    #[instrument(skip(self), fields(path = ?self.path))]
    pub async fn load(&self, ttl: Duration, now: DateTime<Utc>) -> Result<Vec<SnapshotEntry>> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot file");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let file: SnapshotFile = serde_json::from_slice(&contents)
            .map_err(|e| PresignError::SnapshotError(format!("unreadable snapshot: {}", e)))?;

        if file.version != SNAPSHOT_VERSION {
            return Err(PresignError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                actual: file.version,
            });
        }

        let total = file.entries.len();
        let entries: Vec<SnapshotEntry> = file
            .entries
            .into_iter()
            .filter(|e| e.age(now) < ttl)
            .collect();

        info!(total, usable = entries.len(), "Snapshot loaded");
        Ok(entries)
    }

    /// Writes `entries`, replacing the previous snapshot atomically.
    #[instrument(skip(self, entries), fields(path = ?self.path, count = entries.len()))]
    pub async fn save(&self, entries: &[SnapshotEntry]) -> Result<()> {
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            entries: entries.to_vec(),
        };
        let serialized = serde_json::to_vec(&file)?;

        // Write to temp, then rename
        let temp_path = self.path.with_extension("tmp");
        let mut out = fs::File::create(&temp_path).await?;
        out.write_all(&serialized).await?;
        out.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;

        debug!("Snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn entry(key: &str, resolved_at: DateTime<Utc>) -> SnapshotEntry {
        SnapshotEntry {
            key: LogicalKey::from(key),
            path: ResourcePath::new(format!("media/{key}")),
            url: format!("https://x/media/{key}?sig=1"),
            resolved_at,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        assert!(store.load(HOUR, Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("urls.json"));
        let now = Utc::now();

        store.save(&[entry("k1", now), entry("k2", now)]).await.unwrap();

        let loaded = store.load(HOUR, now).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], entry("k1", now));
        assert!(!dir.path().join("urls.tmp").exists());
    }

    #[tokio::test]
    async fn test_expired_entries_dropped_on_load() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("urls.json"));
        let now = Utc::now();

        store
            .save(&[
                entry("fresh", now - chrono::Duration::minutes(5)),
                entry("old", now - chrono::Duration::hours(2)),
            ])
            .await
            .unwrap();

        let loaded = store.load(HOUR, now).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key.as_str(), "fresh");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("urls.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = SnapshotStore::new(&path).load(HOUR, Utc::now()).await.unwrap_err();
        assert!(matches!(err, PresignError::SnapshotError(_)));
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("urls.json");
        let contents = br#"{"version":9,"saved_at":"2026-01-01T00:00:00Z","entries":[]}"#;
        std::fs::write(&path, contents).unwrap();

        let err = SnapshotStore::new(&path).load(HOUR, Utc::now()).await.unwrap_err();
        assert!(matches!(err, PresignError::VersionMismatch { expected: 1, actual: 9 }));
    }

    #[test]
    fn test_age_never_negative() {
        let now = Utc::now();
        let future = entry("k", now + chrono::Duration::minutes(1));
        assert_eq!(future.age(now), Duration::ZERO);
    }
}
