//! Lease backends
//!
//! Storage for lease records with holder-identity and TTL semantics. The
//! coordinator only ever talks to a backend through [`LeaseBackend`].

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{LeaseError, LeaseResult};

/// Persisted state of one lease key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub renewed_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl LeaseRecord {
    fn new(holder: &str, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            holder: holder.to_string(),
            acquired_at: now,
            renewed_at: now,
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.renewed_at) > chrono::Duration::milliseconds(self.ttl_ms as i64)
    }

    pub fn is_held_by(&self, holder: &str, now: DateTime<Utc>) -> bool {
        self.holder == holder && !self.is_expired(now)
    }
}

/// Record to store when `holder` asks for the lease, or `None` when it is taken
fn grant(existing: Option<&LeaseRecord>, holder: &str, ttl: Duration, now: DateTime<Utc>) -> Option<LeaseRecord> {
    match existing {
        Some(record) if record.is_held_by(holder, now) => Some(LeaseRecord {
            renewed_at: now,
            ttl_ms: ttl.as_millis() as u64,
            ..record.clone()
        }),
        Some(record) if !record.is_expired(now) => None,
        _ => Some(LeaseRecord::new(holder, ttl, now)),
    }
}

/// Record after a renewal by `holder`, or `None` when the lease is no longer ours
fn extend(existing: Option<&LeaseRecord>, holder: &str, ttl: Duration, now: DateTime<Utc>) -> Option<LeaseRecord> {
    existing
        .filter(|record| record.is_held_by(holder, now))
        .map(|record| LeaseRecord {
            renewed_at: now,
            ttl_ms: ttl.as_millis() as u64,
            ..record.clone()
        })
}

/// Distributed lock storage
///
/// Every mutating call is atomic with respect to other callers on the same
/// key, so at most one holder can be granted an unexpired lease.
#[mockall::automock]
#[async_trait]
pub trait LeaseBackend: Send + Sync {
    /// Grant the lease when it is free, expired or already ours
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> LeaseResult<bool>;

    /// Extend our unexpired lease; `false` means someone else owns it or it lapsed
    async fn renew(&self, key: &str, holder: &str, ttl: Duration) -> LeaseResult<bool>;

    /// Drop the lease if we still hold it
    async fn release(&self, key: &str, holder: &str) -> LeaseResult<()>;

    /// Current unexpired record, if any
    async fn current_holder(&self, key: &str) -> LeaseResult<Option<LeaseRecord>>;
}

/// Lease table shared by every coordinator in this process
#[derive(Debug, Clone, Default)]
pub struct InMemoryLeaseBackend {
    records: Arc<Mutex<HashMap<String, LeaseRecord>>>,
}

impl InMemoryLeaseBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseBackend for InMemoryLeaseBackend {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> LeaseResult<bool> {
        let mut records = self.records.lock().await;
        match grant(records.get(key), holder, ttl, Utc::now()) {
            Some(record) => {
                records.insert(key.to_string(), record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn renew(&self, key: &str, holder: &str, ttl: Duration) -> LeaseResult<bool> {
        let mut records = self.records.lock().await;
        match extend(records.get(key), holder, ttl, Utc::now()) {
            Some(record) => {
                records.insert(key.to_string(), record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release(&self, key: &str, holder: &str) -> LeaseResult<()> {
        let mut records = self.records.lock().await;
        if records.get(key).is_some_and(|record| record.holder == holder) {
            records.remove(key);
        }
        Ok(())
    }

    async fn current_holder(&self, key: &str) -> LeaseResult<Option<LeaseRecord>> {
        let records = self.records.lock().await;
        let now = Utc::now();
        Ok(records.get(key).filter(|record| !record.is_expired(now)).cloned())
    }
}

const LOCK_ATTEMPTS: usize = 250;
const LOCK_RETRY: Duration = Duration::from_millis(20);

/// Lease records as JSON files in a directory shared by cooperating processes
///
/// Read-modify-write cycles are serialized by an exclusive advisory lock on a
/// persistent `<key>.lock` file next to the `<key>.lease` record. The OS
/// drops the lock when its holder exits, so a crashed process never wedges
/// the key.
#[derive(Debug, Clone)]
pub struct FileLeaseBackend {
    dir: PathBuf,
}

/// Held advisory lock; unlocked on drop
struct KeyLock {
    file: File,
    path: PathBuf,
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("⚠️ Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

impl FileLeaseBackend {
    pub async fn new<P: Into<PathBuf>>(dir: P) -> LeaseResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_stem(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect()
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.lease", Self::file_stem(key)))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", Self::file_stem(key)))
    }

    /// Open the lock file and try to lock it once; `None` when another caller holds it
    fn try_lock(path: PathBuf) -> std::io::Result<Option<KeyLock>> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(KeyLock { file, path })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn lock(&self, key: &str) -> LeaseResult<KeyLock> {
        let path = self.lock_path(key);
        for _ in 0..LOCK_ATTEMPTS {
            let attempt = path.clone();
            let locked = tokio::task::spawn_blocking(move || Self::try_lock(attempt))
                .await
                .map_err(|e| LeaseError::Backend {
                    message: format!("lock task for {} failed: {}", path.display(), e),
                })??;
            if let Some(lock) = locked {
                return Ok(lock);
            }
            tokio::time::sleep(LOCK_RETRY).await;
        }
        Err(LeaseError::Backend {
            message: format!("could not lock {}", path.display()),
        })
    }

    async fn read_record(&self, key: &str) -> LeaseResult<Option<LeaseRecord>> {
        match tokio::fs::read(self.record_path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, key: &str, record: &LeaseRecord) -> LeaseResult<()> {
        let path = self.record_path(key);
        let staging = path.with_extension("lease.tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl LeaseBackend for FileLeaseBackend {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> LeaseResult<bool> {
        let _guard = self.lock(key).await?;
        let existing = self.read_record(key).await?;
        match grant(existing.as_ref(), holder, ttl, Utc::now()) {
            Some(record) => {
                self.write_record(key, &record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn renew(&self, key: &str, holder: &str, ttl: Duration) -> LeaseResult<bool> {
        let _guard = self.lock(key).await?;
        let existing = self.read_record(key).await?;
        match extend(existing.as_ref(), holder, ttl, Utc::now()) {
            Some(record) => {
                self.write_record(key, &record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release(&self, key: &str, holder: &str) -> LeaseResult<()> {
        let _guard = self.lock(key).await?;
        if let Some(record) = self.read_record(key).await? {
            if record.holder == holder {
                tokio::fs::remove_file(self.record_path(key)).await?;
            }
        }
        Ok(())
    }

    async fn current_holder(&self, key: &str) -> LeaseResult<Option<LeaseRecord>> {
        let now = Utc::now();
        Ok(self.read_record(key).await?.filter(|record| !record.is_expired(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_millis(200);

    #[test]
    fn test_grant_rules() {
        let now = Utc::now();
        let held = LeaseRecord::new("a", Duration::from_secs(10), now);

        assert!(grant(None, "a", TTL, now).is_some());
        assert!(grant(Some(&held), "b", TTL, now).is_none());

        let again = grant(Some(&held), "a", TTL, now).unwrap();
        assert_eq!(again.acquired_at, held.acquired_at);

        let later = now + chrono::Duration::seconds(11);
        let taken = grant(Some(&held), "b", TTL, later).unwrap();
        assert_eq!(taken.holder, "b");
        assert_eq!(taken.acquired_at, later);
    }

    #[test]
    fn test_expired_lease_cannot_be_extended() {
        let now = Utc::now();
        let held = LeaseRecord::new("a", Duration::from_secs(1), now);

        assert!(extend(Some(&held), "a", TTL, now).is_some());
        assert!(extend(Some(&held), "b", TTL, now).is_none());
        assert!(extend(Some(&held), "a", TTL, now + chrono::Duration::seconds(2)).is_none());
        assert!(extend(None, "a", TTL, now).is_none());
    }

    #[tokio::test]
    async fn test_in_memory_exclusive_until_expiry() {
        let backend = InMemoryLeaseBackend::new();

        assert!(backend.try_acquire("env", "a", TTL).await.unwrap());
        assert!(!backend.try_acquire("env", "b", TTL).await.unwrap());
        assert_eq!(backend.current_holder("env").await.unwrap().unwrap().holder, "a");

        tokio::time::sleep(TTL + Duration::from_millis(50)).await;
        assert!(backend.current_holder("env").await.unwrap().is_none());
        assert!(!backend.renew("env", "a", TTL).await.unwrap());
        assert!(backend.try_acquire("env", "b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_release_ignores_other_holders() {
        let backend = InMemoryLeaseBackend::new();
        backend.try_acquire("env", "a", TTL).await.unwrap();

        backend.release("env", "b").await.unwrap();
        assert!(backend.current_holder("env").await.unwrap().is_some());

        backend.release("env", "a").await.unwrap();
        assert!(backend.current_holder("env").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_backend_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = FileLeaseBackend::new(dir.path()).await.unwrap();
        let ttl = Duration::from_secs(10);

        assert!(backend.try_acquire("kind/cluster", "a", ttl).await.unwrap());
        assert!(dir.path().join("kind_cluster.lease").exists());
        assert!(dir.path().join("kind_cluster.lock").exists());

        assert!(!backend.try_acquire("kind/cluster", "b", ttl).await.unwrap());
        assert!(backend.renew("kind/cluster", "a", ttl).await.unwrap());
        assert!(!backend.renew("kind/cluster", "b", ttl).await.unwrap());

        backend.release("kind/cluster", "a").await.unwrap();
        assert!(backend.current_holder("kind/cluster").await.unwrap().is_none());
        assert!(!dir.path().join("kind_cluster.lease").exists());
    }

    #[tokio::test]
    async fn test_file_backends_share_a_directory() {
        let dir = TempDir::new().unwrap();
        let first = FileLeaseBackend::new(dir.path()).await.unwrap();
        let second = FileLeaseBackend::new(dir.path()).await.unwrap();
        let ttl = Duration::from_secs(10);

        let (a, b) = tokio::join!(
            first.try_acquire("env", "a", ttl),
            second.try_acquire("env", "b", ttl)
        );
        let granted = [a.unwrap(), b.unwrap()];
        assert_eq!(granted.iter().filter(|g| **g).count(), 1);
    }

    #[tokio::test]
    async fn test_file_backend_reports_corrupt_records() {
        let dir = TempDir::new().unwrap();
        let backend = FileLeaseBackend::new(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("env.lease"), "not json").unwrap();

        let err = backend.current_holder("env").await.unwrap_err();
        assert!(matches!(err, LeaseError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_file_backend_waits_while_the_key_is_locked() {
        let dir = TempDir::new().unwrap();
        let backend = FileLeaseBackend::new(dir.path()).await.unwrap();

        // Another process holding the key lock
        let held = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.path().join("env.lock"))
            .unwrap();
        held.try_lock_exclusive().unwrap();

        let contender = backend.clone();
        let pending = tokio::spawn(async move { contender.try_acquire("env", "a", Duration::from_secs(10)).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!pending.is_finished());
        assert!(!dir.path().join("env.lease").exists());

        FileExt::unlock(&held).unwrap();
        assert!(pending.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_leftover_lock_file_does_not_block() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("env.lock"), "").unwrap();
        let backend = FileLeaseBackend::new(dir.path()).await.unwrap();

        let granted = tokio::time::timeout(Duration::from_millis(500), backend.try_acquire("env", "a", TTL))
            .await
            .unwrap()
            .unwrap();
        assert!(granted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_backends_grant_a_single_holder_under_contention() {
        let dir = TempDir::new().unwrap();
        let ttl = Duration::from_secs(10);

        let mut attempts = Vec::new();
        for i in 0..16 {
            let backend = FileLeaseBackend::new(dir.path()).await.unwrap();
            attempts.push(tokio::spawn(async move { backend.try_acquire("env", &format!("holder-{i}"), ttl).await }));
        }

        let mut granted = 0;
        for attempt in attempts {
            if attempt.await.unwrap().unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }
}
