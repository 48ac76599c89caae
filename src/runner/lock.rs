//! Target-path locking.
//!
//! Two scenarios sharing a target directory would race on its `.terraform`
//! directory, lock file and plugin cache. [`TargetLocks`] hands out one
//! [`TargetLock`] per directory at a time: an in-process async mutex for
//! tasks of this run, plus a lock file in the target's work directory for
//! other harness processes.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::WORK_DIR;
use crate::error::LockError;

use super::retry::RetryPolicy;

/// Lock file name inside the work directory.
pub const LOCK_FILE: &str = "harness.lock";

/// Shortest lock lifetime in seconds.
pub const LOCK_EXPIRY_SECS: u64 = 3600; // 1 hour

/// Engine steps one scenario may run: init, plan, show and apply, a
/// re-plan (init, plan, show) and destroy.
pub const STEPS_PER_SCENARIO: u32 = 8;

/// Lock lifetime that outlasts the slowest possible scenario: every step
/// hitting its deadline on every attempt, plus the longest backoffs.
/// Never shorter than [`LOCK_EXPIRY_SECS`].
#[must_use]
pub fn lock_expiry(step_timeout: Duration, retry: &RetryPolicy) -> Duration {
    let attempts = retry.max_attempts().max(1);
    let steps = step_timeout.saturating_mul(STEPS_PER_SCENARIO.saturating_mul(attempts));
    // Invocation, re-plan and destroy each retry on their own.
    let waits = retry.max_backoff().saturating_mul(attempts.saturating_mul(3));
    steps
        .saturating_add(waits)
        .max(Duration::from_secs(LOCK_EXPIRY_SECS))
}

/// Information about a target lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// Scenario that holds the lock.
    pub scenario: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a new lock info valid for `ttl`.
    #[must_use]
    pub fn new(holder: &str, scenario: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            scenario: scenario.to_string(),
            acquired_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}

/// Registry of per-target locks for one harness run.
#[derive(Debug)]
pub struct TargetLocks {
    /// Holder identifier written to lock files.
    holder: String,
    /// Lifetime written to lock files.
    expiry: Duration,
    /// One mutex per canonical target path.
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

/// Exclusive access to one target directory.
///
/// Call [`TargetLock::release`] to remove the lock file; dropping the token
/// without releasing removes it synchronously.
#[derive(Debug)]
pub struct TargetLock {
    _guard: OwnedMutexGuard<()>,
    lock_path: Option<PathBuf>,
    info: LockInfo,
}

impl Default for TargetLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetLocks {
    /// Creates a registry with a generated holder id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_holder(generate_holder_id())
    }

    /// Creates a registry with an explicit holder id.
    #[must_use]
    pub fn with_holder(holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            expiry: Duration::from_secs(LOCK_EXPIRY_SECS),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the lifetime of lock files written by this registry.
    #[must_use]
    pub const fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Holder identifier of this registry.
    #[must_use]
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Waits for exclusive access to `target`.
    ///
    /// A missing target gets only the in-process lock; the invoker reports
    /// the missing directory.
    ///
    /// # Errors
    ///
    /// Returns an error if another process holds an unexpired lock file, or
    /// the lock file cannot be written.
    pub async fn acquire(&self, target: &Path, scenario: &str) -> Result<TargetLock, LockError> {
        let canonical = fs::canonicalize(target).await.ok();
        let key = canonical.clone().unwrap_or_else(|| target.to_path_buf());

        let mutex = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = mutex.lock_owned().await;
        debug!("Acquired in-process lock on {}", key.display());

        let info = LockInfo::new(&self.holder, scenario, self.expiry);
        let lock_path = match canonical {
            Some(dir) => {
                let path = dir.join(WORK_DIR).join(LOCK_FILE);
                write_lock_file(&path, &info).await?;
                Some(path)
            }
            None => None,
        };

        Ok(TargetLock {
            _guard: guard,
            lock_path,
            info,
        })
    }
}

impl TargetLock {
    /// Lock information.
    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Path of the lock file, if one was written.
    #[must_use]
    pub fn lock_path(&self) -> Option<&Path> {
        self.lock_path.as_deref()
    }

    /// Removes the lock file and releases the in-process lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be removed.
    pub async fn release(mut self) -> Result<(), LockError> {
        let Some(path) = self.lock_path.take() else {
            return Ok(());
        };

        match fs::remove_file(&path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                return Err(LockError::LockFile {
                    path,
                    message: format!("Failed to delete lock file: {e}"),
                });
            }
            _ => {}
        }
        if let Some(dir) = path.parent() {
            // Only succeeds once the work directory is empty.
            let _ = fs::remove_dir(dir).await;
        }
        debug!("Released lock {}", self.info.lock_id);
        Ok(())
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        if let Some(path) = self.lock_path.take() {
            warn!("Lock {} dropped without release; removing {}", self.info.lock_id, path.display());
            let _ = std::fs::remove_file(&path);
        }
    }
}

/// Creates the lock file atomically, taking over an expired one.
async fn write_lock_file(path: &Path, info: &LockInfo) -> Result<(), LockError> {
    let lock_err = |message: String| LockError::LockFile {
        path: path.to_path_buf(),
        message,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| lock_err(format!("Failed to create lock directory: {e}")))?;
    }

    let content =
        serde_json::to_string_pretty(info).map_err(|e| lock_err(format!("Failed to serialize lock: {e}")))?;

    for _ in 0..2 {
        match fs::OpenOptions::new().write(true).create_new(true).open(path).await {
            Ok(mut file) => {
                file.write_all(content.as_bytes())
                    .await
                    .map_err(|e| lock_err(format!("Failed to write lock file: {e}")))?;
                file.sync_all()
                    .await
                    .map_err(|e| lock_err(format!("Failed to sync lock file: {e}")))?;
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing = read_lock_file(path).await;
                match existing {
                    Some(existing) if !existing.is_expired() => {
                        return Err(LockError::LockedByOther {
                            path: path.to_path_buf(),
                            holder: existing.holder,
                            since: existing.acquired_at.to_rfc3339(),
                        });
                    }
                    // Expired or unreadable: take over.
                    _ => {
                        debug!("Stale lock found at {}, taking over", path.display());
                        let _ = fs::remove_file(path).await;
                    }
                }
            }
            Err(e) => return Err(lock_err(format!("Failed to create lock file: {e}"))),
        }
    }

    Err(lock_err(String::from("Lock file reappeared while taking over a stale lock")))
}

async fn read_lock_file(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();
        assert_ne!(id1, id2);
        assert!(id1.contains(&std::process::id().to_string()));
    }

    #[tokio::test]
    async fn test_acquire_writes_and_release_removes_lock_file() {
        let dir = TempDir::new().unwrap();
        let locks = TargetLocks::with_holder("test-holder");

        let lock = locks.acquire(dir.path(), "basic").await.unwrap();
        let path = lock.lock_path().unwrap().to_path_buf();
        let on_disk = read_lock_file(&path).await.unwrap();
        assert_eq!(on_disk.holder, "test-holder");
        assert_eq!(on_disk.scenario, "basic");

        lock.release().await.unwrap();
        assert!(!path.exists());
        assert!(!dir.path().join(WORK_DIR).exists());
    }

    #[tokio::test]
    async fn test_same_target_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let locks = Arc::new(TargetLocks::with_holder("test-holder"));

        let first = locks.acquire(dir.path(), "first").await.unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            let target = dir.path().to_path_buf();
            tokio::spawn(async move { locks.acquire(&target, "second").await.map(|l| l.info().scenario.clone()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        first.release().await.unwrap();
        let second = waiter.await.unwrap().unwrap();
        assert_eq!(second, "second");
    }

    #[tokio::test]
    async fn test_foreign_lock_file_rejected_unless_expired() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(WORK_DIR).join(LOCK_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut foreign = LockInfo::new("other-host-1-abcd", "basic", Duration::from_secs(LOCK_EXPIRY_SECS));
        std::fs::write(&path, serde_json::to_string(&foreign).unwrap()).unwrap();

        let locks = TargetLocks::with_holder("test-holder");
        let err = locks.acquire(dir.path(), "basic").await.unwrap_err();
        assert!(matches!(err, LockError::LockedByOther { ref holder, .. } if holder == "other-host-1-abcd"));

        foreign.expires_at = Utc::now() - chrono::Duration::seconds(1);
        std::fs::write(&path, serde_json::to_string(&foreign).unwrap()).unwrap();
        let lock = locks.acquire(dir.path(), "basic").await.unwrap();
        assert_eq!(read_lock_file(&path).await.unwrap().holder, "test-holder");
        lock.release().await.unwrap();
    }

    #[test]
    fn test_expiry_outlasts_slowest_scenario() {
        let retry = RetryPolicy::default();
        let expiry = lock_expiry(Duration::from_secs(900), &retry);
        // 8 steps x 900s x 3 attempts, plus 9 waits of 30s.
        assert_eq!(expiry, Duration::from_secs(21_870));
        assert!(expiry > Duration::from_secs(LOCK_EXPIRY_SECS));

        let floor = lock_expiry(Duration::from_secs(5), &RetryPolicy::none());
        assert_eq!(floor, Duration::from_secs(LOCK_EXPIRY_SECS));
    }

    #[tokio::test]
    async fn test_lock_file_carries_configured_expiry() {
        let dir = TempDir::new().unwrap();
        let locks = TargetLocks::with_holder("test-holder").with_expiry(Duration::from_secs(21_870));
        let lock = locks.acquire(dir.path(), "basic").await.unwrap();

        let written = read_lock_file(lock.lock_path().unwrap()).await.unwrap();
        assert_eq!((written.expires_at - written.acquired_at).num_seconds(), 21_870);
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_target_gets_in_process_lock_only() {
        let dir = TempDir::new().unwrap();
        let locks = TargetLocks::new();
        let lock = locks.acquire(&dir.path().join("missing"), "basic").await.unwrap();
        assert!(lock.lock_path().is_none());
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_drop_removes_lock_file() {
        let dir = TempDir::new().unwrap();
        let locks = TargetLocks::new();
        let lock = locks.acquire(dir.path(), "basic").await.unwrap();
        let path = lock.lock_path().unwrap().to_path_buf();
        drop(lock);
        assert!(!path.exists());
    }
}
