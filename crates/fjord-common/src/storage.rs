//! Storage backend abstraction
//!
//! The access layer never talks to disk or an object store directly; it goes
//! through [`StorageBackend`]. Production wires in the real storage engine,
//! tests use [`MemoryBackend`].

use crate::error::{AccessError, AccessResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

/// Narrow contract consumed from the external storage engine
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the record at `path`; missing records fail with `NotFound`
    async fn get(&self, path: &str) -> AccessResult<Vec<u8>>;

    /// Write (create or overwrite) the record at `path`
    async fn put(&self, path: &str, bytes: Vec<u8>) -> AccessResult<()>;

    /// List record paths under `prefix`
    async fn list(&self, prefix: &str) -> AccessResult<Vec<String>>;

    /// Delete the record at `path`; deleting a missing record is not an error
    async fn delete(&self, path: &str) -> AccessResult<()>;
}

/// In-memory backend for tests and single-process development
pub struct MemoryBackend {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self { records: RwLock::new(BTreeMap::new()) }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> AccessResult<Vec<u8>> {
        self.records
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| AccessError::NotFound { kind: "record", id: path.to_string() })
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> AccessResult<()> {
        self.records.write().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> AccessResult<Vec<String>> {
        let records = self.records.read();
        Ok(records.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn delete(&self, path: &str) -> AccessResult<()> {
        self.records.write().remove(path);
        Ok(())
    }
}

/// Bounded retry with exponential backoff for storage I/O
///
/// Only `StorageUnavailable` is retried; every other error is the caller's
/// problem and propagates on the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the second attempt; doubles per attempt, capped
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, base_delay: Duration::from_millis(50) }
    }
}

impl RetryPolicy {
    /// Run `op` under this policy
    pub async fn run<T, F, Fut>(&self, mut op: F) -> AccessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AccessResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Err(AccessError::StorageUnavailable(detail)) => {
                    attempt += 1;
                    if attempt >= self.attempts {
                        return Err(AccessError::StorageUnavailable(detail));
                    }
                    let delay = self.base_delay * (1 << (attempt - 1).min(5));
                    tracing::warn!(attempt, ?delay, %detail, "storage unavailable, backing off");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
