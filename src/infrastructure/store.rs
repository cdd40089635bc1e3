//! Key/value persistence used by the export history.
//!
//! Stores are namespaced and quota-bounded. A write that would exceed the
//! quota fails with [`AppError::StorageQuota`] and leaves the store unchanged.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AppError, Result};

/// Namespaced key/value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// `StorageQuota` when the write would exceed the quota.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Bytes currently used by this namespace.
    async fn bytes_in_use(&self) -> Result<u64>;
}

/// Bytes charged for one entry.
#[must_use]
pub const fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

/// Checks a pending write against a quota.
///
/// `current` is the usage before the write, `replaced` the size of the entry
/// being overwritten (zero for new keys).
pub(crate) fn check_quota(
    key: &str,
    value: &str,
    current: u64,
    replaced: u64,
    quota: Option<u64>,
) -> Result<()> {
    let Some(quota) = quota else {
        return Ok(());
    };

    let required = current.saturating_sub(replaced) + entry_size(key, value);
    if required > quota {
        tracing::warn!(key, required, quota, "Store quota exceeded");
        return Err(AppError::StorageQuota {
            key: key.to_string(),
            required,
            quota,
        });
    }
    Ok(())
}

/// In-memory store, used for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryStore {
    /// Create an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store limited to `quota_bytes`.
    #[must_use]
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            entries: Mutex::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Whether `key` is present.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.lock().await;

        let current: u64 = entries.iter().map(|(k, v)| entry_size(k, v)).sum();
        let replaced = entries.get(key).map_or(0, |old| entry_size(key, old));
        check_quota(key, &value, current, replaced, self.quota_bytes)?;

        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<u64> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .map(|(k, v)| entry_size(k, v))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("a", "1".into()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.bytes_in_use().await.unwrap(), 2);

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_quota_rejects_without_writing() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "12345".into()).await.unwrap();

        let err = store.set("big", "123456789".into()).await.unwrap_err();
        assert!(matches!(err, AppError::StorageQuota { quota: 10, .. }));
        assert!(!store.contains("big").await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_overwrite_counts_replaced_entry() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "123456789".into()).await.unwrap();
        // Same size replacement fits because the old value is released.
        store.set("k", "abcdefghi".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("abcdefghi"));
    }
}
