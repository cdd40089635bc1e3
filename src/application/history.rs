//! Export history management.
//!
//! The history lives in two places of a [`KeyValueStore`]: one index key with
//! the ordered entry list (most recent first) and one payload key per export.
//! Writes go payload first, then index; removals go index first, then
//! payload. An index entry without a payload is reported as an integrity
//! error, never dropped silently.

use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    AppError, ConversationExport, ExportHistoryEntry, ExportStatistics, Result, Site,
};
use crate::infrastructure::KeyValueStore;

/// Key holding the history index.
pub const HISTORY_INDEX_KEY: &str = "export_history";

/// Prefix of per-export payload keys. No payload key can equal the index key.
pub const EXPORT_KEY_PREFIX: &str = "export_payload_";

/// Default bound on the number of history entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Store key of an export's payload.
#[must_use]
pub fn payload_key(export_id: &str) -> String {
    format!("{EXPORT_KEY_PREFIX}{export_id}")
}

/// Result of a cleanup operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupResult {
    /// Number of history entries removed.
    pub removed_count: usize,
    /// Total payload bytes freed.
    pub freed_bytes: u64,
}

impl CleanupResult {
    /// Format freed bytes as human readable.
    #[must_use]
    pub fn freed_human(&self) -> String {
        format_bytes(self.freed_bytes)
    }
}

/// Outcome of an index/payload consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Number of index entries checked.
    pub checked: usize,
    /// Export ids listed in the index whose payload is missing.
    pub dangling_payloads: Vec<String>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.dangling_payloads.is_empty()
    }
}

/// Persists export summaries and payloads.
pub struct HistoryManager<S> {
    store: S,
    write_lock: Mutex<()>,
    max_entries: usize,
}

impl<S: KeyValueStore> HistoryManager<S> {
    /// Create a manager over `store`.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    /// Bound the history to `max_entries` (at least one).
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    async fn load_index(&self) -> Result<Vec<ExportHistoryEntry>> {
        match self.store.get(HISTORY_INDEX_KEY).await? {
            Some(json) => serde_json::from_str(&json).map_err(AppError::json_parse),
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, entries: &[ExportHistoryEntry]) -> Result<()> {
        let json = serde_json::to_string(entries).map_err(AppError::json_parse)?;
        self.store.set(HISTORY_INDEX_KEY, json).await
    }

    /// Best-effort removal used when undoing a half-finished write.
    async fn discard_payload(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            tracing::warn!(key, error = %e, "Failed to discard export payload");
        }
    }

    /// Records `export` in the history and stores its payload.
    ///
    /// # Errors
    /// `StorageQuota` if either write exceeds the store quota; the index is
    /// left as it was.
    pub async fn save_to_history(&self, export: &ConversationExport) -> Result<ExportHistoryEntry> {
        let _guard = self.write_lock.lock().await;

        let payload = serde_json::to_string(export).map_err(AppError::json_parse)?;
        let entry = ExportHistoryEntry::from_export(export, payload.len() as u64);
        let key = payload_key(&export.id);

        let mut entries = self.load_index().await?;
        let already_indexed = entries.iter().any(|e| e.export_id == export.id);

        self.store.set(&key, payload).await?;

        entries.retain(|e| e.export_id != export.id);
        entries.insert(0, entry.clone());
        let overflow = if entries.len() > self.max_entries {
            entries.split_off(self.max_entries)
        } else {
            Vec::new()
        };

        if let Err(e) = self.write_index(&entries).await {
            // An indexed id keeps its (now rewritten) payload.
            if !already_indexed {
                self.discard_payload(&key).await;
            }
            return Err(e);
        }

        for old in &overflow {
            self.store.remove(&payload_key(&old.export_id)).await?;
            tracing::debug!(export_id = %old.export_id, "Trimmed history entry over limit");
        }

        tracing::info!(
            export_id = %entry.export_id,
            size = entry.file_size,
            "Saved export to history"
        );

        Ok(entry)
    }

    /// History entries, most recent first.
    ///
    /// # Errors
    /// Returns error if the index cannot be read.
    pub async fn get_history(&self, limit: Option<usize>) -> Result<Vec<ExportHistoryEntry>> {
        let mut entries = self.load_index().await?;
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Whether an export of the same page already exists.
    ///
    /// Matches on `url` and `site` only. `_title` is accepted for interface
    /// compatibility and is not compared.
    ///
    /// # Errors
    /// Returns error if the index cannot be read.
    pub async fn check_duplicate(&self, url: &str, site: Site, _title: &str) -> Result<bool> {
        Ok(self
            .load_index()
            .await?
            .iter()
            .any(|e| e.url == url && e.site == site))
    }

    /// Aggregates over the whole history.
    ///
    /// # Errors
    /// Returns error if the index cannot be read.
    #[allow(clippy::cast_precision_loss)]
    pub async fn get_statistics(&self) -> Result<ExportStatistics> {
        let entries = self.load_index().await?;
        if entries.is_empty() {
            return Ok(ExportStatistics::default());
        }

        let mut stats = ExportStatistics {
            total_exports: entries.len(),
            ..ExportStatistics::default()
        };

        for entry in &entries {
            stats.total_file_size += entry.file_size;
            stats.total_messages += entry.message_count;
            *stats.by_site.entry(entry.site).or_insert(0) += 1;
            *stats.by_format.entry(entry.format).or_insert(0) += 1;
        }

        let count = entries.len() as f64;
        stats.average_file_size = stats.total_file_size as f64 / count;
        stats.average_message_count = stats.total_messages as f64 / count;
        stats.oldest_export = entries.iter().map(|e| e.exported_at).min();
        stats.newest_export = entries.iter().map(|e| e.exported_at).max();

        Ok(stats)
    }

    /// Removes an export and its payload. Missing ids are not an error.
    ///
    /// Returns whether an index entry was removed.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn remove_from_history(&self, export_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load_index().await?;
        let before = entries.len();
        entries.retain(|e| e.export_id != export_id);
        let removed = entries.len() != before;

        if removed {
            self.write_index(&entries).await?;
        }
        self.store.remove(&payload_key(export_id)).await?;

        if removed {
            tracing::info!(export_id, "Removed export from history");
        }
        Ok(removed)
    }

    /// Loads the full export for downloading again.
    ///
    /// # Errors
    /// `ExportNotFound` if the id is not in the history, `DanglingPayload` if
    /// it is listed but its payload is gone.
    pub async fn get_export_for_redownload(&self, export_id: &str) -> Result<ConversationExport> {
        let entries = self.load_index().await?;
        if !entries.iter().any(|e| e.export_id == export_id) {
            return Err(AppError::ExportNotFound {
                id: export_id.to_string(),
            });
        }

        let Some(payload) = self.store.get(&payload_key(export_id)).await? else {
            tracing::warn!(export_id, "History entry has no payload");
            return Err(AppError::DanglingPayload {
                id: export_id.to_string(),
            });
        };

        serde_json::from_str(&payload).map_err(AppError::json_parse)
    }

    /// Removes entries exported more than `retention_days` days ago.
    ///
    /// The index is rewritten only when something was removed.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn cleanup_old_history(&self, retention_days: u32) -> Result<CleanupResult> {
        let _guard = self.write_lock.lock().await;

        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let (kept, expired): (Vec<_>, Vec<_>) = self
            .load_index()
            .await?
            .into_iter()
            .partition(|e| e.exported_at >= cutoff);

        if expired.is_empty() {
            return Ok(CleanupResult::default());
        }

        self.write_index(&kept).await?;

        let mut result = CleanupResult::default();
        for entry in &expired {
            self.store.remove(&payload_key(&entry.export_id)).await?;
            result.removed_count += 1;
            result.freed_bytes += entry.file_size;
            tracing::info!(
                export_id = %entry.export_id,
                exported_at = %entry.exported_at,
                "Deleted expired export"
            );
        }

        Ok(result)
    }

    /// Lists index entries whose payload is missing, without changing anything.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn verify_integrity(&self) -> Result<IntegrityReport> {
        let entries = self.load_index().await?;
        let mut report = IntegrityReport {
            checked: entries.len(),
            ..IntegrityReport::default()
        };

        for entry in &entries {
            if self.store.get(&payload_key(&entry.export_id)).await?.is_none() {
                tracing::warn!(export_id = %entry.export_id, "Dangling history entry");
                report.dangling_payloads.push(entry.export_id.clone());
            }
        }

        Ok(report)
    }

    /// Bytes used by the history in its store.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn storage_usage(&self) -> Result<u64> {
        self.store.bytes_in_use().await
    }
}

/// Format bytes as human readable string.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
