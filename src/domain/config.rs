//! Application configuration models.
//!
//! Loaded from `config.toml`; every field has a default so partial files work.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::models::ExportFormat;

/// Defaults applied to `export` runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Format used when none is given on the command line.
    #[serde(default)]
    pub default_format: ExportFormat,

    /// Keep per-message metadata in exports.
    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Keep per-message timestamps in exports.
    #[serde(default = "default_true")]
    pub include_timestamps: bool,

    /// Run validation rules before exporting.
    #[serde(default = "default_true")]
    pub validate_data: bool,

    /// Record exports in the history.
    #[serde(default = "default_true")]
    pub save_to_storage: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_format: ExportFormat::default(),
            include_metadata: true,
            include_timestamps: true,
            validate_data: true,
            save_to_storage: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Configuration for the export history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of days to keep history entries.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Maximum number of entries kept in the history index.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Byte quota for the history store.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            max_entries: default_max_entries(),
            quota_bytes: default_quota_bytes(),
        }
    }
}

const fn default_retention_days() -> u32 {
    30
}

const fn default_max_entries() -> usize {
    100
}

const fn default_quota_bytes() -> u64 {
    5 * 1024 * 1024
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Export defaults.
    #[serde(default)]
    pub export: ExportConfig,

    /// History management configuration.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Path configuration.
    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chat-archiver")
    }

    /// Get the history database path.
    #[must_use]
    pub fn history_db_path(&self) -> PathBuf {
        self.data_dir().join("history.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.history.retention_days, 30);
        assert_eq!(config.history.max_entries, 100);
        assert!(config.export.validate_data);
        assert_eq!(config.export.default_format, ExportFormat::Markdown);
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let config = AppConfig {
            paths: PathConfig {
                data_dir: Some(PathBuf::from("/tmp/archive")),
            },
            ..Default::default()
        };
        assert_eq!(config.history_db_path(), PathBuf::from("/tmp/archive/history.db"));
    }
}
