//! Domain-level error types for chat-archiver.
//!
//! All errors are typed with `thiserror` and carry a descriptive message.
//! Non-fatal findings never become errors; they are recorded on the export.

use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// The document accessor failed; no partial result is produced.
    #[error("Extraction failed: {message}")]
    Extraction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// One or more fatal validation rules were violated.
    #[error("Validation failed: {}", violations.join("; "))]
    Validation { violations: Vec<String> },

    /// The requested output format is not one of markdown, json, txt, csv.
    #[error("Unsupported export format: {format}")]
    UnsupportedFormat { format: String },

    /// A store write would exceed the configured quota.
    #[error("Storage quota exceeded writing '{key}': {required} bytes needed, quota is {quota} bytes")]
    StorageQuota { key: String, required: u64, quota: u64 },

    /// No history entry exists for the export id.
    #[error("Export not found: {id}")]
    ExportNotFound { id: String },

    /// The history index references an export whose payload is missing.
    #[error("Export {id} is listed in history but its payload is missing")]
    DanglingPayload { id: String },

    /// Failed to open or query the database.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a database error from rusqlite error.
    pub fn database(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Wrap a failure coming out of a document accessor.
    ///
    /// Errors that already are extraction errors pass through unchanged.
    pub fn extraction(context: &str, err: Self) -> Self {
        match err {
            Self::Extraction { .. } => err,
            other => Self::Extraction {
                message: format!("{context}: {other}"),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Whether this error is one of the two not-found flavours.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ExportNotFound { .. } | Self::DanglingPayload { .. })
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
