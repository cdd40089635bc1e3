//! Domain layer - core types for conversations, exports and history.
//!
//! This layer contains pure domain models and error types
//! without any I/O.

pub mod config;
pub mod error;
pub mod models;
pub mod site;

pub use config::{AppConfig, ExportConfig, HistoryConfig, PathConfig};
pub use error::{AppError, Result};
pub use models::{
    ConversationData, ConversationExport, ConversationMessage, ConversationMetadata,
    ExportFormat, ExportHistoryEntry, ExportMetadata, ExportStatistics, MessageMetadata, Role,
    Site, EXPORT_VERSION, MAX_MESSAGE_CHARS, MAX_RAW_SNIPPET_CHARS,
};
pub use site::{canonical_url, SiteProfile};
