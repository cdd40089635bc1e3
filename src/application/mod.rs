//! Application layer - use cases and orchestration.
//!
//! This layer contains the extraction, validation and export pipeline
//! and the export history.

pub mod exporter;
pub mod extractor;
pub mod formatter;
pub mod history;
pub mod parser;
pub mod validator;

pub use exporter::{normalize_conversation, ExportOptions, Exporter, DEFAULT_USER_AGENT};
pub use extractor::{
    default_role_detectors, AttributeRoleDetector, ClassNameRoleDetector,
    ConversationExtractor, DescendantRoleDetector, ElementNameRoleDetector, ExtractionReport,
    RoleDetector, TestIdRoleDetector,
};
pub use formatter::{
    format_history_table, format_statistics, render, render_csv, render_json, render_markdown,
    render_named, render_txt,
};
pub use history::{
    payload_key, CleanupResult, HistoryManager, IntegrityReport, DEFAULT_MAX_ENTRIES,
    HISTORY_INDEX_KEY,
};
pub use parser::{extract_text, normalize_inline, normalize_whitespace};
pub use validator::{Finding, Severity, ValidationOutcome, Validator};
