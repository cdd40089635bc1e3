//! Domain models for extracted conversations and their exports.
//!
//! These models are what the extractor produces, what the renderers consume
//! and what the history manager persists. Field names serialize in camelCase.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AppError;

/// Version stamped on every export.
pub const EXPORT_VERSION: &str = "1.0.0";

/// Upper bound on a single message's content, in characters.
pub const MAX_MESSAGE_CHARS: usize = 100_000;

/// Upper bound on the raw markup snapshot kept per message, in characters.
pub const MAX_RAW_SNIPPET_CHARS: usize = 500;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user (human).
    User,
    /// Message from the AI assistant.
    Assistant,
    /// Unrecognized author. Never produced by extraction.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Supported chat providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Chatgpt,
    Claude,
    Gemini,
}

impl Site {
    /// All providers, in display order.
    pub const ALL: [Self; 3] = [Self::Chatgpt, Self::Claude, Self::Gemini];

    /// Lowercase identifier used in storage and file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chatgpt => "chatgpt",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    /// Human-readable provider name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Chatgpt => "ChatGPT",
            Self::Claude => "Claude",
            Self::Gemini => "Gemini",
        }
    }

    /// Detects the provider from a page URL's host.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase();

        let host = host.split(':').next().unwrap_or_default();
        let on = |domain: &str| {
            host == domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|sub| sub.ends_with('.'))
        };

        if on("chatgpt.com") || on("chat.openai.com") {
            Some(Self::Chatgpt)
        } else if on("claude.ai") {
            Some(Self::Claude)
        } else if on("gemini.google.com") {
            Some(Self::Gemini)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chatgpt" | "openai" => Ok(Self::Chatgpt),
            "claude" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            _ => Err(format!("Unknown site: {s}. Use: chatgpt, claude, gemini")),
        }
    }
}

/// Output encodings an export can be rendered into.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Human-readable Markdown document.
    #[default]
    Markdown,
    /// The export serialized verbatim.
    Json,
    /// Plain text transcript.
    Txt,
    /// One row per message.
    Csv,
}

impl ExportFormat {
    /// File extension for downloads.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
            Self::Txt => "txt",
            Self::Csv => "csv",
        }
    }

    /// Lowercase identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Txt => "txt",
            Self::Csv => "csv",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "txt" | "text" => Ok(Self::Txt),
            "csv" => Ok(Self::Csv),
            _ => Err(AppError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// Per-message details captured during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Stable message id exposed by the page, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Id of the message this one replies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Zero-based position in extraction order.
    pub index: usize,
    /// Truncated markup of the source node.
    #[serde(default)]
    pub raw_snippet: String,
    /// Model slug reported by the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

/// Page-level details of an extracted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    pub site: Site,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub total_messages: usize,
    pub extracted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub is_completed: bool,
}

/// A conversation as read from the page, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationData {
    pub title: String,
    pub messages: Vec<ConversationMessage>,
    pub metadata: ConversationMetadata,
}

impl ConversationData {
    /// Get total message count.
    #[must_use]
    pub const fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Get user message count.
    #[must_use]
    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// Get assistant message count.
    #[must_use]
    pub fn assistant_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }
}

/// Bookkeeping attached to an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub message_count: usize,
    pub export_version: String,
    pub user_agent: String,
    /// Milliseconds spent extracting.
    pub extraction_time: u64,
    /// Non-fatal findings collected along the way.
    #[serde(default)]
    pub parsing_errors: Vec<String>,
    pub data_integrity: bool,
}

/// The result of one export action. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationExport {
    pub id: String,
    pub site: Site,
    pub title: String,
    pub url: String,
    pub exported_at: DateTime<Utc>,
    pub format: ExportFormat,
    pub data: ConversationData,
    pub metadata: ExportMetadata,
}

impl ConversationExport {
    /// Generate a slug from the title for file names.
    #[must_use]
    pub fn title_slug(&self) -> String {
        let cleaned: String = self
            .title
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
            .collect();

        let slug = cleaned
            .split_whitespace()
            .take(8)
            .collect::<Vec<_>>()
            .join("_")
            .to_lowercase();

        if slug.is_empty() {
            "conversation".to_string()
        } else {
            slug.chars().take(50).collect()
        }
    }

    /// Get a safe download filename for the given format.
    #[must_use]
    pub fn filename(&self, format: ExportFormat) -> String {
        let short_id: String = self.id.chars().take(8).collect();
        format!(
            "{}_{}_{short_id}.{}",
            self.site.as_str(),
            self.title_slug(),
            format.extension()
        )
    }
}

/// Summary of a persisted export, kept for fast listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportHistoryEntry {
    pub export_id: String,
    pub title: String,
    pub site: Site,
    pub format: ExportFormat,
    pub exported_at: DateTime<Utc>,
    pub url: String,
    /// Serialized payload size in bytes.
    pub file_size: u64,
    pub message_count: usize,
}

impl ExportHistoryEntry {
    /// Project an export into its history entry.
    #[must_use]
    pub fn from_export(export: &ConversationExport, file_size: u64) -> Self {
        Self {
            export_id: export.id.clone(),
            title: export.title.clone(),
            site: export.site,
            format: export.format,
            exported_at: export.exported_at,
            url: export.url.clone(),
            file_size,
            message_count: export.metadata.message_count,
        }
    }
}

/// Aggregates over the export history. Computed on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatistics {
    pub total_exports: usize,
    pub total_file_size: u64,
    pub total_messages: usize,
    pub average_file_size: f64,
    pub average_message_count: f64,
    pub by_site: BTreeMap<Site, usize>,
    pub by_format: BTreeMap<ExportFormat, usize>,
    pub oldest_export: Option<DateTime<Utc>>,
    pub newest_export: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_str() {
        assert!(matches!("md".parse::<ExportFormat>(), Ok(ExportFormat::Markdown)));
        assert!(matches!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv)));
        assert!(matches!("text".parse::<ExportFormat>(), Ok(ExportFormat::Txt)));

        let err = "xml".parse::<ExportFormat>().unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat { ref format } if format == "xml"));
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_site_from_url() {
        assert_eq!(
            Site::from_url("https://chatgpt.com/c/abc-123"),
            Some(Site::Chatgpt)
        );
        assert_eq!(Site::from_url("https://claude.ai/chat/x"), Some(Site::Claude));
        assert_eq!(
            Site::from_url("https://gemini.google.com/app/1f2e"),
            Some(Site::Gemini)
        );
        assert_eq!(Site::from_url("https://example.com/c/1"), None);
        assert_eq!(Site::from_url("https://www.claude.ai/chat/x"), Some(Site::Claude));
        assert_eq!(Site::from_url("https://claude.ai:443/chat/x"), Some(Site::Claude));
        assert_eq!(Site::from_url("https://notclaude.ai/chat/x"), None);
        assert_eq!(Site::from_url("https://evilchatgpt.com/c/1"), None);
    }

    #[test]
    fn test_role_serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::Unknown);
    }

    #[test]
    fn test_title_slug() {
        let export = ConversationExport {
            id: "0123456789abcdef".into(),
            site: Site::Claude,
            title: "Rust: lifetimes & borrowing!".into(),
            url: "https://claude.ai/chat/1".into(),
            exported_at: Utc::now(),
            format: ExportFormat::Markdown,
            data: ConversationData {
                title: "Rust: lifetimes & borrowing!".into(),
                messages: Vec::new(),
                metadata: ConversationMetadata {
                    site: Site::Claude,
                    url: "https://claude.ai/chat/1".into(),
                    conversation_id: Some("1".into()),
                    total_messages: 0,
                    extracted_at: Utc::now(),
                    language: None,
                    is_completed: true,
                },
            },
            metadata: ExportMetadata {
                message_count: 0,
                export_version: EXPORT_VERSION.into(),
                user_agent: "test".into(),
                extraction_time: 0,
                parsing_errors: Vec::new(),
                data_integrity: true,
            },
        };

        assert_eq!(export.title_slug(), "rust_lifetimes_borrowing");
        assert_eq!(
            export.filename(ExportFormat::Csv),
            "claude_rust_lifetimes_borrowing_01234567.csv"
        );
    }
}
