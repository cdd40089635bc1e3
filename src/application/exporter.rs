//! Export pipeline.
//!
//! Extract, validate, normalize, assemble, and optionally persist. Rendering
//! to a concrete format is left to the formatter and happens on demand.

use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::domain::{
    ConversationData, ConversationExport, ExportConfig, ExportFormat, ExportMetadata, Result,
    EXPORT_VERSION,
};
use crate::infrastructure::{DocumentAccessor, KeyValueStore};

use super::extractor::ConversationExtractor;
use super::history::HistoryManager;
use super::parser::{normalize_inline, normalize_whitespace};
use super::validator::Validator;

/// User agent recorded when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Options for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Keep per-message metadata.
    pub include_metadata: bool,
    /// Keep per-message timestamps.
    pub include_timestamps: bool,
    /// Abort on fatal validation findings.
    ///
    /// The rules run either way. When this is off, every finding, fatal ones
    /// included, is recorded in `parsing_errors` and a fatal finding only
    /// clears `data_integrity`.
    pub validate_data: bool,
    /// Record the export in the history.
    pub save_to_storage: bool,
    /// Skip the duplicate advisory.
    pub force_duplicate: bool,
    /// Overrides the page URL recorded on the export.
    pub url: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

impl ExportOptions {
    /// Options seeded from the `[export]` config section.
    #[must_use]
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            format: config.default_format,
            include_metadata: config.include_metadata,
            include_timestamps: config.include_timestamps,
            validate_data: config.validate_data,
            save_to_storage: config.save_to_storage,
            force_duplicate: false,
            url: None,
        }
    }
}

/// Runs the export pipeline for one page.
pub struct Exporter<'a, D, S> {
    extractor: &'a ConversationExtractor<D>,
    history: &'a HistoryManager<S>,
    validator: Validator,
    user_agent: String,
}

impl<'a, D: DocumentAccessor, S: KeyValueStore> Exporter<'a, D, S> {
    /// Create an exporter.
    ///
    /// # Errors
    /// Returns error if the validator cannot be built.
    pub fn new(
        extractor: &'a ConversationExtractor<D>,
        history: &'a HistoryManager<S>,
    ) -> Result<Self> {
        Ok(Self {
            extractor,
            history,
            validator: Validator::new()?,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    /// Set the user agent recorded on exports.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Extracts the page and builds an export from it.
    ///
    /// # Errors
    /// - `Extraction` if the page cannot be read
    /// - `Validation` if `validate_data` is set and a fatal rule fails
    /// - storage errors if `save_to_storage` is set and persisting fails
    pub async fn export_conversation(&self, options: &ExportOptions) -> Result<ConversationExport> {
        let started = Instant::now();
        let report = self.extractor.extract_with_report().await?;
        let extraction_time = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut parsing_errors = report.notes;
        let outcome = self.validator.validate(&report.data);
        let data_integrity = !outcome.has_fatal();
        if options.validate_data {
            parsing_errors.extend(outcome.into_result()?);
        } else {
            parsing_errors.extend(outcome.findings.into_iter().map(|f| f.message));
        }

        let mut data = normalize_conversation(report.data);
        for message in &mut data.messages {
            if !options.include_metadata {
                message.metadata = None;
            }
            if !options.include_timestamps {
                message.timestamp = None;
            }
        }

        let site = self.extractor.site();
        let url = options
            .url
            .clone()
            .unwrap_or_else(|| data.metadata.url.clone());

        if !options.force_duplicate && self.history.check_duplicate(&url, site, &data.title).await? {
            tracing::warn!(%url, %site, "Conversation was already exported");
            parsing_errors.push(format!("Duplicate export: {url} was already exported"));
        }

        let export = ConversationExport {
            id: Uuid::new_v4().to_string(),
            site,
            title: data.title.clone(),
            url,
            exported_at: canonical_time(Utc::now()),
            format: options.format,
            metadata: ExportMetadata {
                message_count: data.messages.len(),
                export_version: EXPORT_VERSION.to_string(),
                user_agent: self.user_agent.clone(),
                extraction_time,
                parsing_errors,
                data_integrity,
            },
            data,
        };

        if options.save_to_storage {
            self.history.save_to_history(&export).await?;
        }

        tracing::info!(
            export_id = %export.id,
            format = %export.format.as_str(),
            messages = export.metadata.message_count,
            warnings = export.metadata.parsing_errors.len(),
            "Exported conversation"
        );

        Ok(export)
    }
}

/// Canonical form of extracted data. Applying it twice changes nothing.
#[must_use]
pub fn normalize_conversation(mut data: ConversationData) -> ConversationData {
    data.title = normalize_inline(&data.title);
    for message in &mut data.messages {
        message.content = normalize_whitespace(&message.content);
        message.timestamp = message.timestamp.map(canonical_time);
    }
    data.metadata.extracted_at = canonical_time(data.metadata.extracted_at);
    data.metadata.total_messages = data.messages.len();
    data
}

/// UTC with millisecond precision.
fn canonical_time(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::extractor::tests::chatgpt_page;
    use crate::application::extractor::RoleDetector;
    use crate::domain::{AppError, ConversationMessage, ConversationMetadata, Role, Site};
    use crate::infrastructure::{MemoryStore, PageNode, SnapshotDocument};

    fn el(tag: &str) -> PageNode {
        PageNode::element(tag)
    }

    fn turn(n: usize, role: &str, text: &str) -> PageNode {
        el("article")
            .with_attr("data-testid", format!("conversation-turn-{n}"))
            .with_attr("data-message-author-role", role)
            .with_child(el("div").with_class("markdown").with_text(text))
    }

    fn page(title: &str, turns: Vec<PageNode>) -> SnapshotDocument {
        let body = turns.into_iter().fold(el("main"), PageNode::with_child);
        let root = el("html")
            .with_child(el("head").with_child(el("title").with_text(title)))
            .with_child(el("body").with_child(body));
        SnapshotDocument::new("https://chatgpt.com/c/xyz", None, root)
    }

    fn options() -> ExportOptions {
        ExportOptions::default()
    }

    #[tokio::test]
    async fn test_export_chatgpt_page() {
        let extractor = ConversationExtractor::new(chatgpt_page(), Site::Chatgpt).unwrap();
        let history = HistoryManager::new(MemoryStore::new());
        let exporter = Exporter::new(&extractor, &history).unwrap().with_user_agent("tests/1.0");

        let export = exporter.export_conversation(&options()).await.unwrap();

        assert_eq!(export.site, Site::Chatgpt);
        assert_eq!(export.title, "Sorting in Rust");
        assert_eq!(export.url, "https://chatgpt.com/c/abc-123");
        assert_eq!(export.metadata.message_count, 2);
        assert_eq!(export.metadata.export_version, EXPORT_VERSION);
        assert_eq!(export.metadata.user_agent, "tests/1.0");
        assert!(export.metadata.data_integrity);
        // Title is found, so only the skipped-node notes are recorded.
        assert_eq!(export.metadata.parsing_errors.len(), 2);
        assert!(Uuid::parse_str(&export.id).is_ok());

        let saved = history.get_export_for_redownload(&export.id).await.unwrap();
        assert_eq!(saved, export);
    }

    #[tokio::test]
    async fn test_duplicate_is_advisory() {
        let extractor = ConversationExtractor::new(chatgpt_page(), Site::Chatgpt).unwrap();
        let history = HistoryManager::new(MemoryStore::new());
        let exporter = Exporter::new(&extractor, &history).unwrap();

        let first = exporter.export_conversation(&options()).await.unwrap();
        let second = exporter.export_conversation(&options()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(second
            .metadata
            .parsing_errors
            .iter()
            .any(|e| e.starts_with("Duplicate export")));

        let forced = ExportOptions {
            force_duplicate: true,
            ..options()
        };
        let third = exporter.export_conversation(&forced).await.unwrap();
        assert!(!third
            .metadata
            .parsing_errors
            .iter()
            .any(|e| e.starts_with("Duplicate export")));
        assert_eq!(history.get_history(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_strips_metadata_and_timestamps() {
        let extractor = ConversationExtractor::new(chatgpt_page(), Site::Chatgpt).unwrap();
        let history = HistoryManager::new(MemoryStore::new());
        let exporter = Exporter::new(&extractor, &history).unwrap();

        let stripped = ExportOptions {
            include_metadata: false,
            include_timestamps: false,
            save_to_storage: false,
            url: Some("https://example.test/shared".into()),
            ..options()
        };
        let export = exporter.export_conversation(&stripped).await.unwrap();

        assert!(export
            .data
            .messages
            .iter()
            .all(|m| m.metadata.is_none() && m.timestamp.is_none()));
        assert_eq!(export.url, "https://example.test/shared");
        assert!(history.get_history(None).await.unwrap().is_empty());

        let json = serde_json::to_string(&export).unwrap();
        assert!(!json.contains("rawSnippet"));
        assert!(!json.contains("\"timestamp\""));
    }

    #[tokio::test]
    async fn test_consecutive_roles_warn_but_export() {
        let doc = page(
            "Chat",
            vec![turn(1, "user", "q"), turn(2, "assistant", "a"), turn(3, "assistant", "b")],
        );
        let extractor = ConversationExtractor::new(doc, Site::Chatgpt).unwrap();
        let history = HistoryManager::new(MemoryStore::new());
        let export = Exporter::new(&extractor, &history)
            .unwrap()
            .export_conversation(&options())
            .await
            .unwrap();

        assert_eq!(export.metadata.message_count, 3);
        assert_eq!(
            export.metadata.parsing_errors,
            vec!["Messages 2 and 3 are both from Assistant"]
        );
        assert!(export.metadata.data_integrity);
    }

    #[tokio::test]
    async fn test_all_messages_dropped_still_exports() {
        let doc = page("Chat", vec![turn(1, "user", "   "), turn(2, "assistant", "\n\n")]);
        let extractor = ConversationExtractor::new(doc, Site::Chatgpt).unwrap();
        let history = HistoryManager::new(MemoryStore::new());
        let export = Exporter::new(&extractor, &history)
            .unwrap()
            .export_conversation(&options())
            .await
            .unwrap();

        assert_eq!(export.metadata.message_count, 0);
        assert!(export.data.messages.is_empty());
        assert_eq!(export.data.metadata.total_messages, 0);
    }

    struct UnknownRole;

    impl RoleDetector for UnknownRole {
        fn name(&self) -> &'static str {
            "unknown"
        }

        fn detect(&self, _: &PageNode) -> Option<Role> {
            Some(Role::Unknown)
        }
    }

    #[tokio::test]
    async fn test_fatal_finding_aborts_only_when_validating() {
        let doc = page("Chat", vec![turn(1, "user", "q")]);
        let extractor = ConversationExtractor::new(doc, Site::Chatgpt)
            .unwrap()
            .with_detectors(vec![Box::new(UnknownRole)]);
        let history = HistoryManager::new(MemoryStore::new());
        let exporter = Exporter::new(&extractor, &history).unwrap();

        let err = exporter.export_conversation(&options()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert!(history.get_history(None).await.unwrap().is_empty());

        let lenient = ExportOptions {
            validate_data: false,
            ..options()
        };
        let export = exporter.export_conversation(&lenient).await.unwrap();
        assert!(!export.metadata.data_integrity);
        assert!(export
            .metadata
            .parsing_errors
            .contains(&"Message 1 has no recognized role".to_string()));
    }

    #[test]
    fn test_normalize_conversation() {
        let extracted_at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let data = ConversationData {
            title: "  My   Chat  ".into(),
            messages: vec![ConversationMessage {
                role: Role::User,
                content: "  hello   there \n\n\n\n bye ".into(),
                timestamp: Some(extracted_at),
                metadata: None,
            }],
            metadata: ConversationMetadata {
                site: Site::Claude,
                url: "https://claude.ai/chat/1".into(),
                conversation_id: Some("1".into()),
                total_messages: 7,
                extracted_at,
                language: None,
                is_completed: true,
            },
        };

        let once = normalize_conversation(data);
        assert_eq!(once.title, "My Chat");
        assert_eq!(once.messages[0].content, "hello there\n\n bye");
        assert_eq!(once.metadata.total_messages, 1);
        assert_eq!(
            once.metadata.extracted_at.to_rfc3339(),
            "2024-05-01T10:00:00.123+00:00"
        );

        let twice = normalize_conversation(once.clone());
        assert_eq!(twice, once);
    }

    #[test]
    fn test_options_follow_config() {
        let config = ExportConfig {
            default_format: ExportFormat::Csv,
            include_metadata: false,
            ..ExportConfig::default()
        };
        let options = ExportOptions::from_config(&config);
        assert_eq!(options.format, ExportFormat::Csv);
        assert!(!options.include_metadata);
        assert!(options.include_timestamps);
        assert!(!options.force_duplicate);
    }
}
