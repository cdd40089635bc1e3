//! Conversation extraction service.
//!
//! Reads a chat page through a [`DocumentAccessor`] and builds
//! [`ConversationData`]. Accessor failures are fatal; anything that goes wrong
//! with a single turn is recovered by leaving that turn out.

use chrono::{DateTime, Utc};

use crate::domain::{
    canonical_url, AppError, ConversationData, ConversationMessage, ConversationMetadata,
    MessageMetadata, Result, Role, Site, SiteProfile, MAX_MESSAGE_CHARS,
};
use crate::infrastructure::{DocumentAccessor, PageNode, Selector};

use super::parser::{extract_text, normalize_inline, normalize_whitespace, raw_snippet};

/// Attributes that name a turn's author directly.
const ROLE_ATTRIBUTES: &[&str] = &["data-message-author-role", "data-role", "data-author"];

/// Class or element-name fragments hinting at a user turn.
const USER_HINTS: &[&str] = &["user", "human", "query"];

/// Class or element-name fragments hinting at an assistant turn.
const ASSISTANT_HINTS: &[&str] = &[
    "assistant",
    "claude-message",
    "ai-message",
    "model",
    "response",
    "bot",
];

/// Maps a role attribute value to a role.
fn parse_role(value: &str) -> Option<Role> {
    match value.trim().to_lowercase().as_str() {
        "user" | "human" => Some(Role::User),
        "assistant" | "ai" | "model" | "bot" | "chatgpt" | "claude" | "gemini" => {
            Some(Role::Assistant)
        }
        _ => None,
    }
}

/// Role from a class or element name fragment. User hints win ties.
fn role_from_hint(name: &str) -> Option<Role> {
    let name = name.to_lowercase();
    if USER_HINTS.iter().any(|h| name.contains(h)) {
        Some(Role::User)
    } else if ASSISTANT_HINTS.iter().any(|h| name.contains(h)) {
        Some(Role::Assistant)
    } else {
        None
    }
}

/// One way of telling who authored a turn node.
pub trait RoleDetector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The role, if this strategy recognizes the node.
    fn detect(&self, node: &PageNode) -> Option<Role>;
}

/// Reads an explicit role attribute on the turn node itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeRoleDetector;

impl RoleDetector for AttributeRoleDetector {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn detect(&self, node: &PageNode) -> Option<Role> {
        ROLE_ATTRIBUTES
            .iter()
            .find_map(|attr| node.attr(attr).and_then(parse_role))
    }
}

/// Reads `data-testid` markers such as `user-message` on the turn node.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestIdRoleDetector;

impl RoleDetector for TestIdRoleDetector {
    fn name(&self) -> &'static str {
        "test-id"
    }

    fn detect(&self, node: &PageNode) -> Option<Role> {
        let test_id = node.attr("data-testid")?.to_ascii_lowercase();
        if test_id.ends_with("user-message") {
            Some(Role::User)
        } else if test_id.ends_with("assistant-message") {
            Some(Role::Assistant)
        } else {
            None
        }
    }
}

/// Looks for role hints in the turn node's class names.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassNameRoleDetector;

impl RoleDetector for ClassNameRoleDetector {
    fn name(&self) -> &'static str {
        "class-name"
    }

    fn detect(&self, node: &PageNode) -> Option<Role> {
        node.classes().find_map(role_from_hint)
    }
}

/// Reads a role attribute from the first descendant that carries one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescendantRoleDetector;

impl RoleDetector for DescendantRoleDetector {
    fn name(&self) -> &'static str {
        "descendant"
    }

    fn detect(&self, node: &PageNode) -> Option<Role> {
        node.children
            .iter()
            .find_map(|child| AttributeRoleDetector.detect(child).or_else(|| self.detect(child)))
    }
}

/// Recognizes custom elements such as `user-query` or `model-response`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementNameRoleDetector;

impl RoleDetector for ElementNameRoleDetector {
    fn name(&self) -> &'static str {
        "element-name"
    }

    fn detect(&self, node: &PageNode) -> Option<Role> {
        if node.tag.contains('-') {
            role_from_hint(&node.tag)
        } else {
            None
        }
    }
}

/// Detectors in priority order.
#[must_use]
pub fn default_role_detectors() -> Vec<Box<dyn RoleDetector>> {
    vec![
        Box::new(AttributeRoleDetector),
        Box::new(TestIdRoleDetector),
        Box::new(ClassNameRoleDetector),
        Box::new(DescendantRoleDetector),
        Box::new(ElementNameRoleDetector),
    ]
}

/// Why a turn node did not become a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    NoRole,
    Empty,
    Oversized(usize),
}

/// Extraction result together with what was recovered along the way.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub data: ConversationData,
    /// Non-fatal notes, e.g. a default title being used.
    pub notes: Vec<String>,
    pub skipped_without_role: usize,
    pub dropped_empty: usize,
    pub dropped_oversized: usize,
}

/// Selectors compiled from a site profile.
#[derive(Debug, Clone)]
struct ProfileSelectors {
    /// Tried in order; the first non-empty match wins.
    titles: Vec<Selector>,
    turn: Selector,
    content: Option<Selector>,
    in_progress: Selector,
    message_id: Selector,
    model: Selector,
    time: Selector,
}

impl ProfileSelectors {
    fn compile(profile: &SiteProfile) -> Result<Self> {
        Ok(Self {
            titles: profile
                .title_selectors
                .iter()
                .map(|s| Selector::parse(s))
                .collect::<Result<_>>()?,
            turn: Selector::parse(profile.turn_selector)?,
            content: profile.content_selector.map(Selector::parse).transpose()?,
            in_progress: Selector::parse(profile.in_progress_selector)?,
            message_id: Selector::parse("[data-message-id]")?,
            model: Selector::parse("[data-message-model-slug], [data-model]")?,
            time: Selector::parse("time[datetime]")?,
        })
    }
}

/// Extracts conversations from one page.
pub struct ConversationExtractor<D> {
    accessor: D,
    profile: &'static SiteProfile,
    selectors: ProfileSelectors,
    detectors: Vec<Box<dyn RoleDetector>>,
}

impl<D: DocumentAccessor> ConversationExtractor<D> {
    /// Create an extractor for `site` reading through `accessor`.
    ///
    /// # Errors
    /// Returns a configuration error if the site profile's selectors are invalid.
    pub fn new(accessor: D, site: Site) -> Result<Self> {
        let profile = SiteProfile::for_site(site);
        Ok(Self {
            accessor,
            profile,
            selectors: ProfileSelectors::compile(profile)?,
            detectors: default_role_detectors(),
        })
    }

    /// Replace the role detection strategies.
    #[must_use]
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn RoleDetector>>) -> Self {
        self.detectors = detectors;
        self
    }

    /// Provider this extractor reads.
    #[must_use]
    pub const fn site(&self) -> Site {
        self.profile.site
    }

    /// Current page URL as reported by the accessor.
    ///
    /// # Errors
    /// Returns an extraction error if the accessor fails.
    pub async fn page_url(&self) -> Result<String> {
        self.accessor
            .url()
            .await
            .map_err(|e| AppError::extraction("Failed to read page URL", e))
    }

    /// Extracts the conversation on the current page.
    ///
    /// # Errors
    /// Returns an extraction error if the accessor fails. An empty
    /// conversation is not an error.
    pub async fn extract_conversation_data(&self) -> Result<ConversationData> {
        self.extract_with_report().await.map(|report| report.data)
    }

    /// Like [`Self::extract_conversation_data`], also returning recovery notes.
    ///
    /// # Errors
    /// Returns an extraction error if the accessor fails.
    pub async fn extract_with_report(&self) -> Result<ExtractionReport> {
        let extracted_at = Utc::now();
        let mut notes = Vec::new();

        let url = self.page_url().await?;
        let language = self
            .accessor
            .language()
            .await
            .map_err(|e| AppError::extraction("Failed to read page language", e))?;

        let title = self.read_title().await?.unwrap_or_else(|| {
            notes.push(format!(
                "Title not found; using default \"{}\"",
                self.profile.default_title
            ));
            self.profile.default_title.to_string()
        });

        let turns = self
            .accessor
            .query_all(&self.selectors.turn)
            .await
            .map_err(|e| AppError::extraction("Failed to read conversation turns", e))?;

        let mut messages = Vec::with_capacity(turns.len());
        let (mut skipped_without_role, mut dropped_empty, mut dropped_oversized) = (0, 0, 0);

        for (index, turn) in turns.iter().enumerate() {
            match self.parse_turn(turn, index, extracted_at) {
                Ok(message) => messages.push(message),
                Err(reason) => {
                    tracing::debug!(index, ?reason, "Skipped turn node");
                    match reason {
                        SkipReason::NoRole => skipped_without_role += 1,
                        SkipReason::Empty => dropped_empty += 1,
                        SkipReason::Oversized(_) => dropped_oversized += 1,
                    }
                }
            }
        }

        messages.sort_by_key(|m| m.metadata.as_ref().map_or(usize::MAX, |meta| meta.index));

        if skipped_without_role > 0 {
            notes.push(format!(
                "Skipped {skipped_without_role} turn node(s) without a recognizable role"
            ));
        }
        if dropped_empty > 0 {
            notes.push(format!("Dropped {dropped_empty} empty message(s)"));
        }
        if dropped_oversized > 0 {
            notes.push(format!(
                "Dropped {dropped_oversized} message(s) longer than {MAX_MESSAGE_CHARS} characters"
            ));
        }

        let is_completed = self
            .accessor
            .query(&self.selectors.in_progress)
            .await
            .map_err(|e| AppError::extraction("Failed to read completion marker", e))?
            .is_none();

        let url = canonical_url(&url);
        let metadata = ConversationMetadata {
            site: self.profile.site,
            conversation_id: self.profile.conversation_id(&url),
            url,
            total_messages: messages.len(),
            extracted_at,
            language,
            is_completed,
        };

        tracing::info!(
            site = %self.profile.site,
            messages = messages.len(),
            skipped = skipped_without_role + dropped_empty + dropped_oversized,
            "Extracted conversation"
        );

        Ok(ExtractionReport {
            data: ConversationData {
                title,
                messages,
                metadata,
            },
            notes,
            skipped_without_role,
            dropped_empty,
            dropped_oversized,
        })
    }

    /// First non-empty title, trying the profile's selectors in priority order.
    async fn read_title(&self) -> Result<Option<String>> {
        for selector in &self.selectors.titles {
            let title = self
                .accessor
                .query(selector)
                .await
                .map_err(|e| AppError::extraction("Failed to read title node", e))?
                .map(|node| normalize_inline(&node.text_content()))
                .filter(|title| !title.is_empty());
            if title.is_some() {
                return Ok(title);
            }
        }
        Ok(None)
    }

    fn detect_role(&self, node: &PageNode) -> Option<Role> {
        self.detectors.iter().find_map(|detector| {
            let role = detector.detect(node);
            if let Some(role) = role {
                tracing::trace!(detector = detector.name(), %role, "Detected role");
            }
            role
        })
    }

    fn parse_turn(
        &self,
        turn: &PageNode,
        index: usize,
        extracted_at: DateTime<Utc>,
    ) -> std::result::Result<ConversationMessage, SkipReason> {
        let role = self.detect_role(turn).ok_or(SkipReason::NoRole)?;

        let body = self
            .selectors
            .content
            .as_ref()
            .and_then(|sel| turn.select_all_inclusive(sel).into_iter().next())
            .unwrap_or(turn);

        let content = normalize_whitespace(&extract_text(body));
        if content.is_empty() {
            return Err(SkipReason::Empty);
        }
        let length = content.chars().count();
        if length > MAX_MESSAGE_CHARS {
            return Err(SkipReason::Oversized(length));
        }

        let id_node = turn
            .select_all_inclusive(&self.selectors.message_id)
            .into_iter()
            .next();
        let message_id = id_node
            .and_then(|n| n.attr("data-message-id"))
            .or_else(|| turn.attr("id"))
            .map(str::to_string);
        let parent_id = id_node
            .and_then(|n| n.attr("data-parent-id"))
            .or_else(|| turn.attr("data-parent-id"))
            .map(str::to_string);
        let model = turn
            .select_all_inclusive(&self.selectors.model)
            .into_iter()
            .next()
            .and_then(|n| n.attr("data-message-model-slug").or_else(|| n.attr("data-model")))
            .map(str::to_string);

        let timestamp = turn
            .select_first(&self.selectors.time)
            .and_then(|n| n.attr("datetime"))
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or(extracted_at, |dt| dt.with_timezone(&Utc));

        Ok(ConversationMessage {
            role,
            content,
            timestamp: Some(timestamp),
            metadata: Some(MessageMetadata {
                message_id,
                parent_id,
                index,
                raw_snippet: raw_snippet(turn),
                model,
            }),
        })
    }
}
