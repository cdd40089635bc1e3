//! Page document access.
//!
//! The core reads chat pages only through [`DocumentAccessor`]. The shipped
//! implementation, [`SnapshotDocument`], serves a JSON snapshot of a rendered
//! page; a browser bridge would implement the same trait.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AppError, Result};

use super::selector::Selector;

/// Tag used for bare text nodes.
pub const TEXT_TAG: &str = "#text";

/// One node of a rendered page.
///
/// Elements carry a tag, attributes and children. Text nodes use the tag
/// `#text` and hold their content in `text`; an element may also carry
/// `text` directly, which is read before its children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PageNode>,
}

impl PageNode {
    /// Create an element node.
    #[must_use]
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Create a text node.
    #[must_use]
    pub fn text_node(text: impl Into<String>) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Set an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the `class` attribute.
    #[must_use]
    pub fn with_class(self, classes: impl Into<String>) -> Self {
        self.with_attr("class", classes)
    }

    /// Append a text child.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Self::text_node(text))
    }

    /// Append a child node.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    /// Attribute value by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whitespace-separated class names.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Concatenated text of this node and all descendants, as rendered.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.push_text(out);
        }
    }

    /// All descendants matching `selector`, in document order.
    #[must_use]
    pub fn select_all(&self, selector: &Selector) -> Vec<&Self> {
        let mut found = Vec::new();
        let mut ancestors = vec![self];
        for child in &self.children {
            child.collect(selector, &mut ancestors, &mut found);
        }
        found
    }

    /// First descendant matching `selector`.
    #[must_use]
    pub fn select_first(&self, selector: &Selector) -> Option<&Self> {
        self.select_all(selector).into_iter().next()
    }

    /// This node (when it matches) followed by matching descendants.
    #[must_use]
    pub fn select_all_inclusive(&self, selector: &Selector) -> Vec<&Self> {
        let mut found = Vec::new();
        let mut ancestors = Vec::new();
        self.collect(selector, &mut ancestors, &mut found);
        found
    }

    fn collect<'a>(
        &'a self,
        selector: &Selector,
        ancestors: &mut Vec<&'a Self>,
        found: &mut Vec<&'a Self>,
    ) {
        if self.is_text() {
            return;
        }
        if selector.matches(self, ancestors) {
            found.push(self);
        }
        ancestors.push(self);
        for child in &self.children {
            child.collect(selector, ancestors, found);
        }
        ancestors.pop();
    }

    /// Markup rendering of the node, used for raw snapshots.
    #[must_use]
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.push_html(&mut out);
        out
    }

    fn push_html(&self, out: &mut String) {
        if self.is_text() {
            out.push_str(&escape_html(self.text.as_deref().unwrap_or_default()));
            return;
        }

        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            out.push_str(&format!(" {name}=\"{}\"", escape_html(value)));
        }
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape_html(text));
        }
        for child in &self.children {
            child.push_html(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Read access to a rendered chat page.
///
/// Implementations may fail; every failure is fatal to extraction.
#[async_trait]
pub trait DocumentAccessor: Send + Sync {
    /// First node matching `selector`, in document order.
    async fn query(&self, selector: &Selector) -> Result<Option<PageNode>>;

    /// All nodes matching `selector`, in document order.
    async fn query_all(&self, selector: &Selector) -> Result<Vec<PageNode>>;

    /// Current page URL.
    async fn url(&self) -> Result<String>;

    /// Declared page language, if any.
    async fn language(&self) -> Result<Option<String>>;
}

/// A page captured as JSON.
///
/// ```json
/// { "url": "https://claude.ai/chat/1", "language": "en",
///   "root": { "tag": "html", "children": [ ... ] } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub url: String,
    #[serde(default)]
    pub language: Option<String>,
    pub root: PageNode,
}

impl SnapshotDocument {
    /// Create a snapshot from parts.
    #[must_use]
    pub fn new(url: impl Into<String>, language: Option<String>, root: PageNode) -> Self {
        Self {
            url: url.into(),
            language,
            root,
        }
    }

    /// Parse a snapshot from JSON text.
    ///
    /// # Errors
    /// Returns an extraction error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| AppError::extraction("Invalid page snapshot", AppError::json_parse(e)))
    }

    /// Load a snapshot file.
    ///
    /// # Errors
    /// Returns an extraction error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::extraction(
                "Failed to read page snapshot",
                AppError::io(path.display().to_string(), e),
            )
        })?;

        tracing::debug!(path = %path.display(), bytes = content.len(), "Loaded page snapshot");
        Self::from_json(&content)
    }
}

#[async_trait]
impl DocumentAccessor for SnapshotDocument {
    async fn query(&self, selector: &Selector) -> Result<Option<PageNode>> {
        Ok(self
            .root
            .select_all_inclusive(selector)
            .into_iter()
            .next()
            .cloned())
    }

    async fn query_all(&self, selector: &Selector) -> Result<Vec<PageNode>> {
        Ok(self
            .root
            .select_all_inclusive(selector)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn language(&self) -> Result<Option<String>> {
        Ok(self.language.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageNode {
        PageNode::element("html").with_child(
            PageNode::element("body")
                .with_child(PageNode::element("p").with_class("a").with_text("one"))
                .with_child(
                    PageNode::element("div")
                        .with_child(PageNode::element("p").with_class("a").with_text("two")),
                ),
        )
    }

    #[test]
    fn test_select_all_document_order() {
        let root = page();
        let sel = Selector::parse("p.a").unwrap();
        let found: Vec<String> = root.select_all(&sel).iter().map(|n| n.text_content()).collect();
        assert_eq!(found, vec!["one", "two"]);
    }

    #[test]
    fn test_select_all_excludes_self() {
        let node = PageNode::element("div").with_child(PageNode::element("div"));
        let sel = Selector::parse("div").unwrap();
        assert_eq!(node.select_all(&sel).len(), 1);
        assert_eq!(node.select_all_inclusive(&sel).len(), 2);
    }

    #[test]
    fn test_outer_html_escapes() {
        let node = PageNode::element("p")
            .with_attr("title", "a \"b\"")
            .with_text("1 < 2 & 3");
        assert_eq!(
            node.outer_html(),
            "<p title=\"a &quot;b&quot;\">1 &lt; 2 &amp; 3</p>"
        );
    }

    #[test]
    fn test_snapshot_from_json() {
        let json = r#"{
            "url": "https://claude.ai/chat/abc",
            "language": "en",
            "root": {"tag": "html", "children": [
                {"tag": "title", "text": "Hello"}
            ]}
        }"#;
        let doc = SnapshotDocument::from_json(json).unwrap();
        assert_eq!(doc.language.as_deref(), Some("en"));
        assert_eq!(doc.root.children[0].text_content(), "Hello");
    }

    #[test]
    fn test_snapshot_invalid_json_is_extraction_error() {
        let err = SnapshotDocument::from_json("{not json").unwrap_err();
        assert!(matches!(err, AppError::Extraction { .. }));
    }

    #[tokio::test]
    async fn test_accessor_queries() {
        let doc = SnapshotDocument::new("https://x", None, page());
        let sel = Selector::parse("p").unwrap();
        assert_eq!(doc.query_all(&sel).await.unwrap().len(), 2);
        let first = doc.query(&sel).await.unwrap().unwrap();
        assert_eq!(first.text_content(), "one");
        assert!(doc.language().await.unwrap().is_none());
    }
}
