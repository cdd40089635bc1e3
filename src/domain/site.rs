//! Per-provider page profiles.
//!
//! Everything that differs between chat providers lives in a `SiteProfile`
//! record, so adding a provider means adding a record rather than a branch.

use super::models::Site;

/// Selector set and defaults for one chat provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteProfile {
    /// Provider this profile describes.
    pub site: Site,
    /// Nodes that may hold the conversation title, most specific first.
    pub title_selectors: &'static [&'static str],
    /// Nodes holding one conversation turn each, in reading order.
    pub turn_selector: &'static str,
    /// Message body inside a turn. The whole turn is used when absent.
    pub content_selector: Option<&'static str>,
    /// Title used when the page has none.
    pub default_title: &'static str,
    /// Present only while a response is still being generated.
    pub in_progress_selector: &'static str,
    /// URL path segment preceding the conversation id.
    pub conversation_path_prefix: &'static str,
}

const CHATGPT: SiteProfile = SiteProfile {
    site: Site::Chatgpt,
    title_selectors: &["[data-testid=conversation-title]", "title"],
    turn_selector: "[data-testid^=conversation-turn]",
    content_selector: Some(".markdown, .whitespace-pre-wrap"),
    default_title: "ChatGPT Conversation",
    in_progress_selector: ".result-streaming, [data-testid=stop-button]",
    conversation_path_prefix: "/c/",
};

const CLAUDE: SiteProfile = SiteProfile {
    site: Site::Claude,
    title_selectors: &["[data-testid=chat-menu-trigger]", "title"],
    turn_selector: "[data-testid=user-message], .font-claude-message",
    content_selector: None,
    default_title: "Claude Conversation",
    in_progress_selector: "[data-is-streaming=true]",
    conversation_path_prefix: "/chat/",
};

const GEMINI: SiteProfile = SiteProfile {
    site: Site::Gemini,
    title_selectors: &[".conversation-title", "title"],
    turn_selector: "user-query, model-response",
    content_selector: Some(".query-text, message-content"),
    default_title: "Gemini Conversation",
    in_progress_selector: "[aria-busy=true], .loading-indicator",
    conversation_path_prefix: "/app/",
};

impl SiteProfile {
    /// Profile for a provider.
    #[must_use]
    pub const fn for_site(site: Site) -> &'static Self {
        match site {
            Site::Chatgpt => &CHATGPT,
            Site::Claude => &CLAUDE,
            Site::Gemini => &GEMINI,
        }
    }

    /// Parses the conversation id out of a page URL.
    ///
    /// The id is the path segment right after the provider's prefix.
    #[must_use]
    pub fn conversation_id(&self, url: &str) -> Option<String> {
        let path = url
            .split_once("://")
            .map_or(url, |(_, rest)| rest.find('/').map_or("", |i| &rest[i..]));
        let path = path.split(['?', '#']).next().unwrap_or_default();

        let id = path
            .strip_prefix(self.conversation_path_prefix)?
            .split('/')
            .next()
            .filter(|segment| !segment.is_empty())?;

        Some(id.to_string())
    }
}

/// Strips query string and fragment from a page URL.
#[must_use]
pub fn canonical_url(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_per_site() {
        let chatgpt = SiteProfile::for_site(Site::Chatgpt);
        assert_eq!(
            chatgpt.conversation_id("https://chatgpt.com/c/6751-abcd?model=gpt-4o"),
            Some("6751-abcd".to_string())
        );

        let claude = SiteProfile::for_site(Site::Claude);
        assert_eq!(
            claude.conversation_id("https://claude.ai/chat/9f1c/extra"),
            Some("9f1c".to_string())
        );

        let gemini = SiteProfile::for_site(Site::Gemini);
        assert_eq!(
            gemini.conversation_id("https://gemini.google.com/app/77aa#top"),
            Some("77aa".to_string())
        );
    }

    #[test]
    fn test_conversation_id_missing() {
        let chatgpt = SiteProfile::for_site(Site::Chatgpt);
        assert_eq!(chatgpt.conversation_id("https://chatgpt.com/"), None);
        assert_eq!(chatgpt.conversation_id("https://chatgpt.com/c/"), None);
        assert_eq!(chatgpt.conversation_id("https://chatgpt.com"), None);
    }

    #[test]
    fn test_canonical_url() {
        assert_eq!(
            canonical_url("https://claude.ai/chat/1?ref=x#msg-3"),
            "https://claude.ai/chat/1"
        );
        assert_eq!(canonical_url("https://claude.ai/chat/1"), "https://claude.ai/chat/1");
    }
}
