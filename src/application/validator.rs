//! Conversation validation rules.
//!
//! Findings are either fatal (the export must not be produced) or warnings
//! (recorded on the export as parsing errors). Content is never modified
//! here; flagged markup is exported as-is.

use regex::Regex;

use crate::domain::{AppError, ConversationData, Result, Role, MAX_MESSAGE_CHARS};

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Warning,
}

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// All findings for one conversation.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub findings: Vec<Finding>,
}

impl ValidationOutcome {
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Fatal)
    }

    /// Messages of fatal findings.
    #[must_use]
    pub fn fatal_messages(&self) -> Vec<String> {
        self.messages(Severity::Fatal)
    }

    /// Messages of non-fatal findings.
    #[must_use]
    pub fn warning_messages(&self) -> Vec<String> {
        self.messages(Severity::Warning)
    }

    fn messages(&self, severity: Severity) -> Vec<String> {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .map(|f| f.message.clone())
            .collect()
    }

    /// Converts fatal findings into a validation error.
    ///
    /// # Errors
    /// `Validation` listing every fatal finding, if there is one.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.has_fatal() {
            return Err(AppError::Validation {
                violations: self.fatal_messages(),
            });
        }
        Ok(self.warning_messages())
    }
}

/// Checks conversations against the export rules.
#[derive(Debug, Clone)]
pub struct Validator {
    unsafe_patterns: Vec<Regex>,
}

impl Validator {
    /// Creates a validator with the built-in unsafe markup patterns.
    ///
    /// # Errors
    /// Returns a configuration error if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        let sources = [
            r"(?i)<\s*script\b",
            r"(?i)<\s*iframe\b",
            r"(?i)javascript\s*:",
            r"(?i)\bon(?:error|load|click|mouseover|focus)\s*=",
        ];

        let unsafe_patterns = sources
            .iter()
            .map(|source| {
                Regex::new(source).map_err(|e| AppError::Config {
                    message: format!("Invalid validation pattern '{source}': {e}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { unsafe_patterns })
    }

    /// Whether `content` looks like it carries executable markup.
    #[must_use]
    pub fn contains_unsafe_html(&self, content: &str) -> bool {
        self.unsafe_patterns.iter().any(|p| p.is_match(content))
    }

    /// Runs every rule against `data`.
    #[must_use]
    pub fn validate(&self, data: &ConversationData) -> ValidationOutcome {
        let mut findings = Vec::new();

        if data.title.trim().is_empty() {
            findings.push(Finding::fatal("Conversation title is empty"));
        }

        for (i, message) in data.messages.iter().enumerate() {
            let number = i + 1;

            if message.role == Role::Unknown {
                findings.push(Finding::fatal(format!(
                    "Message {number} has no recognized role"
                )));
            }

            if message.content.trim().is_empty() {
                findings.push(Finding::warning(format!("Message {number} is empty")));
            } else if message.content.chars().count() > MAX_MESSAGE_CHARS {
                findings.push(Finding::warning(format!(
                    "Message {number} exceeds {MAX_MESSAGE_CHARS} characters"
                )));
            }

            if self.contains_unsafe_html(&message.content) {
                findings.push(Finding::warning(format!(
                    "Message {number} contains potentially unsafe HTML"
                )));
            }
        }

        if let Some(first) = data.messages.first() {
            if first.role != Role::User {
                findings.push(Finding::warning(
                    "Conversation does not start with a user message",
                ));
            }
        }

        for (i, pair) in data.messages.windows(2).enumerate() {
            if pair[0].role == pair[1].role && pair[0].role != Role::Unknown {
                findings.push(Finding::warning(format!(
                    "Messages {} and {} are both from {}",
                    i + 1,
                    i + 2,
                    pair[0].role
                )));
            }
        }

        ValidationOutcome { findings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConversationMessage, ConversationMetadata, Site};
    use chrono::Utc;

    fn message(role: Role, content: &str) -> ConversationMessage {
        ConversationMessage {
            role,
            content: content.to_string(),
            timestamp: None,
            metadata: None,
        }
    }

    fn conversation(title: &str, messages: Vec<ConversationMessage>) -> ConversationData {
        ConversationData {
            title: title.to_string(),
            metadata: ConversationMetadata {
                site: Site::Chatgpt,
                url: "https://chatgpt.com/c/1".into(),
                conversation_id: Some("1".into()),
                total_messages: messages.len(),
                extracted_at: Utc::now(),
                language: None,
                is_completed: true,
            },
            messages,
        }
    }

    #[test]
    fn test_clean_conversation_has_no_findings() {
        let data = conversation(
            "Chat",
            vec![message(Role::User, "hi"), message(Role::Assistant, "hello")],
        );
        let outcome = Validator::new().unwrap().validate(&data);
        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn test_empty_title_is_fatal() {
        let data = conversation("   ", vec![message(Role::User, "hi")]);
        let err = Validator::new().unwrap().validate(&data).into_result().unwrap_err();
        assert!(matches!(err, AppError::Validation { ref violations } if violations.len() == 1));
    }

    #[test]
    fn test_unknown_role_is_fatal() {
        let data = conversation("Chat", vec![message(Role::Unknown, "hi")]);
        let outcome = Validator::new().unwrap().validate(&data);
        assert!(outcome.has_fatal());
        assert_eq!(outcome.fatal_messages(), vec!["Message 1 has no recognized role"]);
    }

    #[test]
    fn test_consecutive_roles_are_warnings() {
        let data = conversation(
            "Chat",
            vec![
                message(Role::User, "q"),
                message(Role::Assistant, "a"),
                message(Role::Assistant, "b"),
            ],
        );
        let warnings = Validator::new().unwrap().validate(&data).into_result().unwrap();
        assert_eq!(warnings, vec!["Messages 2 and 3 are both from Assistant"]);
    }

    #[test]
    fn test_assistant_first_is_warning() {
        let data = conversation("Chat", vec![message(Role::Assistant, "hello")]);
        let warnings = Validator::new().unwrap().validate(&data).into_result().unwrap();
        assert_eq!(warnings, vec!["Conversation does not start with a user message"]);
    }

    #[test]
    fn test_unsafe_html_patterns() {
        let validator = Validator::new().unwrap();
        assert!(validator.contains_unsafe_html("<script>alert(1)</script>"));
        assert!(validator.contains_unsafe_html("<a href=\"JavaScript:void(0)\">x</a>"));
        assert!(validator.contains_unsafe_html("<img src=x onerror=alert(1)>"));
        assert!(!validator.contains_unsafe_html("Use a <div> with a description"));

        let data = conversation("Chat", vec![message(Role::User, "<script>x</script>")]);
        let warnings = validator.validate(&data).into_result().unwrap();
        assert_eq!(warnings, vec!["Message 1 contains potentially unsafe HTML"]);
    }
}
