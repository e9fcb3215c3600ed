use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const QUESTION_MIN_CHARS: usize = 3;
pub const QUESTION_MAX_CHARS: usize = 500;

/// A caller question that passed the length bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Question(String);

impl Question {
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        let actual = raw.trim().chars().count();
        if !(QUESTION_MIN_CHARS..=QUESTION_MAX_CHARS).contains(&actual) {
            return Err(DomainError::QuestionLength {
                min: QUESTION_MIN_CHARS,
                max: QUESTION_MAX_CHARS,
                actual,
            });
        }
        Ok(Self(raw.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix used in logs and analytics.
    pub fn preview(&self) -> String {
        truncate_chars(&self.0, 100)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    System,
    User,
    Assistant,
}

/// One carried-over turn supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: HistoryRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: HistoryRole::Assistant, content: content.into() }
    }

    /// Parses a raw `{role, content}` pair; `index` names the entry in errors.
    pub fn parse(index: usize, role: &str, content: impl Into<String>) -> Result<Self, DomainError> {
        let role = match role.trim().to_ascii_lowercase().as_str() {
            "system" => HistoryRole::System,
            "user" => HistoryRole::User,
            "assistant" => HistoryRole::Assistant,
            other => return Err(DomainError::HistoryRole { index, role: other.to_string() }),
        };
        Ok(Self { role, content: content.into() })
    }
}

pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::{HistoryEntry, HistoryRole, Question};
    use crate::errors::DomainError;

    #[test]
    fn question_bounds_are_inclusive() {
        assert!(Question::parse("abc").is_ok());
        assert!(Question::parse("a".repeat(500)).is_ok());
        assert_eq!(
            Question::parse("  ab  "),
            Err(DomainError::QuestionLength { min: 3, max: 500, actual: 2 })
        );
        assert!(Question::parse("a".repeat(501)).is_err());
    }

    #[test]
    fn question_is_trimmed_and_previewed() {
        let question = Question::parse(format!("  {}  ", "x".repeat(150))).unwrap_or_else(|err| {
            panic!("question should parse: {err}");
        });
        assert_eq!(question.as_str().len(), 150);
        assert_eq!(question.preview().len(), 100);
    }

    #[test]
    fn history_roles_are_case_insensitive_and_closed() {
        let entry = HistoryEntry::parse(0, "Assistant", "hi");
        assert_eq!(entry.map(|entry| entry.role), Ok(HistoryRole::Assistant));

        assert_eq!(
            HistoryEntry::parse(3, "tool", "{}"),
            Err(DomainError::HistoryRole { index: 3, role: "tool".to_string() })
        );
    }
}
