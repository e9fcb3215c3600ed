use crate::llm::CompletionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Rate limit, quota or context-size exhaustion. Retrying will not help.
    QuotaOrSize,
    Other,
}

/// Decides how a completion failure terminates a conversation.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, error: &CompletionError) -> FailureClass;
}

pub const RATE_LIMIT_PHRASES: &[&str] =
    &["rate_limit_error", "rate limit", "too many requests", "quota exceeded", "insufficient_quota"];

pub const CONTEXT_LENGTH_PHRASES: &[&str] = &[
    "maximum context length",
    "context_length_exceeded",
    "context window",
    "token limit",
    "too many tokens",
    "prompt is too long",
];

/// Case-insensitive phrase matching over the rendered error, plus HTTP 429.
#[derive(Clone, Debug)]
pub struct PhraseClassifier {
    phrases: Vec<String>,
}

impl Default for PhraseClassifier {
    fn default() -> Self {
        Self::new(RATE_LIMIT_PHRASES.iter().chain(CONTEXT_LENGTH_PHRASES))
    }
}

impl PhraseClassifier {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { phrases: phrases.into_iter().map(|phrase| phrase.as_ref().to_lowercase()).collect() }
    }
}

impl FailureClassifier for PhraseClassifier {
    fn classify(&self, error: &CompletionError) -> FailureClass {
        if matches!(error, CompletionError::Provider { status: 429, .. }) {
            return FailureClass::QuotaOrSize;
        }

        let rendered = error.to_string().to_lowercase();
        if self.phrases.iter().any(|phrase| rendered.contains(phrase.as_str())) {
            FailureClass::QuotaOrSize
        } else {
            FailureClass::Other
        }
    }
}
