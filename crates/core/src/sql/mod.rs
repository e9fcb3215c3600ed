//! Safety gate for model-authored SQL.

pub mod tokenizer;
pub mod validator;

pub use validator::{
    validate, SafetyError, SanitizedQuery, SqlValidator, DEFAULT_ALLOWED_TABLES, DEFAULT_MAX_LIMIT,
    DENIED_KEYWORDS,
};
