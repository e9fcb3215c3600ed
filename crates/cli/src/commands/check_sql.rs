use holdwise_core::config::LoadOptions;
use holdwise_core::sql::{SafetyError, SqlValidator};

use crate::commands::{load_config, CommandResult};

const COMMAND: &str = "check-sql";

/// Validates `sql` against the configured table whitelist and row ceiling.
pub fn run(sql: &str, max_limit: Option<u32>) -> CommandResult {
    let config = match load_config(LoadOptions::default()) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure(COMMAND, failure),
    };

    let validator = SqlValidator::new(&config.agent.allowed_tables);
    check(&validator, sql, max_limit.unwrap_or(config.agent.max_rows))
}

pub fn check(validator: &SqlValidator, sql: &str, max_limit: u32) -> CommandResult {
    match validator.validate(sql, max_limit) {
        Ok(sanitized) => CommandResult::success(COMMAND, sanitized.into_string()),
        Err(error) => CommandResult::failure(COMMAND, rejection_class(&error), error.to_string(), 1),
    }
}

fn rejection_class(error: &SafetyError) -> &'static str {
    match error {
        SafetyError::Empty => "empty",
        SafetyError::MultipleStatements => "multiple_statements",
        SafetyError::NotSelect { .. } => "not_select",
        SafetyError::ForbiddenKeyword { .. } => "forbidden_keyword",
        SafetyError::NoTables => "no_tables",
        SafetyError::DisallowedTables { .. } => "disallowed_tables",
        SafetyError::LimitTooLarge { .. } => "limit_too_large",
        SafetyError::InvalidLimit { .. } => "invalid_limit",
        SafetyError::UnterminatedLiteral => "unterminated_literal",
    }
}
