use std::sync::Arc;

use holdwise_agent::{AgentRequest, AgentRuntime, Outcome};
use holdwise_core::config::{AppConfig, LoadOptions};
use holdwise_core::{ApiKeyIdentityVerifier, IdentityVerifier, Question};
use holdwise_db::{SqlRowStore, SqlWatchlistRepository};
use tokio_util::sync::CancellationToken;

use crate::commands::{async_runtime, load_config, open_database, CommandResult, Failure};

const COMMAND: &str = "ask";

#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub include_sql: bool,
    pub include_rows: bool,
    /// Bearer key from `auth.api_keys`; without it the watchlist tool is unavailable.
    pub api_key: Option<String>,
}

/// Answers one question against the configured database and completion service
/// and prints the outcome as JSON. Exit code 1 means the agent could not answer.
pub fn run(question: &str, options: AskOptions) -> CommandResult {
    let question = match Question::parse(question) {
        Ok(question) => question,
        Err(error) => return CommandResult::failure(COMMAND, "invalid_question", error.to_string(), 2),
    };

    let result = load_config(LoadOptions::default()).and_then(|config| {
        init_logging(&config);
        async_runtime()?.block_on(answer(&config, question, options))
    });

    match result {
        Ok(outcome) => render(&outcome),
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}

async fn answer(config: &AppConfig, question: Question, options: AskOptions) -> Result<Outcome, Failure> {
    let pool = open_database(config).await?;
    let store = Arc::new(SqlRowStore::new(pool.clone()));
    let runtime = AgentRuntime::from_config(
        config,
        store.clone(),
        store,
        Some(Arc::new(SqlWatchlistRepository::new(pool.clone()))),
    )
    .await
    .map_err(|error| ("agent_init", error.to_string(), 6))?;

    let identity = match options.api_key.as_deref() {
        Some(key) => Some(
            ApiKeyIdentityVerifier::from_config(&config.auth)
                .verify(key)
                .await
                .ok_or(("auth", "api key is not configured in auth.api_keys".to_string(), 2))?,
        ),
        None => None,
    };

    let request = AgentRequest::new(question, "cli")
        .with_identity(identity)
        .include_sql(options.include_sql)
        .include_rows(options.include_rows);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = runtime.answer(&request, &cancel).await;
    watcher.abort();
    pool.close().await;
    Ok(outcome)
}

fn render(outcome: &Outcome) -> CommandResult {
    match serde_json::to_string_pretty(outcome) {
        Ok(output) => CommandResult { exit_code: if outcome.success { 0 } else { 1 }, output },
        Err(error) => CommandResult::failure(COMMAND, "serialization", error.to_string(), 3),
    }
}

// Events go to stderr so stdout stays parseable.
fn init_logging(config: &AppConfig) {
    use holdwise_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}
