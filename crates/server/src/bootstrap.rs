use std::sync::Arc;
use std::time::Duration;

use holdwise_agent::AgentRuntime;
use holdwise_core::config::{AppConfig, ConfigError, LoadOptions};
use holdwise_core::errors::ApplicationError;
use holdwise_core::{AnalyticsRecorder, ApiKeyIdentityVerifier, ResponseCache};
use holdwise_db::{connect_with_settings, migrations, DbPool, SqlRowStore, SqlWatchlistRepository};
use thiserror::Error;
use tracing::info;

use crate::routes::QueryState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub query_state: QueryState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("agent runtime could not be assembled: {0}")]
    Agent(#[source] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store = Arc::new(SqlRowStore::new(db_pool.clone()));
    let runtime = AgentRuntime::from_config(
        &config,
        store.clone(),
        store,
        Some(Arc::new(SqlWatchlistRepository::new(db_pool.clone()))),
    )
    .await
    .map_err(BootstrapError::Agent)?;

    let verifier = ApiKeyIdentityVerifier::from_config(&config.auth);
    info!(
        event_name = "system.bootstrap.agent_ready",
        correlation_id = "bootstrap",
        tools = runtime.orchestrator().registry().len(),
        api_keys_configured = !verifier.is_empty(),
        "agent runtime ready"
    );

    let query_state = QueryState::new(
        Arc::new(runtime),
        Arc::new(ResponseCache::new(
            config.cache.capacity,
            Duration::from_secs(config.cache.ttl_secs),
        )),
        Arc::new(AnalyticsRecorder::new()),
        Arc::new(verifier),
    );

    Ok(Application { config, db_pool, query_state })
}
