use std::time::Duration;

use holdwise_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens a pool whose connections enforce foreign keys and wait on locks.
///
/// In-memory databases are private to each connection, so callers that use
/// `sqlite::memory:` should pass `max_connections = 1`.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&normalize_url(database_url))
        .await
}

// `:memory:` is accepted by config validation but sqlx wants a scheme.
fn normalize_url(database_url: &str) -> String {
    match database_url.trim() {
        ":memory:" => "sqlite::memory:".to_string(),
        url if url.starts_with("sqlite://") && !url.contains('?') && !url.contains(":memory:") => {
            format!("{url}?mode=rwc")
        }
        url => url.to_string(),
    }
}
