use std::fmt::Write as _;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use holdwise_core::ports::{ColumnSchema, Row, RowStore, SchemaSource, StoreError, TableSchema};
use holdwise_core::sql::SanitizedQuery;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteRow;
use sqlx::Sqlite;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::DbPool;

/// VM steps between deadline checks.
const PROGRESS_HANDLER_STEPS: i32 = 1_000;

/// Extra wait past the deadline before the connection is given up on.
const DEADLINE_GRACE: Duration = Duration::from_secs(2);

const SQLITE_INTERRUPT: &str = "9";

/// Executes sanitized queries on a dedicated pooled connection with
/// `PRAGMA query_only` set and an engine-side deadline installed for the
/// duration of the statement.
#[derive(Clone)]
pub struct SqlRowStore {
    pool: DbPool,
}

impl SqlRowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl RowStore for SqlRowStore {
    async fn fetch(
        &self,
        query: &SanitizedQuery,
        max_rows: usize,
        timeout: Duration,
    ) -> Result<Vec<Row>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;
        sqlx::query("PRAGMA query_only = ON").execute(&mut *conn).await.map_err(store_error)?;

        // SQLite checks the deadline between VM steps and interrupts the
        // statement itself once it has passed.
        let deadline = Instant::now().checked_add(timeout);
        conn.lock_handle().await.map_err(store_error)?.set_progress_handler(
            PROGRESS_HANDLER_STEPS,
            move || deadline.map_or(true, |deadline| Instant::now() < deadline),
        );

        let fetched = tokio::time::timeout(
            timeout.saturating_add(DEADLINE_GRACE),
            sqlx::query(query.as_str()).fetch_all(&mut *conn),
        )
        .await;

        let result = match fetched {
            Ok(Err(error)) if is_interrupted(&error) => Err(StoreError::Timeout(timeout)),
            Ok(result) => result.map_err(store_error),
            Err(_) => {
                // The worker never came back; the connection cannot be trusted.
                warn!(
                    event_name = "db.query.unresponsive",
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "statement ignored its deadline, discarding connection"
                );
                drop(conn.detach());
                return Err(StoreError::Timeout(timeout));
            }
        };

        if let Err(error) = reset_connection(&mut conn).await {
            warn!(
                event_name = "db.connection.reset_failed",
                error = %error,
                "could not restore connection state, discarding connection"
            );
            drop(conn.detach());
        }

        if let Err(StoreError::Timeout(_)) = &result {
            warn!(
                event_name = "db.query.timeout",
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "statement interrupted at its deadline"
            );
        }

        let rows = result?;
        debug!(event_name = "db.query.fetched", row_count = rows.len(), "query fetched");
        rows.iter().take(max_rows).map(decode_row).collect()
    }
}

#[async_trait]
impl SchemaSource for SqlRowStore {
    async fn tables(&self) -> Result<Vec<TableSchema>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = sqlx::query(
                "SELECT name, type, \"notnull\" AS not_null, pk FROM pragma_table_info(?) ORDER BY cid",
            )
            .bind(&name)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?
            .iter()
            .map(|row| {
                Ok(ColumnSchema {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                    nullable: row.try_get::<i64, _>("not_null")? == 0,
                    primary_key: row.try_get::<i64, _>("pk")? > 0,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(store_error)?;

            tables.push(TableSchema { name, columns });
        }

        Ok(tables)
    }
}

/// Clears the progress handler and `query_only` so the connection can go
/// back to the pool.
async fn reset_connection(conn: &mut PoolConnection<Sqlite>) -> Result<(), sqlx::Error> {
    conn.lock_handle().await?.remove_progress_handler();
    sqlx::query("PRAGMA query_only = OFF").execute(&mut **conn).await?;
    Ok(())
}

fn is_interrupted(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(database) if database.code().as_deref() == Some(SQLITE_INTERRUPT))
}

fn store_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Database(database) => StoreError::Database(database.message().to_string()),
        other => StoreError::Database(other.to_string()),
    }
}

/// Maps a row to JSON using each value's runtime storage class, so computed
/// columns like `COUNT(*)` decode without a declared type.
fn decode_row(row: &SqliteRow) -> Result<Row, StoreError> {
    let mut decoded = Row::new();

    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index).map_err(store_error)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(index).map_err(store_error)?),
                "REAL" => {
                    let real = row.try_get_unchecked::<f64, _>(index).map_err(store_error)?;
                    serde_json::Number::from_f64(real).map_or(Value::Null, Value::Number)
                }
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index).map_err(store_error)?;
                    Value::String(hex(&bytes))
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(index).map_err(store_error)?),
            }
        };

        decoded.insert(column.name().to_string(), value);
    }

    Ok(decoded)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use holdwise_core::ports::{RowStore, SchemaSource, StoreError};
    use holdwise_core::sql::validate;
    use serde_json::json;

    use super::{hex, SqlRowStore};
    use crate::{connect_with_settings, migrations::run_pending, SampleDataset};

    async fn seeded_store() -> SqlRowStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SampleDataset::load(&pool).await.expect("seed");
        SqlRowStore::new(pool)
    }

    #[tokio::test]
    async fn fetch_decodes_by_storage_class() {
        let store = seeded_store().await;
        let query = validate(
            "SELECT m.name, COUNT(*) AS positions, SUM(h.value) / 1e9 AS billions, h.put_call
             FROM holdings h JOIN filings f ON f.accession_number = h.accession_number
             JOIN managers m ON m.cik = f.cik
             WHERE m.cik = '0001067983' GROUP BY m.name",
            1000,
        )
        .expect("valid query");

        let rows = store.fetch(&query, 1000, Duration::from_secs(5)).await.expect("fetch");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("BERKSHIRE HATHAWAY INC"));
        assert_eq!(rows[0]["positions"], json!(3));
        assert_eq!(rows[0]["billions"], json!(116.025));
        assert_eq!(rows[0]["put_call"], json!(null));
    }

    #[tokio::test]
    async fn fetch_truncates_to_max_rows() {
        let store = seeded_store().await;
        let query = validate("SELECT id FROM holdings ORDER BY id", 1000).expect("valid query");

        let rows = store.fetch(&query, 2, Duration::from_secs(5)).await.expect("fetch");
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn engine_errors_are_reported_and_connection_is_reusable() {
        let store = seeded_store().await;
        let bad = validate("SELECT no_such_column FROM managers", 1000).expect("passes validation");

        let error = store.fetch(&bad, 10, Duration::from_secs(5)).await;
        assert!(matches!(error, Err(StoreError::Database(ref message)) if message.contains("no_such_column")));

        let good = validate("SELECT COUNT(*) AS n FROM managers", 1000).expect("valid query");
        let rows = store.fetch(&good, 10, Duration::from_secs(5)).await.expect("pool still works");
        assert_eq!(rows[0]["n"], json!(3));
    }

    #[tokio::test]
    async fn query_only_is_cleared_after_fetch() {
        let store = seeded_store().await;
        let query = validate("SELECT cik FROM managers", 1000).expect("valid query");
        store.fetch(&query, 10, Duration::from_secs(5)).await.expect("fetch");

        let flag: i64 =
            sqlx::query_scalar("PRAGMA query_only").fetch_one(store.pool()).await.expect("pragma");
        assert_eq!(flag, 0);
    }

    #[tokio::test]
    async fn schema_lists_tables_and_columns() {
        let store = seeded_store().await;
        let tables = store.tables().await.expect("introspect");

        let names: Vec<_> = tables.iter().map(|table| table.name.as_str()).collect();
        assert_eq!(names, vec!["filings", "holdings", "issuers", "managers", "watchlist_items"]);

        let managers = tables.iter().find(|table| table.name == "managers").expect("managers");
        assert_eq!(managers.columns.len(), 2);
        assert_eq!(managers.columns[0].name, "cik");
        assert!(managers.columns[0].primary_key);
        assert!(!managers.columns[1].nullable);

        let issuers = tables.iter().find(|table| table.name == "issuers").expect("issuers");
        let figi = issuers.columns.iter().find(|column| column.name == "figi").expect("figi");
        assert!(figi.nullable);
        assert_eq!(figi.data_type, "TEXT");
    }

    #[test]
    fn blobs_render_as_hex() {
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00ab10");
    }
}
