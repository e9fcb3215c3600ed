use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use holdwise_core::domain::identity::VerifiedIdentity;
use holdwise_core::domain::watchlist::{ItemType, NewWatchlistItem, WatchlistItem};
use holdwise_core::ports::{WatchlistError, WatchlistStore};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlWatchlistRepository {
    pool: DbPool,
}

impl SqlWatchlistRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn reference_name(&self, item: &NewWatchlistItem) -> Result<String, WatchlistError> {
        let (sql, missing) = match item.item_type {
            ItemType::Manager => (
                "SELECT name FROM managers WHERE cik = ?",
                format!("Manager with CIK {} not found in database", item.key),
            ),
            ItemType::Security => (
                "SELECT name FROM issuers WHERE cusip = ?",
                format!("Security with CUSIP {} not found in database", item.key),
            ),
        };

        let name: Option<String> = sqlx::query_scalar(sql)
            .bind(&item.key)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        name.ok_or(WatchlistError::NotFound(missing))
    }
}

pub(crate) fn normalize(item: NewWatchlistItem) -> Result<NewWatchlistItem, WatchlistError> {
    let key = item.key.trim().to_string();
    if key.is_empty() {
        return Err(WatchlistError::Invalid(format!(
            "{} is required when item_type is '{}'",
            item.item_type.key_field(),
            item.item_type
        )));
    }
    let notes = item.notes.map(|notes| notes.trim().to_string()).filter(|notes| !notes.is_empty());
    Ok(NewWatchlistItem { item_type: item.item_type, key, notes })
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<WatchlistItem, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let item_type: String = row.try_get("item_type").map_err(decode)?;
    let added_at: String = row.try_get("added_at").map_err(decode)?;

    Ok(WatchlistItem {
        id: row.try_get("id").map_err(decode)?,
        user_id: row.try_get("user_id").map_err(decode)?,
        item_type: item_type.parse().map_err(RepositoryError::Decode)?,
        key: row.try_get("item_key").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        notes: row.try_get("notes").map_err(decode)?,
        added_at: DateTime::parse_from_rfc3339(&added_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
    })
}

#[async_trait]
impl WatchlistStore for SqlWatchlistRepository {
    async fn add_item(
        &self,
        identity: &VerifiedIdentity,
        item: NewWatchlistItem,
    ) -> Result<WatchlistItem, WatchlistError> {
        let item = normalize(item)?;

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM watchlist_items
             WHERE user_id = ? AND item_type = ? AND item_key = ?",
        )
        .bind(&identity.user_id)
        .bind(item.item_type.as_str())
        .bind(&item.key)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        if existing > 0 {
            return Err(WatchlistError::Conflict);
        }

        let name = self.reference_name(&item).await?;
        let saved = WatchlistItem {
            id: Uuid::new_v4().to_string(),
            user_id: identity.user_id.clone(),
            item_type: item.item_type,
            key: item.key,
            name,
            notes: item.notes,
            added_at: Utc::now(),
        };

        // The UNIQUE constraint still guards a concurrent insert of the same key.
        sqlx::query(
            "INSERT INTO watchlist_items (id, user_id, item_type, item_key, name, notes, added_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&saved.id)
        .bind(&saved.user_id)
        .bind(saved.item_type.as_str())
        .bind(&saved.key)
        .bind(&saved.name)
        .bind(&saved.notes)
        .bind(saved.added_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        info!(
            event_name = "watchlist.item.added",
            user_id = %saved.user_id,
            item_type = %saved.item_type,
            item_key = %saved.key,
            "watchlist item added"
        );
        Ok(saved)
    }

    async fn list_items(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<Vec<WatchlistItem>, WatchlistError> {
        let rows = sqlx::query(
            "SELECT id, user_id, item_type, item_key, name, notes, added_at
             FROM watchlist_items WHERE user_id = ? ORDER BY added_at, id",
        )
        .bind(&identity.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.iter().map(|row| row_to_item(row).map_err(WatchlistError::from)).collect()
    }
}
