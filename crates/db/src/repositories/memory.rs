use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use holdwise_core::domain::identity::VerifiedIdentity;
use holdwise_core::domain::watchlist::{ItemType, NewWatchlistItem, WatchlistItem};
use holdwise_core::ports::{WatchlistError, WatchlistStore};

use super::watchlist::normalize;

/// Watchlists kept in process; reference names must be registered up front.
#[derive(Default)]
pub struct InMemoryWatchlistRepository {
    references: RwLock<HashMap<(ItemType, String), String>>,
    items: RwLock<Vec<WatchlistItem>>,
}

impl InMemoryWatchlistRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, item_type: ItemType, key: impl Into<String>, name: impl Into<String>) {
        let mut references = self.references.write().await;
        references.insert((item_type, key.into()), name.into());
    }
}

#[async_trait::async_trait]
impl WatchlistStore for InMemoryWatchlistRepository {
    async fn add_item(
        &self,
        identity: &VerifiedIdentity,
        item: NewWatchlistItem,
    ) -> Result<WatchlistItem, WatchlistError> {
        let item = normalize(item)?;

        let name = {
            let references = self.references.read().await;
            references.get(&(item.item_type, item.key.clone())).cloned()
        };
        let name = name.ok_or_else(|| {
            WatchlistError::NotFound(match item.item_type {
                ItemType::Manager => format!("Manager with CIK {} not found in database", item.key),
                ItemType::Security => {
                    format!("Security with CUSIP {} not found in database", item.key)
                }
            })
        })?;

        let mut items = self.items.write().await;
        let duplicate = items.iter().any(|existing| {
            existing.user_id == identity.user_id
                && existing.item_type == item.item_type
                && existing.key == item.key
        });
        if duplicate {
            return Err(WatchlistError::Conflict);
        }

        let saved = WatchlistItem {
            id: Uuid::new_v4().to_string(),
            user_id: identity.user_id.clone(),
            item_type: item.item_type,
            key: item.key,
            name,
            notes: item.notes,
            added_at: Utc::now(),
        };
        items.push(saved.clone());
        Ok(saved)
    }

    async fn list_items(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<Vec<WatchlistItem>, WatchlistError> {
        let items = self.items.read().await;
        Ok(items.iter().filter(|item| item.user_id == identity.user_id).cloned().collect())
    }
}
