//! Collaborator interfaces consumed by the tools and the orchestrator.
//!
//! Implementations live in `holdwise-db` (row store, schema, watchlists), in
//! `holdwise-agent` (HTTP snippet index) and in [`crate::auth`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::identity::VerifiedIdentity;
use crate::domain::watchlist::{NewWatchlistItem, WatchlistItem};
use crate::sql::SanitizedQuery;

/// One materialized result row, column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("query exceeded the {0:?} statement timeout")]
    Timeout(Duration),
    #[error("{0}")]
    Database(String),
}

#[async_trait]
pub trait RowStore: Send + Sync {
    /// Runs exactly `query` read-only, returning at most `max_rows` rows.
    /// The connection is released on every exit path, including timeout.
    async fn fetch(
        &self,
        query: &SanitizedQuery,
        max_rows: usize,
        timeout: Duration,
    ) -> Result<Vec<Row>, StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn tables(&self) -> Result<Vec<TableSchema>, StoreError>;
}

/// Section tags understood by the filing-text index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    CoverPageInfo,
    ExplanatoryNotes,
    AmendmentInfo,
    OtherDocuments,
}

impl ContentType {
    pub const ALL: [ContentType; 4] =
        [Self::CoverPageInfo, Self::ExplanatoryNotes, Self::AmendmentInfo, Self::OtherDocuments];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CoverPageInfo => "cover_page_info",
            Self::ExplanatoryNotes => "explanatory_notes",
            Self::AmendmentInfo => "amendment_info",
            Self::OtherDocuments => "other_documents",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.accession.is_none() && self.content_type.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    /// Accession number of the filing the text came from.
    pub source_id: String,
    pub section_tag: String,
    pub score: f64,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("search timed out")]
    Timeout,
    #[error("search service error: {0}")]
    Service(String),
}

#[async_trait]
pub trait SnippetIndex: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<Snippet>, IndexError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WatchlistError {
    #[error("This item is already in your watchlist")]
    Conflict,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("watchlist storage failure: {0}")]
    Storage(String),
}

#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Adds an item for `identity`. A duplicate `(user, item_type, key)` is a
    /// [`WatchlistError::Conflict`].
    async fn add_item(
        &self,
        identity: &VerifiedIdentity,
        item: NewWatchlistItem,
    ) -> Result<WatchlistItem, WatchlistError>;

    async fn list_items(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<Vec<WatchlistItem>, WatchlistError>;
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Option<VerifiedIdentity>;
}

#[cfg(test)]
mod tests {
    use super::ContentType;

    #[test]
    fn content_type_names_round_trip_through_serde() {
        for kind in ContentType::ALL {
            let encoded = serde_json::to_value(kind).unwrap_or_default();
            assert_eq!(encoded, serde_json::Value::String(kind.as_str().to_string()));
            assert_eq!(ContentType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ContentType::parse("holdings"), None);
    }
}
