pub mod analytics;
pub mod auth;
pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod sql;

pub use analytics::{AnalyticsRecorder, AnalyticsSnapshot, QueryRecord};
pub use auth::ApiKeyIdentityVerifier;
pub use cache::{CacheStats, ResponseCache};
pub use domain::conversation::{HistoryEntry, HistoryRole, Question};
pub use domain::identity::VerifiedIdentity;
pub use domain::watchlist::{ItemType, NewWatchlistItem, WatchlistItem};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ports::{
    ColumnSchema, ContentType, IdentityVerifier, IndexError, Row, RowStore, SchemaSource,
    SearchFilters, Snippet, SnippetIndex, StoreError, TableSchema, WatchlistError, WatchlistStore,
};
pub use sql::{SafetyError, SanitizedQuery, SqlValidator};
