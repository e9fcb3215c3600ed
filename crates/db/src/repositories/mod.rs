use holdwise_core::ports::WatchlistError;
use thiserror::Error;

pub mod memory;
pub mod watchlist;

pub use memory::InMemoryWatchlistRepository;
pub use watchlist::SqlWatchlistRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for WatchlistError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(sqlx::Error::Database(database))
                if database.is_unique_violation() =>
            {
                WatchlistError::Conflict
            }
            other => WatchlistError::Storage(other.to_string()),
        }
    }
}
