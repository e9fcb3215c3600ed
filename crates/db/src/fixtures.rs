use serde::Serialize;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Deterministic Form 13F sample: three managers, four issuers, one filing
/// per manager and seven holdings.
pub struct SampleDataset;

impl SampleDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/sample_13f.sql");

    pub const EXPECTED: DatasetCounts =
        DatasetCounts { managers: 3, issuers: 4, filings: 3, holdings: 7 };

    pub async fn load(pool: &DbPool) -> Result<DatasetCounts, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Self::counts(pool).await
    }

    pub async fn counts(pool: &DbPool) -> Result<DatasetCounts, RepositoryError> {
        Ok(DatasetCounts {
            managers: count(pool, "managers").await?,
            issuers: count(pool, "issuers").await?,
            filings: count(pool, "filings").await?,
            holdings: count(pool, "holdings").await?,
        })
    }

    /// Removes every Form 13F row; watchlists are left untouched.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for table in ["holdings", "filings", "issuers", "managers"] {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DatasetCounts {
    pub managers: i64,
    pub issuers: i64,
    pub filings: i64,
    pub holdings: i64,
}

async fn count(pool: &DbPool, table: &'static str) -> Result<i64, RepositoryError> {
    let total = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}")).fetch_one(pool).await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::SampleDataset;
    use crate::{connect_with_settings, migrations::run_pending};

    #[tokio::test]
    async fn sample_dataset_loads_and_cleans() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let counts = SampleDataset::load(&pool).await.expect("load");
        assert_eq!(counts, SampleDataset::EXPECTED);

        SampleDataset::clean(&pool).await.expect("clean");
        let after = SampleDataset::counts(&pool).await.expect("counts");
        assert_eq!(after.holdings, 0);
        assert_eq!(after.managers, 0);
    }
}
