use holdwise_core::config::LoadOptions;
use holdwise_db::{DatasetCounts, SampleDataset};

use crate::commands::{async_runtime, load_config, open_database, CommandResult, Failure};

const COMMAND: &str = "seed";

#[derive(Debug, PartialEq, Eq)]
enum SeedAction {
    Load,
    AlreadyLoaded,
    Replace,
    Refuse,
}

/// Loads the sample Form 13F dataset into the configured database.
///
/// A database that already holds the sample is left alone. Any other rows are
/// only replaced when `reset` is set.
pub fn run(reset: bool) -> CommandResult {
    let result = load_config(LoadOptions::default()).and_then(|config| {
        async_runtime()?.block_on(async {
            let pool = open_database(&config).await?;
            let outcome = seed(&pool, reset).await;
            pool.close().await;
            outcome
        })
    });

    match result {
        Ok(message) => CommandResult::success(COMMAND, message),
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}

async fn seed(pool: &holdwise_db::DbPool, reset: bool) -> Result<String, Failure> {
    let existing = SampleDataset::counts(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 6))?;

    match plan(existing, reset) {
        SeedAction::AlreadyLoaded => Ok(format!("sample dataset already present: {}", describe(existing))),
        SeedAction::Refuse => Err((
            "seed_conflict",
            format!(
                "database already holds Form 13F rows ({}); pass --reset to replace them",
                describe(existing)
            ),
            6,
        )),
        action => {
            if action == SeedAction::Replace {
                SampleDataset::clean(pool)
                    .await
                    .map_err(|error| ("seed_execution", error.to_string(), 6))?;
            }
            let loaded = SampleDataset::load(pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 6))?;
            if loaded != SampleDataset::EXPECTED {
                return Err((
                    "seed_verification",
                    format!("unexpected row counts after load: {}", describe(loaded)),
                    7,
                ));
            }
            Ok(format!("sample dataset loaded: {}", describe(loaded)))
        }
    }
}

fn plan(existing: DatasetCounts, reset: bool) -> SeedAction {
    let empty = existing == DatasetCounts { managers: 0, issuers: 0, filings: 0, holdings: 0 };
    if empty {
        SeedAction::Load
    } else if reset {
        SeedAction::Replace
    } else if existing == SampleDataset::EXPECTED {
        SeedAction::AlreadyLoaded
    } else {
        SeedAction::Refuse
    }
}

fn describe(counts: DatasetCounts) -> String {
    format!(
        "{} managers, {} issuers, {} filings, {} holdings",
        counts.managers, counts.issuers, counts.filings, counts.holdings
    )
}

#[cfg(test)]
mod tests {
    use holdwise_db::{DatasetCounts, SampleDataset};

    use super::{describe, plan, SeedAction};

    #[test]
    fn plan_follows_existing_rows_and_reset_flag() {
        let empty = DatasetCounts { managers: 0, issuers: 0, filings: 0, holdings: 0 };
        let foreign = DatasetCounts { managers: 40, issuers: 900, filings: 80, holdings: 12_000 };

        assert_eq!(plan(empty, false), SeedAction::Load);
        assert_eq!(plan(empty, true), SeedAction::Load);
        assert_eq!(plan(SampleDataset::EXPECTED, false), SeedAction::AlreadyLoaded);
        assert_eq!(plan(SampleDataset::EXPECTED, true), SeedAction::Replace);
        assert_eq!(plan(foreign, false), SeedAction::Refuse);
        assert_eq!(plan(foreign, true), SeedAction::Replace);
    }

    #[test]
    fn description_lists_every_table() {
        assert_eq!(
            describe(SampleDataset::EXPECTED),
            "3 managers, 4 issuers, 3 filings, 7 holdings"
        );
    }
}
