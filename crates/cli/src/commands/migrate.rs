use holdwise_core::config::LoadOptions;

use crate::commands::{async_runtime, load_config, open_database, CommandResult, Failure};

const COMMAND: &str = "migrate";

pub fn run() -> CommandResult {
    let result = load_config(LoadOptions::default()).and_then(|config| {
        async_runtime()?.block_on(async {
            let pool = open_database(&config).await?;
            pool.close().await;
            Ok::<(), Failure>(())
        })
    });

    match result {
        Ok(()) => CommandResult::success(COMMAND, "applied pending migrations"),
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}
