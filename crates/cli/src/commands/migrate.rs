use cheers_db::migrations;

use crate::commands::{async_runtime, connect, load_config, CommandResult, Failure};

/// Applies pending migrations, or with `status_only` just reports progress.
pub fn run(status_only: bool) -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        if !status_only {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| Failure::new("migration", error, 5))?;
        }
        let status =
            migrations::status(&pool).await.map_err(|error| Failure::new("migration", error, 5));
        pool.close().await;
        status
    });

    match result {
        Ok((known, applied)) if status_only => {
            CommandResult::success("migrate", format!("{applied} of {known} migrations applied"))
        }
        Ok((known, _)) => {
            CommandResult::success("migrate", format!("applied pending migrations ({known} known)"))
        }
        Err(failure) => failure.into_result("migrate"),
    }
}
