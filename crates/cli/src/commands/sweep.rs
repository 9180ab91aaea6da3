use chrono::Utc;

use cheers_db::repositories::{PendingActionRepository, SqlPendingActionRepository};

use crate::commands::{async_runtime, connect, load_config, CommandResult, Failure};

/// One-shot run of the expiry sweep the server performs on a timer.
pub fn run() -> CommandResult {
    let config = match load_config("sweep") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("sweep") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let expired = SqlPendingActionRepository::new(pool.clone())
            .expire_overdue(Utc::now())
            .await
            .map_err(|error| Failure::new("sweep", error, 5));
        pool.close().await;
        expired
    });

    match result {
        Ok(expired) => CommandResult::success("sweep", format!("expired {expired} pending action(s)")),
        Err(failure) => failure.into_result("sweep"),
    }
}
