use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use cheers_agent::AgentRuntime;

/// Expires lapsed pending actions on a fixed interval, on top of the lazy
/// sweep that runs before every chat and resolve request.
pub fn spawn(runtime: Arc<AgentRuntime>, interval: Duration) -> JoinHandle<()> {
    info!(
        event_name = "system.sweep.start",
        interval_secs = interval.as_secs(),
        "pending action sweep started"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let expired = runtime.sweep_expired(Utc::now()).await;
            debug!(event_name = "system.sweep.tick", expired, "pending action sweep ran");
        }
    })
}
