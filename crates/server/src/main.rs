mod api;
mod bootstrap;
mod health;
mod rate_limit;
mod sweep;

use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use cheers_core::config::{AppConfig, LoadOptions, LogFormat};

use crate::api::ApiState;
use crate::health::HealthState;
use crate::rate_limit::RateLimiter;

/// `RUST_LOG` wins over `logging.level` when set.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let sweeper = sweep::spawn(
        app.runtime.clone(),
        Duration::from_secs(app.config.assistant.sweep_interval_secs),
    );

    let state = ApiState {
        runtime: app.runtime.clone(),
        limiter: RateLimiter::per_minute(app.config.assistant.rate_limit_per_minute),
    };
    let health_state = HealthState { db_pool: app.db_pool.clone(), llm_offline: app.config.llm.offline };
    let router = api::router(state).merge(health::router(health_state));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "cheers-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = app.config.server.graceful_shutdown_secs,
        "cheers-server stopping"
    );
    sweeper.abort();
    tokio::time::timeout(
        Duration::from_secs(app.config.server.graceful_shutdown_secs),
        app.db_pool.close(),
    )
    .await
    .ok();

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.server.signal_error",
            error = %error,
            "could not listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
