use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use cheers_agent::anthropic::AnthropicClient;
use cheers_agent::llm::{LlmClient, LlmError, OfflineClient, RetryConfig, RetryingClient};
use cheers_agent::services::{PlainTextDocuments, UnconfiguredImages};
use cheers_agent::{AgentRuntime, RuntimeDeps};
use cheers_core::config::{AppConfig, ConfigError, LlmConfig, LoadOptions};
use cheers_core::ApplicationError;
use cheers_db::repositories::{
    SqlAuditRepository, SqlConversationRepository, SqlPendingActionRepository,
    SqlSubAgentTaskRepository,
};
use cheers_db::{connect_with_settings, migrations, DbPool, SqlDataStore};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model client setup failed: {0}")]
    Llm(#[source] LlmError),
    #[error("assistant runtime setup failed: {0}")]
    Runtime(#[source] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let deps = RuntimeDeps {
        llm: llm_client(&config.llm).map_err(BootstrapError::Llm)?,
        store: Arc::new(SqlDataStore::new(db_pool.clone())),
        conversations: Arc::new(SqlConversationRepository::new(db_pool.clone())),
        actions: Arc::new(SqlPendingActionRepository::new(db_pool.clone())),
        tasks: Arc::new(SqlSubAgentTaskRepository::new(db_pool.clone())),
        audit: Arc::new(SqlAuditRepository::new(db_pool.clone())),
        images: Arc::new(UnconfiguredImages),
        documents: Arc::new(PlainTextDocuments),
    };
    let runtime = AgentRuntime::new(deps, config.llm.model_catalog(), config.assistant.clone())
        .map_err(BootstrapError::Runtime)?;

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

fn llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    if config.offline {
        warn!(
            event_name = "system.bootstrap.llm_offline",
            correlation_id = "bootstrap",
            "running without model credentials; chat requests will fail"
        );
        return Ok(Arc::new(OfflineClient));
    }
    let client = AnthropicClient::from_config(config)?;
    let retry = RetryConfig { max_retries: config.max_retries, ..RetryConfig::default() };
    info!(
        event_name = "system.bootstrap.llm_ready",
        correlation_id = "bootstrap",
        base_url = %config.base_url,
        timeout_secs = config.timeout_secs,
        "model client configured"
    );
    Ok(Arc::new(RetryingClient::new(client, retry)))
}

#[cfg(test)]
mod tests {
    use cheers_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(offline: Option<bool>, api_key: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_offline: offline,
                llm_api_key: api_key.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_model_credentials() {
        let result = bootstrap(overrides(None, None)).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.api_key"), "{message}");
    }

    #[tokio::test]
    async fn offline_bootstrap_migrates_the_assistant_tables() {
        let app = bootstrap(overrides(Some(true), None)).await.expect("offline bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('ai_conversations', 'ai_pending_actions', 'reservations')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables");
        assert_eq!(table_count, 3);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn configured_key_builds_the_online_runtime() {
        let app = bootstrap(overrides(None, Some("sk-ant-test"))).await.expect("bootstrap");
        assert_eq!(app.config.assistant.rate_limit_per_minute, 20);
        app.db_pool.close().await;
    }
}
