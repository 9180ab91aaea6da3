//! `GET /health`: readiness of the database and schema, plus the model mode.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use cheers_db::{migrations, ping, DbPool};

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub llm_offline: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub status: Readiness,
    pub detail: String,
}

impl Probe {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Ready, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Degraded, detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub database: Probe,
    pub schema: Probe,
    /// `online` or `offline`; offline mode is reported but does not degrade readiness.
    pub model: &'static str,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let (database, schema) = match ping(&state.db_pool).await {
        Ok(()) => (Probe::ready("database query succeeded"), schema_probe(&state.db_pool).await),
        Err(error) => (
            Probe::degraded(format!("database query failed: {error}")),
            Probe::degraded("not checked: database unreachable"),
        ),
    };

    let ready = database.status == Readiness::Ready && schema.status == Readiness::Ready;
    let report = HealthReport {
        status: if ready { Readiness::Ready } else { Readiness::Degraded },
        database,
        schema,
        model: if state.llm_offline { "offline" } else { "online" },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(report))
}

async fn schema_probe(pool: &DbPool) -> Probe {
    match migrations::status(pool).await {
        Ok((known, applied)) if applied >= known => Probe::ready(format!("{known} migrations applied")),
        Ok((known, applied)) => Probe::degraded(format!("{applied} of {known} migrations applied")),
        Err(error) => Probe::degraded(format!("migration state unreadable: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use cheers_db::{connect_with_settings, migrations, DbPool};

    use crate::health::{health, HealthState, Readiness};

    async fn pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect")
    }

    #[tokio::test]
    async fn ready_once_the_schema_is_migrated() {
        let pool = pool().await;
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(report)) =
            health(State(HealthState { db_pool: pool.clone(), llm_offline: true })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, Readiness::Ready);
        assert_eq!(report.model, "offline");

        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_schema_is_degraded() {
        let pool = pool().await;

        let (status, Json(report)) =
            health(State(HealthState { db_pool: pool.clone(), llm_offline: false })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.database.status, Readiness::Ready);
        assert_eq!(report.schema.status, Readiness::Degraded);
        assert!(report.schema.detail.starts_with("0 of "));

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_degrades_both_probes() {
        let pool = pool().await;
        pool.close().await;

        let (status, Json(report)) =
            health(State(HealthState { db_pool: pool, llm_offline: false })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.database.status, Readiness::Degraded);
        assert_eq!(report.schema.status, Readiness::Degraded);
    }
}
