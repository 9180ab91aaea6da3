use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::Row;

use cheers_core::domain::conversation::ConversationId;
use cheers_core::domain::pending_action::{
    PendingAction, PendingActionId, PendingActionStatus, Resolution,
};

use super::{
    decode_err, format_timestamp, parse_json, parse_optional_timestamp, parse_timestamp, to_json,
    PendingActionRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlPendingActionRepository {
    pool: DbPool,
}

impl SqlPendingActionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_action(row: &sqlx::sqlite::SqliteRow) -> Result<PendingAction, RepositoryError> {
    let conversation_id: Option<String> = row.try_get("conversation_id").map_err(decode_err)?;
    let parameters_json: String = row.try_get("parameters_json").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let expires_at: String = row.try_get("expires_at").map_err(decode_err)?;
    let resolved_at: Option<String> = row.try_get("resolved_at").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(PendingAction {
        id: PendingActionId(row.try_get("id").map_err(decode_err)?),
        user_id: row.try_get("user_id").map_err(decode_err)?,
        conversation_id: conversation_id.map(ConversationId),
        tool_name: row.try_get("tool_name").map_err(decode_err)?,
        params: parse_json::<Map<String, Value>>("parameters_json", &parameters_json)?,
        description: row.try_get("description").map_err(decode_err)?,
        status: PendingActionStatus::parse(&status).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown pending action status `{status}`"))
        })?,
        expires_at: parse_timestamp("expires_at", &expires_at)?,
        resolved_at: parse_optional_timestamp("resolved_at", resolved_at)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl PendingActionRepository for SqlPendingActionRepository {
    async fn insert(&self, action: PendingAction) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ai_pending_actions (id, user_id, conversation_id, tool_name,
                                             parameters_json, description, status,
                                             expires_at, resolved_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&action.id.0)
        .bind(&action.user_id)
        .bind(action.conversation_id.as_ref().map(|id| id.0.clone()))
        .bind(&action.tool_name)
        .bind(to_json("parameters_json", &action.params)?)
        .bind(&action.description)
        .bind(action.status.as_str())
        .bind(format_timestamp(&action.expires_at))
        .bind(action.resolved_at.as_ref().map(format_timestamp))
        .bind(format_timestamp(&action.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &PendingActionId,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, conversation_id, tool_name, parameters_json, description,
                    status, expires_at, resolved_at, created_at
             FROM ai_pending_actions WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_action).transpose()
    }

    async fn transition(
        &self,
        id: &PendingActionId,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let now = format_timestamp(&now);
        let result = sqlx::query(
            "UPDATE ai_pending_actions
             SET status = ?, resolved_at = ?
             WHERE id = ? AND status = 'pending' AND expires_at > ?",
        )
        .bind(resolution.status().as_str())
        .bind(&now)
        .bind(&id.0)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let now = format_timestamp(&now);
        let result = sqlx::query(
            "UPDATE ai_pending_actions
             SET status = 'expired', resolved_at = ?
             WHERE status = 'pending' AND expires_at <= ?",
        )
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Map, Value};

    use cheers_core::domain::pending_action::{
        PendingAction, PendingActionStatus, Resolution, WriteIntent,
    };

    use super::SqlPendingActionRepository;
    use crate::repositories::PendingActionRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlPendingActionRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlPendingActionRepository::new(pool)
    }

    fn reservation_action(now: chrono::DateTime<Utc>) -> PendingAction {
        let params: Map<String, Value> = json!({
            "guest_name": "Ada",
            "party_size": 4,
            "reservation_date": "2026-03-14",
            "reservation_time": "19:30"
        })
        .as_object()
        .cloned()
        .expect("object");
        PendingAction::from_intent(
            WriteIntent::new("create_reservation", params),
            "user-1",
            None,
            Duration::minutes(5),
            now,
        )
    }

    #[tokio::test]
    async fn insert_and_find_round_trips_parameters() {
        let repo = repository().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).single().expect("time");
        let action = reservation_action(now);
        repo.insert(action.clone()).await.expect("insert");

        let stored = repo.find_by_id(&action.id).await.expect("find").expect("exists");
        assert_eq!(stored, action);
        assert_eq!(stored.description, "create reservation");
    }

    #[tokio::test]
    async fn confirm_transition_happens_exactly_once() {
        let repo = repository().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).single().expect("time");
        let action = reservation_action(now);
        repo.insert(action.clone()).await.expect("insert");

        let later = now + Duration::minutes(1);
        assert!(repo.transition(&action.id, Resolution::Confirmed, later).await.expect("first"));
        assert!(!repo.transition(&action.id, Resolution::Confirmed, later).await.expect("second"));
        assert!(!repo.transition(&action.id, Resolution::Rejected, later).await.expect("third"));

        let stored = repo.find_by_id(&action.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, PendingActionStatus::Confirmed);
        assert_eq!(stored.resolved_at, Some(later));
    }

    #[tokio::test]
    async fn overdue_actions_expire_and_cannot_be_confirmed() {
        let repo = repository().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).single().expect("time");
        let stale = reservation_action(now);
        let fresh = reservation_action(now + Duration::minutes(4));
        repo.insert(stale.clone()).await.expect("insert stale");
        repo.insert(fresh.clone()).await.expect("insert fresh");

        let sweep_at = now + Duration::minutes(6);
        assert!(!repo.transition(&stale.id, Resolution::Confirmed, sweep_at).await.expect("late"));
        assert_eq!(repo.expire_overdue(sweep_at).await.expect("sweep"), 1);
        assert_eq!(repo.expire_overdue(sweep_at).await.expect("sweep again"), 0);

        let stale = repo.find_by_id(&stale.id).await.expect("find").expect("exists");
        let fresh = repo.find_by_id(&fresh.id).await.expect("find").expect("exists");
        assert_eq!(stale.status, PendingActionStatus::Expired);
        assert_eq!(fresh.status, PendingActionStatus::Pending);
    }
}
