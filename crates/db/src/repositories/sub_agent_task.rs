use serde_json::{Map, Value};
use sqlx::Row;

use cheers_core::domain::conversation::{ConversationId, TokenUsage};
use cheers_core::domain::sub_agent::{
    SubAgentCompletion, SubAgentKind, SubAgentTask, SubAgentTaskId, SubAgentTaskStatus,
};

use super::{
    decode_err, format_timestamp, parse_json, parse_optional_timestamp, parse_timestamp,
    parse_u64, to_json, RepositoryError, SubAgentTaskRepository,
};
use crate::DbPool;

pub struct SqlSubAgentTaskRepository {
    pool: DbPool,
}

impl SqlSubAgentTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<SubAgentTask, RepositoryError> {
    let conversation_id: Option<String> = row.try_get("conversation_id").map_err(decode_err)?;
    let agent_type: String = row.try_get("agent_type").map_err(decode_err)?;
    let input_json: String = row.try_get("input_json").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let artifacts_json: String = row.try_get("artifacts_json").map_err(decode_err)?;
    let token_usage_json: Option<String> = row.try_get("token_usage_json").map_err(decode_err)?;
    let duration_ms: Option<i64> = row.try_get("duration_ms").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(decode_err)?;

    Ok(SubAgentTask {
        id: SubAgentTaskId(row.try_get("id").map_err(decode_err)?),
        conversation_id: conversation_id.map(ConversationId),
        user_id: row.try_get("user_id").map_err(decode_err)?,
        agent_type: SubAgentKind::parse(&agent_type)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        input_params: parse_json::<Map<String, Value>>("input_json", &input_json)?,
        status: SubAgentTaskStatus::parse(&status).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown sub-agent task status `{status}`"))
        })?,
        model_used: row.try_get("model_used").map_err(decode_err)?,
        result_summary: row.try_get("result_summary").map_err(decode_err)?,
        artifacts: parse_json::<Vec<Value>>("artifacts_json", &artifacts_json)?,
        token_usage: token_usage_json
            .map(|raw| parse_json::<TokenUsage>("token_usage_json", &raw))
            .transpose()?,
        duration_ms: duration_ms.map(|value| parse_u64("duration_ms", value)).transpose()?,
        error: row.try_get("error").map_err(decode_err)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        completed_at: parse_optional_timestamp("completed_at", completed_at)?,
    })
}

#[async_trait::async_trait]
impl SubAgentTaskRepository for SqlSubAgentTaskRepository {
    async fn insert_running(&self, task: SubAgentTask) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ai_sub_agent_tasks (id, conversation_id, user_id, agent_type, input_json,
                                             status, artifacts_json, created_at)
             VALUES (?, ?, ?, ?, ?, 'running', '[]', ?)",
        )
        .bind(&task.id.0)
        .bind(task.conversation_id.as_ref().map(|id| id.0.clone()))
        .bind(&task.user_id)
        .bind(task.agent_type.as_str())
        .bind(to_json("input_json", &task.input_params)?)
        .bind(format_timestamp(&task.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SubAgentTaskId,
    ) -> Result<Option<SubAgentTask>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, user_id, agent_type, input_json, status, model_used,
                    result_summary, artifacts_json, token_usage_json, duration_ms, error,
                    created_at, completed_at
             FROM ai_sub_agent_tasks WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn complete(
        &self,
        id: &SubAgentTaskId,
        completion: SubAgentCompletion,
    ) -> Result<bool, RepositoryError> {
        let token_usage_json = completion
            .token_usage
            .as_ref()
            .map(|usage| to_json("token_usage_json", usage))
            .transpose()?;

        let result = sqlx::query(
            "UPDATE ai_sub_agent_tasks
             SET status = ?, model_used = ?, result_summary = ?, artifacts_json = ?,
                 token_usage_json = ?, duration_ms = ?, error = ?, completed_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(completion.status.as_str())
        .bind(&completion.model_used)
        .bind(&completion.result_summary)
        .bind(to_json("artifacts_json", &completion.artifacts)?)
        .bind(token_usage_json)
        .bind(completion.duration_ms as i64)
        .bind(&completion.error)
        .bind(format_timestamp(&completion.completed_at))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Map};

    use cheers_core::domain::conversation::TokenUsage;
    use cheers_core::domain::sub_agent::{
        SubAgentCompletion, SubAgentKind, SubAgentTask, SubAgentTaskStatus,
    };

    use super::SqlSubAgentTaskRepository;
    use crate::repositories::SubAgentTaskRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn completion_is_written_once() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlSubAgentTaskRepository::new(pool);

        let started = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).single().expect("time");
        let mut input = Map::new();
        input.insert("task".to_string(), json!("Promote quiz night"));
        let task = SubAgentTask::running(SubAgentKind::AdvertisingManager, "user-1", None, input, started);
        repo.insert_running(task.clone()).await.expect("insert");

        let running = repo.find_by_id(&task.id).await.expect("find").expect("exists");
        assert_eq!(running, task);

        let completion = SubAgentCompletion {
            status: SubAgentTaskStatus::Completed,
            model_used: Some("claude-haiku-4-5-20251001".to_string()),
            result_summary: Some("Drafted one ad".to_string()),
            artifacts: vec![json!({"type": "html", "title": "Quiz"})],
            token_usage: Some(TokenUsage { input_tokens: 900, output_tokens: 200, ..Default::default() }),
            duration_ms: 1_450,
            error: None,
            completed_at: started + Duration::seconds(2),
        };
        assert!(repo.complete(&task.id, completion.clone()).await.expect("complete"));

        let failure = SubAgentCompletion {
            status: SubAgentTaskStatus::Failed,
            error: Some("late failure".to_string()),
            ..completion.clone()
        };
        assert!(!repo.complete(&task.id, failure).await.expect("second completion"));

        let stored = repo.find_by_id(&task.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, SubAgentTaskStatus::Completed);
        assert_eq!(stored.duration_ms, Some(1_450));
        assert_eq!(stored.result_summary.as_deref(), Some("Drafted one ad"));
        assert_eq!(stored.artifacts.len(), 1);
        assert!(stored.error.is_none());
    }
}
