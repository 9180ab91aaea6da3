use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{format_timestamp, AuditRepository, RepositoryError};
use crate::DbPool;

/// One confirm/reject decision on a pending action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionAuditEntry {
    pub user_id: String,
    pub action: String,
    pub tool_name: Option<String>,
    pub pending_action_id: Option<String>,
    pub outcome: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExecutionStatus {
    Success,
    Error,
    Timeout,
}

impl ToolExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub conversation_id: Option<String>,
    pub user_id: String,
    pub tool_name: String,
    pub status: ToolExecutionStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditRepository for SqlAuditRepository {
    async fn record_action(&self, entry: ActionAuditEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ai_audit_log (id, user_id, action, tool_name, pending_action_id,
                                       outcome, detail, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&entry.user_id)
        .bind(&entry.action)
        .bind(&entry.tool_name)
        .bind(&entry.pending_action_id)
        .bind(&entry.outcome)
        .bind(&entry.detail)
        .bind(format_timestamp(&entry.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_tool_execution(
        &self,
        record: ToolExecutionRecord,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ai_tool_executions (id, conversation_id, user_id, tool_name, status,
                                             duration_ms, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&record.conversation_id)
        .bind(&record.user_id)
        .bind(&record.tool_name)
        .bind(record.status.as_str())
        .bind(record.duration_ms as i64)
        .bind(&record.error)
        .bind(format_timestamp(&record.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
