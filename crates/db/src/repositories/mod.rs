use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use thiserror::Error;

use cheers_core::domain::conversation::{
    Conversation, ConversationId, ConversationUpdate, Message,
};
use cheers_core::domain::pending_action::{PendingAction, PendingActionId, Resolution};
use cheers_core::domain::sub_agent::{SubAgentCompletion, SubAgentTask, SubAgentTaskId};

pub mod audit;
pub mod conversation;
pub mod memory;
pub mod pending_action;
pub mod sub_agent_task;

pub use audit::{ActionAuditEntry, SqlAuditRepository, ToolExecutionRecord, ToolExecutionStatus};
pub use conversation::SqlConversationRepository;
pub use memory::{
    InMemoryAuditRepository, InMemoryConversationRepository, InMemoryPendingActionRepository,
    InMemorySubAgentTaskRepository,
};
pub use pending_action::SqlPendingActionRepository;
pub use sub_agent_task::SqlSubAgentTaskRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Most recently active first; conversations without messages sort last.
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError>;

    async fn update(
        &self,
        id: &ConversationId,
        update: ConversationUpdate,
        now: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError>;

    async fn record_usage(
        &self,
        id: &ConversationId,
        tokens: u64,
        cost_usd: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Hard delete; messages go with the conversation.
    async fn delete(&self, id: &ConversationId) -> Result<bool, RepositoryError>;

    /// Appends and bumps the parent's message count and last activity atomically.
    async fn append_message(&self, message: Message) -> Result<(), RepositoryError>;

    /// Messages in creation order. With a limit, only the newest `limit` are returned.
    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait PendingActionRepository: Send + Sync {
    async fn insert(&self, action: PendingAction) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: &PendingActionId,
    ) -> Result<Option<PendingAction>, RepositoryError>;

    /// Moves a still-pending, unexpired action to its resolved status.
    /// Returns false when another caller won the transition or the action lapsed.
    async fn transition(
        &self,
        id: &PendingActionId,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait SubAgentTaskRepository: Send + Sync {
    async fn insert_running(&self, task: SubAgentTask) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &SubAgentTaskId)
        -> Result<Option<SubAgentTask>, RepositoryError>;

    /// Writes the terminal state once; a second completion is ignored.
    async fn complete(
        &self,
        id: &SubAgentTaskId,
        completion: SubAgentCompletion,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn record_action(&self, entry: ActionAuditEntry) -> Result<(), RepositoryError>;
    async fn record_tool_execution(&self, record: ToolExecutionRecord)
        -> Result<(), RepositoryError>;
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).map_err(|error| {
        RepositoryError::Decode(format!("invalid {column} timestamp `{value}`: {error}"))
    })
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|raw| parse_timestamp(column, &raw)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column} out of range: {value}")))
}

pub(crate) fn parse_u64(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column} out of range: {value}")))
}

pub(crate) fn parse_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid {column} json: {error}")))
}

pub(crate) fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode {column}: {error}")))
}

pub(crate) fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
