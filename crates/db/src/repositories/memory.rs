use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use cheers_core::domain::conversation::{
    Conversation, ConversationId, ConversationUpdate, Message,
};
use cheers_core::domain::pending_action::{
    PendingAction, PendingActionId, PendingActionStatus, Resolution,
};
use cheers_core::domain::sub_agent::{
    SubAgentCompletion, SubAgentTask, SubAgentTaskId, SubAgentTaskStatus,
};

use super::{
    ActionAuditEntry, AuditRepository, ConversationRepository, PendingActionRepository,
    RepositoryError, SubAgentTaskRepository, ToolExecutionRecord,
};

#[derive(Default)]
struct ConversationState {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    state: RwLock<ConversationState>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.conversations.insert(conversation.id.0.clone(), conversation);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.conversations.get(&id.0).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let state = self.state.read().await;
        let mut owned: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|conversation| conversation.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|left, right| match (left.last_message_at, right.last_message_at) {
            (Some(a), Some(b)) => b.cmp(&a).then(right.created_at.cmp(&left.created_at)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => right.created_at.cmp(&left.created_at),
        });
        Ok(owned.into_iter().skip(offset as usize).take(limit as usize).collect())
    }

    async fn update(
        &self,
        id: &ConversationId,
        update: ConversationUpdate,
        now: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("conversation {}", id.0)))?;
        if let Some(title) = update.title {
            conversation.title = Some(title);
        }
        if let Some(summary) = update.summary {
            conversation.summary = Some(summary);
        }
        if let Some(metadata) = update.metadata {
            conversation.metadata = metadata;
        }
        if let Some(pinned) = update.pinned {
            conversation.pinned = pinned;
        }
        conversation.updated_at = now;
        Ok(conversation.clone())
    }

    async fn record_usage(
        &self,
        id: &ConversationId,
        tokens: u64,
        cost_usd: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("conversation {}", id.0)))?;
        conversation.total_tokens += tokens;
        conversation.estimated_cost_usd += cost_usd;
        conversation.updated_at = now;
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        state.messages.remove(&id.0);
        Ok(state.conversations.remove(&id.0).is_some())
    }

    async fn append_message(&self, message: Message) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let conversation =
            state.conversations.get_mut(&message.conversation_id.0).ok_or_else(|| {
                RepositoryError::NotFound(format!("conversation {}", message.conversation_id.0))
            })?;
        conversation.message_count += 1;
        conversation.last_message_at = Some(message.created_at);
        conversation.updated_at = message.created_at;
        state.messages.entry(message.conversation_id.0.clone()).or_default().push(message);
        Ok(())
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let messages = state.messages.get(&conversation_id.0).cloned().unwrap_or_default();
        let skip = match limit {
            Some(limit) => messages.len().saturating_sub(limit as usize),
            None => 0,
        };
        Ok(messages.into_iter().skip(skip).collect())
    }
}

#[derive(Default)]
pub struct InMemoryPendingActionRepository {
    actions: RwLock<HashMap<String, PendingAction>>,
}

impl InMemoryPendingActionRepository {
    pub async fn all(&self) -> Vec<PendingAction> {
        let actions = self.actions.read().await;
        let mut all: Vec<PendingAction> = actions.values().cloned().collect();
        all.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        all
    }
}

#[async_trait::async_trait]
impl PendingActionRepository for InMemoryPendingActionRepository {
    async fn insert(&self, action: PendingAction) -> Result<(), RepositoryError> {
        let mut actions = self.actions.write().await;
        actions.insert(action.id.0.clone(), action);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &PendingActionId,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let actions = self.actions.read().await;
        Ok(actions.get(&id.0).cloned())
    }

    async fn transition(
        &self,
        id: &PendingActionId,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut actions = self.actions.write().await;
        match actions.get_mut(&id.0) {
            Some(action) if action.is_resolvable_at(now) => {
                action.status = resolution.status();
                action.resolved_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut actions = self.actions.write().await;
        let mut expired = 0;
        for action in actions.values_mut() {
            if action.status == PendingActionStatus::Pending && action.is_expired_at(now) {
                action.status = PendingActionStatus::Expired;
                action.resolved_at = Some(now);
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[derive(Default)]
pub struct InMemorySubAgentTaskRepository {
    tasks: RwLock<HashMap<String, SubAgentTask>>,
}

impl InMemorySubAgentTaskRepository {
    pub async fn all(&self) -> Vec<SubAgentTask> {
        self.tasks.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl SubAgentTaskRepository for InMemorySubAgentTaskRepository {
    async fn insert_running(&self, task: SubAgentTask) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.0.clone(), task);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SubAgentTaskId,
    ) -> Result<Option<SubAgentTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id.0).cloned())
    }

    async fn complete(
        &self,
        id: &SubAgentTaskId,
        completion: SubAgentCompletion,
    ) -> Result<bool, RepositoryError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&id.0) {
            Some(task) if task.status == SubAgentTaskStatus::Running => {
                task.status = completion.status;
                task.model_used = completion.model_used;
                task.result_summary = completion.result_summary;
                task.artifacts = completion.artifacts;
                task.token_usage = completion.token_usage;
                task.duration_ms = Some(completion.duration_ms);
                task.error = completion.error;
                task.completed_at = Some(completion.completed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryAuditRepository {
    actions: RwLock<Vec<ActionAuditEntry>>,
    tool_executions: RwLock<Vec<ToolExecutionRecord>>,
}

impl InMemoryAuditRepository {
    pub async fn actions(&self) -> Vec<ActionAuditEntry> {
        self.actions.read().await.clone()
    }

    pub async fn tool_executions(&self) -> Vec<ToolExecutionRecord> {
        self.tool_executions.read().await.clone()
    }
}

#[async_trait::async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn record_action(&self, entry: ActionAuditEntry) -> Result<(), RepositoryError> {
        self.actions.write().await.push(entry);
        Ok(())
    }

    async fn record_tool_execution(
        &self,
        record: ToolExecutionRecord,
    ) -> Result<(), RepositoryError> {
        self.tool_executions.write().await.push(record);
        Ok(())
    }
}
