//! Confirm/reject flow for queued writes.
//!
//! The only path that performs a queued mutation. The guarded `pending -> confirmed`
//! transition happens before the write executor runs, so concurrent confirmations of
//! the same action execute it at most once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use cheers_core::{
    ApplicationError, ConversationId, DomainError, Message, MessageRole, PendingAction,
    PendingActionId, PendingActionStatus, Resolution,
};
use cheers_db::repositories::{
    ActionAuditEntry, AuditRepository, ConversationRepository, PendingActionRepository,
    RepositoryError,
};

use crate::write_executor::WriteExecutor;

pub const ALREADY_PROCESSED: &str = "This action has expired or was already processed.";
pub const REJECTED: &str = "Action cancelled. Let me know if you'd like to modify the request.";

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[derive(Clone, Debug)]
pub struct ResolveRequest {
    pub action_id: PendingActionId,
    pub user_id: String,
    pub resolution: Resolution,
    pub conversation_id: Option<ConversationId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolveOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PendingActionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ResolveOutcome {
    fn already_processed() -> Self {
        Self { success: false, message: ALREADY_PROCESSED.to_string(), status: None, result: None }
    }
}

pub struct ActionResolver {
    actions: Arc<dyn PendingActionRepository>,
    conversations: Arc<dyn ConversationRepository>,
    audit: Arc<dyn AuditRepository>,
    executor: Arc<WriteExecutor>,
}

impl ActionResolver {
    pub fn new(
        actions: Arc<dyn PendingActionRepository>,
        conversations: Arc<dyn ConversationRepository>,
        audit: Arc<dyn AuditRepository>,
        executor: Arc<WriteExecutor>,
    ) -> Self {
        Self { actions, conversations, audit, executor }
    }

    /// Flips lapsed pending actions to `expired`. Failures are logged, never raised.
    pub async fn sweep(&self, now: DateTime<Utc>) -> u64 {
        match self.actions.expire_overdue(now).await {
            Ok(0) => 0,
            Ok(expired) => {
                info!(event_name = "agent.actions.expired", expired, "expired pending actions");
                expired
            }
            Err(error) => {
                warn!(event_name = "agent.actions.sweep_failed", error = %error, "expiry sweep failed");
                0
            }
        }
    }

    pub async fn resolve(
        &self,
        request: ResolveRequest,
        now: DateTime<Utc>,
    ) -> Result<ResolveOutcome, ApplicationError> {
        self.sweep(now).await;

        let Some(action) = self.actions.find_by_id(&request.action_id).await.map_err(persistence)?
        else {
            return Ok(ResolveOutcome::already_processed());
        };
        if action.user_id != request.user_id {
            warn!(
                event_name = "agent.actions.not_owned",
                action_id = %action.id.0,
                user_id = %request.user_id,
                "rejected resolution of another user's action"
            );
            return Err(DomainError::ActionNotOwned(action.id.0).into());
        }
        if !action.is_resolvable_at(now) {
            return Ok(ResolveOutcome::already_processed());
        }
        if !self.actions.transition(&action.id, request.resolution, now).await.map_err(persistence)? {
            return Ok(ResolveOutcome::already_processed());
        }

        let outcome = match request.resolution {
            Resolution::Rejected => ResolveOutcome {
                success: true,
                message: REJECTED.to_string(),
                status: Some(PendingActionStatus::Rejected),
                result: None,
            },
            Resolution::Confirmed => self.perform(&action).await,
        };
        info!(
            event_name = "agent.actions.resolved",
            action_id = %action.id.0,
            tool_name = %action.tool_name,
            resolution = ?request.resolution,
            success = outcome.success,
            "pending action resolved"
        );

        self.record_audit(&action, request.resolution, &outcome, now).await;
        let conversation_id = request.conversation_id.or_else(|| action.conversation_id.clone());
        if let Some(conversation_id) = conversation_id {
            self.record_reply(conversation_id, &action, &outcome, now).await;
        }
        Ok(outcome)
    }

    async fn perform(&self, action: &PendingAction) -> ResolveOutcome {
        match self.executor.execute(&action.tool_name, &action.params, &action.user_id).await {
            Ok(result) => ResolveOutcome {
                success: true,
                message: format!(
                    "Action completed successfully. {} has been executed.",
                    action.description
                ),
                status: Some(PendingActionStatus::Confirmed),
                result: Some(result),
            },
            Err(error) => {
                warn!(
                    event_name = "agent.actions.execution_failed",
                    action_id = %action.id.0,
                    tool_name = %action.tool_name,
                    error = %error,
                    "confirmed action failed"
                );
                ResolveOutcome {
                    success: false,
                    message: format!("The action failed: {error}"),
                    status: Some(PendingActionStatus::Confirmed),
                    result: None,
                }
            }
        }
    }

    async fn record_audit(
        &self,
        action: &PendingAction,
        resolution: Resolution,
        outcome: &ResolveOutcome,
        now: DateTime<Utc>,
    ) {
        let entry = ActionAuditEntry {
            user_id: action.user_id.clone(),
            action: match resolution {
                Resolution::Confirmed => "confirm_action",
                Resolution::Rejected => "reject_action",
            }
            .to_string(),
            tool_name: Some(action.tool_name.clone()),
            pending_action_id: Some(action.id.0.clone()),
            outcome: if outcome.success { "success" } else { "failure" }.to_string(),
            detail: Some(outcome.message.clone()),
            created_at: now,
        };
        if let Err(error) = self.audit.record_action(entry).await {
            warn!(event_name = "agent.audit.write_failed", error = %error, "could not write action audit");
        }
    }

    async fn record_reply(
        &self,
        conversation_id: ConversationId,
        action: &PendingAction,
        outcome: &ResolveOutcome,
        now: DateTime<Utc>,
    ) {
        let mut message = Message::new(conversation_id, MessageRole::Assistant, &outcome.message, now);
        message.pending_action_id = Some(action.id.clone());
        message.metadata.insert(
            "action_result".to_string(),
            json!({ "success": outcome.success, "tool_name": action.tool_name }),
        );
        if let Err(error) = self.conversations.append_message(message).await {
            warn!(
                event_name = "agent.conversation.write_failed",
                action_id = %action.id.0,
                error = %error,
                "could not save action reply"
            );
        }
    }
}
