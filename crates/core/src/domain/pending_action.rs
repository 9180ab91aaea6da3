use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::conversation::ConversationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingActionId(pub String);

impl PendingActionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingActionStatus {
    Pending,
    Confirmed,
    Rejected,
    Expired,
}

impl PendingActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Outcome a user picks when resolving a pending action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Confirmed,
    Rejected,
}

impl Resolution {
    pub fn status(&self) -> PendingActionStatus {
        match self {
            Self::Confirmed => PendingActionStatus::Confirmed,
            Self::Rejected => PendingActionStatus::Rejected,
        }
    }
}

/// A write-tool invocation queued during an engine run, before it is persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteIntent {
    pub tool_name: String,
    pub params: Map<String, Value>,
    pub description: String,
}

impl WriteIntent {
    pub fn new(tool_name: impl Into<String>, params: Map<String, Value>) -> Self {
        let tool_name = tool_name.into();
        let description = default_description(&tool_name);
        Self { tool_name, params, description }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

pub fn default_description(tool_name: &str) -> String {
    tool_name.replace('_', " ")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: PendingActionId,
    pub user_id: String,
    pub conversation_id: Option<ConversationId>,
    pub tool_name: String,
    pub params: Map<String, Value>,
    pub description: String,
    pub status: PendingActionStatus,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn from_intent(
        intent: WriteIntent,
        user_id: impl Into<String>,
        conversation_id: Option<ConversationId>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PendingActionId::generate(),
            user_id: user_id.into(),
            conversation_id,
            tool_name: intent.tool_name,
            params: intent.params,
            description: intent.description,
            status: PendingActionStatus::Pending,
            expires_at: now + ttl,
            resolved_at: None,
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// True while the action can still be confirmed or rejected.
    pub fn is_resolvable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PendingActionStatus::Pending && !self.is_expired_at(now)
    }
}
