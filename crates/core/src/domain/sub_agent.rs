use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::conversation::{ConversationId, TokenUsage};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubAgentTaskId(pub String);

impl SubAgentTaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Closed registry of specialist configurations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentKind {
    AdvertisingManager,
    CocktailSpecialist,
    ScheduleOptimizer,
}

impl SubAgentKind {
    pub const ALL: [SubAgentKind; 3] =
        [Self::AdvertisingManager, Self::CocktailSpecialist, Self::ScheduleOptimizer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdvertisingManager => "advertising_manager",
            Self::CocktailSpecialist => "cocktail_specialist",
            Self::ScheduleOptimizer => "schedule_optimizer",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim() {
            "advertising_manager" => Ok(Self::AdvertisingManager),
            "cocktail_specialist" => Ok(Self::CocktailSpecialist),
            "schedule_optimizer" => Ok(Self::ScheduleOptimizer),
            other => Err(DomainError::UnknownSubAgent(other.to_string())),
        }
    }

    /// Name of the primary-assistant tool that delegates to this specialist.
    pub fn delegate_tool(&self) -> &'static str {
        match self {
            Self::AdvertisingManager => "delegate_advertising_manager",
            Self::CocktailSpecialist => "delegate_cocktail_specialist",
            Self::ScheduleOptimizer => "delegate_schedule_optimizer",
        }
    }

    pub fn from_delegate_tool(tool_name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.delegate_tool() == tool_name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentTaskStatus {
    Running,
    Completed,
    Failed,
}

impl SubAgentTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubAgentTask {
    pub id: SubAgentTaskId,
    pub conversation_id: Option<ConversationId>,
    pub user_id: String,
    pub agent_type: SubAgentKind,
    pub input_params: Map<String, Value>,
    pub status: SubAgentTaskStatus,
    pub model_used: Option<String>,
    pub result_summary: Option<String>,
    pub artifacts: Vec<Value>,
    pub token_usage: Option<TokenUsage>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SubAgentTask {
    pub fn running(
        agent_type: SubAgentKind,
        user_id: impl Into<String>,
        conversation_id: Option<ConversationId>,
        input_params: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SubAgentTaskId::generate(),
            conversation_id,
            user_id: user_id.into(),
            agent_type,
            input_params,
            status: SubAgentTaskStatus::Running,
            model_used: None,
            result_summary: None,
            artifacts: Vec::new(),
            token_usage: None,
            duration_ms: None,
            error: None,
            created_at: now,
            completed_at: None,
        }
    }
}

/// Terminal record written once when a sub-agent run ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubAgentCompletion {
    pub status: SubAgentTaskStatus,
    pub model_used: Option<String>,
    pub result_summary: Option<String>,
    pub artifacts: Vec<Value>,
    pub token_usage: Option<TokenUsage>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}
