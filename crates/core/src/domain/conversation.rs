use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::pending_action::PendingActionId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_write_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub metadata: Map<String, Value>,
    pub pinned: bool,
    pub message_count: u32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub total_tokens: u64,
    pub estimated_cost_usd: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub const TITLE_MAX_CHARS: usize = 100;

    pub fn start(user_id: impl Into<String>, first_message: &str, now: DateTime<Utc>) -> Self {
        let title: String = first_message.trim().chars().take(Self::TITLE_MAX_CHARS).collect();
        Self {
            id: ConversationId::generate(),
            user_id: user_id.into(),
            title: (!title.is_empty()).then_some(title),
            summary: None,
            metadata: Map::new(),
            pinned: false,
            message_count: 0,
            last_message_at: None,
            total_tokens: 0,
            estimated_cost_usd: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields a caller may change on an existing conversation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub pinned: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub tools_used: Vec<String>,
    pub pending_action_id: Option<PendingActionId>,
    pub token_usage: Option<TokenUsage>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        conversation_id: ConversationId,
        role: MessageRole,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            role,
            content: content.into(),
            tools_used: Vec::new(),
            pending_action_id: None,
            token_usage: None,
            metadata: Map::new(),
            created_at: now,
        }
    }
}
