//! Messages-API content model and the client seam the engine talks through.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use cheers_core::TokenUsage;

use crate::prompt::ComposedRequest;
use crate::tools::ToolCall;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Block types this client does not interpret (e.g. thinking blocks).
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: vec![ContentBlock::text(text)] }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: vec![ContentBlock::text(text)] }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("end_turn") {
            "end_turn" => Self::EndTurn,
            "tool_use" => Self::ToolUse,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponse {
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

impl ModelResponse {
    /// Concatenated text blocks of this turn.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.as_object().cloned().unwrap_or_else(Map::new),
                }),
                _ => None,
            })
            .collect()
    }

    /// Content worth replaying to the model on the next iteration.
    pub fn replayable_content(&self) -> Vec<ContentBlock> {
        self.content
            .iter()
            .filter(|block| !matches!(block, ContentBlock::Unsupported))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model API returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("could not encode model request: {0}")]
    Encode(String),
    #[error("could not decode model response: {0}")]
    Decode(String),
    #[error("model client is not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Rate limits, server errors and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Encode(_) | Self::Decode(_) | Self::NotConfigured(_) => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ComposedRequest) -> Result<ModelResponse, LlmError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: &ComposedRequest) -> Result<ModelResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request).await {
                Ok(response) => return Ok(response),
                Err(error) if attempt < self.config.max_retries && error.is_retryable() => {
                    let delay = self.config.delay_for(attempt);
                    warn!(
                        event_name = "agent.llm.retry",
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying model request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Stand-in used when the service runs without model credentials.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineClient;

#[async_trait]
impl LlmClient for OfflineClient {
    async fn complete(&self, _request: &ComposedRequest) -> Result<ModelResponse, LlmError> {
        Err(LlmError::NotConfigured("the assistant is running in offline mode".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::{
        ContentBlock, LlmClient, LlmError, ModelResponse, RetryConfig, RetryingClient, StopReason,
    };
    use crate::prompt::ComposedRequest;

    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        status: u16,
    }

    #[async_trait]
    impl LlmClient for Flaky {
        async fn complete(&self, _request: &ComposedRequest) -> Result<ModelResponse, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(LlmError::Api { status: self.status, body: "busy".to_string() });
            }
            Ok(ModelResponse {
                model: "test-model".to_string(),
                content: vec![ContentBlock::text("ok")],
                stop_reason: StopReason::EndTurn,
                usage: Default::default(),
            })
        }
    }

    fn fast_retries(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn content_blocks_use_messages_api_tags() {
        let block: ContentBlock = serde_json::from_value(json!({
            "type": "tool_use", "id": "tu_1", "name": "get_events", "input": {"date_from": "2026-03-14"}
        }))
        .expect("tool_use block");
        assert!(matches!(block, ContentBlock::ToolUse { ref name, .. } if name == "get_events"));

        let unknown: ContentBlock =
            serde_json::from_value(json!({"type": "thinking", "thinking": "..."})).expect("unknown");
        assert_eq!(unknown, ContentBlock::Unsupported);

        let result = ContentBlock::ToolResult {
            tool_use_id: "tu_1".to_string(),
            content: "{}".to_string(),
            is_error: false,
        };
        let encoded = serde_json::to_value(&result).expect("encode");
        assert_eq!(encoded["type"], "tool_result");
        assert!(encoded.get("is_error").is_none());
    }

    #[test]
    fn tool_calls_default_non_object_input_to_empty_map() {
        let response = ModelResponse {
            model: "m".to_string(),
            content: vec![
                ContentBlock::text("Checking."),
                ContentBlock::ToolUse {
                    id: "tu_1".to_string(),
                    name: "get_stock_levels".to_string(),
                    input: json!(null),
                },
            ],
            stop_reason: StopReason::parse(Some("tool_use")),
            usage: Default::default(),
        };
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].input.is_empty());
        assert_eq!(response.text(), "Checking.");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
    }

    #[tokio::test]
    async fn retrying_client_recovers_from_rate_limits() {
        let client = RetryingClient::new(
            Flaky { calls: AtomicU32::new(0), failures: 2, status: 429 },
            fast_retries(2),
        );
        let response = client.complete(&ComposedRequest::default()).await.expect("third try");
        assert_eq!(response.text(), "ok");
    }

    #[tokio::test]
    async fn retrying_client_does_not_retry_client_errors() {
        let client = RetryingClient::new(
            Flaky { calls: AtomicU32::new(0), failures: 1, status: 401 },
            fast_retries(3),
        );
        let error = client.complete(&ComposedRequest::default()).await.expect_err("auth error");
        assert!(matches!(error, LlmError::Api { status: 401, .. }));
        assert_eq!(client.inner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
