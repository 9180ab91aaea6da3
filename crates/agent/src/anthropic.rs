use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cheers_core::config::LlmConfig;
use cheers_core::TokenUsage;

use crate::llm::{ContentBlock, LlmClient, LlmError, ModelResponse, StopReason};
use crate::prompt::ComposedRequest;

const MESSAGES_PATH: &str = "/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

const EPHEMERAL: CacheControl = CacheControl { kind: "ephemeral" };

#[derive(Debug, Serialize)]
struct SystemBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct ToolSpec<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: Vec<SystemBlock<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_write_tokens: usage.cache_creation_input_tokens.unwrap_or(0),
            cache_read_tokens: usage.cache_read_input_tokens.unwrap_or(0),
        }
    }
}

/// HTTP client for the Anthropic Messages API with prompt-cache markers.
pub struct AnthropicClient {
    endpoint: String,
    api_key: SecretString,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Transport(format!("could not build HTTP client: {error}")))?;
        Ok(Self {
            endpoint: format!("{}{MESSAGES_PATH}", base_url.trim_end_matches('/')),
            api_key,
            http_client,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::NotConfigured("llm.api_key is not set".to_string()))?;
        Self::new(&config.base_url, api_key, Duration::from_secs(config.timeout_secs))
    }

    fn build_request_body<'a>(
        request: &'a ComposedRequest,
    ) -> Result<MessagesRequest<'a>, LlmError> {
        let system = request
            .system
            .iter()
            .map(|segment| SystemBlock {
                kind: "text",
                text: &segment.text,
                cache_control: segment.cacheable.then_some(EPHEMERAL),
            })
            .collect();

        let tools = request
            .tools
            .iter()
            .map(|tool| ToolSpec {
                name: &tool.definition.name,
                description: &tool.definition.description,
                input_schema: &tool.definition.input_schema,
                cache_control: tool.cache_boundary.then_some(EPHEMERAL),
            })
            .collect();

        let messages = request
            .messages
            .iter()
            .map(|composed| {
                let mut content = composed
                    .message
                    .content
                    .iter()
                    .filter(|block| !matches!(block, ContentBlock::Unsupported))
                    .map(|block| {
                        serde_json::to_value(block)
                            .map_err(|error| LlmError::Encode(error.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if composed.cache_boundary {
                    if let Some(Value::Object(last)) = content.last_mut() {
                        last.insert(
                            "cache_control".to_string(),
                            serde_json::json!({ "type": EPHEMERAL.kind }),
                        );
                    }
                }
                Ok(WireMessage { role: composed.message.role.as_str(), content })
            })
            .collect::<Result<Vec<_>, LlmError>>()?;

        Ok(MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system,
            tools,
            messages,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &ComposedRequest) -> Result<ModelResponse, LlmError> {
        let body = Self::build_request_body(request)?;

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let decoded: MessagesResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;

        Ok(ModelResponse {
            model: decoded.model,
            content: decoded.content,
            stop_reason: StopReason::parse(decoded.stop_reason.as_deref()),
            usage: decoded.usage.into(),
        })
    }
}
