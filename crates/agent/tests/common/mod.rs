#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use cheers_agent::llm::{ContentBlock, LlmClient, LlmError, ModelResponse, StopReason};
use cheers_agent::prompt::ComposedRequest;
use cheers_core::TokenUsage;
use cheers_db::{connect_with_settings, migrations, DataStore, SqlDataStore};

/// Replays canned model turns in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedLlm {
    turns: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<ComposedRequest>>,
}

impl ScriptedLlm {
    pub fn new(turns: Vec<ModelResponse>) -> Arc<Self> {
        Arc::new(Self { turns: Mutex::new(turns.into()), requests: Mutex::new(Vec::new()) })
    }

    pub async fn requests(&self) -> Vec<ComposedRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &ComposedRequest) -> Result<ModelResponse, LlmError> {
        self.requests.lock().await.push(request.clone());
        self.turns
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| LlmError::Transport("script exhausted".to_string()))
    }
}

/// Answers every request with plain text, but only after `delay` has passed.
pub struct StalledLlm {
    pub delay: std::time::Duration,
}

#[async_trait]
impl LlmClient for StalledLlm {
    async fn complete(&self, _request: &ComposedRequest) -> Result<ModelResponse, LlmError> {
        tokio::time::sleep(self.delay).await;
        Ok(text_turn("finally done"))
    }
}

pub fn usage(input: u64, output: u64) -> TokenUsage {
    TokenUsage { input_tokens: input, output_tokens: output, ..TokenUsage::default() }
}

pub fn text_turn(text: &str) -> ModelResponse {
    ModelResponse {
        model: "model-standard".to_string(),
        content: vec![ContentBlock::text(text)],
        stop_reason: StopReason::EndTurn,
        usage: usage(100, 20),
    }
}

/// A turn requesting the given `(id, tool, input)` calls.
pub fn tool_turn(calls: &[(&str, &str, Value)]) -> ModelResponse {
    ModelResponse {
        model: "model-standard".to_string(),
        content: calls
            .iter()
            .map(|(id, name, input)| ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: input.clone(),
            })
            .collect(),
        stop_reason: StopReason::ToolUse,
        usage: usage(100, 10),
    }
}

pub async fn memory_store() -> Arc<dyn DataStore> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
    migrations::run_pending(&pool).await.expect("migrations");
    Arc::new(SqlDataStore::new(pool))
}
