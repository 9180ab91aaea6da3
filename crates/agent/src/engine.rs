//! Bounded tool-calling loop.
//!
//! `requesting` → (`tool-dispatch` → `requesting`)* → `done` | `exhausted`, with
//! `failed` reserved for model-call errors. Tool errors and timeouts never leave
//! the loop: they become error results the model can react to.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use cheers_core::{ToolDefinition, TokenUsage};
use cheers_db::repositories::{AuditRepository, ToolExecutionRecord, ToolExecutionStatus};

use crate::llm::{ChatMessage, ChatRole, ContentBlock, LlmClient, LlmError, StopReason};
use crate::prompt::{compose, PromptInput};
use crate::queue::WriteQueue;
use crate::tools::{ToolCall, ToolFailure, ToolHandler};

pub const MAX_ITERATIONS_MARKER: &str = "[max iterations reached]";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Requesting,
    ToolDispatch,
    Done,
    Exhausted,
    Failed,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requesting => "requesting",
            Self::ToolDispatch => "tool_dispatch",
            Self::Done => "done",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub model: String,
    pub max_tokens: u32,
    pub max_iterations: u32,
    pub tool_timeout: Duration,
    /// End the run as soon as a tool call queued a write; the user confirms first.
    pub halt_on_pending_write: bool,
}

/// Where tool executions are audited for one run.
#[derive(Clone)]
pub struct ToolAudit {
    pub repository: Arc<dyn AuditRepository>,
    pub user_id: String,
    pub conversation_id: Option<String>,
}

pub struct EngineRun<'a> {
    pub settings: EngineSettings,
    pub system_prompt: &'a str,
    pub context: Option<&'a str>,
    pub tools: &'a [ToolDefinition],
    pub messages: Vec<ChatMessage>,
    pub audit: Option<ToolAudit>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineOutcome {
    pub state: EngineState,
    pub text: String,
    pub usage: TokenUsage,
    pub iterations: u32,
    /// Tool names in call order, repeats included.
    pub tools_called: Vec<String>,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Error)]
#[error("model call failed after {iterations} iteration(s): {source}")]
pub struct EngineError {
    pub iterations: u32,
    pub usage: TokenUsage,
    #[source]
    pub source: LlmError,
}

struct DispatchResult {
    call: ToolCall,
    result: Result<serde_json::Value, ToolFailure>,
    status: ToolExecutionStatus,
    elapsed: Duration,
}

#[derive(Clone)]
pub struct ToolCallingEngine {
    llm: Arc<dyn LlmClient>,
}

impl ToolCallingEngine {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn run(
        &self,
        run: EngineRun<'_>,
        handler: &dyn ToolHandler,
        queue: &WriteQueue,
    ) -> Result<EngineOutcome, EngineError> {
        let EngineRun { settings, system_prompt, context, tools, mut messages, audit } = run;
        let mut text_parts: Vec<String> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut tools_called = Vec::new();
        let mut model = settings.model.clone();
        let mut iterations = 0;

        loop {
            iterations += 1;
            debug!(
                event_name = "agent.engine.state",
                state = EngineState::Requesting.as_str(),
                iteration = iterations,
                model = %settings.model,
                "requesting model turn"
            );

            let request = compose(PromptInput {
                model: &settings.model,
                max_tokens: settings.max_tokens,
                system_prompt,
                context,
                tools,
                messages: &messages,
            });
            let response = match self.llm.complete(&request).await {
                Ok(response) => response,
                Err(source) => {
                    warn!(
                        event_name = "agent.engine.state",
                        state = EngineState::Failed.as_str(),
                        iteration = iterations,
                        error = %source,
                        "model call failed"
                    );
                    return Err(EngineError { iterations, usage, source });
                }
            };

            usage.add(&response.usage);
            model = response.model.clone();
            let text = response.text();
            if !text.trim().is_empty() {
                text_parts.push(text);
            }

            let calls = response.tool_calls();
            if response.stop_reason != StopReason::ToolUse || calls.is_empty() {
                messages.push(ChatMessage {
                    role: ChatRole::Assistant,
                    content: response.replayable_content(),
                });
                return Ok(finish(
                    EngineState::Done,
                    text_parts,
                    usage,
                    iterations,
                    tools_called,
                    model,
                    messages,
                ));
            }

            if iterations >= settings.max_iterations {
                warn!(
                    event_name = "agent.engine.state",
                    state = EngineState::Exhausted.as_str(),
                    iterations,
                    pending_tool_calls = calls.len(),
                    "iteration cap reached"
                );
                text_parts.push(MAX_ITERATIONS_MARKER.to_string());
                return Ok(finish(
                    EngineState::Exhausted,
                    text_parts,
                    usage,
                    iterations,
                    tools_called,
                    model,
                    messages,
                ));
            }

            debug!(
                event_name = "agent.engine.state",
                state = EngineState::ToolDispatch.as_str(),
                iteration = iterations,
                tool_calls = calls.len(),
                "dispatching tool calls"
            );
            let queued_before = queue.len().await;
            tools_called.extend(calls.iter().map(|call| call.name.clone()));

            // join_all keeps request order regardless of completion order.
            let results = join_all(
                calls
                    .into_iter()
                    .map(|call| dispatch(handler, queue, call, settings.tool_timeout)),
            )
            .await;

            if let Some(audit) = audit.as_ref() {
                record_executions(audit, handler, &results).await;
            }

            messages.push(ChatMessage {
                role: ChatRole::Assistant,
                content: response.replayable_content(),
            });
            messages.push(ChatMessage {
                role: ChatRole::User,
                content: results.iter().map(tool_result_block).collect(),
            });

            if settings.halt_on_pending_write && queue.len().await > queued_before {
                info!(
                    event_name = "agent.engine.halted_for_confirmation",
                    iteration = iterations,
                    "write queued; waiting for user confirmation"
                );
                return Ok(finish(
                    EngineState::Done,
                    text_parts,
                    usage,
                    iterations,
                    tools_called,
                    model,
                    messages,
                ));
            }
        }
    }
}

fn finish(
    state: EngineState,
    text_parts: Vec<String>,
    usage: TokenUsage,
    iterations: u32,
    tools_called: Vec<String>,
    model: String,
    messages: Vec<ChatMessage>,
) -> EngineOutcome {
    EngineOutcome {
        state,
        text: text_parts.join("\n\n"),
        usage,
        iterations,
        tools_called,
        model,
        messages,
    }
}

async fn dispatch(
    handler: &dyn ToolHandler,
    queue: &WriteQueue,
    call: ToolCall,
    timeout: Duration,
) -> DispatchResult {
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, handler.handle(&call, queue)).await;
    let elapsed = started.elapsed();

    let (result, status) = match outcome {
        Ok(Ok(value)) => (Ok(value), ToolExecutionStatus::Success),
        Ok(Err(failure)) => {
            debug!(
                event_name = "agent.tool.failed",
                tool_name = %call.name,
                error = %failure.message,
                "tool returned an error result"
            );
            (Err(failure), ToolExecutionStatus::Error)
        }
        Err(_) => {
            warn!(
                event_name = "agent.tool.timeout",
                tool_name = %call.name,
                timeout_secs = timeout.as_secs(),
                "tool call timed out"
            );
            (Err(ToolFailure::timeout(&call.name, timeout.as_secs())), ToolExecutionStatus::Timeout)
        }
    };

    DispatchResult { call, result, status, elapsed }
}

fn tool_result_block(result: &DispatchResult) -> ContentBlock {
    let (content, is_error) = match &result.result {
        Ok(value) => (value.to_string(), false),
        Err(failure) => (failure.to_value().to_string(), true),
    };
    ContentBlock::ToolResult { tool_use_id: result.call.id.clone(), content, is_error }
}

async fn record_executions(audit: &ToolAudit, handler: &dyn ToolHandler, results: &[DispatchResult]) {
    for result in results.iter().filter(|result| handler.audits(&result.call.name)) {
        let record = ToolExecutionRecord {
            conversation_id: audit.conversation_id.clone(),
            user_id: audit.user_id.clone(),
            tool_name: result.call.name.clone(),
            status: result.status,
            duration_ms: result.elapsed.as_millis() as u64,
            error: result.result.as_ref().err().map(|failure| failure.message.clone()),
            created_at: Utc::now(),
        };
        if let Err(error) = audit.repository.record_tool_execution(record).await {
            warn!(
                event_name = "agent.tool.audit_failed",
                tool_name = %result.call.name,
                error = %error,
                "could not record tool execution"
            );
        }
    }
}
