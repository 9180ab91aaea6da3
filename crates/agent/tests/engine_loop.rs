mod common;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use cheers_agent::engine::{
    EngineRun, EngineSettings, EngineState, ToolCallingEngine, MAX_ITERATIONS_MARKER,
};
use cheers_agent::llm::{ChatMessage, ChatRole, ContentBlock};
use cheers_agent::queue::WriteQueue;
use cheers_agent::tools::{ToolCall, ToolFailure, ToolHandler, ToolResult};
use cheers_core::WriteIntent;

use common::{text_turn, tool_turn, ScriptedLlm};

/// `slow_lookup` sleeps for `seconds`; `queue_note` queues a write; anything else echoes.
struct FakeTools;

#[async_trait]
impl ToolHandler for FakeTools {
    async fn handle(&self, call: &ToolCall, queue: &WriteQueue) -> ToolResult {
        match call.name.as_str() {
            "slow_lookup" => {
                let seconds = call.input.get("seconds").and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                Ok(json!({ "slept": seconds }))
            }
            "queue_note" => {
                let _ = queue.enqueue(WriteIntent::new("create_task", call.input.clone())).await;
                Ok(json!({ "requires_confirmation": true }))
            }
            "broken" => Err(ToolFailure::new("lookup failed")),
            _ => Ok(json!({ "echo": call.name })),
        }
    }
}

fn settings(max_iterations: u32, halt_on_pending_write: bool) -> EngineSettings {
    EngineSettings {
        model: "model-standard".to_string(),
        max_tokens: 1024,
        max_iterations,
        tool_timeout: Duration::from_secs(120),
        halt_on_pending_write,
    }
}

fn run(settings: EngineSettings) -> EngineRun<'static> {
    EngineRun {
        settings,
        system_prompt: "You help restaurant staff.",
        context: None,
        tools: &[],
        messages: vec![ChatMessage::user_text("How busy is tonight?")],
        audit: None,
    }
}

fn tool_results(message: &ChatMessage) -> Vec<(String, String, bool)> {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult { tool_use_id, content, is_error } => {
                Some((tool_use_id.clone(), content.clone(), *is_error))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn text_reply_finishes_in_one_iteration() {
    let llm = ScriptedLlm::new(vec![text_turn("Twelve covers booked.")]);
    let engine = ToolCallingEngine::new(llm.clone());
    let queue = WriteQueue::new(20);

    let outcome = engine.run(run(settings(5, true)), &FakeTools, &queue).await.expect("run");

    assert_eq!(outcome.state, EngineState::Done);
    assert_eq!(outcome.text, "Twelve covers booked.");
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.usage.input_tokens, 100);
    assert_eq!(llm.requests().await.len(), 1);
}

#[tokio::test]
async fn tool_results_come_back_in_request_order() {
    let llm = ScriptedLlm::new(vec![
        tool_turn(&[
            ("call-1", "slow_lookup", json!({ "seconds": 2 })),
            ("call-2", "get_events", json!({})),
            ("call-3", "broken", json!({})),
        ]),
        text_turn("Done."),
    ]);
    let engine = ToolCallingEngine::new(llm.clone());
    let queue = WriteQueue::new(20);

    let outcome = engine.run(run(settings(5, true)), &FakeTools, &queue).await.expect("run");

    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.tools_called, vec!["slow_lookup", "get_events", "broken"]);
    let results_turn = outcome
        .messages
        .iter()
        .find(|message| message.role == ChatRole::User && !tool_results(message).is_empty())
        .expect("tool results");
    let results = tool_results(results_turn);
    let ids: Vec<&str> = results.iter().map(|(id, _, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["call-1", "call-2", "call-3"]);
    assert!(!results[0].2);
    assert!(results[2].2);
    assert!(results[2].1.contains("lookup failed"));
}

#[tokio::test]
async fn iteration_cap_appends_marker() {
    let llm = ScriptedLlm::new(vec![
        tool_turn(&[("call-1", "get_events", json!({}))]),
        tool_turn(&[("call-2", "get_events", json!({}))]),
    ]);
    let engine = ToolCallingEngine::new(llm.clone());
    let queue = WriteQueue::new(20);

    let outcome = engine.run(run(settings(2, true)), &FakeTools, &queue).await.expect("run");

    assert_eq!(outcome.state, EngineState::Exhausted);
    assert_eq!(outcome.iterations, 2);
    assert!(outcome.text.ends_with(MAX_ITERATIONS_MARKER));
    assert_eq!(llm.requests().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out_and_loop_continues() {
    let llm = ScriptedLlm::new(vec![
        tool_turn(&[("call-1", "slow_lookup", json!({ "seconds": 130 }))]),
        text_turn("The lookup took too long."),
    ]);
    let engine = ToolCallingEngine::new(llm.clone());
    let queue = WriteQueue::new(20);

    let outcome = engine.run(run(settings(5, true)), &FakeTools, &queue).await.expect("run");

    assert_eq!(outcome.state, EngineState::Done);
    let requests = llm.requests().await;
    assert_eq!(requests.len(), 2);
    let last = requests[1].messages.last().expect("tool result turn");
    let results = tool_results(&last.message);
    assert_eq!(results.len(), 1);
    assert!(results[0].2);
    assert!(results[0].1.contains("timed out after 120s"));
}

#[tokio::test]
async fn queued_write_halts_the_run() {
    let llm = ScriptedLlm::new(vec![
        tool_turn(&[("call-1", "queue_note", json!({ "title": "Restock limes" }))]),
        text_turn("never requested"),
    ]);
    let engine = ToolCallingEngine::new(llm.clone());
    let queue = WriteQueue::new(20);

    let outcome = engine.run(run(settings(5, true)), &FakeTools, &queue).await.expect("run");

    assert_eq!(outcome.state, EngineState::Done);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(queue.len().await, 1);
    assert_eq!(llm.requests().await.len(), 1);
}

#[tokio::test]
async fn model_failure_surfaces_as_engine_error() {
    let llm = ScriptedLlm::new(Vec::new());
    let engine = ToolCallingEngine::new(llm);
    let queue = WriteQueue::new(20);

    let error = engine.run(run(settings(5, true)), &FakeTools, &queue).await.expect_err("no script");

    assert_eq!(error.iterations, 1);
    assert!(error.to_string().contains("script exhausted"));
}
