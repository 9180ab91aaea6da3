//! Tool handler for the primary assistant.
//!
//! Routing follows the catalog kind: reads run against the data store, writes go
//! into the run's confirmation queue, delegations run a specialist and fold its
//! queued writes back into the same queue.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use cheers_core::catalog::tool_kind;
use cheers_core::tool_access::ensure_permitted;
use cheers_core::validation::validate_write_input;
use cheers_core::{SubAgentKind, ToolKind, UserRole, WriteIntent};

use crate::queue::{EnqueueOutcome, WriteQueue};
use crate::read_tools::ReadTools;
use crate::sub_agents::{fold_writes, Delegation, SubAgentDispatcher};
use crate::tools::{ToolCall, ToolFailure, ToolHandler, ToolResult};

pub struct AssistantTools {
    role: UserRole,
    /// Names of the tools this run offered the model; anything else is unknown to it.
    offered: HashSet<String>,
    reads: ReadTools,
    dispatcher: Arc<SubAgentDispatcher>,
    delegation: Delegation,
}

impl AssistantTools {
    pub fn new(
        role: UserRole,
        offered: HashSet<String>,
        reads: ReadTools,
        dispatcher: Arc<SubAgentDispatcher>,
        delegation: Delegation,
    ) -> Self {
        Self { role, offered, reads, dispatcher, delegation }
    }

    async fn queue_write(&self, call: &ToolCall, queue: &WriteQueue) -> ToolResult {
        validate_write_input(&call.name, &call.input)
            .map_err(|error| ToolFailure::new(format!("Validation: {error}")))?;
        let intent = WriteIntent::new(call.name.clone(), call.input.clone());
        let description = intent.description.clone();

        match queue.enqueue(intent).await {
            EnqueueOutcome::Queued(id) => Ok(json!({
                "requires_confirmation": true,
                "action_id": id.0,
                "description": description,
                "message": "This action requires user confirmation.",
            })),
            EnqueueOutcome::Duplicate { reason } => Ok(json!({ "skipped": true, "reason": reason })),
            EnqueueOutcome::CapReached { cap } => Err(cap_reached(cap)),
        }
    }

    async fn delegate(&self, call: &ToolCall, queue: &WriteQueue) -> ToolResult {
        let kind = SubAgentKind::from_delegate_tool(&call.name)
            .ok_or_else(|| ToolFailure::unknown_tool(&call.name))?;
        let report = self.dispatcher.dispatch(kind.as_str(), &call.input, &self.delegation).await;

        let mut pending = Vec::new();
        let mut skipped = Vec::new();
        for intent in fold_writes(kind, report.pending_writes.clone()) {
            let description = intent.description.clone();
            match queue.enqueue(intent).await {
                EnqueueOutcome::Queued(id) => {
                    pending.push(json!({ "action_id": id.0, "description": description }));
                }
                EnqueueOutcome::Duplicate { reason } => {
                    skipped.push(json!({ "description": description, "reason": reason }));
                }
                EnqueueOutcome::CapReached { cap } => {
                    skipped.push(json!({ "description": description, "reason": cap_reached(cap).message }));
                }
            }
        }

        let mut body = report.to_value();
        if !pending.is_empty() {
            body["requires_confirmation"] = json!(true);
            body["pending_actions"] = Value::Array(pending);
        }
        if !skipped.is_empty() {
            body["skipped_actions"] = Value::Array(skipped);
        }
        Ok(body)
    }
}

fn cap_reached(cap: usize) -> ToolFailure {
    ToolFailure::new(format!("Too many pending actions in this turn (limit {cap})"))
        .with_suggestion("Ask the user to confirm the queued actions before adding more.")
}

#[async_trait]
impl ToolHandler for AssistantTools {
    async fn handle(&self, call: &ToolCall, queue: &WriteQueue) -> ToolResult {
        if !self.offered.contains(&call.name) {
            return Err(ToolFailure::unknown_tool(&call.name));
        }
        ensure_permitted(self.role, &call.name).map_err(|_| ToolFailure::access_denied(&call.name))?;
        match tool_kind(&call.name) {
            Some(ToolKind::Read) => self.reads.execute(&call.name, &call.input).await,
            Some(ToolKind::Write) => self.queue_write(call, queue).await,
            Some(ToolKind::Delegate) => self.delegate(call, queue).await,
            None => Err(ToolFailure::unknown_tool(&call.name)),
        }
    }

    fn audits(&self, tool_name: &str) -> bool {
        tool_kind(tool_name) == Some(ToolKind::Read)
    }
}
