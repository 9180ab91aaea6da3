//! Specialist sub-agents.
//!
//! Each specialist is a fixed engine configuration: its own system prompt, tool
//! catalog, handler, model tier and iteration cap. Runs get a fresh write queue;
//! whatever they queue is handed back to the caller for folding into the parent run.

pub mod advertising;
pub mod cocktail;
pub mod schedule;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use cheers_core::domain::sub_agent::SubAgentCompletion;
use cheers_core::{
    Artifact, ArtifactParser, ConversationId, ModelCatalog, ModelTier, SubAgentKind, SubAgentTask,
    SubAgentTaskStatus, TokenUsage, ToolDefinition, WriteIntent,
};
use cheers_db::repositories::SubAgentTaskRepository;
use cheers_db::DataStore;

use crate::engine::{EngineRun, EngineSettings, ToolCallingEngine};
use crate::llm::ChatMessage;
use crate::queue::WriteQueue;
use crate::services::{DocumentRenderer, ImageGenerator};
use crate::tools::ToolHandler;

const RESULT_SUMMARY_CHARS: usize = 500;
/// Time kept back from the parent's tool timeout so the completion write always lands.
const COMPLETION_MARGIN: Duration = Duration::from_secs(5);

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

fn prop(kind: &str, description: &str) -> Value {
    json!({ "type": kind, "description": description })
}

/// Engine configuration for one specialist run.
pub struct SpecialistProfile {
    pub tier: ModelTier,
    pub max_iterations: u32,
    pub max_tokens: u32,
    pub system_prompt: &'static str,
    pub tools: Vec<ToolDefinition>,
    pub user_prompt: String,
}

/// Who delegated, and from where.
#[derive(Clone, Debug)]
pub struct Delegation {
    pub user_id: String,
    pub conversation_id: Option<ConversationId>,
    pub today: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubAgentReport {
    pub success: bool,
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(skip)]
    pub pending_writes: Vec<WriteIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl SubAgentReport {
    fn failed(agent: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            agent: agent.to_string(),
            result: None,
            artifacts: Vec::new(),
            pending_writes: Vec::new(),
            error: Some(error.into()),
            usage: None,
            model: None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|error| json!({ "success": false, "error": error.to_string() }))
    }
}

pub struct SubAgentDispatcher {
    engine: ToolCallingEngine,
    catalog: ModelCatalog,
    tasks: Arc<dyn SubAgentTaskRepository>,
    store: Arc<dyn DataStore>,
    images: Arc<dyn ImageGenerator>,
    documents: Arc<dyn DocumentRenderer>,
    artifacts: Arc<ArtifactParser>,
    tool_timeout: Duration,
    queue_cap: usize,
}

impl SubAgentDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: ToolCallingEngine,
        catalog: ModelCatalog,
        tasks: Arc<dyn SubAgentTaskRepository>,
        store: Arc<dyn DataStore>,
        images: Arc<dyn ImageGenerator>,
        documents: Arc<dyn DocumentRenderer>,
        artifacts: Arc<ArtifactParser>,
        tool_timeout: Duration,
        queue_cap: usize,
    ) -> Self {
        Self {
            engine,
            catalog,
            tasks,
            store,
            images,
            documents,
            artifacts,
            tool_timeout,
            queue_cap,
        }
    }

    /// A specialist run must finish inside the delegating tool call's own timeout.
    fn run_deadline(&self) -> Duration {
        match self.tool_timeout.checked_sub(COMPLETION_MARGIN) {
            Some(deadline) if !deadline.is_zero() => deadline,
            _ => self.tool_timeout / 2,
        }
    }

    fn specialist(
        &self,
        kind: SubAgentKind,
        params: &Map<String, Value>,
        delegation: &Delegation,
    ) -> (SpecialistProfile, Box<dyn ToolHandler>) {
        match kind {
            SubAgentKind::AdvertisingManager => (
                advertising::profile(params, delegation.today),
                Box::new(advertising::AdvertisingTools::new(Arc::clone(&self.store))),
            ),
            SubAgentKind::CocktailSpecialist => (
                cocktail::profile(params),
                Box::new(cocktail::CocktailTools::new(
                    Arc::clone(&self.store),
                    Arc::clone(&self.images),
                    Arc::clone(&self.documents),
                )),
            ),
            SubAgentKind::ScheduleOptimizer => (
                schedule::profile(params, delegation.today),
                Box::new(schedule::ScheduleTools::new(Arc::clone(&self.store))),
            ),
        }
    }

    /// Runs a specialist. Never fails: every outcome, including an unknown tag,
    /// is a report the delegating model can read.
    pub async fn dispatch(
        &self,
        agent_tag: &str,
        params: &Map<String, Value>,
        delegation: &Delegation,
    ) -> SubAgentReport {
        let kind = match SubAgentKind::parse(agent_tag) {
            Ok(kind) => kind,
            Err(error) => {
                warn!(
                    event_name = "agent.sub_agent.unknown",
                    agent = agent_tag,
                    user_id = %delegation.user_id,
                    "rejected unknown sub-agent"
                );
                return SubAgentReport::failed(agent_tag, error.to_string());
            }
        };

        let (profile, handler) = self.specialist(kind, params, delegation);
        let model = self.catalog.model_id(profile.tier).to_string();

        let task = SubAgentTask::running(
            kind,
            delegation.user_id.clone(),
            delegation.conversation_id.clone(),
            params.clone(),
            Utc::now(),
        );
        let task_id = task.id.clone();
        let logged = match self.tasks.insert_running(task).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "agent.sub_agent.log_failed",
                    agent = kind.as_str(),
                    error = %error,
                    "could not record sub-agent start"
                );
                false
            }
        };

        info!(
            event_name = "agent.sub_agent.started",
            agent = kind.as_str(),
            model = %model,
            task_id = %task_id.0,
            "dispatching sub-agent"
        );
        let started = Instant::now();
        let queue = WriteQueue::new(self.queue_cap);
        let run = EngineRun {
            settings: EngineSettings {
                model: model.clone(),
                max_tokens: profile.max_tokens,
                max_iterations: profile.max_iterations,
                tool_timeout: self.tool_timeout,
                halt_on_pending_write: false,
            },
            system_prompt: profile.system_prompt,
            context: None,
            tools: &profile.tools,
            messages: vec![ChatMessage::user_text(profile.user_prompt.clone())],
            audit: None,
        };
        let deadline = self.run_deadline();
        let outcome =
            tokio::time::timeout(deadline, self.engine.run(run, handler.as_ref(), &queue)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let report = match outcome {
            Err(_) => {
                warn!(
                    event_name = "agent.sub_agent.timeout",
                    agent = kind.as_str(),
                    deadline_secs = deadline.as_secs(),
                    "sub-agent run exceeded its deadline"
                );
                SubAgentReport {
                    model: Some(model.clone()),
                    ..SubAgentReport::failed(
                        kind.as_str(),
                        format!("{} timed out after {}s", kind.as_str(), deadline.as_secs()),
                    )
                }
            }
            Ok(Ok(outcome)) => SubAgentReport {
                success: true,
                agent: kind.as_str().to_string(),
                artifacts: self.artifacts.parse(&outcome.text),
                result: Some(outcome.text),
                pending_writes: queue.into_writes().into_iter().map(|write| write.intent).collect(),
                error: None,
                usage: Some(outcome.usage),
                model: Some(outcome.model),
            },
            Ok(Err(error)) => {
                warn!(
                    event_name = "agent.sub_agent.failed",
                    agent = kind.as_str(),
                    error = %error,
                    "sub-agent run failed"
                );
                SubAgentReport {
                    usage: Some(error.usage),
                    model: Some(model.clone()),
                    ..SubAgentReport::failed(kind.as_str(), format!("{} failed: {}", kind.as_str(), error.source))
                }
            }
        };

        if logged {
            self.complete_task(&task_id, &report, duration_ms).await;
        }
        info!(
            event_name = "agent.sub_agent.finished",
            agent = kind.as_str(),
            success = report.success,
            duration_ms,
            pending_writes = report.pending_writes.len(),
            "sub-agent finished"
        );
        report
    }

    async fn complete_task(
        &self,
        task_id: &cheers_core::SubAgentTaskId,
        report: &SubAgentReport,
        duration_ms: u64,
    ) {
        let completion = SubAgentCompletion {
            status: if report.success {
                SubAgentTaskStatus::Completed
            } else {
                SubAgentTaskStatus::Failed
            },
            model_used: report.model.clone(),
            result_summary: report
                .result
                .as_ref()
                .map(|text| text.chars().take(RESULT_SUMMARY_CHARS).collect()),
            artifacts: report
                .artifacts
                .iter()
                .filter_map(|artifact| serde_json::to_value(artifact).ok())
                .collect(),
            token_usage: report.usage,
            duration_ms,
            error: report.error.clone(),
            completed_at: Utc::now(),
        };
        if let Err(error) = self.tasks.complete(task_id, completion).await {
            warn!(
                event_name = "agent.sub_agent.log_failed",
                task_id = %task_id.0,
                error = %error,
                "could not record sub-agent completion"
            );
        }
    }
}

/// Groups a specialist's queued writes by tool, keeping first-seen order.
/// A lone write keeps its own parameters; several become one batched write.
pub fn fold_writes(agent: SubAgentKind, writes: Vec<WriteIntent>) -> Vec<WriteIntent> {
    let mut groups: Vec<(String, Vec<WriteIntent>)> = Vec::new();
    for write in writes {
        match groups.iter_mut().find(|(tool, _)| *tool == write.tool_name) {
            Some((_, group)) => group.push(write),
            None => groups.push((write.tool_name.clone(), vec![write])),
        }
    }

    groups
        .into_iter()
        .filter_map(|(tool, mut group)| {
            if group.len() == 1 {
                return group.pop();
            }
            let count = group.len();
            let mut params = Map::new();
            params.insert(
                "descriptions".to_string(),
                group.iter().map(|write| Value::String(write.description.clone())).collect(),
            );
            params.insert(
                "items".to_string(),
                group.into_iter().map(|write| Value::Object(write.params)).collect(),
            );
            Some(
                WriteIntent::new(tool.clone(), params)
                    .with_description(format!("{}: {count} {tool} operation(s)", agent.as_str())),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use cheers_core::{SubAgentKind, WriteIntent};

    use super::fold_writes;

    fn ad(title: &str) -> WriteIntent {
        let params: Map<String, Value> =
            json!({"title": title, "placement": "social_media"}).as_object().cloned().unwrap_or_default();
        WriteIntent::new("create_ad", params).with_description(format!("Ad: {title} (social_media)"))
    }

    #[test]
    fn single_writes_pass_through_unchanged() {
        let folded = fold_writes(SubAgentKind::AdvertisingManager, vec![ad("Sunset Sessions")]);
        assert_eq!(folded, vec![ad("Sunset Sessions")]);
    }

    #[test]
    fn repeated_tools_fold_into_one_batched_write() {
        let export = WriteIntent::new("export_schedule_excel", Map::new());
        let folded = fold_writes(
            SubAgentKind::AdvertisingManager,
            vec![ad("Quiz Night"), export.clone(), ad("DJ Night")],
        );

        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].tool_name, "create_ad");
        assert_eq!(folded[0].description, "advertising_manager: 2 create_ad operation(s)");
        assert_eq!(folded[0].params["items"][1]["title"], "DJ Night");
        assert_eq!(folded[0].params["descriptions"][0], "Ad: Quiz Night (social_media)");
        assert_eq!(folded[1], export);
    }
}
