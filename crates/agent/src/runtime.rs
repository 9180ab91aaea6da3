//! Chat flow for one user turn, plus the conversation and action surfaces the
//! HTTP layer exposes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use cheers_core::config::AssistantConfig;
use cheers_core::cost;
use cheers_core::tool_access::resolve_tools;
use cheers_core::{
    ApplicationError, Artifact, ArtifactParser, Conversation, ConversationId, DomainError, Message,
    MessageRole, ModelCatalog, ModelRouter, ModelSelection, PendingAction, PendingActionId,
    TokenUsage, ToolDefinition, UserRole,
};
use cheers_db::repositories::{
    AuditRepository, ConversationRepository, PendingActionRepository, RepositoryError,
    SubAgentTaskRepository,
};
use cheers_db::DataStore;

use crate::assistant_tools::AssistantTools;
use crate::confirmation::{ActionResolver, ResolveOutcome, ResolveRequest};
use crate::context::ContextRegistry;
use crate::engine::{EngineRun, EngineSettings, EngineState, ToolAudit, ToolCallingEngine};
use crate::llm::{ChatMessage, ChatRole, LlmClient};
use crate::queue::WriteQueue;
use crate::read_tools::ReadTools;
use crate::services::{DocumentRenderer, ImageGenerator};
use crate::sub_agents::{Delegation, SubAgentDispatcher};
use crate::system_prompt::{PromptContext, SystemPromptBuilder};
use crate::write_executor::WriteExecutor;

const EMPTY_REPLY: &str = "I couldn't produce an answer for that. Could you rephrase the request?";
const AWAITING_CONFIRMATION: &str = "Please confirm or reject the pending action below.";

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// Everything the runtime talks to.
#[derive(Clone)]
pub struct RuntimeDeps {
    pub llm: Arc<dyn LlmClient>,
    pub store: Arc<dyn DataStore>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub actions: Arc<dyn PendingActionRepository>,
    pub tasks: Arc<dyn SubAgentTaskRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub images: Arc<dyn ImageGenerator>,
    pub documents: Arc<dyn DocumentRenderer>,
}

/// The authenticated caller, as resolved upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: UserRole,
    pub name: String,
    /// ISO 639-1 code.
    pub language: String,
}

#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<ConversationId>,
    pub model_override: Option<String>,
    /// Explicit tool subset; `None` means every tool the role may use.
    pub tools: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PendingActionSummary {
    pub id: PendingActionId,
    pub tool_name: String,
    pub description: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&PendingAction> for PendingActionSummary {
    fn from(action: &PendingAction) -> Self {
        Self {
            id: action.id.clone(),
            tool_name: action.tool_name.clone(),
            description: action.description.clone(),
            expires_at: action.expires_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub conversation_id: ConversationId,
    pub artifacts: Vec<Artifact>,
    pub tools_used: Vec<String>,
    pub pending_actions: Vec<PendingActionSummary>,
    pub model: String,
    pub model_selection: ModelSelection,
    pub usage: TokenUsage,
    pub cost_usd: Decimal,
    pub cache_hit_rate: Decimal,
    pub state: EngineState,
    pub iterations: u32,
}

pub struct AgentRuntime {
    router: ModelRouter,
    engine: ToolCallingEngine,
    context: ContextRegistry,
    prompts: SystemPromptBuilder,
    artifacts: Arc<ArtifactParser>,
    dispatcher: Arc<SubAgentDispatcher>,
    resolver: ActionResolver,
    deps: RuntimeDeps,
    settings: AssistantConfig,
}

impl AgentRuntime {
    pub fn new(
        deps: RuntimeDeps,
        catalog: ModelCatalog,
        settings: AssistantConfig,
    ) -> Result<Self, ApplicationError> {
        let configuration = |error: String| ApplicationError::Configuration(error);
        let router =
            ModelRouter::new(catalog.clone()).map_err(|error| configuration(error.to_string()))?;
        let context = ContextRegistry::new().map_err(|error| configuration(error.to_string()))?;
        let prompts =
            SystemPromptBuilder::new().map_err(|error| configuration(error.to_string()))?;
        let artifacts =
            Arc::new(ArtifactParser::new().map_err(|error| configuration(error.to_string()))?);

        let engine = ToolCallingEngine::new(Arc::clone(&deps.llm));
        let dispatcher = Arc::new(SubAgentDispatcher::new(
            engine.clone(),
            catalog,
            Arc::clone(&deps.tasks),
            Arc::clone(&deps.store),
            Arc::clone(&deps.images),
            Arc::clone(&deps.documents),
            Arc::clone(&artifacts),
            Duration::from_secs(settings.tool_timeout_secs),
            settings.max_pending_actions_per_run,
        ));
        let executor = Arc::new(WriteExecutor::new(Arc::clone(&deps.store), Arc::clone(&deps.documents)));
        let resolver = ActionResolver::new(
            Arc::clone(&deps.actions),
            Arc::clone(&deps.conversations),
            Arc::clone(&deps.audit),
            executor,
        );

        Ok(Self { router, engine, context, prompts, artifacts, dispatcher, resolver, deps, settings })
    }

    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> u64 {
        self.resolver.sweep(now).await
    }

    pub async fn resolve_action(
        &self,
        request: ResolveRequest,
        now: DateTime<Utc>,
    ) -> Result<ResolveOutcome, ApplicationError> {
        self.resolver.resolve(request, now).await
    }

    pub async fn list_conversations(
        &self,
        caller: &Caller,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, ApplicationError> {
        self.deps.conversations.list_for_user(&caller.user_id, limit, offset).await.map_err(persistence)
    }

    /// A conversation and its messages, or `None` when it does not exist or
    /// belongs to someone else.
    pub async fn conversation(
        &self,
        caller: &Caller,
        id: &ConversationId,
    ) -> Result<Option<(Conversation, Vec<Message>)>, ApplicationError> {
        let Some(conversation) = self.owned_conversation(caller, id).await? else {
            return Ok(None);
        };
        let messages = self.deps.conversations.list_messages(id, None).await.map_err(persistence)?;
        Ok(Some((conversation, messages)))
    }

    pub async fn delete_conversation(
        &self,
        caller: &Caller,
        id: &ConversationId,
    ) -> Result<bool, ApplicationError> {
        if self.owned_conversation(caller, id).await?.is_none() {
            return Ok(false);
        }
        let deleted = self.deps.conversations.delete(id).await.map_err(persistence)?;
        info!(
            event_name = "agent.conversation.deleted",
            conversation_id = %id.0,
            user_id = %caller.user_id,
            "conversation deleted"
        );
        Ok(deleted)
    }

    async fn owned_conversation(
        &self,
        caller: &Caller,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ApplicationError> {
        Ok(self
            .deps
            .conversations
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .filter(|conversation| conversation.user_id == caller.user_id))
    }

    pub async fn handle_message(
        &self,
        caller: &Caller,
        request: ChatRequest,
        now: DateTime<Utc>,
    ) -> Result<ChatReply, ApplicationError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(DomainError::InvariantViolation("message must not be empty".to_string()).into());
        }
        let tools: Vec<ToolDefinition> = resolve_tools(caller.role, request.tools.as_deref())?
            .into_iter()
            .cloned()
            .collect();
        let selection = self.router.select(message, request.model_override.as_deref())?;
        let model = self.router.catalog().model_id(selection.tier).to_string();

        self.resolver.sweep(now).await;

        let conversation = self.open_conversation(caller, request.conversation_id.as_ref(), message, now).await?;
        let conversation_id = conversation.id.clone();
        self.deps
            .conversations
            .append_message(Message::new(conversation_id.clone(), MessageRole::User, message, now))
            .await
            .map_err(persistence)?;
        let history = self
            .deps
            .conversations
            .list_messages(&conversation_id, Some(self.settings.history_limit))
            .await
            .map_err(persistence)?;

        let local = now.with_timezone(&Local).naive_local();
        let today = local.date();
        let context = self.context.resolve(message, caller.role, self.deps.store.as_ref(), today).await;
        let system_prompt = self
            .prompts
            .render(&PromptContext {
                user_name: &caller.name,
                role: caller.role,
                language: &caller.language,
                now: local,
            })
            .map_err(|error| ApplicationError::Configuration(format!("system prompt: {error}")))?;

        let queue = WriteQueue::new(self.settings.max_pending_actions_per_run);
        let handler = AssistantTools::new(
            caller.role,
            tools.iter().map(|tool| tool.name.clone()).collect(),
            ReadTools::new(Arc::clone(&self.deps.store), Arc::clone(&self.deps.images), today),
            Arc::clone(&self.dispatcher),
            Delegation {
                user_id: caller.user_id.clone(),
                conversation_id: Some(conversation_id.clone()),
                today,
            },
        );
        info!(
            event_name = "agent.chat.started",
            conversation_id = %conversation_id.0,
            user_id = %caller.user_id,
            role = caller.role.as_str(),
            model = %model,
            reason = %selection.reason,
            tools = tools.len(),
            has_context = context.is_some(),
            "handling chat message"
        );

        let run = EngineRun {
            settings: EngineSettings {
                model: model.clone(),
                max_tokens: selection.tier.max_output_tokens(),
                max_iterations: self.settings.max_iterations,
                tool_timeout: Duration::from_secs(self.settings.tool_timeout_secs),
                halt_on_pending_write: true,
            },
            system_prompt: &system_prompt,
            context: context.as_deref(),
            tools: &tools,
            messages: to_chat_history(&history),
            audit: Some(ToolAudit {
                repository: Arc::clone(&self.deps.audit),
                user_id: caller.user_id.clone(),
                conversation_id: Some(conversation_id.0.clone()),
            }),
        };
        let outcome = self.engine.run(run, &handler, &queue).await.map_err(|error| {
            warn!(
                event_name = "agent.chat.failed",
                conversation_id = %conversation_id.0,
                iterations = error.iterations,
                error = %error,
                "engine run failed"
            );
            ApplicationError::Integration(error.to_string())
        })?;

        let ttl = chrono::Duration::seconds(i64::try_from(self.settings.pending_action_ttl_secs).unwrap_or(i64::MAX));
        let mut pending = Vec::new();
        for write in queue.into_writes() {
            let mut action = PendingAction::from_intent(
                write.intent,
                caller.user_id.clone(),
                Some(conversation_id.clone()),
                ttl,
                now,
            );
            action.id = write.id;
            self.deps.actions.insert(action.clone()).await.map_err(persistence)?;
            pending.push(action);
        }

        let response = match outcome.text.trim() {
            "" if pending.is_empty() => EMPTY_REPLY.to_string(),
            "" => AWAITING_CONFIRMATION.to_string(),
            _ => outcome.text.clone(),
        };
        let artifacts = self.artifacts.parse(&response);
        let tools_used = dedupe(&outcome.tools_called);
        let estimate = cost::estimate(selection.tier, &outcome.usage);

        let mut reply_message = Message::new(conversation_id.clone(), MessageRole::Assistant, &response, now);
        reply_message.tools_used = tools_used.clone();
        reply_message.pending_action_id = pending.last().map(|action| action.id.clone());
        reply_message.token_usage = Some(outcome.usage);
        reply_message.metadata.insert("model_used".to_string(), serde_json::json!(outcome.model));
        reply_message
            .metadata
            .insert("model_reason".to_string(), serde_json::json!(selection.reason));
        reply_message
            .metadata
            .insert("engine_state".to_string(), serde_json::json!(outcome.state.as_str()));
        self.deps.conversations.append_message(reply_message).await.map_err(persistence)?;

        if let Err(error) = self
            .deps
            .conversations
            .record_usage(&conversation_id, outcome.usage.total(), estimate.usd, now)
            .await
        {
            warn!(
                event_name = "agent.conversation.usage_failed",
                conversation_id = %conversation_id.0,
                error = %error,
                "could not update conversation totals"
            );
        }

        info!(
            event_name = "agent.chat.completed",
            conversation_id = %conversation_id.0,
            state = outcome.state.as_str(),
            iterations = outcome.iterations,
            pending_actions = pending.len(),
            input_tokens = outcome.usage.input_tokens,
            output_tokens = outcome.usage.output_tokens,
            cache_read_tokens = outcome.usage.cache_read_tokens,
            cost_usd = %estimate.usd,
            "chat turn finished"
        );

        Ok(ChatReply {
            response,
            conversation_id,
            artifacts,
            tools_used,
            pending_actions: pending.iter().map(PendingActionSummary::from).collect(),
            model: outcome.model,
            model_selection: selection,
            usage: outcome.usage,
            cost_usd: estimate.usd,
            cache_hit_rate: estimate.cache_hit_rate,
            state: outcome.state,
            iterations: outcome.iterations,
        })
    }

    /// Reuses the caller's own conversation; any other id starts a fresh one.
    async fn open_conversation(
        &self,
        caller: &Caller,
        requested: Option<&ConversationId>,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Conversation, ApplicationError> {
        if let Some(id) = requested {
            if let Some(conversation) = self.owned_conversation(caller, id).await? {
                return Ok(conversation);
            }
            warn!(
                event_name = "agent.conversation.not_owned",
                conversation_id = %id.0,
                user_id = %caller.user_id,
                "unknown or foreign conversation; starting a new one"
            );
        }
        let conversation = Conversation::start(caller.user_id.clone(), message, now);
        self.deps.conversations.create(conversation.clone()).await.map_err(persistence)?;
        Ok(conversation)
    }
}

/// Stored user/assistant turns as model history. The model API requires the
/// history to open with a user turn.
fn to_chat_history(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|message| !message.content.trim().is_empty())
        .filter_map(|message| match message.role {
            MessageRole::User => Some(ChatMessage::user_text(message.content.clone())),
            MessageRole::Assistant => Some(ChatMessage::assistant_text(message.content.clone())),
            MessageRole::Tool => None,
        })
        .skip_while(|message| message.role != ChatRole::User)
        .collect()
}

fn dedupe(names: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for name in names {
        if !unique.contains(name) {
            unique.push(name.clone());
        }
    }
    unique
}
