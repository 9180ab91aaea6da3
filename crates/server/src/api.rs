//! JSON API for the assistant.
//!
//! - `POST   /api/ai/chat`                      run one chat turn
//! - `POST   /api/ai/actions/{id}/confirm`      execute a queued write
//! - `POST   /api/ai/actions/{id}/reject`       discard a queued write
//! - `GET    /api/ai/conversations`             caller's conversations, most recent first
//! - `GET    /api/ai/conversations/{id}`        one conversation with its messages
//! - `DELETE /api/ai/conversations/{id}`        delete an owned conversation
//!
//! Authentication happens upstream; the caller is identified by the
//! `x-user-id`, `x-user-role`, `x-user-name` and `x-user-language` headers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use cheers_agent::{AgentRuntime, Caller, ChatReply, ChatRequest, ResolveOutcome, ResolveRequest};
use cheers_core::{
    ApplicationError, Conversation, ConversationId, InterfaceError, Message, PendingActionId,
    Resolution, UserRole,
};

use crate::rate_limit::{RateDecision, RateLimiter};

const DEFAULT_PAGE: u32 = 20;
const MAX_PAGE: u32 = 100;

#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<AgentRuntime>,
    pub limiter: RateLimiter,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/ai/chat", post(chat))
        .route("/api/ai/actions/{id}/confirm", post(confirm_action))
        .route("/api/ai/actions/{id}/reject", post(reject_action))
        .route("/api/ai/conversations", get(list_conversations))
        .route("/api/ai/conversations/{id}", get(get_conversation).delete(delete_conversation))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    pub conversation_id: Option<String>,
    pub model_override: Option<String>,
    pub tools: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveBody {
    pub conversation_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

/// A failed request: status plus a message that is safe to show to staff.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub correlation_id: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, correlation_id: &str) -> Self {
        Self { status, message: message.into(), correlation_id: correlation_id.to_string() }
    }

    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        let interface = error.into_interface(correlation_id);
        let status = match &interface {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(
            event_name = "server.request.failed",
            correlation_id,
            status = status.as_u16(),
            error = %interface,
            "request failed"
        );
        Self::new(status, interface.user_message(), correlation_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.message, correlation_id: self.correlation_id };
        (self.status, Json(body)).into_response()
    }
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Resolves the caller from the identity headers set by the upstream gateway.
pub fn caller_from_headers(headers: &HeaderMap, correlation_id: &str) -> Result<Caller, ApiError> {
    let user_id = header(headers, "x-user-id").ok_or_else(|| {
        ApiError::new(StatusCode::UNAUTHORIZED, "Missing user identity.", correlation_id)
    })?;
    Ok(Caller {
        user_id: user_id.to_string(),
        role: UserRole::from_profile(header(headers, "x-user-role")),
        name: header(headers, "x-user-name").unwrap_or("there").to_string(),
        language: header(headers, "x-user-language").unwrap_or("en").to_ascii_lowercase(),
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    let correlation_id = correlation_id();
    let caller = caller_from_headers(&headers, &correlation_id)?;
    if body.message.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Message is required.", &correlation_id));
    }
    if let RateDecision::Limited { retry_after_secs } = state.limiter.check(&caller.user_id).await {
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            format!("Too many requests. Please wait {retry_after_secs} seconds and try again."),
            &correlation_id,
        ));
    }

    info!(
        event_name = "server.chat.received",
        correlation_id = %correlation_id,
        user_id = %caller.user_id,
        role = caller.role.as_str(),
        "chat request received"
    );
    let request = ChatRequest {
        message: body.message,
        conversation_id: body.conversation_id.map(ConversationId),
        model_override: body.model_override,
        tools: body.tools,
    };
    state
        .runtime
        .handle_message(&caller, request, Utc::now())
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

pub async fn confirm_action(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ResolveBody>,
) -> Result<Json<ResolveOutcome>, ApiError> {
    resolve(state, id, headers, body, Resolution::Confirmed).await
}

pub async fn reject_action(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ResolveBody>,
) -> Result<Json<ResolveOutcome>, ApiError> {
    resolve(state, id, headers, body, Resolution::Rejected).await
}

async fn resolve(
    state: ApiState,
    action_id: String,
    headers: HeaderMap,
    body: ResolveBody,
    resolution: Resolution,
) -> Result<Json<ResolveOutcome>, ApiError> {
    let correlation_id = correlation_id();
    let caller = caller_from_headers(&headers, &correlation_id)?;
    let request = ResolveRequest {
        action_id: PendingActionId(action_id),
        user_id: caller.user_id,
        resolution,
        conversation_id: body.conversation_id.map(ConversationId),
    };
    state
        .runtime
        .resolve_action(request, Utc::now())
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

pub async fn list_conversations(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let correlation_id = correlation_id();
    let caller = caller_from_headers(&headers, &correlation_id)?;
    let limit = page.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    state
        .runtime
        .list_conversations(&caller, limit, page.offset.unwrap_or(0))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

pub async fn get_conversation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ConversationDetail>, ApiError> {
    let correlation_id = correlation_id();
    let caller = caller_from_headers(&headers, &correlation_id)?;
    match state.runtime.conversation(&caller, &ConversationId(id)).await {
        Ok(Some((conversation, messages))) => Ok(Json(ConversationDetail { conversation, messages })),
        Ok(None) => {
            Err(ApiError::new(StatusCode::NOT_FOUND, "Conversation not found.", &correlation_id))
        }
        Err(error) => Err(ApiError::from_application(error, &correlation_id)),
    }
}

pub async fn delete_conversation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, ApiError> {
    let correlation_id = correlation_id();
    let caller = caller_from_headers(&headers, &correlation_id)?;
    match state.runtime.delete_conversation(&caller, &ConversationId(id)).await {
        Ok(true) => Ok(Json(DeleteResponse { success: true })),
        Ok(false) => {
            Err(ApiError::new(StatusCode::NOT_FOUND, "Conversation not found.", &correlation_id))
        }
        Err(error) => Err(ApiError::from_application(error, &correlation_id)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use axum::Json;

    use cheers_agent::confirmation::ALREADY_PROCESSED;
    use cheers_agent::llm::{ContentBlock, LlmClient, LlmError, ModelResponse, StopReason};
    use cheers_agent::prompt::ComposedRequest;
    use cheers_agent::services::{PlainTextDocuments, UnconfiguredImages};
    use cheers_agent::{AgentRuntime, RuntimeDeps};
    use cheers_core::config::AppConfig;
    use cheers_core::TokenUsage;
    use cheers_db::repositories::{
        InMemoryAuditRepository, InMemoryConversationRepository, InMemoryPendingActionRepository,
        InMemorySubAgentTaskRepository,
    };
    use cheers_db::{connect_with_settings, migrations, SqlDataStore};

    use super::*;

    /// Answers every turn with the same text.
    struct CannedLlm;

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, request: &ComposedRequest) -> Result<ModelResponse, LlmError> {
            Ok(ModelResponse {
                model: request.model.clone(),
                content: vec![ContentBlock::text("Goedemiddag! Wat kan ik doen?")],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage { input_tokens: 50, output_tokens: 8, ..TokenUsage::default() },
            })
        }
    }

    async fn state(limit: u32) -> ApiState {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let deps = RuntimeDeps {
            llm: Arc::new(CannedLlm),
            store: Arc::new(SqlDataStore::new(pool)),
            conversations: Arc::new(InMemoryConversationRepository::default()),
            actions: Arc::new(InMemoryPendingActionRepository::default()),
            tasks: Arc::new(InMemorySubAgentTaskRepository::default()),
            audit: Arc::new(InMemoryAuditRepository::default()),
            images: Arc::new(UnconfiguredImages),
            documents: Arc::new(PlainTextDocuments),
        };
        let config = AppConfig::default();
        let runtime = AgentRuntime::new(deps, config.llm.model_catalog(), config.assistant)
            .expect("runtime");
        ApiState { runtime: Arc::new(runtime), limiter: RateLimiter::per_minute(limit) }
    }

    fn identity(user_id: &str, role: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_str(user_id).expect("header"));
        headers.insert("x-user-role", HeaderValue::from_str(role).expect("header"));
        headers.insert("x-user-language", HeaderValue::from_static("NL"));
        headers
    }

    fn message(text: &str) -> Json<ChatBody> {
        Json(ChatBody {
            message: text.to_string(),
            conversation_id: None,
            model_override: None,
            tools: None,
        })
    }

    #[test]
    fn unknown_roles_fall_back_to_waiter() {
        let caller = caller_from_headers(&identity("user-1", "sommelier"), "c-1").expect("caller");
        assert_eq!(caller.role, UserRole::Waiter);
        assert_eq!(caller.language, "nl");
        assert_eq!(caller.name, "there");
    }

    #[tokio::test]
    async fn chat_requires_an_identity() {
        let result = chat(State(state(20).await), HeaderMap::new(), message("Hallo")).await;

        let error = result.expect_err("anonymous");
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);
        assert!(!error.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn chat_returns_the_reply_and_stores_the_conversation() {
        let state = state(20).await;
        let headers = identity("user-1", "manager");

        let Json(reply) =
            chat(State(state.clone()), headers.clone(), message("Hallo")).await.expect("reply");
        assert_eq!(reply.response, "Goedemiddag! Wat kan ik doen?");
        assert!(reply.pending_actions.is_empty());

        let Json(listed) = list_conversations(State(state.clone()), headers.clone(), Query(PageQuery::default()))
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);

        let Json(detail) =
            get_conversation(State(state.clone()), Path(reply.conversation_id.0.clone()), headers)
                .await
                .expect("detail");
        assert_eq!(detail.messages.len(), 2);

        let foreign = get_conversation(
            State(state),
            Path(reply.conversation_id.0),
            identity("user-2", "manager"),
        )
        .await
        .expect_err("not owned");
        assert_eq!(foreign.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_is_rate_limited_per_user() {
        let state = state(1).await;

        chat(State(state.clone()), identity("user-1", "bar"), message("Hallo")).await.expect("first");
        let limited = chat(State(state.clone()), identity("user-1", "bar"), message("Nog een"))
            .await
            .expect_err("limited");
        assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);

        chat(State(state), identity("user-2", "bar"), message("Hallo")).await.expect("other user");
    }

    #[tokio::test]
    async fn forbidden_tools_map_to_403_with_a_safe_message() {
        let body = Json(ChatBody {
            message: "Add a shift".to_string(),
            conversation_id: None,
            model_override: None,
            tools: Some(vec!["create_shift".to_string()]),
        });

        let error = chat(State(state(20).await), identity("user-1", "waiter"), body)
            .await
            .expect_err("forbidden");

        assert_eq!(error.status, StatusCode::FORBIDDEN);
        assert_eq!(error.message, "You are not allowed to perform this action.");
    }

    #[tokio::test]
    async fn unknown_model_override_is_a_bad_request() {
        let body = Json(ChatBody {
            message: "Hallo".to_string(),
            conversation_id: None,
            model_override: Some("gpt-9".to_string()),
            tools: None,
        });

        let error = chat(State(state(20).await), identity("user-1", "owner"), body)
            .await
            .expect_err("bad override");

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn confirming_an_unknown_action_reports_already_processed() {
        let Json(outcome) = confirm_action(
            State(state(20).await),
            Path("missing".to_string()),
            identity("user-1", "manager"),
            Json(ResolveBody::default()),
        )
        .await
        .expect("outcome");

        assert!(!outcome.success);
        assert_eq!(outcome.message, ALREADY_PROCESSED);
    }

    #[tokio::test]
    async fn deleting_a_missing_conversation_is_not_found() {
        let error = delete_conversation(
            State(state(20).await),
            Path("missing".to_string()),
            identity("user-1", "manager"),
        )
        .await
        .expect_err("missing");

        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }
}
