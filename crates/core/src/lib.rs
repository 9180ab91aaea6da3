pub mod artifact;
pub mod catalog;
pub mod config;
pub mod cost;
pub mod domain;
pub mod errors;
pub mod model_router;
pub mod tool_access;
pub mod validation;

pub use artifact::{Artifact, ArtifactKind, ArtifactParser};
pub use catalog::{ToolDefinition, ToolKind};
pub use domain::conversation::{
    Conversation, ConversationId, ConversationUpdate, Message, MessageId, MessageRole, TokenUsage,
};
pub use domain::model::{ModelCatalog, ModelSelection, ModelTier};
pub use domain::pending_action::{
    PendingAction, PendingActionId, PendingActionStatus, Resolution, WriteIntent,
};
pub use domain::role::UserRole;
pub use domain::sub_agent::{SubAgentKind, SubAgentTask, SubAgentTaskId, SubAgentTaskStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use model_router::ModelRouter;
