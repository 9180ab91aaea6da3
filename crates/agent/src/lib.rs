//! Cheers assistant runtime.
//!
//! Turns one staff message into a model-driven tool loop against the restaurant
//! data store:
//! - `runtime` owns the chat turn: routing, history, context, prompt, persistence
//! - `engine` runs the bounded tool-calling loop with per-tool timeouts
//! - `sub_agents` delegates to the schedule, cocktail and advertising specialists
//! - `queue` and `confirmation` keep every mutation behind an explicit user decision
//!
//! # Safety Principle
//!
//! The model never writes. Write tools only describe an intended change; the
//! change is applied by `write_executor` after the owning user confirms it.

pub mod anthropic;
pub mod assistant_tools;
pub mod confirmation;
pub mod context;
pub mod engine;
pub mod llm;
pub mod prompt;
pub mod queue;
pub mod read_tools;
pub mod runtime;
pub mod services;
pub mod sub_agents;
pub mod system_prompt;
pub mod tools;
pub mod write_executor;

pub use confirmation::{ActionResolver, ResolveOutcome, ResolveRequest};
pub use engine::{EngineOutcome, EngineState, ToolCallingEngine};
pub use llm::{LlmClient, LlmError};
pub use runtime::{AgentRuntime, Caller, ChatReply, ChatRequest, RuntimeDeps};
