//! Reasoning-loop primitives for the page agent.
//! The crate holds the transcript model, the completion client contract and its
//! OpenAI-compatible adapter, the reply parser, the tool registry and the
//! orchestrator that ties them together. Remote tool execution is reached
//! through the [`ToolDispatcher`] seam.

pub mod dispatch;
pub mod language_model;
pub mod openai;
pub mod orchestrator;
pub mod parser;
pub mod tools;
pub mod transcript;

use std::time::Duration;

pub use dispatch::{DispatchError, ToolDispatcher};
pub use language_model::{
    CompletionOptions, LanguageModelClient, LanguageModelResponse, LanguageModelUsage,
    TransportError,
};
pub use openai::{OpenAiClient, DEFAULT_COMPLETION_ENDPOINT};
pub use orchestrator::{
    AgentConfig, AgentEvent, AgentOrchestrator, LoopState, RunOutcome, RunReport,
};
pub use parser::{parse, ReasoningStep};
pub use tools::{
    Capability, LocalTool, RegistryError, ToolDescription, ToolEntry, ToolError, ToolRegistry,
    ToolRegistryBuilder,
};
pub use transcript::{Message, Role, Transcript};

pub const DEFAULT_MAX_ITERATIONS: usize = 4;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
