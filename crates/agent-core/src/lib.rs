//! Agent runtime crate: the execution bridge to the page context, settings
//! resolution and the stock browser tool set, wired around the reasoning loop
//! from `ai-agent`.

pub mod bridge;
pub mod browser_tools;
pub mod config;
pub mod protocol;
pub mod runtime;

pub use bridge::{BridgeClosed, BridgeConfig, ExecutionBridge, RemoteEndpoint};
pub use browser_tools::{browser_tool_descriptions, default_browser_registry};
pub use config::{resolve_settings, resolve_settings_with, AgentSettings, SettingsError};
pub use protocol::{CorrelationId, ToolRequest, ToolResponse, ToolResult};
pub use runtime::{AgentRuntime, AgentRuntimeBuilder};
