use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Why a remote tool call produced no result text.
///
/// Every variant is recoverable: the loop turns it into an observation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Tool \"{tool}\" not found")]
    ToolNotFound { tool: String },
    #[error("Tool \"{tool}\" failed: {message}")]
    Execution { tool: String, message: String },
    #[error("Tool \"{tool}\" did not respond within {}ms", .timeout.as_millis())]
    Timeout { tool: String, timeout: Duration },
    #[error("execution context for tool \"{tool}\" is disconnected")]
    Disconnected { tool: String },
}

/// Sends a tool invocation to wherever remote tools execute and waits for its result.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        tool: &str,
        argument: Option<&str>,
        timeout: Duration,
    ) -> Result<String, DispatchError>;
}
