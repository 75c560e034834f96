//! Envelopes carried across the boundary between the agent and the page
//! execution context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Token pairing a tool request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub correlation_id: CorrelationId,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ToolResult {
    Output(String),
    Error(String),
    UnknownTool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub correlation_id: CorrelationId,
    pub result: ToolResult,
}

impl ToolResponse {
    pub fn output(correlation_id: CorrelationId, text: impl Into<String>) -> Self {
        Self {
            correlation_id,
            result: ToolResult::Output(text.into()),
        }
    }

    pub fn error(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            result: ToolResult::Error(message.into()),
        }
    }

    pub fn unknown_tool(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            result: ToolResult::UnknownTool,
        }
    }
}
