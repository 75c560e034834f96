use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

static TOOL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("tool name pattern is valid"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    /// Name of the single free-text argument, when the tool takes one.
    #[serde(default)]
    pub argument: Option<String>,
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
}

impl ToolDescription {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            argument: None,
            metadata: IndexMap::default(),
        }
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }

    /// `name(argument): description`, as listed in the system prompt.
    pub fn signature_line(&self) -> String {
        match &self.argument {
            Some(argument) => format!("- {}({}): {}", self.name, argument, self.description),
            None => format!("- {}: {}", self.name, self.description),
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool invocation failed: {0}")]
    Invocation(String),
}

/// A tool that runs in-process without suspending the loop.
pub trait LocalTool: Send + Sync {
    fn invoke(&self, argument: Option<&str>) -> Result<String, ToolError>;
}

impl<F> LocalTool for F
where
    F: Fn(Option<&str>) -> Result<String, ToolError> + Send + Sync,
{
    fn invoke(&self, argument: Option<&str>) -> Result<String, ToolError> {
        self(argument)
    }
}

/// Where and how a registered tool executes.
#[derive(Clone)]
pub enum Capability {
    Local(Arc<dyn LocalTool>),
    /// Canned reply, returned without touching the page.
    Stub(String),
    /// Dispatched across the execution boundary.
    Remote,
}

impl Capability {
    pub fn local<T: LocalTool + 'static>(tool: T) -> Self {
        Self::Local(Arc::new(tool))
    }

    pub fn stub(reply: impl Into<String>) -> Self {
        Self::Stub(reply.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Stub(_) => "stub",
            Self::Remote => "remote",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(_) => f.write_str("Local(..)"),
            Self::Stub(reply) => f.debug_tuple("Stub").field(reply).finish(),
            Self::Remote => f.write_str("Remote"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool {name:?} is registered more than once")]
    Duplicate { name: String },
    #[error("tool name {name:?} is not a valid identifier")]
    InvalidName { name: String },
    #[error("Tool \"{name}\" not found")]
    NotFound { name: String },
}

#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub description: ToolDescription,
    pub capability: Capability,
}

/// Immutable name → capability map, fixed once built.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn resolve(&self, name: &str) -> Result<&Capability, RegistryError> {
        self.tools
            .get(name)
            .map(|entry| &entry.capability)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn descriptions(&self) -> Vec<ToolDescription> {
        self.tools
            .values()
            .map(|entry| entry.description.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// One line per tool, in registration order.
    pub fn render_tool_list(&self) -> String {
        self.tools
            .values()
            .map(|entry| entry.description.signature_line())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: Vec<ToolEntry>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, description: ToolDescription, capability: Capability) -> Self {
        self.entries.push(ToolEntry {
            description,
            capability,
        });
        self
    }

    pub fn remote(self, description: ToolDescription) -> Self {
        self.register(description, Capability::Remote)
    }

    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut tools = IndexMap::with_capacity(self.entries.len());
        for entry in self.entries {
            let name = entry.description.name.clone();
            if !TOOL_NAME.is_match(&name) {
                return Err(RegistryError::InvalidName { name });
            }
            if tools.contains_key(&name) {
                return Err(RegistryError::Duplicate { name });
            }
            tools.insert(name, entry);
        }
        Ok(ToolRegistry { tools })
    }
}
