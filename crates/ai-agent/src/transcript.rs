use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix used when observations are rendered or replayed to the model.
pub const OBSERVATION_PREFIX: &str = "Observation: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Observation,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Observation => "observation",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Text of the message as it appears in a rendered transcript.
    pub fn rendered_content(&self) -> String {
        match self.role {
            Role::Observation => format!("{OBSERVATION_PREFIX}{}", self.content),
            _ => self.content.clone(),
        }
    }
}

/// Ordered, append-only message history for a single run.
///
/// A transcript always starts with exactly one system message followed by the
/// user request. Only assistant replies and observations can be appended, so
/// the history can never be reordered or rewritten once the loop is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>, user_request: impl Into<String>) -> Self {
        Self {
            messages: vec![
                Message::new(Role::System, system_prompt),
                Message::new(Role::User, user_request),
            ],
        }
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::Assistant, content));
    }

    pub fn push_observation(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::Observation, content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|msg| msg.role == role).count()
    }

    /// Joins every message with a blank line, observations carrying their prefix.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(Message::rendered_content)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
