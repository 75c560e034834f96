use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transcript::Message;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageModelUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl LanguageModelUsage {
    pub fn accumulate(&mut self, other: &LanguageModelUsage) {
        fn add(slot: &mut Option<u32>, value: Option<u32>) {
            if let Some(value) = value {
                *slot = Some(slot.unwrap_or(0).saturating_add(value));
            }
        }
        add(&mut self.prompt_tokens, other.prompt_tokens);
        add(&mut self.completion_tokens, other.completion_tokens);
        add(&mut self.total_tokens, other.total_tokens);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageModelResponse {
    pub text: String,
    pub usage: LanguageModelUsage,
}

impl LanguageModelResponse {
    pub fn new(text: String) -> Self {
        Self {
            text,
            usage: LanguageModelUsage::default(),
        }
    }
}

/// Failure of a completion call. Always fatal to the current run.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("completion response contained no choice with content")]
    MissingContent,
    #[error("{0}")]
    Other(String),
}

/// Adapter to a hosted completion service.
///
/// Implementations receive the transcript read-only; appending the reply is the
/// caller's job. Retry policy also belongs to the caller.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<LanguageModelResponse, TransportError>;
}
