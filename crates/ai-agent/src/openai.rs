use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::language_model::{
    CompletionOptions, LanguageModelClient, LanguageModelResponse, LanguageModelUsage,
    TransportError,
};
use crate::transcript::{Message, Role};

pub const DEFAULT_COMPLETION_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn build_request<'a>(
        messages: &'a [Message],
        options: &'a CompletionOptions,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &options.model,
            messages: messages.iter().map(ChatMessage::from_message).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }
}

#[async_trait]
impl LanguageModelClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<LanguageModelResponse, TransportError> {
        let body = Self::build_request(messages, options);
        debug!(
            target: "completion_client",
            model = %options.model,
            messages = messages.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!(
                target: "completion_client",
                status = status.as_u16(),
                "completion service rejected request"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: ChatResponse = serde_json::from_str(&text)?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or(TransportError::MissingContent)?;

        Ok(LanguageModelResponse {
            text: content,
            usage: payload.usage.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    // The chat API has no observation role; observations go back as user turns.
    fn from_message(message: &Message) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User | Role::Observation => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role,
            content: message.rendered_content(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<LanguageModelUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
