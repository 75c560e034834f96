use std::env;
use std::sync::Arc;
use std::time::Duration;

use ai_agent::language_model::{DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use ai_agent::{
    AgentConfig, CompletionOptions, OpenAiClient, DEFAULT_COMPLETION_ENDPOINT,
    DEFAULT_MAX_ITERATIONS, DEFAULT_TOOL_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const ENDPOINT_VAR: &str = "AGENT_COMPLETION_ENDPOINT";
pub const MODEL_VAR: &str = "AGENT_MODEL";
pub const TEMPERATURE_VAR: &str = "AGENT_TEMPERATURE";
pub const MAX_ITERATIONS_VAR: &str = "AGENT_MAX_ITERATIONS";
pub const TOOL_TIMEOUT_VAR: &str = "AGENT_TOOL_TIMEOUT_MS";

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("no completion API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("max_iterations must be at least 1")]
    ZeroIterations,
    #[error("temperature {0} is outside 0.0..=2.0")]
    TemperatureOutOfRange(f32),
    #[error("tool timeout must be greater than zero")]
    ZeroToolTimeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_iterations: usize,
    pub tool_timeout_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_COMPLETION_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT.as_millis() as u64,
        }
    }
}

impl AgentSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self
            .api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty())
        {
            return Err(SettingsError::MissingApiKey);
        }
        if self.max_iterations == 0 {
            return Err(SettingsError::ZeroIterations);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(SettingsError::TemperatureOutOfRange(self.temperature));
        }
        if self.tool_timeout_ms == 0 {
            return Err(SettingsError::ZeroToolTimeout);
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Loop configuration derived from these settings, with the stock prompt.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_iterations: self.max_iterations,
            tool_timeout: self.tool_timeout(),
            completion: CompletionOptions {
                model: self.model.clone(),
                temperature: self.temperature,
                max_tokens: None,
            },
            ..AgentConfig::default()
        }
    }

    pub fn completion_client(&self) -> Result<Arc<OpenAiClient>, SettingsError> {
        self.validate()?;
        let key = self.api_key.clone().unwrap_or_default();
        Ok(Arc::new(OpenAiClient::with_endpoint(
            key,
            self.endpoint.clone(),
        )))
    }
}

/// Overlay process environment variables on `base`.
pub fn resolve_settings(base: &AgentSettings) -> AgentSettings {
    resolve_settings_with(base, |name| env::var(name).ok())
}

pub fn resolve_settings_with<F>(base: &AgentSettings, lookup: F) -> AgentSettings
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = base.clone();

    if let Some(key) = lookup(API_KEY_VAR) {
        if !key.trim().is_empty() {
            cfg.api_key = Some(key.trim().to_string());
        }
    }

    if let Some(endpoint) = lookup(ENDPOINT_VAR) {
        if !endpoint.is_empty() {
            cfg.endpoint = endpoint;
        }
    }

    if let Some(model) = lookup(MODEL_VAR) {
        if !model.is_empty() {
            cfg.model = model;
        }
    }

    if let Some(raw) = lookup(TEMPERATURE_VAR) {
        match raw.trim().parse::<f32>() {
            Ok(value) => cfg.temperature = value,
            Err(_) => warn!(var = TEMPERATURE_VAR, value = %raw, "ignoring unparsable setting"),
        }
    }

    if let Some(raw) = lookup(MAX_ITERATIONS_VAR) {
        match raw.trim().parse::<usize>() {
            Ok(value) => cfg.max_iterations = value,
            Err(_) => warn!(var = MAX_ITERATIONS_VAR, value = %raw, "ignoring unparsable setting"),
        }
    }

    if let Some(raw) = lookup(TOOL_TIMEOUT_VAR) {
        match raw.trim().parse::<u64>() {
            Ok(value) => cfg.tool_timeout_ms = value,
            Err(_) => warn!(var = TOOL_TIMEOUT_VAR, value = %raw, "ignoring unparsable setting"),
        }
    }

    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_stock_agent() {
        let settings = AgentSettings::default();
        assert_eq!(settings.endpoint, "https://api.openai.com/v1/chat/completions");
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.temperature, 0.3);
        assert_eq!(settings.max_iterations, 4);
        assert_eq!(settings.tool_timeout(), Duration::from_secs(30));
        assert_eq!(settings.validate(), Err(SettingsError::MissingApiKey));
    }

    #[test]
    fn environment_overrides_base() {
        let settings = resolve_settings_with(
            &AgentSettings::default(),
            lookup(&[
                (API_KEY_VAR, " sk-test "),
                (MODEL_VAR, "gpt-4o-mini"),
                (TEMPERATURE_VAR, "0.7"),
                (MAX_ITERATIONS_VAR, "6"),
                (TOOL_TIMEOUT_VAR, "1500"),
            ]),
        );
        assert_eq!(settings.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.model, "gpt-4o-mini");
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.max_iterations, 6);
        assert_eq!(settings.tool_timeout(), Duration::from_millis(1500));
        assert!(settings.validate().is_ok());

        let config = settings.agent_config();
        assert_eq!(config.max_iterations, 6);
        assert_eq!(config.completion.model, "gpt-4o-mini");
        assert_eq!(config.tool_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn unparsable_values_keep_base() {
        let settings = resolve_settings_with(
            &AgentSettings::default(),
            lookup(&[(MAX_ITERATIONS_VAR, "lots"), (TEMPERATURE_VAR, "warm"), (ENDPOINT_VAR, "")]),
        );
        assert_eq!(settings, AgentSettings::default());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let base = AgentSettings {
            api_key: Some("sk".into()),
            ..AgentSettings::default()
        };
        assert_eq!(
            AgentSettings {
                max_iterations: 0,
                ..base.clone()
            }
            .validate(),
            Err(SettingsError::ZeroIterations)
        );
        assert_eq!(
            AgentSettings {
                temperature: 2.5,
                ..base.clone()
            }
            .validate(),
            Err(SettingsError::TemperatureOutOfRange(2.5))
        );
        assert_eq!(
            AgentSettings {
                tool_timeout_ms: 0,
                ..base.clone()
            }
            .validate(),
            Err(SettingsError::ZeroToolTimeout)
        );
        assert!(AgentSettings {
            api_key: Some("   ".into()),
            ..base
        }
        .completion_client()
        .is_err());
    }

    #[test]
    fn api_key_is_never_serialized() {
        let settings = AgentSettings {
            api_key: Some("sk-secret".into()),
            ..AgentSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
