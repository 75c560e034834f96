use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ai_agent::{
    AgentConfig, AgentOrchestrator, LanguageModelClient, RunReport, ToolDescription, ToolRegistry,
};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::bridge::{BridgeConfig, ExecutionBridge, RemoteEndpoint};
use crate::browser_tools::default_browser_registry;
use crate::config::AgentSettings;

/// A configured agent wired to an execution bridge.
///
/// The runtime answers one request at a time per call to [`run`](Self::run);
/// starting a new run cancels whatever run was still active.
pub struct AgentRuntime {
    orchestrator: AgentOrchestrator,
    bridge: Arc<ExecutionBridge>,
    active: Mutex<Option<ActiveRun>>,
}

struct ActiveRun {
    id: Uuid,
    token: CancellationToken,
}

/// Clears the active slot when its run ends, unless a newer run has taken it.
struct ActiveRunGuard<'a> {
    runtime: &'a AgentRuntime,
    id: Uuid,
}

impl Drop for ActiveRunGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.runtime.lock_active();
        if active.as_ref().is_some_and(|run| run.id == self.id) {
            *active = None;
        }
    }
}

impl AgentRuntime {
    pub fn builder(model: Arc<dyn LanguageModelClient>) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new(model)
    }

    /// Builder backed by the HTTP completion client described by `settings`.
    pub fn from_settings(settings: &AgentSettings) -> Result<AgentRuntimeBuilder> {
        let client = settings
            .completion_client()
            .context("invalid agent settings")?;
        Ok(AgentRuntimeBuilder::new(client).with_settings(settings))
    }

    /// Run the loop for `prompt` and return the rendered transcript.
    pub async fn run(&self, prompt: &str, current_url: &str) -> String {
        self.run_report(prompt, current_url).await.render()
    }

    pub async fn run_report(&self, prompt: &str, current_url: &str) -> RunReport {
        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        let previous = self.lock_active().replace(ActiveRun {
            id: run_id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        let _active = ActiveRunGuard {
            runtime: self,
            id: run_id,
        };

        let span = info_span!("agent_run", %run_id);
        let report = self
            .orchestrator
            .run_task_with_cancellation(prompt, current_url, &token)
            .instrument(span.clone())
            .await;
        span.in_scope(|| {
            info!(
                iterations = report.iterations,
                tool_calls = report.remote_dispatches(),
                "run complete"
            );
        });
        report
    }

    /// Cancel the active run, if any. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        match self.lock_active().take() {
            Some(run) if !run.token.is_cancelled() => {
                run.token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn tool_descriptions(&self) -> Vec<ToolDescription> {
        self.orchestrator.tools().descriptions()
    }

    pub fn config(&self) -> &AgentConfig {
        self.orchestrator.config()
    }

    pub fn pending_tool_calls(&self) -> usize {
        self.bridge.pending_requests()
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct AgentRuntimeBuilder {
    model: Arc<dyn LanguageModelClient>,
    config: AgentConfig,
    tools: Option<ToolRegistry>,
    bridge: BridgeConfig,
}

impl AgentRuntimeBuilder {
    fn new(model: Arc<dyn LanguageModelClient>) -> Self {
        Self {
            model,
            config: AgentConfig::default(),
            tools: None,
            bridge: BridgeConfig::default(),
        }
    }

    pub fn with_settings(mut self, settings: &AgentSettings) -> Self {
        let prompt = std::mem::take(&mut self.config.system_prompt);
        self.config = AgentConfig {
            system_prompt: prompt,
            ..settings.agent_config()
        };
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_bridge_config(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// Wire everything up. The returned endpoint must be served by the page
    /// side for remote tools to answer.
    pub fn build(self) -> Result<(AgentRuntime, RemoteEndpoint)> {
        let tools = match self.tools {
            Some(tools) => tools,
            None => default_browser_registry().context("building default browser tools")?,
        };
        let (bridge, endpoint) = ExecutionBridge::connect(self.bridge);
        let bridge = Arc::new(bridge);
        let orchestrator =
            AgentOrchestrator::new(self.model, bridge.clone(), Arc::new(tools), self.config);
        let runtime = AgentRuntime {
            orchestrator,
            bridge,
            active: Mutex::new(None),
        };
        Ok((runtime, endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolResponse;
    use ai_agent::{
        CompletionOptions, LanguageModelResponse, Message, Role, RunOutcome, TransportError,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex as TokioMutex;

    struct ScriptedModel {
        responses: TokioMutex<VecDeque<String>>,
    }

    impl ScriptedModel {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: TokioMutex::new(responses.iter().map(|r| r.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LanguageModelClient for ScriptedModel {
        async fn complete(
            &self,
            _messages: &[Message],
            _options: &CompletionOptions,
        ) -> Result<LanguageModelResponse, TransportError> {
            let mut guard = self.responses.lock().await;
            let next = guard
                .pop_front()
                .expect("scripted model ran out of responses");
            Ok(LanguageModelResponse::new(next))
        }
    }

    fn serve_fixed(mut endpoint: RemoteEndpoint, reply: &'static str) {
        tokio::spawn(async move {
            while let Some(request) = endpoint.next_request().await {
                let _ = endpoint
                    .respond(ToolResponse::output(request.correlation_id, reply))
                    .await;
            }
        });
    }

    #[tokio::test]
    async fn answers_price_question_through_bridge() {
        let model = ScriptedModel::new(&[
            "Thought: I need to look for any prices.\nAction: extract_prices",
            "Final Answer: The page lists $19.99, $29.99 and $49.99.",
        ]);
        let (runtime, endpoint) = AgentRuntime::builder(model)
            .with_bridge_config(BridgeConfig {
                channel_capacity: 1,
            })
            .build()
            .unwrap();
        serve_fixed(endpoint, "Found 3 prices:\n$19.99, $29.99, $49.99");

        let report = runtime
            .run_report("What prices are on this page?", "https://shop.example")
            .await;
        assert_eq!(
            report.final_answer(),
            Some("The page lists $19.99, $29.99 and $49.99.")
        );
        assert_eq!(report.remote_dispatches(), 1);
        assert_eq!(runtime.pending_tool_calls(), 0);

        let rendered = report.render();
        assert!(rendered.starts_with("You are an intelligent browser assistant"));
        assert!(rendered.contains(
            "\n\nObservation: Found 3 prices:\n$19.99, $29.99, $49.99\n\n"
        ));
        assert!(rendered.ends_with("Final Answer: The page lists $19.99, $29.99 and $49.99."));
    }

    #[tokio::test]
    async fn finished_run_leaves_nothing_to_cancel() {
        let model = ScriptedModel::new(&["Final Answer: ok"]);
        let (runtime, _endpoint) = AgentRuntime::builder(model).build().unwrap();

        let report = runtime.run_report("anything?", "https://example.com").await;
        assert_eq!(report.final_answer(), Some("ok"));
        assert!(!runtime.cancel());
    }

    #[tokio::test]
    async fn superseded_run_does_not_clear_its_successor() {
        let model = ScriptedModel::new(&["Action: scrape_table", "Action: scrape_table"]);
        let (runtime, _endpoint) = AgentRuntime::builder(model).build().unwrap();
        let runtime = Arc::new(runtime);

        let spawn_run = |prompt: &'static str| {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.run_report(prompt, "https://example.com").await })
        };

        let first = spawn_run("first");
        while runtime.pending_tool_calls() == 0 {
            tokio::task::yield_now().await;
        }
        let second = spawn_run("second");

        let first = first.await.unwrap();
        assert_eq!(first.outcome, RunOutcome::Cancelled);
        while runtime.pending_tool_calls() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(runtime.cancel());
        let second = second.await.unwrap();
        assert_eq!(second.outcome, RunOutcome::Cancelled);
        assert!(!runtime.cancel());
    }

    #[tokio::test]
    async fn cancel_interrupts_a_pending_tool_call() {
        let model = ScriptedModel::new(&["Action: scrape_table"]);
        let (runtime, _endpoint) = AgentRuntime::builder(model).build().unwrap();
        let runtime = Arc::new(runtime);

        let run = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.run_report("table?", "https://example.com").await })
        };
        while runtime.pending_tool_calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(runtime.cancel());

        let report = run.await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.transcript.count_role(Role::Observation), 0);
        assert!(report.render().ends_with("Error: Run cancelled"));
        assert_eq!(runtime.pending_tool_calls(), 0);
        assert!(!runtime.cancel());
    }

    #[tokio::test]
    async fn settings_shape_the_loop() {
        let settings = AgentSettings {
            api_key: Some("sk-test".into()),
            max_iterations: 2,
            model: "gpt-4o-mini".into(),
            ..AgentSettings::default()
        };
        let model = ScriptedModel::new(&["Thought: one", "Thought: two"]);
        let (runtime, _endpoint) = AgentRuntime::builder(model)
            .with_settings(&settings)
            .build()
            .unwrap();
        assert_eq!(runtime.config().completion.model, "gpt-4o-mini");
        assert!(runtime
            .config()
            .system_prompt
            .starts_with("You are an intelligent browser assistant"));

        let report = runtime.run_report("loop", "").await;
        assert_eq!(report.outcome, RunOutcome::IterationLimitReached);
        assert_eq!(report.iterations, 2);
        assert_eq!(runtime.tool_descriptions().len(), 5);
    }

    #[tokio::test]
    async fn missing_key_is_rejected_before_any_run() {
        let err = AgentRuntime::from_settings(&AgentSettings::default())
            .err()
            .expect("settings without a key must fail");
        assert!(format!("{err:#}").contains("OPENAI_API_KEY"));
    }
}
