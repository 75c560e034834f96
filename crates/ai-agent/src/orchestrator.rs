use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::ToolDispatcher;
use crate::language_model::{CompletionOptions, LanguageModelClient, LanguageModelUsage};
use crate::parser::{self, ReasoningStep};
use crate::tools::{Capability, ToolRegistry};
use crate::transcript::Transcript;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub system_prompt: String,
    pub max_iterations: usize,
    pub tool_timeout: Duration,
    pub completion: CompletionOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.trim().to_string(),
            max_iterations: crate::DEFAULT_MAX_ITERATIONS,
            tool_timeout: crate::DEFAULT_TOOL_TIMEOUT,
            completion: CompletionOptions::default(),
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    FinalAnswer(String),
    IterationLimitReached,
    FatalError(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Initializing,
    AwaitingCompletion,
    Parsing,
    AwaitingToolResult,
    Done(RunOutcome),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    ModelResponse {
        raw: String,
    },
    ToolCall {
        name: String,
        argument: Option<String>,
        capability: String,
    },
    ToolResult {
        name: String,
        observation: String,
        ok: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub transcript: Transcript,
    /// Completion calls made during the run.
    pub iterations: usize,
    pub events: Vec<AgentEvent>,
    pub usage: LanguageModelUsage,
}

impl RunReport {
    pub fn final_answer(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::FinalAnswer(answer) => Some(answer),
            _ => None,
        }
    }

    /// Number of calls that went through the tool dispatcher.
    pub fn remote_dispatches(&self) -> usize {
        self.events
            .iter()
            .filter(|event| {
                matches!(event, AgentEvent::ToolCall { capability, .. } if capability == "remote")
            })
            .count()
    }

    /// The transcript text handed back to the caller.
    pub fn render(&self) -> String {
        let transcript = self.transcript.render();
        match &self.outcome {
            RunOutcome::FatalError(cause) => format!(
                "{transcript}\n\nError: Failed to get response from AI service: {cause}"
            ),
            RunOutcome::Cancelled => format!("{transcript}\n\nError: Run cancelled"),
            _ => transcript,
        }
    }
}

/// Drives the think → act → observe loop for one request at a time.
pub struct AgentOrchestrator {
    model: Arc<dyn LanguageModelClient>,
    dispatcher: Arc<dyn ToolDispatcher>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl AgentOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModelClient>,
        dispatcher: Arc<dyn ToolDispatcher>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            dispatcher,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn build_system_prompt(&self, current_url: &str) -> String {
        let url = if current_url.trim().is_empty() {
            "unknown"
        } else {
            current_url.trim()
        };
        let mut prompt = String::new();
        prompt.push_str(&self.config.system_prompt);
        prompt.push_str("\n\nCURRENT URL: ");
        prompt.push_str(url);
        prompt.push_str("\n\nAVAILABLE TOOLS:\n");
        prompt.push_str(&self.tools.render_tool_list());
        prompt.push_str("\n\n");
        prompt.push_str(RESPONSE_FORMAT.trim());
        prompt
    }

    pub async fn run_task(&self, task: &str, current_url: &str) -> RunReport {
        self.run_task_with_cancellation(task, current_url, &CancellationToken::new())
            .await
    }

    pub async fn run_task_with_cancellation(
        &self,
        task: &str,
        current_url: &str,
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut run = ActiveRun::new(Transcript::new(
            self.build_system_prompt(current_url),
            task,
        ));
        run.transition(LoopState::AwaitingCompletion);

        let outcome = loop {
            if run.iterations >= self.config.max_iterations {
                warn!(
                    target: "react_loop",
                    max_iterations = self.config.max_iterations,
                    "iteration cap reached without a final answer"
                );
                break RunOutcome::IterationLimitReached;
            }

            let completion = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.model.complete(run.transcript.messages(), &self.config.completion) => Some(result),
            };
            let Some(completion) = completion else {
                break RunOutcome::Cancelled;
            };
            run.iterations += 1;
            let response = match completion {
                Err(err) => {
                    error!(target: "react_loop", error = %err, "completion call failed");
                    break RunOutcome::FatalError(err.to_string());
                }
                Ok(response) => response,
            };

            run.usage.accumulate(&response.usage);
            run.events.push(AgentEvent::ModelResponse {
                raw: response.text.clone(),
            });
            run.transcript.push_assistant(response.text.as_str());
            run.transition(LoopState::Parsing);

            match parser::parse(&response.text) {
                ReasoningStep::FinalAnswer { text } => break RunOutcome::FinalAnswer(text),
                ReasoningStep::Action {
                    tool_name,
                    argument,
                } => {
                    let Some(observation) = self
                        .act(&mut run, &tool_name, argument.as_deref(), cancel)
                        .await
                    else {
                        break RunOutcome::Cancelled;
                    };
                    run.transcript.push_observation(observation);
                }
                step @ (ReasoningStep::Thought { .. } | ReasoningStep::Unparseable { .. }) => {
                    debug!(
                        target: "react_loop",
                        iteration = run.iterations,
                        step = ?step,
                        "no actionable directive in reply"
                    );
                }
            }
            run.transition(LoopState::AwaitingCompletion);
        };

        run.transition(LoopState::Done(outcome.clone()));
        info!(
            target: "react_loop",
            iterations = run.iterations,
            outcome = ?outcome,
            "agent run finished"
        );

        RunReport {
            outcome,
            transcript: run.transcript,
            iterations: run.iterations,
            events: run.events,
            usage: run.usage,
        }
    }

    // Returns the observation to record, or None when the run was cancelled
    // while the tool call was in flight.
    async fn act(
        &self,
        run: &mut ActiveRun,
        tool_name: &str,
        argument: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let capability = match self.tools.resolve(tool_name) {
            Ok(capability) => capability.clone(),
            Err(err) => {
                warn!(target: "react_loop", tool = tool_name, "model requested unknown tool");
                return Some(format!("Error: {err}"));
            }
        };

        run.events.push(AgentEvent::ToolCall {
            name: tool_name.to_string(),
            argument: argument.map(str::to_string),
            capability: capability.kind().to_string(),
        });

        let result = match capability {
            Capability::Local(tool) => tool.invoke(argument).map_err(|err| err.to_string()),
            Capability::Stub(reply) => Ok(reply),
            Capability::Remote => {
                run.transition(LoopState::AwaitingToolResult);
                info!(target: "react_loop", tool = tool_name, argument = ?argument, "dispatching tool");
                let dispatched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = self.dispatcher.dispatch(tool_name, argument, self.config.tool_timeout) => Some(result),
                };
                dispatched?.map_err(|err| err.to_string())
            }
        };

        let (observation, ok) = match result {
            Ok(output) => (output, true),
            Err(message) => {
                warn!(target: "react_loop", tool = tool_name, error = %message, "tool call failed");
                (format!("Error: {message}"), false)
            }
        };
        run.events.push(AgentEvent::ToolResult {
            name: tool_name.to_string(),
            observation: observation.clone(),
            ok,
        });
        Some(observation)
    }
}

struct ActiveRun {
    state: LoopState,
    transcript: Transcript,
    iterations: usize,
    events: Vec<AgentEvent>,
    usage: LanguageModelUsage,
}

impl ActiveRun {
    fn new(transcript: Transcript) -> Self {
        Self {
            state: LoopState::Initializing,
            transcript,
            iterations: 0,
            events: Vec::new(),
            usage: LanguageModelUsage::default(),
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!(target: "react_loop", from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"
You are an intelligent browser assistant embedded in a desktop browser.
You can reason and use tools to help users with tasks on webpages.
"#;

const RESPONSE_FORMAT: &str = r#"
RESPONSE FORMAT:
Always use this format:
Thought: [your reasoning]
Action: [tool_name] OR Action: [tool_name]([argument]) for tools with args
[Wait for observation, then continue]
Thought: [your reasoning based on observation]
Final Answer: [your conclusive answer to the user's query]
"#;
