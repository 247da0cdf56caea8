//! Agent Driver: the top-level step loop.
//!
//! Iterates, checks for interruption via an `interrupted: Arc<AtomicBool>`
//! cancellation flag, and stops on completion or a step limit, calling
//! [`crate::step::step`] once per iteration.

use crate::hooks::Hooks;
use crate::interpreter::Scope;
use crate::response::{Response, StreamChunk};
use crate::state::{Input, State};
use crate::step;
use crate::tools::Tool;
use crate::toolset::{self, Toolset};
use crate::types::{AgentOptions, Message};
use crate::{provider, Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Runs the step loop against a task, owning the tool registry and any
/// remote Toolsets for the duration of one `run`/`run_streaming` call.
///
/// An `Agent` is cheap to construct and not meant to be reused concurrently
/// across runs: build one, call `run` or `run_streaming` once, and let it
/// drop. Toolsets are set up at the start of the call and closed on every
/// exit path, including cancellation.
pub struct Agent {
    options: AgentOptions,
    tools: HashMap<String, Arc<Tool>>,
    toolsets: Vec<Arc<Toolset>>,
    interrupted: Arc<AtomicBool>,
}

impl Agent {
    pub fn new(options: AgentOptions) -> Self {
        let mut tools = HashMap::new();
        for tool in options.tools() {
            tools.insert(tool.name().to_string(), tool.clone());
            if let Some(alias) = crate::tools::sanitized_alias(tool.name()) {
                tools.entry(alias).or_insert_with(|| tool.clone());
            }
        }
        Self {
            options,
            tools,
            toolsets: Vec::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a remote Toolset whose tools are merged into the local
    /// registry (first-registered name wins) once `setup()` succeeds.
    pub fn with_toolset(mut self, toolset: Arc<Toolset>) -> Self {
        self.toolsets.push(toolset);
        self
    }

    /// A handle the caller can use to cancel an in-flight `run`/`run_streaming`.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    fn hooks(&self) -> &Hooks {
        self.options.hooks()
    }

    async fn setup_toolsets(&mut self) -> Result<()> {
        for toolset in &self.toolsets {
            if let Err(e) = toolset.setup().await {
                tracing::warn!(toolset = toolset.name(), error = %e, "toolset setup failed");
                continue;
            }
            let remote_tools = toolset.tools().await;
            toolset::merge_tool_registry(&mut self.tools, remote_tools);
        }
        Ok(())
    }

    async fn close_toolsets(&self) {
        for toolset in &self.toolsets {
            toolset.close().await;
        }
    }

    /// Blocking form: runs the loop to completion (final answer, step limit,
    /// error, or cancellation) and returns the terminal [`Response`].
    pub async fn run(&mut self, task: impl Into<String>) -> Result<Response> {
        let mut state = State::new();
        let mut globals = Scope::new();
        let mut history = vec![Message::system(self.options.system_prompt())];
        let input = Input::new(task);
        history.push(Message::user(input.task.clone()));

        self.setup_toolsets().await?;
        let result = self
            .run_loop(&mut state, &mut globals, &mut history, |_| {})
            .await;
        self.close_toolsets().await;
        result
    }

    /// Streaming form: same loop, but yields a [`StreamChunk`] per step (and
    /// a final `Done` chunk) rather than only returning the terminal value.
    pub fn run_streaming(
        mut self,
        task: impl Into<String>,
    ) -> impl tokio_stream::Stream<Item = StreamChunk> {
        let task = task.into();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut state = State::new();
            let mut globals = Scope::new();
            let mut history = vec![Message::system(self.options.system_prompt())];
            history.push(Message::user(task));

            if let Err(e) = self.setup_toolsets().await {
                let _ = tx
                    .send(StreamChunk::Done(Response {
                        final_answer: None,
                        steps_taken: 0,
                        truncated: true,
                        cancelled: false,
                        errors: vec![e.to_string()],
                    }))
                    .await;
                return;
            }

            let tx_clone = tx.clone();
            let result = self
                .run_loop(&mut state, &mut globals, &mut history, move |response| {
                    let _ = tx_clone.try_send(StreamChunk::Text(response.clone()));
                })
                .await;
            self.close_toolsets().await;

            let response = match result {
                Ok(response) => response,
                Err(Error::Cancelled) => Response {
                    final_answer: state.final_answer.clone(),
                    steps_taken: state.step_count,
                    truncated: true,
                    cancelled: true,
                    errors: vec![],
                },
                Err(e) => Response {
                    final_answer: None,
                    steps_taken: state.step_count,
                    truncated: true,
                    cancelled: false,
                    errors: vec![e.to_string()],
                },
            };
            let _ = tx.send(StreamChunk::Done(response)).await;
        });
        ReceiverStream::new(rx)
    }

    async fn run_loop(
        &self,
        state: &mut State,
        globals: &mut Scope,
        history: &mut Vec<Message>,
        mut on_text: impl FnMut(&str),
    ) -> Result<Response> {
        let mut errors = Vec::new();
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }
            if state.step_count >= self.options.max_steps() {
                return Err(Error::MaxStepsExceeded(self.options.max_steps()));
            }

            if history_as_slice_should_compact(history, self.options.model(), self.options.compaction_threshold())
            {
                self.compact(history).await?;
            }

            let step_result = step::step(state, globals, history, &self.tools, &self.options).await?;
            on_text(&step_result.raw_response);
            errors.extend(step_result.errors);

            if is_done(&step_result, state) {
                return Ok(Response {
                    final_answer: finalize(&step_result, state),
                    steps_taken: state.step_count,
                    truncated: false,
                    cancelled: false,
                    errors,
                });
            }
        }
    }

    async fn compact(&self, history: &mut Vec<Message>) -> Result<()> {
        let mut compactable = crate::history::History::from_messages(std::mem::take(history));
        let options = self.options.clone();
        compactable
            .compact(self.options.keep_recent_messages(), |dropped| {
                let options = options.clone();
                async move {
                    // Each dropped message is truncated before joining so a handful of
                    // long tool observations can't balloon the summarization prompt itself.
                    const MAX_MESSAGE_CHARS: usize = 2000;
                    let summary_prompt = vec![Message::user(format!(
                        "Summarize the following conversation excerpt in a few sentences, \
                         preserving any facts or decisions a continuation would need:\n\n{}",
                        dropped
                            .iter()
                            .map(|m| {
                                let text = m.content_text();
                                if text.chars().count() > MAX_MESSAGE_CHARS {
                                    let mut truncated: String =
                                        text.chars().take(MAX_MESSAGE_CHARS).collect();
                                    truncated.push_str("...");
                                    truncated
                                } else {
                                    text
                                }
                            })
                            .collect::<Vec<_>>()
                            .join("\n")
                    ))];
                    provider::complete_text(&summary_prompt, &options).await
                }
            })
            .await?;
        *history = compactable.into_messages();
        Ok(())
    }
}

fn history_as_slice_should_compact(history: &[Message], model: &str, threshold: f32) -> bool {
    crate::history::History::from_messages(history.to_vec()).should_compact(model, threshold)
}

/// `is_done` policy: a final answer on the step result or on state settles it.
fn is_done(result: &step::StepResult, state: &State) -> bool {
    result.terminated || state.is_done()
}

/// `finalize` policy: prefer the state's recorded final answer, then the
/// step result's, and otherwise there is none.
fn finalize(result: &step::StepResult, state: &State) -> Option<serde_json::Value> {
    state
        .final_answer
        .clone()
        .or_else(|| result.final_answer.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_options() -> AgentOptions {
        AgentOptions::builder()
            .model("test-model")
            .max_steps(3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_agent_new_registers_options_tools() {
        let options = AgentOptions::builder()
            .model("test-model")
            .tool(
                crate::tool("noop", "does nothing")
                    .build(|_| Box::pin(async { Ok(serde_json::Value::Null) })),
            )
            .build()
            .unwrap();
        let agent = Agent::new(options);
        assert!(agent.tools.contains_key("noop"));
    }

    #[test]
    fn test_is_done_prefers_state_final_answer() {
        let mut state = State::new();
        state.set_final_answer(serde_json::json!("42"));
        let result = step::StepResult {
            raw_response: String::new(),
            final_answer: None,
            terminated: false,
            errors: vec![],
        };
        assert!(is_done(&result, &state));
        assert_eq!(finalize(&result, &state), Some(serde_json::json!("42")));
    }

    #[test]
    fn test_agent_new_registers_sanitized_alias_for_dotted_tool_name() {
        let options = AgentOptions::builder()
            .model("test-model")
            .tool(
                crate::tool("fs.read_file", "reads a file")
                    .build(|_| Box::pin(async { Ok(serde_json::Value::Null) })),
            )
            .build()
            .unwrap();
        let agent = Agent::new(options);
        assert!(agent.tools.contains_key("fs.read_file"));
        assert!(agent.tools.contains_key("fs_read_file"));
    }

    #[tokio::test]
    async fn test_run_rejects_unreachable_server_without_hanging() {
        let options = AgentOptions::builder()
            .model("test-model")
            .base_url("http://127.0.0.1:1")
            .max_steps(2)
            .build()
            .unwrap();
        let mut agent = Agent::new(options);
        let result = agent.run("say hello").await;
        assert!(result.is_err());
    }
}
