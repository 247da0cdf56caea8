//! Step Executor: one reason-and-act turn of the agent loop.
//!
//! Prompt, parse, execute, observe, repeat: the model is asked for text
//! containing fenced code, and the `code` route feeds that code to
//! [`crate::interpreter`] rather than dispatching a structured tool call.

use crate::interpreter::{self, Outcome, Scope};
use crate::state::{Route, State};
use crate::tools::Tool;
use crate::types::{AgentOptions, ContentBlock, Message, TextBlock};
use crate::{provider, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Sentinel the system prompt asks the model to close fenced code with.
/// Purely advisory to the model; [`interpreter::extract_code_blocks`] finds
/// fenced blocks regardless of whether the sentinel is present.
pub const END_CODE_SENTINEL: &str = "<end_code>";

/// One step's outcome, handed back to the Agent Driver.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Raw assistant text for this step, before code extraction.
    pub raw_response: String,
    /// Set once a code block calls `final_answer(...)`.
    pub final_answer: Option<serde_json::Value>,
    /// Whether this step produced a final answer.
    pub terminated: bool,
    /// Per-block error observations, in execution order.
    pub errors: Vec<String>,
}

/// Executes one step against `state`'s variables and `history`, mutating
/// both in place. Dispatches to the `code` or `plain` strategy per
/// [`AgentOptions::route`].
pub async fn step(
    state: &mut State,
    globals: &mut Scope,
    history: &mut Vec<Message>,
    tools: &HashMap<String, Arc<Tool>>,
    options: &AgentOptions,
) -> Result<StepResult> {
    match options.route() {
        Route::Code => step_code(state, globals, history, tools, options).await,
        Route::Plain => step_plain(state, history, options).await,
    }
}

/// The `plain` route: a single model call with no code execution. The
/// response is treated as the final answer directly, for tasks that don't
/// need tool use or multi-step reasoning.
async fn step_plain(
    state: &mut State,
    history: &mut Vec<Message>,
    options: &AgentOptions,
) -> Result<StepResult> {
    maybe_inject_reflection(state, history);

    let mut system_prompt = options.system_prompt().to_string();
    if system_prompt.is_empty() {
        system_prompt = "You are a helpful assistant. Answer directly and concisely.".to_string();
    }
    let raw_response =
        provider::complete_text_with_system(history, options, &system_prompt).await?;
    history.push(Message::assistant(vec![ContentBlock::Text(
        TextBlock::new(raw_response.clone()),
    )]));

    let final_answer = serde_json::Value::String(raw_response.clone());
    state.record_step();
    state.set_final_answer(final_answer.clone());

    Ok(StepResult {
        raw_response,
        final_answer: Some(final_answer),
        terminated: true,
        errors: Vec::new(),
    })
}

/// The `code` route: the model writes fenced code that runs in the
/// sandboxed evaluator, one step at a time, until a block calls
/// `final_answer(...)`.
async fn step_code(
    state: &mut State,
    globals: &mut Scope,
    history: &mut Vec<Message>,
    tools: &HashMap<String, Arc<Tool>>,
    options: &AgentOptions,
) -> Result<StepResult> {
    maybe_inject_reflection(state, history);

    let system_prompt = render_system_prompt(options, tools);
    let raw_response =
        provider::complete_text_with_system(history, options, &system_prompt).await?;
    history.push(Message::assistant(vec![ContentBlock::Text(
        TextBlock::new(raw_response.clone()),
    )]));

    let blocks =
        interpreter::extract_code_blocks(&raw_response, options.max_code_length())?;

    let history_snapshot: Vec<serde_json::Value> = history
        .iter()
        .map(|m| serde_json::json!({"role": format!("{:?}", m.role), "content": m.content_text()}))
        .collect();

    let mut errors = Vec::new();
    let mut final_answer = None;

    for block in blocks {
        // A failing block must not erase variables earlier blocks in this
        // same step already set, so it runs against a clone rather than the
        // shared globals directly.
        let outcome = interpreter::run(
            &block.source,
            globals.clone(),
            tools,
            options.authorized_imports(),
            options.max_code_length(),
            Some(options.hooks()),
            &history_snapshot,
            Some(&*state),
        )
        .await;

        match outcome {
            Ok((Outcome::FinalAnswer(value), new_globals)) => {
                *globals = new_globals;
                let json = value.to_json();
                history.push(observation_message(format!(
                    "**Final Answer Found:** {json}"
                )));
                final_answer = Some(json);
                break;
            }
            Ok((Outcome::Completed(value), new_globals)) => {
                *globals = new_globals;
                history.push(observation_message(format!(
                    "Observation: {}",
                    value.to_display_string()
                )));
            }
            Err(e) => {
                let message = e.to_string();
                history.push(observation_message(format!("**Error:** {message}")));
                errors.push(message);
                state.record_error();
            }
        }
    }

    state.record_step();
    let terminated = final_answer.is_some();
    if terminated {
        if let Some(value) = &final_answer {
            state.set_final_answer(value.clone());
        }
    }

    Ok(StepResult {
        raw_response,
        final_answer,
        terminated,
        errors,
    })
}

fn observation_message(text: String) -> Message {
    Message::user(text)
}

/// Injects a one-time self-reflection nudge when [`State::should_reflect`]
/// fires, per the error-count / step-cadence / low-confidence triggers.
fn maybe_inject_reflection(state: &State, history: &mut Vec<Message>) {
    if state.should_reflect() {
        history.push(Message::user(
            "Before continuing, briefly reflect: what has gone wrong so far, and what should \
             change about your approach for the next step?",
        ));
    }
}

fn render_system_prompt(options: &AgentOptions, tools: &HashMap<String, Arc<Tool>>) -> String {
    let mut prompt = String::new();
    if !options.system_prompt().is_empty() {
        prompt.push_str(options.system_prompt());
        prompt.push_str("\n\n");
    }
    prompt.push_str(
        "You solve tasks by writing Python-like code in a fenced block. Each block you \
         write is run in a persistent sandbox: variables survive between blocks. Call \
         `final_answer(value)` with your answer when you are done; until then, write code \
         that makes progress and inspect its output before deciding what to do next. Close \
         each code block with the fence and the sentinel ",
    );
    prompt.push_str(END_CODE_SENTINEL);
    prompt.push_str(" on its own line.\n\n");

    if tools.is_empty() {
        prompt.push_str("No tools are available this run.\n");
    } else {
        prompt.push_str("Available tools:\n");
        let mut names: Vec<&String> = tools.keys().collect();
        names.sort();
        for name in names {
            let tool = &tools[name];
            prompt.push_str(&format!(
                "- {}({}): {}\n",
                tool.name(),
                tool.input_schema()
                    .get("properties")
                    .and_then(|p| p.as_object())
                    .map(|props| props.keys().cloned().collect::<Vec<_>>().join(", "))
                    .unwrap_or_default(),
                tool.description()
            ));
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;

    #[test]
    fn test_render_system_prompt_lists_tools() {
        let options = AgentOptions::builder()
            .model("test-model")
            .build()
            .unwrap();
        let mut tools = HashMap::new();
        tools.insert(
            "search".to_string(),
            Arc::new(
                crate::tool("search", "Search the web")
                    .param("query", "string")
                    .build(|_| Box::pin(async { Ok(serde_json::Value::Null) })),
            ),
        );
        let prompt = render_system_prompt(&options, &tools);
        assert!(prompt.contains("search"));
        assert!(prompt.contains("Search the web"));
    }

    #[test]
    fn test_maybe_inject_reflection_only_when_triggered() {
        let state = State::new();
        let mut history = Vec::new();
        maybe_inject_reflection(&state, &mut history);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_step_dispatches_to_plain_route() {
        let options = AgentOptions::builder()
            .model("test-model")
            .base_url("http://127.0.0.1:1")
            .route(crate::state::Route::Plain)
            .build()
            .unwrap();
        let mut state = State::new();
        let mut globals = Scope::new();
        let mut history = vec![Message::user("hello")];
        let tools = HashMap::new();
        // No server is reachable; this only asserts the Plain route was
        // taken (it never touches the sandboxed evaluator) rather than
        // that a real completion succeeds.
        let result = step(&mut state, &mut globals, &mut history, &tools, &options).await;
        assert!(result.is_err());
    }
}
