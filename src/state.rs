//! Shared mutable state threaded through a single agent run.
//!
//! Grounded in the original implementation's `minion/types/agent_state.py`:
//! a small namespace of named values that persists across steps and that
//! the sandboxed code evaluator can read and write via plain variable names.
//! Separate from [`crate::history::History`], which is the message log, not
//! working memory.

use serde_json::Value;
use std::collections::HashMap;

/// Which Step Executor strategy a run uses.
///
/// `Code` is the interesting one: the model writes fenced code that runs in
/// the sandboxed evaluator. `Plain` skips code execution entirely — the
/// model's response is treated as the answer directly, for tasks that don't
/// need tool use or multi-step reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Code,
    Plain,
}

/// What kicked off the current run: the initial user-facing task plus
/// whatever structured extras a caller wants the first step to see.
#[derive(Debug, Clone)]
pub struct Input {
    pub task: String,
    pub route: Route,
    pub extra: HashMap<String, Value>,
}

impl Input {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            route: Route::default(),
            extra: HashMap::new(),
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Namespace of named values visible to the sandboxed code evaluator across
/// steps, plus bookkeeping the Agent Driver uses to decide when to stop or
/// reflect.
///
/// A variable assigned in one step's code block (e.g. `results = search(...)`)
/// is visible by the same name in the next step's code, exactly as if the
/// whole run were one interactive session — this struct is that session's
/// persistent namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    variables: HashMap<String, Value>,
    pub step_count: u32,
    pub error_count: u32,
    pub last_confidence: Option<f32>,
    pub final_answer: Option<Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.variables.remove(name)
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn is_done(&self) -> bool {
        self.final_answer.is_some()
    }

    /// Whether the Step Executor should trigger a reflection pass before its
    /// next step, per the heuristics: three or more recoverable errors seen
    /// so far, every fifth step, or a last-reported confidence below 0.3.
    pub fn should_reflect(&self) -> bool {
        self.error_count >= 3
            || (self.step_count > 0 && self.step_count % 5 == 0)
            || self.last_confidence.is_some_and(|c| c < 0.3)
    }

    pub fn record_step(&mut self) {
        self.step_count += 1;
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn set_final_answer(&mut self, value: Value) {
        self.final_answer = Some(value);
    }

    /// Resets counters and the final-answer flag for a fresh run, preserving
    /// an opaque `learned_patterns` variable across the reset if one was set.
    /// Idempotent: calling it twice in a row is the same as calling it once.
    pub fn reset(&mut self) {
        let learned_patterns = self.variables.get("learned_patterns").cloned();
        self.variables.clear();
        if let Some(v) = learned_patterns {
            self.variables.insert("learned_patterns".to_string(), v);
        }
        self.step_count = 0;
        self.error_count = 0;
        self.last_confidence = None;
        self.final_answer = None;
    }

    /// Serializes this run's state, task, and transcript into the
    /// JSON-compatible shape used to persist or inspect a run.
    pub fn to_dict(&self, task: &str, history: &[crate::types::Message]) -> Value {
        let history_json: Vec<Value> = history
            .iter()
            .map(|m| {
                let tool_call_id = m.content.iter().find_map(|block| match block {
                    crate::types::ContentBlock::ToolUse(b) => Some(b.id.clone()),
                    crate::types::ContentBlock::ToolResult(b) => Some(b.tool_use_id.clone()),
                    _ => None,
                });
                serde_json::json!({
                    "role": format!("{:?}", m.role).to_lowercase(),
                    "content": m.content_text(),
                    "tool_call_id": tool_call_id,
                })
            })
            .collect();

        serde_json::json!({
            "step_count": self.step_count,
            "error_count": self.error_count,
            "task": task,
            "is_final_answer": self.final_answer.is_some(),
            "final_answer_value": self.final_answer,
            "last_confidence": self.last_confidence,
            "history": history_json,
            "metadata": self.variables,
        })
    }

    /// Reconstructs a `State` from the `to_dict` shape's core fields
    /// (`step_count`, `error_count`, `final_answer_value`, `last_confidence`,
    /// `metadata`). `task`/`history` round-trip through `Input`/the Agent
    /// Driver's own history, not through `State`, so they're ignored here.
    pub fn from_dict(dict: &Value) -> Self {
        let variables = dict
            .get("metadata")
            .and_then(|m| m.as_object())
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let final_answer = dict
            .get("is_final_answer")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
            .then(|| dict.get("final_answer_value").cloned())
            .flatten();

        Self {
            variables,
            step_count: dict
                .get("step_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            error_count: dict
                .get("error_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            last_confidence: dict
                .get("last_confidence")
                .and_then(|v| v.as_f64())
                .map(|v| v as f32),
            final_answer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_variable_roundtrip() {
        let mut state = State::new();
        state.set("x", json!(42));
        assert_eq!(state.get("x"), Some(&json!(42)));
        assert_eq!(state.remove("x"), Some(json!(42)));
        assert_eq!(state.get("x"), None);
    }

    #[test]
    fn test_should_reflect_on_error_count() {
        let mut state = State::new();
        state.record_error();
        state.record_error();
        assert!(!state.should_reflect());
        state.record_error();
        assert!(state.should_reflect());
    }

    #[test]
    fn test_should_reflect_every_fifth_step() {
        let mut state = State::new();
        for _ in 0..5 {
            state.record_step();
        }
        assert!(state.should_reflect());
    }

    #[test]
    fn test_should_reflect_on_low_confidence() {
        let mut state = State::new();
        state.last_confidence = Some(0.1);
        assert!(state.should_reflect());
    }

    #[test]
    fn test_is_done_tracks_final_answer() {
        let mut state = State::new();
        assert!(!state.is_done());
        state.set_final_answer(json!("done"));
        assert!(state.is_done());
    }

    #[test]
    fn test_to_dict_reports_task_and_final_answer() {
        let mut state = State::new();
        state.record_step();
        state.set_final_answer(json!(42));
        let history = vec![crate::types::Message::user("hello")];
        let dict = state.to_dict("do the thing", &history);
        assert_eq!(dict["task"], json!("do the thing"));
        assert_eq!(dict["step_count"], json!(1));
        assert_eq!(dict["is_final_answer"], json!(true));
        assert_eq!(dict["final_answer_value"], json!(42));
        assert_eq!(dict["history"][0]["role"], json!("user"));
    }

    #[test]
    fn test_to_dict_from_dict_round_trip() {
        let mut state = State::new();
        state.record_step();
        state.record_error();
        state.last_confidence = Some(0.42);
        state.set("x", json!(7));
        state.set_final_answer(json!({"ok": true}));

        let dict = state.to_dict("task", &[]);
        let restored = State::from_dict(&dict);
        assert_eq!(restored, state);
    }

    #[test]
    fn test_reset_twice_equals_once() {
        let mut state = State::new();
        state.record_step();
        state.record_error();
        state.set_final_answer(json!("done"));
        state.set("scratch", json!(1));

        let mut once = state.clone();
        once.reset();
        let mut twice = state.clone();
        twice.reset();
        twice.reset();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_reset_preserves_learned_patterns() {
        let mut state = State::new();
        state.set("learned_patterns", json!(["retry on timeout"]));
        state.set("scratch", json!(1));
        state.record_step();
        state.reset();
        assert_eq!(state.step_count, 0);
        assert_eq!(state.get("scratch"), None);
        assert_eq!(
            state.get("learned_patterns"),
            Some(&json!(["retry on timeout"]))
        );
    }
}
