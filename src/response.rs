//! Final and incremental output types for an Agent Driver run.

use serde_json::Value;

/// One step's worth of streamed output, emitted by [`crate::agent::Agent::run_streaming`].
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// A slice of assistant text as it's produced by the provider.
    Text(String),
    /// The code block the model wrote for this step, before it runs.
    Code(String),
    /// The sandboxed evaluator's observation after running that code.
    Observation(Value),
    /// The run finished; carries the same payload `run()` would have returned.
    Done(Response),
}

/// Outcome of a finished (or cancelled/failed) Agent Driver run.
///
/// Unlike the original's ad hoc return tuple, this is a plain struct with
/// named fields you can destructure, plus [`Response::is_done`] as the one
/// piece of derived state worth a method rather than a field.
#[derive(Debug, Clone)]
pub struct Response {
    /// The model's final answer, if the run reached one.
    pub final_answer: Option<Value>,
    /// Number of Agent Driver steps the run took.
    pub steps_taken: u32,
    /// Whether the run was cut short (max steps, cancellation, or error).
    pub truncated: bool,
    /// Whether the run was cancelled by the caller.
    pub cancelled: bool,
    /// Non-fatal errors observed along the way (tool failures, rejected code
    /// blocks) that didn't abort the run.
    pub errors: Vec<String>,
}

impl Response {
    /// True once the run has stopped for any reason — reached a final
    /// answer, or was cut short by a step limit or cancellation.
    pub fn is_done(&self) -> bool {
        self.final_answer.is_some() || self.truncated
    }
}
