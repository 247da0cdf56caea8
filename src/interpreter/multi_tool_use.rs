//! The synthetic `multi_tool_use.parallel(...)` entry point: lets a single
//! code block dispatch several tool calls concurrently instead of one per
//! step, the same shape the original exposes for batching independent
//! lookups.
//!
//! Only the async form is exposed — there is no synchronous variant, since
//! every tool call in this crate is already async.

use super::value::Value;
use crate::tools::Tool;
use crate::Error;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

pub const NAME: &str = "multi_tool_use.parallel";

/// Runs `{tool_uses: [{recipient_name, parameters}, ...]}` concurrently and
/// returns `{results: [{recipient_name, success, result|error}], total_calls,
/// successful_calls, failed_calls}`. A single call failing does not abort the
/// batch — its failure is captured in its own `results` entry.
pub async fn parallel(config: &Value, tools: &HashMap<String, Arc<Tool>>) -> crate::Result<Value> {
    let Value::Dict(entries) = config else {
        return Err(Error::interpreter(
            "multi_tool_use.parallel() expects a dict with a 'tool_uses' key",
            0,
        ));
    };
    let tool_uses = entries
        .lock()
        .unwrap()
        .iter()
        .find(|(k, _)| k == "tool_uses")
        .map(|(_, v)| v.clone())
        .ok_or_else(|| Error::interpreter("missing 'tool_uses' key", 0))?;

    let Value::List(items) = tool_uses else {
        return Err(Error::interpreter("'tool_uses' must be a list", 0));
    };
    let calls: Vec<Value> = items.lock().unwrap().clone();

    let futures = calls.into_iter().map(|call| {
        let tools = tools.clone();
        async move { run_one(&call, &tools).await }
    });

    let outcomes: Vec<crate::Result<(String, Value)>> = join_all(futures).await;
    let total_calls = outcomes.len() as i64;
    let mut successful_calls = 0i64;
    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let entry = match outcome {
            Ok((recipient_name, result)) => {
                successful_calls += 1;
                Value::dict(vec![
                    ("recipient_name".to_string(), Value::Str(recipient_name)),
                    ("success".to_string(), Value::Bool(true)),
                    ("result".to_string(), result),
                ])
            }
            Err((recipient_name, err)) => Value::dict(vec![
                ("recipient_name".to_string(), Value::Str(recipient_name)),
                ("success".to_string(), Value::Bool(false)),
                ("error".to_string(), Value::Str(err.to_string())),
            ]),
        };
        results.push(entry);
    }
    let failed_calls = total_calls - successful_calls;

    Ok(Value::dict(vec![
        ("results".to_string(), Value::list(results)),
        ("total_calls".to_string(), Value::Int(total_calls)),
        ("successful_calls".to_string(), Value::Int(successful_calls)),
        ("failed_calls".to_string(), Value::Int(failed_calls)),
    ]))
}

/// Runs one `{recipient_name, parameters}` entry, returning the recipient
/// name alongside either its result or its error so the caller can build a
/// per-entry envelope without one failure aborting the whole batch.
async fn run_one(
    call: &Value,
    tools: &HashMap<String, Arc<Tool>>,
) -> Result<(String, Value), (String, Error)> {
    let recipient_and_parameters = (|| -> crate::Result<(String, Value)> {
        let Value::Dict(entries) = call else {
            return Err(Error::interpreter("each tool use must be a dict", 0));
        };
        let guard = entries.lock().unwrap();
        let recipient = guard
            .iter()
            .find(|(k, _)| k == "recipient_name")
            .map(|(_, v)| v.to_display_string())
            .ok_or_else(|| Error::interpreter("missing 'recipient_name'", 0))?;
        let parameters = guard
            .iter()
            .find(|(k, _)| k == "parameters")
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| Value::dict(Vec::new()));
        Ok((recipient, parameters))
    })();

    let (recipient, parameters) = match recipient_and_parameters {
        Ok(pair) => pair,
        Err(e) => return Err(("<unknown>".to_string(), e)),
    };

    let lookup_name = recipient.trim_start_matches("functions.");
    let Some(tool) = tools.get(lookup_name) else {
        return Err((
            recipient.clone(),
            Error::interpreter(format!("unknown tool '{recipient}'"), 0),
        ));
    };

    match tool.execute(parameters.to_json()).await {
        Ok(result) => Ok((recipient, Value::from_json(result))),
        Err(e) => Err((
            recipient,
            Error::tool_invocation(tool.name().to_string(), e.to_string()),
        )),
    }
}
