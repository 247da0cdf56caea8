//! OpenAI-compatible text completion provider.
//!
//! The Agent Driver never uses native function-calling: the model is asked
//! for plain text that may contain a fenced code block, and the sandboxed
//! evaluator is what calls tools. So unlike the streaming query engine this
//! module is adapted from, requests never set the `tools` field, and the
//! response side only has to reassemble text deltas, not tool-call deltas.

use crate::types::{AgentOptions, Message, MessageRole, OpenAIMessage, OpenAIRequest};
use crate::utils::parse_sse_stream;
use crate::{Error, Result};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// Stream of text deltas from the model, in arrival order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

fn to_openai_messages(system_prompt: &str, history: &[Message]) -> Vec<OpenAIMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
            tool_calls: None,
            tool_call_id: None,
        });
    }
    for msg in history {
        let content = msg.content_text();
        messages.push(OpenAIMessage {
            role: match msg.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::Tool => "tool",
            }
            .to_string(),
            content,
            tool_calls: None,
            tool_call_id: None,
        });
    }
    messages
}

/// Streams a single completion for `history` against `options`, yielding
/// plain-text deltas as they arrive. No tools are advertised to the model;
/// the sandboxed evaluator mediates all tool access.
pub async fn complete(history: &[Message], options: &AgentOptions) -> Result<TextStream> {
    complete_with_system(history, options, options.system_prompt()).await
}

/// Same as [`complete`], but with the system prompt text overridden — used
/// by the Step Executor to send a freshly rendered prompt (tool listing,
/// sentinel instructions) without mutating `options`.
pub async fn complete_with_system(
    history: &[Message],
    options: &AgentOptions,
    system_prompt: &str,
) -> Result<TextStream> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(options.timeout()))
        .build()
        .map_err(Error::Http)?;

    let messages = to_openai_messages(system_prompt, history);
    let request = OpenAIRequest {
        model: options.model().to_string(),
        messages,
        stream: true,
        max_tokens: options.max_tokens(),
        temperature: Some(options.temperature()),
        tools: None,
    };

    let url = format!("{}/chat/completions", options.base_url());
    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", options.api_key()))
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(Error::Http)?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(Error::api(format!("API error {status}: {body}")));
    }

    let sse_stream = parse_sse_stream(response);
    let text_stream = sse_stream.filter_map(|chunk_result| async move {
        match chunk_result {
            Ok(chunk) => {
                let text: String = chunk
                    .choices
                    .into_iter()
                    .filter_map(|c| c.delta.content)
                    .collect();
                if text.is_empty() {
                    None
                } else {
                    Some(Ok(text))
                }
            }
            Err(e) => Some(Err(e)),
        }
    });

    Ok(Box::pin(text_stream))
}

/// Collects a full completion into a single string, for callers (like the
/// Step Executor) that need the whole response before deciding what to do
/// with it rather than token-by-token.
pub async fn complete_text(history: &[Message], options: &AgentOptions) -> Result<String> {
    complete_text_with_system(history, options, options.system_prompt()).await
}

/// Same as [`complete_text`], but with the system prompt overridden, as in
/// [`complete_with_system`].
pub async fn complete_text_with_system(
    history: &[Message],
    options: &AgentOptions,
    system_prompt: &str,
) -> Result<String> {
    let mut stream = complete_with_system(history, options, system_prompt).await?;
    let mut out = String::new();
    while let Some(piece) = stream.next().await {
        out.push_str(&piece?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentOptions;

    #[test]
    fn test_to_openai_messages_includes_system_prompt() {
        let history = vec![Message::user("hello")];
        let messages = to_openai_messages("be helpful", &history);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "be helpful");
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn test_to_openai_messages_skips_empty_system_prompt() {
        let history = vec![Message::user("hi")];
        let messages = to_openai_messages("", &history);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[tokio::test]
    async fn test_complete_rejects_unreachable_server() {
        let options = AgentOptions::builder()
            .model("test-model")
            .base_url("http://127.0.0.1:1")
            .build()
            .unwrap();
        let result = complete_text(&[Message::user("hi")], &options).await;
        assert!(result.is_err());
    }
}
