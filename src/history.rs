//! Conversation history with context-window-aware compaction.
//!
//! Builds on [`crate::context`]'s token estimation helpers to give the Agent
//! Driver a single place to append messages, ask "are we close to the
//! context window?", and compact when the answer is yes.

use crate::context::estimate_tokens;
use crate::types::{Message, MessageRole};

/// Context window sizes (tokens) for model name substrings we recognize.
/// Falls back to `DEFAULT_CONTEXT_WINDOW` for anything unrecognized, matching
/// the original implementation's conservative-default behavior.
const CONTEXT_WINDOWS: &[(&str, usize)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("claude-3", 200_000),
    ("qwen2.5", 32_768),
    ("llama-3.1", 128_000),
    ("llama-3", 8_192),
    ("mistral", 32_768),
];

/// Default context window when `model` doesn't match any known entry.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4_096;

/// Looks up a model's context window by matching known substrings.
///
/// Matching is case-insensitive and substring-based (`"qwen2.5-32b-instruct"`
/// matches the `"qwen2.5"` entry) since local server deployments rarely use
/// the exact model identifiers cloud providers publish.
pub fn context_window_for(model: &str) -> usize {
    let model_lower = model.to_lowercase();
    CONTEXT_WINDOWS
        .iter()
        .find(|(needle, _)| model_lower.contains(needle))
        .map(|(_, size)| *size)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

/// Append-only conversation log with estimation and compaction support.
///
/// `History` owns the `Vec<Message>` the Agent Driver threads through a run.
/// It does not talk to an LLM provider itself; [`History::compact`] takes a
/// summarizer closure so callers can plug in whatever produces the summary
/// text (typically a call back into the provider).
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_of_role(&self, role: MessageRole) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == role)
    }

    /// Messages whose role matches `role`, in original order.
    pub fn filter_by_role(&self, role: MessageRole) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.role == role).collect()
    }

    /// The last `n` messages, or all of them if there are fewer than `n`.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn estimate_tokens(&self) -> usize {
        estimate_tokens(&self.messages)
    }

    /// Whether `estimate_tokens()` has crossed `threshold` fraction of
    /// `model`'s context window.
    pub fn should_compact(&self, model: &str, threshold: f32) -> bool {
        let window = context_window_for(model);
        let limit = (window as f32 * threshold) as usize;
        self.estimate_tokens() > limit
    }

    /// Compacts history in place: everything except the leading system
    /// messages and the trailing `keep_recent` messages is replaced by one
    /// synthetic assistant summary message produced by `summarize`.
    ///
    /// `summarize` receives the messages being dropped and returns the
    /// summary text (or an error, which aborts compaction and leaves history
    /// untouched — surfaced to the caller as `Error::CompactionError`).
    pub async fn compact<F, Fut>(
        &mut self,
        keep_recent: usize,
        summarize: F,
    ) -> crate::Result<()>
    where
        F: FnOnce(Vec<Message>) -> Fut,
        Fut: std::future::Future<Output = crate::Result<String>>,
    {
        let system_count = self
            .messages
            .iter()
            .take_while(|m| m.role == MessageRole::System)
            .count();

        if self.messages.len() <= system_count + keep_recent {
            // Nothing worth compacting: everything is either a leading
            // system message or inside the always-kept recent window.
            return Ok(());
        }

        let keep_recent_start = self.messages.len().saturating_sub(keep_recent);
        let middle: Vec<Message> = self.messages[system_count..keep_recent_start].to_vec();
        if middle.is_empty() {
            return Ok(());
        }

        tracing::info!(
            dropped = middle.len(),
            "compacting history, summarizing dropped messages"
        );

        let summary_text = summarize(middle)
            .await
            .map_err(|e| crate::Error::CompactionError(e.to_string()))?;

        let mut compacted: Vec<Message> = self.messages[..system_count].to_vec();
        compacted.push(Message::assistant(vec![crate::types::ContentBlock::Text(
            crate::types::TextBlock::new(summary_text),
        )]));
        compacted.extend_from_slice(&self.messages[keep_recent_start..]);

        tracing::info!(
            before = self.messages.len(),
            after = compacted.len(),
            "history compacted"
        );
        self.messages = compacted;
        Ok(())
    }
}

impl std::ops::Index<usize> for History {
    type Output = Message;
    fn index(&self, index: usize) -> &Message {
        &self.messages[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_window_lookup() {
        assert_eq!(context_window_for("qwen2.5-32b-instruct"), 32_768);
        assert_eq!(context_window_for("gpt-4o-mini"), 128_000);
        assert_eq!(context_window_for("some-unknown-model"), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn test_should_compact() {
        let mut history = History::new();
        history.append(Message::system("be helpful"));
        history.append(Message::user("x".repeat(500_000)));
        assert!(history.should_compact("gpt-4", 0.85));
        assert!(!history.should_compact("claude-3", 0.85));
    }

    #[tokio::test]
    async fn test_compact_replaces_middle_with_summary() {
        let mut history = History::new();
        history.append(Message::system("be helpful"));
        for i in 0..10 {
            history.append(Message::user(format!("message {i}")));
        }

        history
            .compact(2, |dropped| async move {
                assert_eq!(dropped.len(), 8);
                Ok("summary of 8 messages".to_string())
            })
            .await
            .unwrap();

        // system + summary + 2 kept
        assert_eq!(history.len(), 4);
        assert_eq!(history.as_slice()[0].role, MessageRole::System);
        assert_eq!(history.as_slice()[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_compact_noop_when_small() {
        let mut history = History::new();
        history.append(Message::user("hi"));
        history.append(Message::user("there"));

        history
            .compact(10, |_| async move { Ok(String::new()) })
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_compact_propagates_summarizer_error() {
        let mut history = History::new();
        for i in 0..10 {
            history.append(Message::user(format!("message {i}")));
        }

        let result = history
            .compact(1, |_| async move { Err(crate::Error::other("summarizer down")) })
            .await;
        assert!(matches!(result, Err(crate::Error::CompactionError(_))));
        // History is left untouched on failure.
        assert_eq!(history.len(), 10);
    }
}
