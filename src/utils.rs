//! Streaming utilities for SSE parsing.
//!
//! The API returns data in SSE format, which looks like:
//!
//! ```text
//! data: {"id":"msg_123","object":"chat.completion.chunk","choices":[...]}
//!
//! data: {"id":"msg_123","object":"chat.completion.chunk","choices":[...]}
//!
//! data: [DONE]
//! ```
//!
//! Each line starting with `data: ` contains a JSON chunk. The stream ends with `data: [DONE]`.
//! [`parse_sse_stream`] transforms the raw HTTP response into a stream of parsed
//! [`OpenAIChunk`] objects; [`provider`](crate::provider) concatenates their text deltas into
//! one completion. There is no tool-call-delta aggregation here: the runtime never asks the
//! model for native tool calls, so a chunk's `delta.content` is the only field anything reads.

use crate::types::OpenAIChunk;
use crate::{Error, Result};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

/// Parses a raw HTTP response body as a Server-Sent Events (SSE) stream.
///
/// Transforms an HTTP streaming response into a stream of parsed [`OpenAIChunk`] objects.
///
/// # SSE Format
///
/// ```text
/// data: {"id":"msg_123","object":"chat.completion.chunk",...}
///
/// data: {"id":"msg_123","object":"chat.completion.chunk",...}
///
/// data: [DONE]
///
/// ```
///
/// Each message starts with `data: `, messages are separated by `\n\n`, and the stream ends
/// with `data: [DONE]`, which is skipped rather than parsed as JSON.
///
/// Errors are per-chunk (wrapped as [`Error::Http`] for transport failures or [`Error::Stream`]
/// for malformed JSON), not fatal to the stream as a whole.
pub fn parse_sse_stream(
    body: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>> {
    let stream = body.bytes_stream().filter_map(move |result| async move {
        let bytes = match result.map_err(Error::Http) {
            Ok(b) => b,
            Err(e) => return Some(Err(e)),
        };

        // Lossy conversion guards against a split UTF-8 sequence at a chunk boundary.
        let text = String::from_utf8_lossy(&bytes);

        for line in text.lines() {
            if let Some(data) = line.strip_prefix("data: ") {
                if data == "[DONE]" {
                    continue;
                }

                let chunk: OpenAIChunk = match serde_json::from_str(data) {
                    Ok(c) => c,
                    Err(e) => {
                        return Some(Err(Error::stream(format!("Failed to parse chunk: {}", e))));
                    }
                };

                return Some(Ok(chunk));
            }
        }

        // Heartbeats, comments, and other non-data SSE lines are skipped.
        None
    });

    Box::pin(stream)
}
