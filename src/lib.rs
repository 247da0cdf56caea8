//! # Agent Orchestration Runtime
//!
//! A Rust runtime for building "reason in code" agents against local
//! OpenAI-compatible servers: the model is never given native function
//! calling, it is prompted to write short fenced blocks of a restricted,
//! Python-like language, and the runtime runs those blocks in a sandbox that
//! can call your tools on the model's behalf.
//!
//! ## Why code instead of structured tool calls
//!
//! Native function-calling APIs force one tool invocation per round trip.
//! Code lets a single step chain several tool calls, branch on an
//! intermediate result, and loop — all before the loop has to go back to the
//! model for another round trip. The [`interpreter`] module is the sandbox
//! that makes this safe: it never imports the host's filesystem, network, or
//! process APIs, enforces an operation budget, and exposes tools as plain
//! function calls inside the restricted grammar.
//!
//! ## Key Features
//!
//! - **Zero API Costs**: Run models on your own hardware
//! - **Privacy-First**: All data stays local on your machine
//! - **Sandboxed Code Evaluator**: hand-rolled lexer/parser/evaluator for a
//!   restricted grammar, with an operation budget and import allowlisting
//! - **Tool Calling**: Define and execute tools with automatic schema
//!   generation, local or via a remote [`toolset::Toolset`]
//! - **Lifecycle Hooks**: Intercept and control execution at key points
//! - **History Compaction**: summarize older turns once a model's context
//!   window is under pressure
//! - **Interrupts**: Gracefully cancel a long-running [`agent::Agent`] run
//! - **Retry Logic**: Exponential backoff with jitter for reliability
//!
//! ## Running an agent
//!
//! ```rust,no_run
//! use minion_rt::{Agent, AgentOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .system_prompt("You are a helpful assistant")
//!         .model("qwen2.5-32b-instruct")
//!         .base_url("http://localhost:1234/v1")
//!         .build()?;
//!
//!     let mut agent = Agent::new(options);
//!     let response = agent.run("What's 2+2, then multiply that by 10?").await?;
//!     println!("{:?}", response.final_answer);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **agent**: the top-level step loop (`Agent::run`/`run_streaming`),
//!   owning the tool registry and any remote Toolsets for one run
//! - **step**: one reason-and-act turn, dispatched to a `code` or `plain`
//!   route (render a prompt, call the model, extract code, run it, produce
//!   an observation — or, for `plain`, just return the model's reply)
//! - **interpreter**: the sandboxed code evaluator (lexer, parser,
//!   tree-walking evaluator, builtins)
//! - **toolset**: remote tool servers reached over stdio/SSE/streamable-HTTP
//! - **tools**: local tool definitions with automatic JSON schema generation
//! - **hooks**: lifecycle event system for intercepting execution
//! - **history**: append-only conversation log with context-aware compaction
//! - **state**: the namespace of named values and counters carried across steps
//! - **response**: the `Response`/`StreamChunk` output types
//! - **provider**: the tool-free OpenAI-compatible text completion client
//!   the Step Executor drives
//! - **types**: data structures for messages, content blocks, and configuration
//! - **config**: provider-specific configuration helpers
//! - **error**: comprehensive error types and conversions
//! - **context**: token estimation and message truncation utilities
//! - **retry**: exponential backoff retry logic with jitter
//! - **utils**: internal utilities for SSE parsing and tool aggregation

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
// These modules are private (internal implementation details) unless explicitly
// re-exported through `pub use` statements below.

/// The top-level step loop: owns the tool registry and Toolsets for one run.
mod agent;

/// Provider configuration helpers for LM Studio, Ollama, llama.cpp, and vLLM.
/// Simplifies endpoint and model name resolution with environment variable support.
mod config;

/// Context window management utilities for token estimation and history truncation.
/// Provides manual control over conversation memory to prevent context overflow.
mod context;

/// Error types and conversions for comprehensive error handling throughout the SDK.
/// Defines the `Error` enum and `Result<T>` type alias used across all public APIs.
mod error;

/// Append-only conversation log with context-window-aware compaction.
mod history;

/// Lifecycle hooks system for intercepting and controlling execution at key points.
/// Enables security gates, audit logging, input/output modification, and compliance checks.
mod hooks;

/// The sandboxed code evaluator: lexer, parser, tree-walking evaluator, and builtins.
mod interpreter;

/// The tool-free OpenAI-compatible text completion client the Step Executor drives.
mod provider;

/// Final and incremental output types for an Agent Driver run.
mod response;

/// One reason-and-act turn: render a prompt, call the model, run the code it wrote.
mod step;

/// Shared mutable state threaded through a single agent run.
mod state;

/// Tool definition and execution system with automatic JSON schema generation.
/// Allows LLMs to call Rust functions with type-safe parameter handling.
mod tools;

/// Remote tool servers reached over stdio/SSE/streamable-HTTP, exposed as plain Tools.
mod toolset;

/// Core type definitions for messages, content blocks, and agent configuration.
/// Includes builder patterns for ergonomic configuration and OpenAI API serialization.
mod types;

/// Internal utilities for Server-Sent Events (SSE) parsing and tool call aggregation.
/// Handles the low-level details of streaming response parsing.
mod utils;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================
// These items form the public API of the SDK. Everything else is internal.

/// Retry utilities with exponential backoff and jitter.
/// Made public as a module so users can access retry configuration and functions
/// for their own operations that need retry logic.
pub mod retry;

// --- Agent Driver ---

pub use agent::Agent;

// --- Provider Configuration ---

pub use config::{Provider, get_base_url, get_model};

// --- Context Management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Error Handling ---

pub use error::{Error, Result};

// --- History ---

pub use history::{DEFAULT_CONTEXT_WINDOW, History, context_window_for};

// --- Lifecycle Hooks ---

pub use hooks::{
    HOOK_POST_TOOL_USE, HOOK_PRE_TOOL_USE, HOOK_USER_PROMPT_SUBMIT, BuiltinPreToolUseHook,
    HookDecision, Hooks, PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent,
};

// --- Sandboxed Code Evaluator ---

pub use interpreter::{ExtractedCode, Outcome, Scope, Value, extract_code_blocks};

// --- Response / Output Types ---

pub use response::{Response, StreamChunk};

// --- Step Executor ---

pub use step::{END_CODE_SENTINEL, StepResult};

// --- Agent State ---

pub use state::{Input, Route, State};

// --- Tool System ---

pub use tools::{Tool, ToolBuilder, tool};

// --- Remote Toolsets ---

pub use toolset::{RemoteToolDescriptor, Toolset, ToolsetState, Transport};

// --- Core Types ---

pub use types::{
    AgentOptions, AgentOptionsBuilder, ContentBlock, ImageBlock, ImageDetail, Message,
    MessageRole, TextBlock, ToolResultBlock, ToolUseBlock,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types and functions.
/// Import with `use minion_rt::prelude::*;` to get everything you need for typical usage.
///
/// This includes:
/// - Agent Driver: Agent, Response, StreamChunk, State
/// - Configuration: AgentOptions, AgentOptionsBuilder
/// - Tools: Tool, tool(), Toolset, Transport
/// - Hooks: Hooks, HookDecision, hook event types
/// - Errors: Error, Result
pub mod prelude {
    pub use crate::{
        Agent, AgentOptions, AgentOptionsBuilder, ContentBlock, Error, HookDecision, Hooks,
        PostToolUseEvent, PreToolUseEvent, Response, Result, State, StreamChunk, TextBlock, Tool,
        ToolUseBlock, Toolset, Transport, UserPromptSubmitEvent, tool,
    };
}
