//! Remote-tool client: connects to an external tool server over one of three
//! transports and exposes whatever it advertises as ordinary [`crate::tools::Tool`]s.
//!
//! Grounded in `McpClient` (stdio JSON-RPC child process) from the pack's
//! sidecar-module example, generalized to the two network transports and to
//! the lifecycle states the Agent Driver needs: a Toolset is connected once,
//! reused across every step of a run, and torn down exactly once regardless
//! of how the run ends.

use crate::tools::{Tool, ToolBuilder};
use crate::{Error, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};

/// How to reach a remote tool server.
#[derive(Debug, Clone)]
pub enum Transport {
    /// Spawn a child process and speak line-delimited JSON-RPC over its
    /// stdin/stdout.
    Stdio { command: String, args: Vec<String> },
    /// A single JSON-RPC request per call, POSTed to `url` and answered with
    /// one JSON body — the stateless profile of "streamable HTTP".
    StreamableHttp { url: String },
    /// A long-lived `GET` event stream plus a server-advertised POST endpoint
    /// for requests, responses correlated back to their request by id.
    Sse { url: String },
}

/// Lifecycle of a single Toolset, matching the Remote-Tool Client state
/// machine: a Toolset starts `Uninitialized`, moves to `Connecting` inside
/// `setup()`, and lands on `Ready` or `Failed`; `close()` moves it to
/// `Closed` from any state and is a no-op once there.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolsetState {
    Uninitialized,
    Connecting,
    Ready,
    Failed(String),
    Closed,
}

#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(Error::other(format!(
                "remote tool server error {}: {}",
                err.code, err.message
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// A tool advertised by a remote server, as returned from its `tools/list`
/// call.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

struct StdioSession {
    stdin: tokio::process::ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
    child: tokio::process::Child,
}

enum Session {
    Stdio(Mutex<StdioSession>),
    Http { client: reqwest::Client, url: String },
    Sse {
        client: reqwest::Client,
        post_url: String,
        pending: Arc<StdMutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
        _reader: tokio::task::JoinHandle<()>,
    },
}

/// A connected (or not-yet-connected) remote tool server.
///
/// All request/response traffic for a single Toolset goes through one
/// session, serialized where the transport requires it (stdio always;
/// the network transports parallelize naturally since each call carries its
/// own id).
pub struct Toolset {
    name: String,
    transport: Transport,
    state: Mutex<ToolsetState>,
    session: Mutex<Option<Session>>,
    descriptors: Mutex<Vec<RemoteToolDescriptor>>,
    next_id: AtomicU64,
}

impl Toolset {
    pub fn new(name: impl Into<String>, transport: Transport) -> Self {
        Self {
            name: name.into(),
            transport,
            state: Mutex::new(ToolsetState::Uninitialized),
            session: Mutex::new(None),
            descriptors: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ToolsetState {
        self.state.lock().await.clone()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Connects to the server and discovers its tools. Idempotent: calling
    /// `setup()` again once `Ready` or `Closed` is a no-op; calling it again
    /// after a prior `Failed` attempt retries.
    pub async fn setup(&self) -> Result<()> {
        {
            let state = self.state.lock().await;
            match &*state {
                ToolsetState::Ready | ToolsetState::Closed => return Ok(()),
                _ => {}
            }
        }
        *self.state.lock().await = ToolsetState::Connecting;

        let result = match &self.transport {
            Transport::Stdio { command, args } => self.setup_stdio(command, args).await,
            Transport::StreamableHttp { url } => self.setup_http(url).await,
            Transport::Sse { url } => self.setup_sse(url).await,
        };

        match result {
            Ok(descriptors) => {
                tracing::info!(
                    toolset = %self.name,
                    tool_count = descriptors.len(),
                    "toolset ready"
                );
                *self.descriptors.lock().await = descriptors;
                *self.state.lock().await = ToolsetState::Ready;
                Ok(())
            }
            Err(e) => {
                *self.state.lock().await = ToolsetState::Failed(e.to_string());
                Err(Error::toolset_setup(&self.name, e.to_string()))
            }
        }
    }

    async fn setup_stdio(
        &self,
        command: &str,
        args: &[String],
    ) -> Result<Vec<RemoteToolDescriptor>> {
        let mut child = tokio::process::Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| Error::other(format!("failed to start '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::other("child process has no stdin"))?;
        let stdout = BufReader::new(
            child
                .stdout
                .take()
                .ok_or_else(|| Error::other("child process has no stdout"))?,
        );

        let mut session = StdioSession {
            stdin,
            stdout,
            child,
        };
        stdio_call(&mut session, self.next_id(), "initialize", Some(handshake_params()))
            .await?
            .into_result()?;
        stdio_notify(&mut session, "notifications/initialized").await?;
        let tools_result = stdio_call(&mut session, self.next_id(), "tools/list", None)
            .await?
            .into_result()?;
        let descriptors = parse_tool_list(tools_result);

        *self.session.lock().await = Some(Session::Stdio(Mutex::new(session)));
        Ok(descriptors)
    }

    async fn setup_http(&self, url: &str) -> Result<Vec<RemoteToolDescriptor>> {
        let client = reqwest::Client::new();
        let init_req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id(),
            method: "initialize".to_string(),
            params: Some(handshake_params()),
        };
        http_post(&client, url, &init_req).await?.into_result()?;

        let list_req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id(),
            method: "tools/list".to_string(),
            params: None,
        };
        let tools_result = http_post(&client, url, &list_req).await?.into_result()?;
        let descriptors = parse_tool_list(tools_result);

        *self.session.lock().await = Some(Session::Http {
            client,
            url: url.to_string(),
        });
        Ok(descriptors)
    }

    async fn setup_sse(&self, url: &str) -> Result<Vec<RemoteToolDescriptor>> {
        let client = reqwest::Client::new();
        let response = client
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(Error::Http)?;
        if !response.status().is_success() {
            return Err(Error::other(format!(
                "SSE endpoint returned {}",
                response.status()
            )));
        }

        let pending: Arc<StdMutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>> =
            Arc::new(StdMutex::new(HashMap::new()));
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();

        let reader_pending = pending.clone();
        let mut byte_stream = response.bytes_stream();
        let reader = tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let Ok(bytes) = chunk else { break };
                buf.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buf.find("\n\n") {
                    let event: String = buf.drain(..pos + 2).collect();
                    let mut event_type = "message".to_string();
                    let mut data = String::new();
                    for line in event.lines() {
                        if let Some(rest) = line.strip_prefix("event: ") {
                            event_type = rest.trim().to_string();
                        } else if let Some(rest) = line.strip_prefix("data: ") {
                            data.push_str(rest.trim());
                        }
                    }
                    if event_type == "endpoint" {
                        if let Some(tx) = endpoint_tx.take() {
                            let _ = tx.send(data);
                        }
                        continue;
                    }
                    if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&data) {
                        if let Some(id) = resp.id {
                            if let Some(sender) =
                                reader_pending.lock().unwrap().remove(&id)
                            {
                                let _ = sender.send(resp);
                            }
                        }
                    }
                }
            }
        });

        let post_url = endpoint_rx
            .await
            .map_err(|_| Error::other("SSE server never advertised a message endpoint"))?;
        let post_url = if post_url.starts_with("http") {
            post_url
        } else {
            let base = url.rsplit_once('/').map(|(b, _)| b).unwrap_or(url);
            format!("{base}{post_url}")
        };

        let session = Session::Sse {
            client: client.clone(),
            post_url: post_url.clone(),
            pending: pending.clone(),
            _reader: reader,
        };

        let init_id = self.next_id();
        let init_result = sse_call(
            &client,
            &post_url,
            &pending,
            init_id,
            "initialize",
            Some(handshake_params()),
        )
        .await?;
        init_result.into_result()?;

        let list_id = self.next_id();
        let tools_result = sse_call(&client, &post_url, &pending, list_id, "tools/list", None)
            .await?
            .into_result()?;
        let descriptors = parse_tool_list(tools_result);

        *self.session.lock().await = Some(session);
        Ok(descriptors)
    }

    /// Invokes `tool_name` on the remote server with `input`.
    pub async fn call(&self, tool_name: &str, input: Value) -> Result<Value> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| Error::tool_invocation(tool_name, "toolset is not connected"))?;
        let params = serde_json::json!({"name": tool_name, "arguments": input});

        let result = match session {
            Session::Stdio(stdio) => {
                let mut stdio = stdio.lock().await;
                let id = self.next_id();
                stdio_call(&mut stdio, id, "tools/call", Some(params))
                    .await?
                    .into_result()?
            }
            Session::Http { client, url } => {
                let req = JsonRpcRequest {
                    jsonrpc: "2.0",
                    id: self.next_id(),
                    method: "tools/call".to_string(),
                    params: Some(params),
                };
                http_post(client, url, &req).await?.into_result()?
            }
            Session::Sse {
                client,
                post_url,
                pending,
                ..
            } => {
                let id = self.next_id();
                sse_call(client, post_url, pending, id, "tools/call", Some(params))
                    .await?
                    .into_result()?
            }
        };

        if result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let message = result
                .get("content")
                .and_then(|c| c.as_array())
                .and_then(|arr| arr.first())
                .and_then(|item| item.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("remote tool reported an error")
                .to_string();
            return Err(Error::tool_invocation(tool_name, message));
        }
        Ok(result)
    }

    /// Closes the session, idempotently. Safe to call on an unconnected or
    /// already-closed Toolset.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if *state == ToolsetState::Closed {
            return;
        }
        if let Some(session) = self.session.lock().await.take() {
            match session {
                Session::Stdio(stdio) => {
                    let mut stdio = stdio.into_inner();
                    let _ = stdio.child.start_kill();
                }
                Session::Sse { _reader, .. } => _reader.abort(),
                Session::Http { .. } => {}
            }
        }
        *state = ToolsetState::Closed;
        tracing::info!(toolset = %self.name, "toolset closed");
    }

    /// Wraps every discovered remote tool as a plain [`Tool`], each one
    /// delegating execution back through this Toolset. Empty before
    /// `setup()` succeeds.
    pub async fn tools(self: &Arc<Self>) -> Vec<Tool> {
        let descriptors = self.descriptors.lock().await;
        descriptors
            .iter()
            .map(|descriptor| {
                let toolset = self.clone();
                let tool_name = descriptor.name.clone();
                ToolBuilder::new(&descriptor.name, &descriptor.description)
                    .schema(descriptor.input_schema.clone())
                    .build(move |args: Value| {
                        let toolset = toolset.clone();
                        let tool_name = tool_name.clone();
                        Box::pin(async move { toolset.call(&tool_name, args).await })
                    })
            })
            .collect()
    }
}

fn handshake_params() -> Value {
    serde_json::json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {},
        "clientInfo": {"name": "open-agent-runtime", "version": env!("CARGO_PKG_VERSION")}
    })
}

fn parse_tool_list(result: Value) -> Vec<RemoteToolDescriptor> {
    result
        .get("tools")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

async fn stdio_call(
    session: &mut StdioSession,
    id: u64,
    method: &str,
    params: Option<Value>,
) -> Result<JsonRpcResponse> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        id,
        method: method.to_string(),
        params,
    };
    let mut line = serde_json::to_string(&request).map_err(Error::Json)?;
    line.push('\n');
    session
        .stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| Error::other(format!("write to remote tool server failed: {e}")))?;
    session
        .stdin
        .flush()
        .await
        .map_err(|e| Error::other(format!("flush to remote tool server failed: {e}")))?;

    let mut response_line = String::new();
    session
        .stdout
        .read_line(&mut response_line)
        .await
        .map_err(|e| Error::other(format!("read from remote tool server failed: {e}")))?;
    if response_line.is_empty() {
        return Err(Error::other("remote tool server closed the connection"));
    }
    serde_json::from_str(&response_line).map_err(Error::Json)
}

async fn stdio_notify(session: &mut StdioSession, method: &str) -> Result<()> {
    let notification = serde_json::json!({"jsonrpc": "2.0", "method": method});
    let mut line = serde_json::to_string(&notification).map_err(Error::Json)?;
    line.push('\n');
    session
        .stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| Error::other(format!("write to remote tool server failed: {e}")))?;
    session
        .stdin
        .flush()
        .await
        .map_err(|e| Error::other(format!("flush to remote tool server failed: {e}")))
}

async fn http_post(
    client: &reqwest::Client,
    url: &str,
    request: &JsonRpcRequest,
) -> Result<JsonRpcResponse> {
    let response = client
        .post(url)
        .json(request)
        .send()
        .await
        .map_err(Error::Http)?;
    if !response.status().is_success() {
        return Err(Error::other(format!(
            "remote tool server returned {}",
            response.status()
        )));
    }
    response.json().await.map_err(Error::Http)
}

async fn sse_call(
    client: &reqwest::Client,
    post_url: &str,
    pending: &Arc<StdMutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
    id: u64,
    method: &str,
    params: Option<Value>,
) -> Result<JsonRpcResponse> {
    let (tx, rx) = oneshot::channel();
    pending.lock().unwrap().insert(id, tx);

    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        id,
        method: method.to_string(),
        params,
    };
    let response = client
        .post(post_url)
        .json(&request)
        .send()
        .await
        .map_err(Error::Http)?;
    if !response.status().is_success() {
        pending.lock().unwrap().remove(&id);
        return Err(Error::other(format!(
            "remote tool server returned {}",
            response.status()
        )));
    }

    rx.await
        .map_err(|_| Error::other("remote tool server never answered the request"))
}

/// Merges a toolset's remote tools into a local name -> tool registry,
/// keeping whichever tool was registered first and warning on collision
/// rather than silently overwriting it. A remote tool whose name isn't a
/// valid sandbox identifier (e.g. `fs.read_file`, `shell-exec`, both
/// realistic for the stdio/SSE/HTTP transports above) is also registered
/// under its sanitized alias, so it remains callable from code.
pub fn merge_tool_registry(registry: &mut HashMap<String, Arc<Tool>>, remote_tools: Vec<Tool>) {
    for tool in remote_tools {
        if registry.contains_key(tool.name()) {
            tracing::warn!(
                tool = tool.name(),
                "remote tool name collides with an already-registered tool, keeping the first"
            );
            continue;
        }
        let alias = crate::tools::sanitized_alias(tool.name());
        let tool = Arc::new(tool);
        registry.insert(tool.name().to_string(), tool.clone());
        if let Some(alias) = alias {
            registry.entry(alias).or_insert(tool);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_is_idempotent_once_closed() {
        let toolset = Toolset::new(
            "test",
            Transport::Stdio {
                command: "/nonexistent/binary".to_string(),
                args: vec![],
            },
        );
        toolset.close().await;
        assert_eq!(toolset.state().await, ToolsetState::Closed);
        toolset.setup().await.unwrap();
        assert_eq!(toolset.state().await, ToolsetState::Closed);
    }

    #[tokio::test]
    async fn test_setup_failure_is_recorded() {
        let toolset = Toolset::new(
            "broken",
            Transport::Stdio {
                command: "/nonexistent/binary".to_string(),
                args: vec![],
            },
        );
        let err = toolset.setup().await.unwrap_err();
        assert!(matches!(err, Error::ToolsetSetup { .. }));
        assert!(matches!(toolset.state().await, ToolsetState::Failed(_)));
    }

    #[test]
    fn test_merge_tool_registry_first_wins() {
        let mut registry = HashMap::new();
        registry.insert(
            "search".to_string(),
            Arc::new(
                ToolBuilder::new("search", "local search")
                    .schema(default_schema())
                    .build(|_| Box::pin(async { Ok(Value::Null) })),
            ),
        );
        let remote = vec![ToolBuilder::new("search", "remote search")
            .schema(default_schema())
            .build(|_| Box::pin(async { Ok(Value::Null) }))];
        merge_tool_registry(&mut registry, remote);
        assert_eq!(registry.get("search").unwrap().description(), "local search");
    }

    #[test]
    fn test_merge_tool_registry_adds_sanitized_alias() {
        let mut registry = HashMap::new();
        let remote = vec![ToolBuilder::new("fs.read_file", "reads a file")
            .schema(default_schema())
            .build(|_| Box::pin(async { Ok(Value::Null) }))];
        merge_tool_registry(&mut registry, remote);
        assert!(registry.contains_key("fs.read_file"));
        assert_eq!(registry.get("fs_read_file").unwrap().description(), "reads a file");
    }
}
