//! Stdio transport for tool-provider subprocesses.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::protocol::{
    JsonRpcRequest, JsonRpcResponse, RemoteTool, ToolCallResult, TransportError, TransportResult,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Configuration for one tool-provider subprocess
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Unique name for the provider
    pub name: String,
    /// Command to spawn
    pub command: String,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the subprocess
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ToolServerConfig {
    /// Parse a whitespace-separated command line into a config
    pub fn from_command_line(name: impl Into<String>, command_line: &str) -> TransportResult<Self> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let command = parts
            .next()
            .ok_or_else(|| TransportError::Io("empty tool server command".to_string()))?;
        Ok(Self {
            name: name.into(),
            command,
            args: parts.collect(),
            env: HashMap::new(),
        })
    }
}

/// An active connection to one spawned tool provider.
///
/// Covers the full external-process capability interface: start (spawn +
/// initialize), list capabilities, invoke capability, shutdown.
pub struct ToolServerConnection {
    name: String,
    request_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
    process: Option<Arc<Mutex<Child>>>,
    stdin: Option<Arc<Mutex<std::process::ChildStdin>>>,
}

impl ToolServerConnection {
    /// Spawn the subprocess and start the response reader
    pub fn spawn(config: &ToolServerConfig) -> TransportResult<Self> {
        info!(server = %config.name, command = %config.command, args = ?config.args, "Starting tool provider");

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| TransportError::Io(format!("Failed to spawn tool provider: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io("Failed to get stdin handle".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Io("Failed to get stdout handle".to_string()))?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        // Reader thread: route responses to the pending request map by id
        let reader_pending = pending.clone();
        let server_name = config.name.clone();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(line) if !line.is_empty() => {
                        debug!(server = %server_name, line = %line, "Received from tool provider");
                        match serde_json::from_str::<JsonRpcResponse>(&line) {
                            Ok(response) => {
                                // Recover from a poisoned mutex so responses are still
                                // delivered if another thread panicked holding the lock
                                let mut pending =
                                    reader_pending.lock().unwrap_or_else(|e| e.into_inner());
                                if let Some(sender) = pending.remove(&response.id) {
                                    let _ = sender.send(response);
                                }
                            }
                            Err(e) => {
                                warn!(server = %server_name, error = %e, "Failed to parse response");
                            }
                        }
                    }
                    Ok(_) => {} // Empty line
                    Err(e) => {
                        error!(server = %server_name, error = %e, "Read error");
                        break;
                    }
                }
            }
            info!(server = %server_name, "Tool provider reader exited");
        });

        Ok(Self {
            name: config.name.clone(),
            request_id: AtomicU64::new(1),
            pending,
            process: Some(Arc::new(Mutex::new(child))),
            stdin: Some(Arc::new(Mutex::new(stdin))),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn write_line(&self, payload: &str) -> TransportResult<()> {
        let stdin = self
            .stdin
            .as_ref()
            .ok_or_else(|| TransportError::Io("Connection not started".to_string()))?;
        let mut stdin = stdin.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(stdin, "{}", payload)
            .map_err(|e| TransportError::Io(format!("Failed to write to stdin: {}", e)))?;
        stdin
            .flush()
            .map_err(|e| TransportError::Io(format!("Failed to flush stdin: {}", e)))
    }

    fn drop_pending(&self, id: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&id);
    }

    /// Send a request and wait for the matching response
    async fn send(&self, request: JsonRpcRequest) -> TransportResult<JsonRpcResponse> {
        let id = request.id;
        let json = serde_json::to_string(&request)
            .map_err(|e| TransportError::Protocol(format!("Failed to serialize request: {}", e)))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(id, tx);
        }

        debug!(server = %self.name, request = %json, "Sending to tool provider");
        if let Err(e) = self.write_line(&json) {
            self.drop_pending(id);
            return Err(e);
        }

        // Failed requests must not leave their sender behind in the map
        let response = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.drop_pending(id);
                return Err(TransportError::Io("Response channel closed".to_string()));
            }
            Err(_) => {
                self.drop_pending(id);
                return Err(TransportError::Timeout);
            }
        };

        if let Some(error) = response.error {
            return Err(TransportError::Server {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response)
    }

    /// Perform the initialize handshake
    pub async fn initialize(&self) -> TransportResult<()> {
        let request =
            JsonRpcRequest::new("initialize", self.next_id()).with_params(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "clientInfo": {
                    "name": "magpie",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }));
        let response = self.send(request).await?;
        if let Some(result) = response.result {
            let protocol = result
                .get("protocolVersion")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            debug!(server = %self.name, protocol, "Tool provider initialized");
        }

        // Fire-and-forget initialized notification
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        });
        let _ = self.write_line(&notification.to_string());

        Ok(())
    }

    /// List the tools the provider advertises
    pub async fn list_tools(&self) -> TransportResult<Vec<RemoteTool>> {
        let request = JsonRpcRequest::new("tools/list", self.next_id());
        let response = self.send(request).await?;

        match response.result {
            Some(result) => {
                #[derive(Deserialize)]
                struct ToolsResult {
                    tools: Vec<RemoteTool>,
                }
                let tools_result: ToolsResult = serde_json::from_value(result)
                    .map_err(|e| TransportError::Protocol(format!("Failed to parse tools: {}", e)))?;
                Ok(tools_result.tools)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Invoke a named tool with arguments
    pub async fn call_tool(&self, name: &str, arguments: Value) -> TransportResult<ToolCallResult> {
        let request = JsonRpcRequest::new("tools/call", self.next_id()).with_params(json!({
            "name": name,
            "arguments": arguments
        }));
        let response = self.send(request).await?;

        let result = response
            .result
            .ok_or_else(|| TransportError::Protocol("tools/call returned no result".to_string()))?;
        serde_json::from_value(result)
            .map_err(|e| TransportError::Protocol(format!("Failed to parse tool result: {}", e)))
    }

    /// Shut down the subprocess
    pub fn shutdown(&mut self) {
        if let Some(process) = self.process.take() {
            let mut process = process.lock().unwrap_or_else(|e| e.into_inner());
            let _ = process.kill();
            info!(server = %self.name, "Tool provider stopped");
        }
        self.stdin = None;
    }
}

impl Drop for ToolServerConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_command_line() {
        let config = ToolServerConfig::from_command_line(
            "tracker",
            "docker run -i --rm ghcr.io/sooperset/mcp-atlassian:latest",
        )
        .unwrap();
        assert_eq!(config.name, "tracker");
        assert_eq!(config.command, "docker");
        assert_eq!(config.args.len(), 4);
        assert_eq!(config.args[3], "ghcr.io/sooperset/mcp-atlassian:latest");
    }

    #[test]
    fn test_config_from_empty_command_line() {
        assert!(ToolServerConfig::from_command_line("tracker", "   ").is_err());
    }

    // Shell stub that answers the handshake and a tools/list request with
    // canned responses, reading each request line first so replies cannot
    // race the pending-map insertion.
    const HANDSHAKE_STUB: &str = concat!(
        "read req; ",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}}}}'; "#,
        "read note; ",
        "read req2; ",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"Echo the input"}]}}'"#,
    );

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let config = ToolServerConfig {
            name: "stub".to_string(),
            command: "sh".to_string(),
            args: vec!["-c".to_string(), HANDSHAKE_STUB.to_string()],
            env: HashMap::new(),
        };
        let conn = ToolServerConnection::spawn(&config).unwrap();
        conn.initialize().await.unwrap();

        let tools = conn.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    #[tokio::test]
    async fn test_failed_send_leaves_no_pending_entry() {
        // The subprocess exits immediately, so the write fails
        let config = ToolServerConfig::from_command_line("stub", "true").unwrap();
        let conn = ToolServerConnection::spawn(&config).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let result = conn.list_tools().await;
        assert!(result.is_err());
        let pending = conn.pending.lock().unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let json = r#"{
            "name": "docs",
            "command": "docker",
            "args": ["run", "-i", "--rm", "mcp/notion"],
            "env": {"OPENAPI_MCP_HEADERS": "{}"}
        }"#;
        let config: ToolServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "docs");
        assert!(config.env.contains_key("OPENAPI_MCP_HEADERS"));
    }
}
