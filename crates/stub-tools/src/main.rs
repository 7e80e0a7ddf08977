//! Minimal stdio tool provider for local development.
//!
//! Speaks just enough JSON-RPC 2.0 to stand in for a real tool provider:
//! `initialize`, `tools/list` and `tools/call` with a single echo tool.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};

#[derive(Deserialize)]
struct Request {
    method: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Serialize)]
struct Response {
    jsonrpc: &'static str,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

fn ok(id: u64, result: Value) -> Response {
    Response {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

fn err(id: u64, code: i32, message: &str) -> Response {
    Response {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(json!({"code": code, "message": message})),
    }
}

fn handle(request: &Request, id: u64) -> Response {
    match request.method.as_str() {
        "initialize" => ok(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "stub-tools", "version": env!("CARGO_PKG_VERSION")}
            }),
        ),
        "tools/list" => ok(
            id,
            json!({
                "tools": [{
                    "name": "echo",
                    "description": "Echo the message back",
                    "inputSchema": {
                        "type": "object",
                        "required": ["message"],
                        "properties": {"message": {"type": "string"}}
                    }
                }]
            }),
        ),
        "tools/call" => {
            let name = request
                .params
                .as_ref()
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if name != "echo" {
                return err(id, -32602, "unknown tool");
            }
            let message = request
                .params
                .as_ref()
                .and_then(|p| p.pointer("/arguments/message"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            ok(
                id,
                json!({
                    "content": [{"type": "text", "text": message}],
                    "isError": false
                }),
            )
        }
        _ => err(id, -32601, "method not found"),
    }
}

fn main() -> io::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(request) = serde_json::from_str::<Request>(&line) else {
            continue;
        };
        // Notifications carry no id and get no reply
        let Some(id) = request.id else {
            continue;
        };
        let response = handle(&request, id);
        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &response)?;
        writeln!(out)?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, params: Value) -> Request {
        Request {
            method: method.to_string(),
            id: Some(1),
            params: Some(params),
        }
    }

    #[test]
    fn test_tools_list() {
        let response = handle(&request("tools/list", json!({})), 1);
        let result = response.result.unwrap();
        assert_eq!(result["tools"][0]["name"], "echo");
    }

    #[test]
    fn test_echo_call() {
        let response = handle(
            &request("tools/call", json!({"name": "echo", "arguments": {"message": "hi"}})),
            1,
        );
        let result = response.result.unwrap();
        assert_eq!(result["content"][0]["text"], "hi");
        assert_eq!(result["isError"], false);
    }

    #[test]
    fn test_unknown_method() {
        let response = handle(&request("resources/list", json!({})), 1);
        assert_eq!(response.error.unwrap()["code"], -32601);
    }

    #[test]
    fn test_unknown_tool() {
        let response = handle(&request("tools/call", json!({"name": "missing"})), 1);
        assert!(response.error.is_some());
    }
}
