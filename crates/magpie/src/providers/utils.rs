use anyhow::Result;
use regex::Regex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::tool::{Tool, ToolCall};

pub fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").expect("static regex");
    re.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex");
    re.is_match(name)
}

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });

        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        converted["content"] = json!(text.text);
                    }
                }
                MessageContent::ToolRequest(request) => match &request.tool_call {
                    Ok(tool_call) => {
                        let sanitized_name = sanitize_function_name(&tool_call.name);
                        let tool_calls = converted
                            .as_object_mut()
                            .expect("converted message is an object")
                            .entry("tool_calls")
                            .or_insert(json!([]));

                        tool_calls
                            .as_array_mut()
                            .expect("tool_calls is an array")
                            .push(json!({
                                "id": request.id,
                                "type": "function",
                                "function": {
                                    "name": sanitized_name,
                                    "arguments": tool_call.arguments.to_string(),
                                }
                            }));
                    }
                    Err(e) => {
                        output.push(json!({
                            "role": "tool",
                            "content": format!("Error: {}", e),
                            "tool_call_id": request.id
                        }));
                    }
                },
                MessageContent::ToolResponse(response) => match &response.tool_result {
                    Ok(contents) => {
                        let text = contents
                            .iter()
                            .filter_map(|content| content.as_text())
                            .collect::<Vec<_>>()
                            .join("\n");
                        output.push(json!({
                            "role": "tool",
                            "content": text,
                            "tool_call_id": response.id
                        }));
                    }
                    Err(e) => {
                        // A tool error is sent as output so the model can interpret the message
                        output.push(json!({
                            "role": "tool",
                            "content": format!("The tool call returned the following error:\n{}", e),
                            "tool_call_id": response.id
                        }));
                    }
                },
            }
        }

        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow::anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: Value) -> Result<Message> {
    let original = response["choices"][0]["message"].clone();
    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            message = message.with_text(text);
        }
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            // Some gateways omit the call id; make one up so the tool
            // response can still be correlated
            let id = tool_call["id"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default()
                .to_string();

            if !is_valid_function_name(&function_name) {
                let error = AgentError::ToolNotFound(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    function_name
                ));
                message = message.with_tool_request(id, Err(error));
            } else {
                match serde_json::from_str::<Value>(&arguments) {
                    Ok(params) => {
                        message = message
                            .with_tool_request(id, Ok(ToolCall::new(&function_name, params)));
                    }
                    Err(e) => {
                        let error = AgentError::InvalidParameters(format!(
                            "Could not interpret tool use parameters for id {}: {}",
                            id, e
                        ));
                        message = message.with_tool_request(id, Err(error));
                    }
                }
            }
        }
    }

    Ok(message)
}
