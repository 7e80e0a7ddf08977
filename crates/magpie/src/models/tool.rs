use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A capability an agent can invoke, described by a JSON schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Name used by the model to refer to the tool
    pub name: String,
    /// Natural-language description of what the tool does
    pub description: String,
    /// JSON schema of the tool parameters
    pub input_schema: Value,
}

impl Tool {
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A request from the model to invoke a named tool with arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<N: Into<String>>(name: N, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}
