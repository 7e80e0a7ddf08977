//! Exposes a spawned tool-provider subprocess as a [`System`].

use async_trait::async_trait;
use regex::Regex;
use std::sync::Mutex;
use tracing::info;

use crate::errors::{AgentError, AgentResult};
use crate::mcp::transport::{ToolServerConfig, ToolServerConnection};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::systems::System;

pub struct McpSystem {
    connection: ToolServerConnection,
    name: String,
    description: String,
    instructions: String,
    tools: Vec<Tool>,
    /// When set, matches in tool output are collected as sources
    source_pattern: Option<Regex>,
    sources: Mutex<Vec<String>>,
}

impl McpSystem {
    /// Spawn the provider, run the handshake and discover its tools
    pub async fn connect(
        config: &ToolServerConfig,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> AgentResult<Self> {
        let connection = ToolServerConnection::spawn(config)
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;
        connection
            .initialize()
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        let remote_tools = connection
            .list_tools()
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;
        let tools = remote_tools
            .into_iter()
            .map(|t| Tool::new(t.name, t.description, t.input_schema))
            .collect::<Vec<_>>();

        info!(system = %config.name, tools = tools.len(), "Connected to tool provider");
        Ok(Self {
            connection,
            name: config.name.clone(),
            description: description.into(),
            instructions: instructions.into(),
            tools,
            source_pattern: None,
            sources: Mutex::new(Vec::new()),
        })
    }

    /// Collect matches of `pattern` in tool output as sources (e.g. issue keys)
    pub fn with_source_pattern(mut self, pattern: Regex) -> Self {
        self.source_pattern = Some(pattern);
        self
    }

    fn harvest_sources(&self, text: &str) {
        if let Some(pattern) = &self.source_pattern {
            let mut sources = self.sources.lock().unwrap_or_else(|p| p.into_inner());
            for m in pattern.find_iter(text) {
                let found = m.as_str().to_string();
                if !sources.contains(&found) {
                    sources.push(found);
                }
            }
        }
    }
}

#[async_trait]
impl System for McpSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        if !self.tools.iter().any(|t| t.name == tool_call.name) {
            return Err(AgentError::ToolNotFound(tool_call.name));
        }

        let result = self
            .connection
            .call_tool(&tool_call.name, tool_call.arguments)
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        let text = result
            .content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error {
            return Err(AgentError::ExecutionError(text));
        }

        self.harvest_sources(&text);
        Ok(vec![Content::text(text)])
    }

    fn sources(&self) -> Vec<String> {
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}
