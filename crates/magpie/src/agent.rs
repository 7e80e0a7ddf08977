//! The agent: a provider, a role, and a set of connected systems.
//!
//! An `Agent` is immutable once built and safe to share behind an `Arc`;
//! `reply` takes `&self`, and per-run state lives inside the systems.

use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::render_prompt;
use crate::providers::base::Provider;
use crate::systems::System;

#[derive(Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

#[derive(Serialize)]
struct PromptContext {
    name: String,
    role: String,
    instructions: Vec<String>,
    systems: Vec<SystemInfo>,
}

pub struct Agent {
    name: String,
    role: String,
    instructions: Vec<String>,
    systems: Vec<Box<dyn System>>,
    provider: Box<dyn Provider>,
}

impl Agent {
    pub fn new(name: impl Into<String>, role: impl Into<String>, provider: Box<dyn Provider>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            instructions: Vec::new(),
            systems: Vec::new(),
            provider,
        }
    }

    pub fn with_instructions(mut self, instructions: Vec<String>) -> Self {
        self.instructions = instructions;
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Get all tools from all systems with proper system prefixing
    fn get_prefixed_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        for system in &self.systems {
            for tool in system.tools() {
                tools.push(Tool::new(
                    format!("{}__{}", system.name(), tool.name),
                    &tool.description,
                    tool.input_schema.clone(),
                ));
            }
        }
        tools
    }

    /// Find the appropriate system for a tool call based on the prefixed name
    fn get_system_for_tool(&self, prefixed_name: &str) -> Option<&dyn System> {
        let (system_name, _) = prefixed_name.split_once("__")?;
        self.systems
            .iter()
            .find(|s| s.name() == system_name)
            .map(|s| s.as_ref())
    }

    /// Dispatch a single tool call to the appropriate system
    async fn dispatch_tool_call(&self, tool_call: AgentResult<ToolCall>) -> AgentResult<Vec<Content>> {
        let call = tool_call?;
        let system = self
            .get_system_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        let tool_name = call
            .name
            .split_once("__")
            .map(|(_, name)| name)
            .ok_or_else(|| AgentError::InvalidToolName(call.name.clone()))?;
        let system_tool_call = ToolCall::new(tool_name, call.arguments);
        system.call(system_tool_call).await
    }

    fn system_prompt(&self) -> Result<String> {
        let context = PromptContext {
            name: self.name.clone(),
            role: self.role.clone(),
            instructions: self.instructions.clone(),
            systems: self
                .systems
                .iter()
                .map(|s| SystemInfo {
                    name: s.name().to_string(),
                    description: s.description().to_string(),
                    instructions: s.instructions().to_string(),
                })
                .collect(),
        };
        Ok(render_prompt(
            include_str!("prompts/system.md"),
            &context,
        )?)
    }

    /// Run the completion loop on the conversation and return the new
    /// messages, tool exchanges included, in order.
    #[instrument(skip_all, fields(agent = %self.name))]
    pub async fn reply(&self, messages: &[Message]) -> Result<Vec<Message>> {
        let system_prompt = self.system_prompt()?;
        let tools = self.get_prefixed_tools();

        let mut transcript = messages.to_vec();
        let mut new_messages = Vec::new();

        loop {
            let (response, usage) = self
                .provider
                .complete(&system_prompt, &transcript, &tools)
                .await?;
            debug!(
                input_tokens = ?usage.input_tokens,
                output_tokens = ?usage.output_tokens,
                "Provider completion"
            );

            let tool_requests: Vec<_> = response
                .content
                .iter()
                .filter_map(|c| c.as_tool_request())
                .cloned()
                .collect();

            transcript.push(response.clone());
            new_messages.push(response);

            if tool_requests.is_empty() {
                break;
            }

            let results = join_all(
                tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone())),
            )
            .await;

            let mut response_message = Message::user();
            for (request, result) in tool_requests.iter().zip(results) {
                response_message = response_message.with_tool_response(&request.id, result);
            }
            transcript.push(response_message.clone());
            new_messages.push(response_message);
        }

        Ok(new_messages)
    }

    /// The final assistant text of a reply run
    pub async fn reply_text(&self, messages: &[Message]) -> Result<String> {
        let new_messages = self.reply(messages).await?;
        Ok(new_messages
            .iter()
            .rev()
            .find_map(|m| {
                let text = m.text();
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            })
            .unwrap_or_default())
    }

    /// Sources reported by the systems so far, in system order
    pub fn sources(&self) -> Vec<String> {
        let mut sources = Vec::new();
        for system in &self.systems {
            for source in system.sources() {
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }
        sources
    }
}
