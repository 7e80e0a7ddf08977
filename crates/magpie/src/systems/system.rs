use async_trait::async_trait;

use crate::errors::AgentResult;
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// Core trait that defines a system providing capabilities an agent can operate
#[async_trait]
pub trait System: Send + Sync {
    /// Get the name of the system
    fn name(&self) -> &str;

    /// Get the system description
    fn description(&self) -> &str;

    /// Get system instructions
    fn instructions(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call a tool with the given parameters
    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>>;

    /// Identifiers of the sources the system has touched so far in this
    /// session (issue keys, page titles, ...). Best effort; empty when the
    /// system does not track attribution.
    fn sources(&self) -> Vec<String> {
        Vec::new()
    }
}
