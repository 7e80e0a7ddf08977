use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::systems::System;

const DEFAULT_MAX_RESULTS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub host: String,
    pub username: String,
    pub api_token: String,
}

/// Read-only access to the issue tracker's REST API.
///
/// Issue keys surfaced during a run are recorded and reported as sources.
pub struct TrackerSystem {
    client: Client,
    config: TrackerConfig,
    tools: Vec<Tool>,
    seen_keys: Mutex<Vec<String>>,
}

impl TrackerSystem {
    pub fn new(config: TrackerConfig) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Internal(e.to_string()))?;

        let tools = vec![
            Tool::new(
                "search_issues",
                "Search issues with a JQL query. Returns the key, summary, \
                 status and assignee of each match.",
                json!({
                    "type": "object",
                    "required": ["jql"],
                    "properties": {
                        "jql": {
                            "type": "string",
                            "description": "JQL query, e.g. 'project = PLAT AND status = Open'"
                        },
                        "max_results": {
                            "type": "integer",
                            "description": "Maximum number of issues to return (default 10)"
                        }
                    }
                }),
            ),
            Tool::new(
                "get_issue",
                "Fetch a single issue by its key.",
                json!({
                    "type": "object",
                    "required": ["key"],
                    "properties": {
                        "key": {
                            "type": "string",
                            "description": "Issue key, e.g. PLAT-123"
                        }
                    }
                }),
            ),
        ];

        Ok(Self {
            client,
            config,
            tools,
            seen_keys: Mutex::new(Vec::new()),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> AgentResult<Value> {
        let url = format!("{}{}", self.config.host.trim_end_matches('/'), path);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.api_token))
            .query(query)
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::ExecutionError(format!(
                "Tracker API error: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))
    }

    fn record_key(&self, key: &str) {
        let mut keys = self.seen_keys.lock().unwrap_or_else(|p| p.into_inner());
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }

    fn format_issue(&self, issue: &Value) -> String {
        let key = issue.get("key").and_then(Value::as_str).unwrap_or("?");
        if key != "?" {
            self.record_key(key);
        }
        let fields = issue.get("fields");
        let field_str = |name: &str| -> &str {
            fields
                .and_then(|f| f.get(name))
                .and_then(Value::as_str)
                .unwrap_or("")
        };
        let nested = |outer: &str, inner: &str| -> String {
            fields
                .and_then(|f| f.get(outer))
                .and_then(|o| o.get(inner))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };
        format!(
            "{}: {} [status: {}, assignee: {}]",
            key,
            field_str("summary"),
            nested("status", "name"),
            nested("assignee", "displayName"),
        )
    }

    async fn search_issues(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let jql = tool_call
            .arguments
            .get("jql")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::InvalidParameters("The jql string is required".into()))?;
        let max_results = tool_call
            .arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let response = self
            .get(
                "/rest/api/2/search",
                &[
                    ("jql", jql.to_string()),
                    ("maxResults", max_results.to_string()),
                ],
            )
            .await?;

        let issues = response
            .get("issues")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if issues.is_empty() {
            return Ok(vec![Content::text("No issues matched the query.")]);
        }

        let body = issues
            .iter()
            .map(|issue| self.format_issue(issue))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(vec![Content::text(body)])
    }

    async fn get_issue(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let key = tool_call
            .arguments
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::InvalidParameters("The issue key is required".into()))?;

        let issue = self.get(&format!("/rest/api/2/issue/{}", key), &[]).await?;
        Ok(vec![Content::text(self.format_issue(&issue))])
    }
}

#[async_trait]
impl System for TrackerSystem {
    fn name(&self) -> &str {
        "tracker"
    }

    fn description(&self) -> &str {
        "Read-only access to the team's issue tracker"
    }

    fn instructions(&self) -> &str {
        "Use search_issues with a JQL query to find issues, and get_issue to \
         fetch a specific one by key. Always cite issue keys in your answers."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "search_issues" => self.search_issues(tool_call).await,
            "get_issue" => self.get_issue(tool_call).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }

    fn sources(&self) -> Vec<String> {
        self.seen_keys
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn issue_json(key: &str, summary: &str) -> Value {
        json!({
            "key": key,
            "fields": {
                "summary": summary,
                "status": {"name": "In Progress"},
                "assignee": {"displayName": "Sam Harper"}
            }
        })
    }

    fn system(server: &MockServer) -> TrackerSystem {
        TrackerSystem::new(TrackerConfig {
            host: server.uri(),
            username: "bot@example.com".to_string(),
            api_token: "token".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_issues() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("jql", "project = PLAT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [issue_json("PLAT-1", "Fix login timeout")]
            })))
            .mount(&server)
            .await;

        let system = system(&server);
        let call = ToolCall::new("search_issues", json!({"jql": "project = PLAT"}));
        let content = system.call(call).await.unwrap();

        let text = content[0].as_text().unwrap();
        assert!(text.contains("PLAT-1: Fix login timeout"));
        assert!(text.contains("In Progress"));
        assert_eq!(system.sources(), vec!["PLAT-1".to_string()]);
    }

    #[tokio::test]
    async fn test_get_issue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/PLAT-7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(issue_json("PLAT-7", "Upgrade database")),
            )
            .mount(&server)
            .await;

        let system = system(&server);
        let call = ToolCall::new("get_issue", json!({"key": "PLAT-7"}));
        let content = system.call(call).await.unwrap();

        assert!(content[0].as_text().unwrap().contains("Upgrade database"));
        assert_eq!(system.sources(), vec!["PLAT-7".to_string()]);
    }

    #[tokio::test]
    async fn test_api_error_is_execution_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let system = system(&server);
        let call = ToolCall::new("search_issues", json!({"jql": "project = PLAT"}));
        assert!(matches!(
            system.call(call).await,
            Err(AgentError::ExecutionError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_jql_is_invalid() {
        let server = MockServer::start().await;
        let system = system(&server);
        let call = ToolCall::new("search_issues", json!({}));
        assert!(matches!(
            system.call(call).await,
            Err(AgentError::InvalidParameters(_))
        ));
    }
}
