use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;

use crate::errors::{AgentError, AgentResult};
use crate::knowledge::VectorIndex;
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::systems::System;

const DEFAULT_LIMIT: usize = 5;

/// Semantic search over the documentation snapshot.
///
/// Records the titles of every record surfaced during a run so they can be
/// reported back as sources.
pub struct KnowledgeSystem {
    index: VectorIndex,
    tools: Vec<Tool>,
    hits: Mutex<Vec<String>>,
}

impl KnowledgeSystem {
    pub fn new(index: VectorIndex) -> Self {
        let search_tool = Tool::new(
            "search",
            "Search the documentation snapshot for records relevant to a query. \
             Returns the closest matches with their container, title and summary.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural language description of what to look for"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of records to return (default 5)"
                    }
                }
            }),
        );

        Self {
            index,
            tools: vec![search_tool],
            hits: Mutex::new(Vec::new()),
        }
    }

    async fn search(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let query = tool_call
            .arguments
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AgentError::InvalidParameters("The query string is required".into())
            })?;
        let limit = tool_call
            .arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let results = self
            .index
            .search(query, limit)
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        if results.is_empty() {
            return Ok(vec![Content::text("No matching records found.")]);
        }

        {
            let mut hits = self.hits.lock().unwrap_or_else(|p| p.into_inner());
            for (record, _) in &results {
                if !hits.contains(&record.record_title) {
                    hits.push(record.record_title.clone());
                }
            }
        }

        let body = results
            .iter()
            .map(|(record, score)| {
                format!(
                    "[{:.3}] {} / {}\n{}",
                    score, record.container_title, record.record_title, record.summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(vec![Content::text(body)])
    }
}

#[async_trait]
impl System for KnowledgeSystem {
    fn name(&self) -> &str {
        "knowledge"
    }

    fn description(&self) -> &str {
        "Semantic search over the team's documentation workspace"
    }

    fn instructions(&self) -> &str {
        "Use the search tool to look up internal documentation before answering \
         questions about processes, projects or team knowledge. Quote record \
         titles when citing what you found."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "search" => self.search(tool_call).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }

    fn sources(&self) -> Vec<String> {
        self.hits
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::snapshot::KnowledgeRecord;
    use crate::knowledge::Embedder;
    use anyhow::Result;

    struct LetterFrequencyEmbedder;

    #[async_trait]
    impl Embedder for LetterFrequencyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut counts = vec![0.0f32; 26];
            for c in text.to_lowercase().chars() {
                if c.is_ascii_lowercase() {
                    counts[(c as usize) - ('a' as usize)] += 1.0;
                }
            }
            Ok(counts)
        }
    }

    async fn system() -> KnowledgeSystem {
        let records = vec![
            KnowledgeRecord {
                container_id: "db-1".to_string(),
                container_title: "Engineering Docs".to_string(),
                record_id: "page-1".to_string(),
                record_title: "Onboarding Guide".to_string(),
                summary: "day one setup steps for new joiners".to_string(),
            },
            KnowledgeRecord {
                container_id: "db-1".to_string(),
                container_title: "Engineering Docs".to_string(),
                record_id: "page-2".to_string(),
                record_title: "Release Process".to_string(),
                summary: "Cutting and shipping a release".to_string(),
            },
        ];
        let index = VectorIndex::build(records, Box::new(LetterFrequencyEmbedder))
            .await
            .unwrap();
        KnowledgeSystem::new(index)
    }

    #[tokio::test]
    async fn test_search_returns_records_and_records_sources() {
        let system = system().await;
        let call = ToolCall::new(
            "search",
            json!({"query": "day one setup steps for new joiners", "limit": 1}),
        );
        let content = system.call(call).await.unwrap();

        let text = content[0].as_text().unwrap();
        assert!(text.contains("Onboarding Guide"));
        assert_eq!(system.sources(), vec!["Onboarding Guide".to_string()]);
    }

    #[tokio::test]
    async fn test_sources_deduplicated_across_calls() {
        let system = system().await;
        let call = ToolCall::new(
            "search",
            json!({"query": "day one setup steps for new joiners", "limit": 1}),
        );
        system.call(call.clone()).await.unwrap();
        system.call(call).await.unwrap();

        assert_eq!(system.sources().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_query_is_invalid() {
        let system = system().await;
        let call = ToolCall::new("search", json!({"limit": 3}));
        let result = system.call(call).await;
        assert!(matches!(result, Err(AgentError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let system = system().await;
        let call = ToolCall::new("lookup", json!({}));
        assert!(matches!(
            system.call(call).await,
            Err(AgentError::ToolNotFound(_))
        ));
    }
}
