//! Multi-specialist coordination.
//!
//! A team is a coordinator agent whose only system exposes one `ask_<slug>`
//! tool per member. The coordinator decides which members to consult; every
//! member runs its own full reply loop against its own systems.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::agent::Agent;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::Provider;
use crate::systems::System;

fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// The members, kept alive past the coordinator run so their sources stay
/// readable afterwards.
struct MemberPool {
    members: Vec<Agent>,
}

impl MemberPool {
    fn find(&self, member_slug: &str) -> Option<&Agent> {
        self.members.iter().find(|m| slug(m.name()) == member_slug)
    }
}

struct MemberSystem {
    pool: Arc<MemberPool>,
    tools: Vec<Tool>,
}

impl MemberSystem {
    fn new(pool: Arc<MemberPool>) -> Self {
        let tools = pool
            .members
            .iter()
            .map(|member| {
                Tool::new(
                    format!("ask_{}", slug(member.name())),
                    format!("Ask the {} a question and get their answer.", member.role()),
                    json!({
                        "type": "object",
                        "required": ["question"],
                        "properties": {
                            "question": {
                                "type": "string",
                                "description": "The question to forward to this specialist"
                            }
                        }
                    }),
                )
            })
            .collect();
        Self { pool, tools }
    }
}

#[async_trait]
impl System for MemberSystem {
    fn name(&self) -> &str {
        "team"
    }

    fn description(&self) -> &str {
        "Specialists you can consult"
    }

    fn instructions(&self) -> &str {
        "Forward questions to the specialist best placed to answer them. You \
         can consult several specialists for one question."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let member_slug = tool_call
            .name
            .strip_prefix("ask_")
            .ok_or_else(|| AgentError::ToolNotFound(tool_call.name.clone()))?;
        let member = self
            .pool
            .find(member_slug)
            .ok_or_else(|| AgentError::ToolNotFound(tool_call.name.clone()))?;

        let question = tool_call
            .arguments
            .get("question")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AgentError::InvalidParameters("The question string is required".into())
            })?;

        debug!(member = %member.name(), "Consulting team member");
        let answer = member
            .reply_text(&[Message::user().with_text(question)])
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;
        Ok(vec![Content::text(answer)])
    }
}

/// Sources one member reported during a team run
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentSources {
    pub agent: String,
    pub sources: Vec<String>,
}

/// The coordinator's answer plus source attribution per member
#[derive(Debug, Clone, Serialize)]
pub struct TeamReply {
    pub responses: HashMap<String, String>,
    pub sources: Vec<AgentSources>,
}

pub struct Team {
    coordinator: Agent,
    pool: Arc<MemberPool>,
}

impl Team {
    pub fn new(provider: Box<dyn Provider>, members: Vec<Agent>) -> Self {
        let pool = Arc::new(MemberPool { members });
        let mut coordinator = Agent::new("coordinator", "Workspace Coordinator", provider)
            .with_instructions(vec![
                "You coordinate a team of specialists to answer workspace questions."
                    .to_string(),
                "Decide which specialists are relevant and consult them with the ask tools."
                    .to_string(),
                "Consult the tracker specialist for issues, sprints and project status."
                    .to_string(),
                "Consult the documentation specialist for processes and internal knowledge."
                    .to_string(),
                "For questions spanning both, consult both and merge their answers."
                    .to_string(),
                "Pass the user's question through faithfully; do not editorialize it."
                    .to_string(),
                "Base your final answer only on what the specialists returned.".to_string(),
                "If a specialist fails or returns nothing useful, say so in your answer."
                    .to_string(),
                "Answer the user directly; do not mention the consultation process."
                    .to_string(),
                "Keep the final answer concise.".to_string(),
            ]);
        coordinator.add_system(Box::new(MemberSystem::new(pool.clone())));
        Self { coordinator, pool }
    }

    /// Run the coordinator on one question and collect member sources
    pub async fn respond(&self, question: &str) -> Result<TeamReply> {
        let answer = self
            .coordinator
            .reply_text(&[Message::user().with_text(question)])
            .await?;

        let mut responses = HashMap::new();
        responses.insert("team".to_string(), answer);

        let sources = self
            .pool
            .members
            .iter()
            .filter_map(|member| {
                let sources = member.sources();
                if sources.is_empty() {
                    None
                } else {
                    Some(AgentSources {
                        agent: member.name().to_string(),
                        sources,
                    })
                }
            })
            .collect();

        Ok(TeamReply { responses, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::systems::knowledge::KnowledgeSystem;
    use crate::knowledge::snapshot::KnowledgeRecord;
    use crate::knowledge::{Embedder, VectorIndex};

    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    async fn docs_member() -> Agent {
        let records = vec![KnowledgeRecord {
            container_id: "db-1".to_string(),
            container_title: "Engineering Docs".to_string(),
            record_id: "page-1".to_string(),
            record_title: "Onboarding Guide".to_string(),
            summary: "Day 1 setup steps".to_string(),
        }];
        let index = VectorIndex::build(records, Box::new(ConstantEmbedder))
            .await
            .unwrap();

        // Member searches the knowledge base then answers
        let responses = vec![
            Message::assistant().with_tool_request(
                "1",
                Ok(ToolCall::new(
                    "knowledge__search",
                    json!({"query": "onboarding"}),
                )),
            ),
            Message::assistant().with_text("See the Onboarding Guide for day 1 setup."),
        ];
        let mut member = Agent::new(
            "docs_specialist",
            "Documentation Specialist",
            Box::new(MockProvider::new(responses)),
        );
        member.add_system(Box::new(KnowledgeSystem::new(index)));
        member
    }

    #[tokio::test]
    async fn test_team_reply_shape() {
        let member = docs_member().await;
        let coordinator_responses = vec![
            Message::assistant().with_tool_request(
                "1",
                Ok(ToolCall::new(
                    "team__ask_docs_specialist",
                    json!({"question": "how do I onboard?"}),
                )),
            ),
            Message::assistant().with_text("Follow the Onboarding Guide."),
        ];
        let team = Team::new(Box::new(MockProvider::new(coordinator_responses)), vec![member]);

        let reply = team.respond("how do I onboard?").await.unwrap();
        assert_eq!(
            reply.responses.get("team"),
            Some(&"Follow the Onboarding Guide.".to_string())
        );
        assert_eq!(reply.sources.len(), 1);
        assert_eq!(reply.sources[0].agent, "docs_specialist");
        assert_eq!(reply.sources[0].sources, vec!["Onboarding Guide".to_string()]);
    }

    #[tokio::test]
    async fn test_members_without_sources_are_omitted() {
        let quiet_member = Agent::new(
            "tracker_specialist",
            "Issue Tracker Specialist",
            Box::new(MockProvider::new(vec![
                Message::assistant().with_text("no issues"),
            ])),
        );
        let team = Team::new(
            Box::new(MockProvider::new(vec![
                Message::assistant().with_text("All quiet."),
            ])),
            vec![quiet_member],
        );

        let reply = team.respond("anything open?").await.unwrap();
        assert!(reply.sources.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_member_tool_is_error() {
        let pool = Arc::new(MemberPool { members: vec![] });
        let system = MemberSystem::new(pool);
        let result = system
            .call(ToolCall::new("ask_nobody", json!({"question": "hi"})))
            .await;
        assert!(matches!(result, Err(AgentError::ToolNotFound(_))));
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Docs Specialist"), "docs_specialist");
        assert_eq!(slug("tracker_specialist"), "tracker_specialist");
    }
}
