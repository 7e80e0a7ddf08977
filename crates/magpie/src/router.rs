//! Routing seam between the request layer and the agents.
//!
//! The request handlers only see the [`Router`] trait, so the routing
//! strategy (a single shared agent, a full team run, or a deterministic
//! keyword rule) can be swapped without touching them.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::agent::Agent;
use crate::models::message::Message;
use crate::team::{AgentSources, Team};

/// The routed answer plus whatever sources the run surfaced
#[derive(Debug, Clone)]
pub struct RouterReply {
    pub text: String,
    pub sources: Vec<AgentSources>,
}

#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, query: &str) -> Result<RouterReply>;
}

/// Routes every query to one shared agent
pub struct SingleAgentRouter {
    agent: Arc<Agent>,
}

impl SingleAgentRouter {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Router for SingleAgentRouter {
    async fn route(&self, query: &str) -> Result<RouterReply> {
        let text = self
            .agent
            .reply_text(&[Message::user().with_text(query)])
            .await?;
        let sources = self.agent.sources();
        let sources = if sources.is_empty() {
            Vec::new()
        } else {
            vec![AgentSources {
                agent: self.agent.name().to_string(),
                sources,
            }]
        };
        Ok(RouterReply { text, sources })
    }
}

/// Routes every query through a coordinator-led team run
pub struct TeamRouter {
    team: Team,
}

impl TeamRouter {
    pub fn new(team: Team) -> Self {
        Self { team }
    }
}

#[async_trait]
impl Router for TeamRouter {
    async fn route(&self, query: &str) -> Result<RouterReply> {
        let reply = self.team.respond(query).await?;
        let text = reply
            .responses
            .get("team")
            .cloned()
            .unwrap_or_default();
        Ok(RouterReply {
            text,
            sources: reply.sources,
        })
    }
}

/// Deterministic keyword routing between two specialists.
///
/// Queries containing any tracker keyword go to the tracker specialist,
/// everything else to the docs specialist. Tracker-bound queries are
/// scoped to the default project unless they already name one.
pub struct RuleRouter {
    tracker: Arc<Agent>,
    docs: Arc<Agent>,
    tracker_keywords: Vec<String>,
    default_project: Option<String>,
}

impl RuleRouter {
    pub fn new(tracker: Arc<Agent>, docs: Arc<Agent>) -> Self {
        Self {
            tracker,
            docs,
            tracker_keywords: ["issue", "ticket", "sprint", "jql", "bug", "assignee"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_project: None,
        }
    }

    pub fn with_tracker_keywords(mut self, keywords: Vec<String>) -> Self {
        self.tracker_keywords = keywords;
        self
    }

    pub fn with_default_project(mut self, project: impl Into<String>) -> Self {
        self.default_project = Some(project.into());
        self
    }

    fn pick(&self, query: &str) -> bool {
        let lowered = query.to_lowercase();
        self.tracker_keywords.iter().any(|k| lowered.contains(k))
    }
}

#[async_trait]
impl Router for RuleRouter {
    async fn route(&self, query: &str) -> Result<RouterReply> {
        let (agent, query) = if self.pick(query) {
            let scoped = match &self.default_project {
                Some(project) => crate::specialists::scope_project_query(query, project),
                None => query.to_string(),
            };
            (&self.tracker, scoped)
        } else {
            (&self.docs, query.to_string())
        };
        let text = agent
            .reply_text(&[Message::user().with_text(&query)])
            .await?;
        let sources = agent.sources();
        let sources = if sources.is_empty() {
            Vec::new()
        } else {
            vec![AgentSources {
                agent: agent.name().to_string(),
                sources,
            }]
        };
        Ok(RouterReply { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::Tool;
    use crate::providers::base::{Provider, Usage};
    use crate::providers::mock::MockProvider;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn mock_agent(name: &str, answer: &str) -> Arc<Agent> {
        Arc::new(Agent::new(
            name,
            "Test specialist",
            Box::new(MockProvider::new(vec![
                Message::assistant().with_text(answer),
            ])),
        ))
    }

    /// Records the last user message so tests can inspect what an agent
    /// was actually asked.
    struct CapturingProvider {
        seen: Arc<Mutex<Option<String>>>,
        answer: String,
    }

    #[async_trait]
    impl Provider for CapturingProvider {
        async fn complete(
            &self,
            _system: &str,
            messages: &[Message],
            _tools: &[Tool],
        ) -> anyhow::Result<(Message, Usage)> {
            let last = messages.last().map(|m| m.text()).unwrap_or_default();
            *self.seen.lock().unwrap() = Some(last);
            Ok((
                Message::assistant().with_text(&self.answer),
                Usage::default(),
            ))
        }
    }

    fn capturing_agent(name: &str, answer: &str) -> (Arc<Agent>, Arc<Mutex<Option<String>>>) {
        let seen = Arc::new(Mutex::new(None));
        let agent = Arc::new(Agent::new(
            name,
            "Test specialist",
            Box::new(CapturingProvider {
                seen: seen.clone(),
                answer: answer.to_string(),
            }),
        ));
        (agent, seen)
    }

    #[tokio::test]
    async fn test_single_agent_router() {
        let router = SingleAgentRouter::new(mock_agent("helper", "the answer"));
        let reply = router.route("a question").await.unwrap();
        assert_eq!(reply.text, "the answer");
        assert!(reply.sources.is_empty());
    }

    #[tokio::test]
    async fn test_rule_router_picks_tracker_for_issue_queries() {
        let router = RuleRouter::new(
            mock_agent("tracker_specialist", "tracker answer"),
            mock_agent("docs_specialist", "docs answer"),
        );
        let reply = router.route("what issues are open in the sprint?").await.unwrap();
        assert_eq!(reply.text, "tracker answer");
    }

    #[tokio::test]
    async fn test_rule_router_scopes_tracker_queries() {
        let (tracker, seen) = capturing_agent("tracker_specialist", "tracker answer");
        let router = RuleRouter::new(
            tracker,
            mock_agent("docs_specialist", "docs answer"),
        )
        .with_default_project("Platform");

        router.route("what bugs are open?").await.unwrap();
        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some("what bugs are open? (in project Platform)")
        );
    }

    #[tokio::test]
    async fn test_rule_router_leaves_docs_queries_unscoped() {
        let (docs, seen) = capturing_agent("docs_specialist", "docs answer");
        let router = RuleRouter::new(
            mock_agent("tracker_specialist", "tracker answer"),
            docs,
        )
        .with_default_project("Platform");

        router.route("how do I onboard?").await.unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("how do I onboard?"));
    }

    #[tokio::test]
    async fn test_rule_router_defaults_to_docs() {
        let router = RuleRouter::new(
            mock_agent("tracker_specialist", "tracker answer"),
            mock_agent("docs_specialist", "docs answer"),
        );
        let reply = router.route("how do I onboard?").await.unwrap();
        assert_eq!(reply.text, "docs answer");
    }
}
