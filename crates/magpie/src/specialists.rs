//! Factories for the specialist agents and the project scoping rule.

use crate::agent::Agent;
use crate::providers::base::Provider;
use crate::systems::System;

/// Append the default project to a query unless the user already named one.
///
/// The check is a case-insensitive substring match on "project": any query
/// mentioning the word is passed through untouched.
pub fn scope_project_query(query: &str, default_project: &str) -> String {
    if query.to_lowercase().contains("project") {
        query.to_string()
    } else {
        format!("{} (in project {})", query, default_project)
    }
}

/// Specialist for the issue tracker
pub fn make_tracker_agent(
    provider: Box<dyn Provider>,
    system: Box<dyn System>,
    default_project: &str,
) -> Agent {
    let mut agent = Agent::new("tracker_specialist", "Issue Tracker Specialist", provider)
        .with_instructions(vec![
            "Answer questions about issues, sprints and project status using the tracker tools."
                .to_string(),
            "Always search before answering; never invent issue keys or statuses.".to_string(),
            "Cite every issue key you rely on, e.g. PLAT-123.".to_string(),
            "Prefer JQL searches scoped to the project the user asked about.".to_string(),
            format!(
                "When the user does not name a project, search project {}.",
                default_project
            ),
            "When asked who owns something, report the assignee by name.".to_string(),
            "Summarize long issue lists instead of dumping every field.".to_string(),
            "If a search returns nothing, say so plainly and suggest a broader query.".to_string(),
            "Do not modify issues; you have read-only access.".to_string(),
            "Keep answers short and factual.".to_string(),
            "If the tracker is unreachable, report the failure instead of guessing.".to_string(),
        ]);
    agent.add_system(system);
    agent
}

/// Specialist for the documentation workspace
pub fn make_docs_agent(provider: Box<dyn Provider>, system: Box<dyn System>) -> Agent {
    let mut agent = Agent::new("docs_specialist", "Documentation Specialist", provider)
        .with_instructions(vec![
            "Answer questions using the team's documentation workspace.".to_string(),
            "Search the knowledge base before answering; ground every claim in a record."
                .to_string(),
            "Cite the record titles you used.".to_string(),
            "If nothing relevant is found, say so rather than speculating.".to_string(),
            "Prefer the most specific record over general overviews.".to_string(),
            "Quote short passages verbatim when the wording matters.".to_string(),
            "Do not reveal record identifiers, only titles.".to_string(),
            "Keep answers concise.".to_string(),
        ]);
    agent.add_system(system);
    agent
}
