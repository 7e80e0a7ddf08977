use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use magpie::knowledge::{OpenAiEmbedder, VectorIndex};
use magpie::providers::configs::ProviderConfig;
use magpie::providers::factory::get_provider;
use magpie::router::{Router as QueryRouter, SingleAgentRouter, TeamRouter};
use magpie::specialists::{make_docs_agent, make_tracker_agent};
use magpie::systems::knowledge::KnowledgeSystem;
use magpie::systems::tracker::TrackerSystem;
use magpie::team::Team;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Deserialize)]
struct AgentChatRequest {
    message: String,
    #[serde(default)]
    tone: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({"error": message.into()})))
}

fn validate_message(message: &str) -> Result<&str, ApiError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "message must not be empty",
        ));
    }
    Ok(trimmed)
}

/// POST /chat - answer with the shared agent
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let message = validate_message(&request.message)?;
    let agent = state.agent.clone().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "agent is not available; check the server logs",
        )
    })?;

    let router = SingleAgentRouter::new(agent);
    let reply = router.route(message).await.map_err(|e| {
        error!(error = %e, "Chat request failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(json!({
        "response": reply.text,
        "sources": reply.sources,
    })))
}

/// POST /chat_agent - shared agent with a per-request tone/prompt overlay
async fn chat_agent(
    State(state): State<AppState>,
    Json(request): Json<AgentChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let message = validate_message(&request.message)?;
    let agent = state.agent.clone().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "agent is not available; check the server logs",
        )
    })?;

    let mut full_message = message.to_string();
    if let Some(prompt) = request.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        full_message = format!("{}\n\n{}", prompt, full_message);
    }
    if let Some(tone) = request.tone.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        full_message = format!("{}\n\nRespond in a {} tone.", full_message, tone);
    }

    let router = SingleAgentRouter::new(agent);
    let reply = router.route(&full_message).await.map_err(|e| {
        error!(error = %e, "Agent chat request failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(json!({
        "response": reply.text,
        "sources": reply.sources,
    })))
}

/// Build a fresh team from the snapshot and the configured credentials.
///
/// Constructed per request so every run starts with clean source tracking.
async fn build_team(state: &AppState) -> anyhow::Result<Team> {
    let embedder = OpenAiEmbedder::new(
        state.provider_config.host.clone(),
        state.provider_config.api_key.clone(),
    )?;
    let index = VectorIndex::build_from_snapshot(&state.snapshot_path, Box::new(embedder)).await?;

    let mut members = Vec::new();
    let docs_provider = get_provider(ProviderConfig::OpenAi(state.provider_config.clone()))?;
    members.push(make_docs_agent(
        docs_provider,
        Box::new(KnowledgeSystem::new(index)),
    ));

    if let Some(tracker_config) = &state.tracker {
        let tracker_provider = get_provider(ProviderConfig::OpenAi(state.provider_config.clone()))?;
        let tracker_system = TrackerSystem::new(tracker_config.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build tracker system: {}", e))?;
        members.push(make_tracker_agent(
            tracker_provider,
            Box::new(tracker_system),
            &state.default_project,
        ));
    }

    let coordinator_provider =
        get_provider(ProviderConfig::OpenAi(state.provider_config.clone()))?;
    Ok(Team::new(coordinator_provider, members))
}

/// POST /team_chat - route the question through the full specialist team
async fn team_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    // The coordinator sees the raw message; project scoping is the
    // tracker specialist's concern
    let message = validate_message(&request.message)?;

    let team = build_team(&state).await.map_err(|e| {
        error!(error = %e, "Failed to assemble team");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let router = TeamRouter::new(team);
    let reply = router.route(message).await.map_err(|e| {
        error!(error = %e, "Team chat request failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(json!({
        "responses": {"team": reply.text},
        "sources": reply.sources,
    })))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat_agent", post(chat_agent))
        .route("/team_chat", post(team_chat))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use magpie::agent::Agent;
    use magpie::models::message::Message;
    use magpie::providers::configs::OpenAiProviderConfig;
    use magpie::providers::mock::MockProvider;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(agent: Option<Arc<Agent>>) -> AppState {
        AppState {
            agent,
            provider_config: OpenAiProviderConfig {
                host: "http://localhost:0".to_string(),
                api_key: "test-key".to_string(),
                model: "gpt-4o".to_string(),
                temperature: None,
                max_tokens: None,
            },
            snapshot_path: "/nonexistent/snapshot.csv".into(),
            tracker: None,
            default_project: "Platform".to_string(),
        }
    }

    fn mock_agent(answer: &str) -> Arc<Agent> {
        Arc::new(Agent::new(
            "assistant",
            "You answer workspace questions.",
            Box::new(MockProvider::new(vec![
                Message::assistant().with_text(answer),
            ])),
        ))
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap();
        (status, value)
    }

    #[tokio::test]
    async fn test_chat_returns_agent_answer() {
        let app = routes(test_state(Some(mock_agent("the answer"))));
        let (status, body) = post_json(app, "/chat", json!({"message": "a question"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "the answer");
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let app = routes(test_state(Some(mock_agent("unused"))));
        let (status, body) = post_json(app, "/chat", json!({"message": "   "})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_missing_agent_is_service_unavailable() {
        let app = routes(test_state(None));
        let (status, body) = post_json(app, "/chat", json!({"message": "hello"})).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_chat_agent_accepts_overlay() {
        let app = routes(test_state(Some(mock_agent("in a pirate voice"))));
        let (status, body) = post_json(
            app,
            "/chat_agent",
            json!({"message": "hello", "tone": "pirate"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "in a pirate voice");
    }

    #[tokio::test]
    async fn test_team_chat_empty_message_is_bad_request() {
        let app = routes(test_state(Some(mock_agent("unused"))));
        let (status, _) = post_json(app, "/team_chat", json!({"message": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_team_chat_forwards_raw_message() {
        use magpie::knowledge::{write_snapshot, KnowledgeRecord};
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "All clear"}
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("snapshot.csv");
        write_snapshot(
            &snapshot,
            &[KnowledgeRecord {
                container_id: "db-1".to_string(),
                container_title: "Engineering Docs".to_string(),
                record_id: "page-1".to_string(),
                record_title: "Release Process".to_string(),
                summary: "Cutting and shipping a release".to_string(),
            }],
        )
        .unwrap();

        let mut state = test_state(None);
        state.provider_config.host = server.uri();
        state.snapshot_path = snapshot;
        let app = routes(state);

        let question = "what is blocking the release?";
        let (status, body) = post_json(app, "/team_chat", json!({"message": question})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["responses"]["team"], "All clear");

        // The coordinator must see the message as the user sent it, with
        // no project scoping applied
        let requests = server.received_requests().await.unwrap();
        let completion = requests
            .iter()
            .find(|r| r.url.path() == "/v1/chat/completions")
            .unwrap();
        let payload: Value = completion.body_json().unwrap();
        let user_contents: Vec<&str> = payload["messages"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|m| m["role"] == "user")
            .filter_map(|m| m["content"].as_str())
            .collect();
        assert_eq!(user_contents, vec![question]);
    }

    #[tokio::test]
    async fn test_team_chat_without_snapshot_is_server_error() {
        let app = routes(test_state(Some(mock_agent("unused"))));
        let (status, body) = post_json(app, "/team_chat", json!({"message": "hello"})).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }
}
