mod configuration;
mod error;
mod routes;
mod state;

use configuration::Settings;
use magpie::agent::Agent;
use magpie::extract::WorkspaceClient;
use magpie::mcp::transport::ToolServerConfig;
use magpie::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use magpie::providers::factory::get_provider;
use magpie::systems::remote::McpSystem;
use regex::Regex;
use state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Refresh the documentation snapshot at startup. Failures are logged and
/// swallowed; the server still comes up with the previous snapshot, if any.
async fn refresh_snapshot(settings: &Settings, snapshot_path: &PathBuf) {
    let Some(workspace_config) = settings.workspace.workspace_config() else {
        info!("No workspace token configured, skipping snapshot refresh");
        return;
    };
    match WorkspaceClient::new(workspace_config) {
        Ok(client) => match client.refresh_snapshot(snapshot_path).await {
            Ok(rows) => info!(rows, "Snapshot refreshed at startup"),
            Err(e) => warn!(error = %e, "Snapshot refresh failed, continuing without it"),
        },
        Err(e) => warn!(error = %e, "Could not build workspace client"),
    }
}

/// Build the shared agent with whatever tool providers come up.
///
/// A provider that fails to start is skipped with a warning rather than
/// taking the whole server down.
async fn provision_agent(
    settings: &Settings,
    provider_config: &OpenAiProviderConfig,
) -> Option<Arc<Agent>> {
    let provider = match get_provider(ProviderConfig::OpenAi(provider_config.clone())) {
        Ok(provider) => provider,
        Err(e) => {
            warn!(error = %e, "Could not construct the model provider");
            return None;
        }
    };

    let mut agent = Agent::new("assistant", "Workspace Assistant", provider).with_instructions(vec![
        "Answer questions about the team's issues and documentation.".to_string(),
        "Use the connected tools to look up facts before answering.".to_string(),
        "Cite issue keys and document titles you relied on.".to_string(),
        "If the tools are unavailable, say what you could not check.".to_string(),
    ]);

    match tracker_tool_config(settings) {
        Ok(config) => match McpSystem::connect(
            &config,
            "Issue tracker access",
            "Use these tools to search and inspect issues. Cite issue keys.",
        )
        .await
        {
            Ok(system) => {
                let system = match Regex::new(r"[A-Z][A-Z0-9]+-\d+") {
                    Ok(pattern) => system.with_source_pattern(pattern),
                    Err(_) => system,
                };
                agent.add_system(Box::new(system));
            }
            Err(e) => warn!(error = %e, "Tracker tool provider unavailable"),
        },
        Err(e) => warn!(error = %e, "Invalid tracker tool command"),
    }

    match docs_tool_config(settings) {
        Ok(config) => match McpSystem::connect(
            &config,
            "Documentation workspace access",
            "Use these tools to search and read workspace pages. Cite page titles.",
        )
        .await
        {
            Ok(system) => agent.add_system(Box::new(system)),
            Err(e) => warn!(error = %e, "Docs tool provider unavailable"),
        },
        Err(e) => warn!(error = %e, "Invalid docs tool command"),
    }

    Some(Arc::new(agent))
}

fn tracker_tool_config(settings: &Settings) -> anyhow::Result<ToolServerConfig> {
    let mut config = ToolServerConfig::from_command_line("tracker", &settings.tools.tracker_command)?;
    if let Some(tracker) = settings.tracker.tracker_config() {
        config.env.insert("JIRA_URL".to_string(), tracker.host);
        config
            .env
            .insert("JIRA_USERNAME".to_string(), tracker.username);
        config
            .env
            .insert("JIRA_API_TOKEN".to_string(), tracker.api_token);
    }
    Ok(config)
}

fn docs_tool_config(settings: &Settings) -> anyhow::Result<ToolServerConfig> {
    let mut config = ToolServerConfig::from_command_line("docs", &settings.tools.docs_command)?;
    if let Some(workspace) = settings.workspace.workspace_config() {
        let headers = serde_json::json!({
            "Authorization": format!("Bearer {}", workspace.api_token),
            "Notion-Version": "2022-06-28"
        });
        config
            .env
            .insert("OPENAPI_MCP_HEADERS".to_string(), headers.to_string());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = Settings::new()?;
    let addr = settings.server.socket_addr()?;
    let snapshot_path = PathBuf::from(&settings.workspace.snapshot_path);

    refresh_snapshot(&settings, &snapshot_path).await;

    let tracker = settings.tracker.tracker_config();
    let default_project = settings.tracker.default_project.clone();
    let ProviderConfig::OpenAi(provider_config) = settings.provider.to_config();

    let agent = provision_agent(&settings, &provider_config).await;
    if agent.is_none() {
        warn!("Agent provisioning failed; chat routes will answer 503");
    }

    let state = AppState {
        agent,
        provider_config,
        snapshot_path,
        tracker,
        default_project,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
