use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use magpie::extract::WorkspaceConfig;
use magpie::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use magpie::systems::tracker::TrackerConfig;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                ConfigError::Other(config::ConfigError::Message(format!(
                    "Invalid server address: {}",
                    e
                )))
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn to_config(&self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host: host.clone(),
                api_key: api_key.clone(),
                model: model.clone(),
                temperature: *temperature,
                max_tokens: *max_tokens,
            }),
        }
    }
}

/// Documentation workspace access; without an api_token the extractor and
/// team routes are disabled
#[derive(Debug, Deserialize)]
pub struct WorkspaceSettings {
    #[serde(default = "default_workspace_host")]
    pub host: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            host: default_workspace_host(),
            api_token: None,
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl WorkspaceSettings {
    pub fn workspace_config(&self) -> Option<WorkspaceConfig> {
        self.api_token.as_ref().map(|token| WorkspaceConfig {
            host: self.host.clone(),
            api_token: token.clone(),
        })
    }
}

/// Issue tracker access; all three credentials are required together
#[derive(Debug, Deserialize)]
pub struct TrackerSettings {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_project")]
    pub default_project: String,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            api_token: None,
            default_project: default_project(),
        }
    }
}

impl TrackerSettings {
    pub fn tracker_config(&self) -> Option<TrackerConfig> {
        match (&self.host, &self.username, &self.api_token) {
            (Some(host), Some(username), Some(api_token)) => Some(TrackerConfig {
                host: host.clone(),
                username: username.clone(),
                api_token: api_token.clone(),
            }),
            _ => None,
        }
    }
}

/// Command lines for the tool-provider subprocesses
#[derive(Debug, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_tracker_command")]
    pub tracker_command: String,
    #[serde(default = "default_docs_command")]
    pub docs_command: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            tracker_command: default_tracker_command(),
            docs_command: default_docs_command(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub workspace: WorkspaceSettings,
    #[serde(default)]
    pub tracker: TrackerSettings,
    #[serde(default)]
    pub tools: ToolSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            .add_source(
                Environment::with_prefix("MAGPIE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Map missing fields onto the environment variable the operator
        // needs to set
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches("`");
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_workspace_host() -> String {
    "https://api.notion.com".to_string()
}

fn default_snapshot_path() -> String {
    "workspace_snapshot.csv".to_string()
}

fn default_project() -> String {
    "Platform".to_string()
}

fn default_tracker_command() -> String {
    "docker run -i --rm -e JIRA_URL -e JIRA_USERNAME -e JIRA_API_TOKEN ghcr.io/sooperset/mcp-atlassian:latest".to_string()
}

fn default_docs_command() -> String {
    "docker run -i --rm -e OPENAPI_MCP_HEADERS mcp/notion".to_string()
}
