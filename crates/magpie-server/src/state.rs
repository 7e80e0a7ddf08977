use magpie::agent::Agent;
use magpie::providers::configs::OpenAiProviderConfig;
use magpie::systems::tracker::TrackerConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state.
///
/// The agent is provisioned once at startup and shared across requests;
/// `None` means provisioning failed and agent routes answer 503.
#[derive(Clone)]
pub struct AppState {
    pub agent: Option<Arc<Agent>>,
    pub provider_config: OpenAiProviderConfig,
    pub snapshot_path: PathBuf,
    pub tracker: Option<TrackerConfig>,
    pub default_project: String,
}
