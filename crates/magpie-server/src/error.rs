use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Convert a configuration field path to its environment variable name.
/// Missing provider fields (the only required section) are reported without
/// a section path, e.g. bare `type` or `api_key`.
pub fn to_env_var(field: &str) -> String {
    if !field.contains('.') {
        return format!("MAGPIE_PROVIDER__{}", field.to_uppercase());
    }
    format!("MAGPIE_{}", field.replace('.', "__").to_uppercase())
}
