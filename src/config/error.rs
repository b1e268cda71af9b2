//! Errors raised while loading the service configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Validation(String),

    /// Secrets are never read from YAML; these env vars were unset or empty.
    #[error("missing secrets, set env vars: {}", .0.join(", "))]
    MissingSecrets(Vec<&'static str>),
}
