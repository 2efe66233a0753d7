use std::path::PathBuf;

use thiserror::Error;

/// Startup configuration problems. Any of these prevents the orchestrator
/// from being constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid classifier mode '{0}' (expected rule_only, delegated_only or auto)")]
    InvalidMode(String),

    #[error("invalid confidence thresholds: {0}")]
    InvalidThresholds(String),

    #[error("invalid fallback override: {0}")]
    InvalidFallback(String),

    #[error("invalid classifier settings: {0}")]
    InvalidClassifier(String),

    #[error("invalid vault settings: {0}")]
    InvalidVault(String),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
