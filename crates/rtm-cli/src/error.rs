//! Error types for the RTM CLI
//!
//! Messages are user-facing and say what to do next where possible.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Engine operation failed
    #[error(transparent)]
    Engine(#[from] rtm_core::EngineError),

    /// No usable grid proxy
    #[error("No valid proxy: {0}. Run 'voms-proxy-init' manually or pass --no-proxy-check.")]
    Proxy(String),

    /// Command-line arguments don't describe a usable request
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Dataset list file could not be read
    #[error("File operation failed: {0}. Check the file path and permissions.")]
    Io(#[from] std::io::Error),

    /// Dataset list file is not valid YAML
    #[error("Failed to parse YAML: {0}. Expected keys 'datasets' (list) and 'site'.")]
    YamlParse(#[from] serde_yaml::Error),
}

impl CliError {
    pub fn proxy(msg: impl Into<String>) -> Self {
        Self::Proxy(msg.into())
    }

    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }
}
