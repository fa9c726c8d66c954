//! Error types for the execution backend
//!
//! These never cross the public `execute` boundary: runners turn every
//! `SandboxError` into an `ExecutionResult` with `ErrorKind::InternalError`.

use std::path::PathBuf;

/// Result type for sandbox internals
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors raised while preparing or tearing down an execution
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Workspace directory or one of its files could not be created or written
    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read or written
    #[error("Configuration file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for `ExecutorConfig`
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl SandboxError {
    /// Whether the error is caused by the host rather than by configuration
    pub fn is_host_fault(&self) -> bool {
        matches!(self, SandboxError::Workspace(_))
    }
}
