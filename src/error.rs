//! Error types for the pipeline engine
//!
//! Tool failures and dependency skips are recorded as data on stage results.
//! Only configuration, persistence and re-entry problems surface as `Error`.

use thiserror::Error;

/// Errors raised by the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Tool not found or not available: {0}")]
    ToolNotFound(String),

    #[error("Tool {tool} timed out after {timeout_secs}s")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Pipeline is already running")]
    AlreadyRunning,

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Step not registered: {0}")]
    StepNotFound(String),

    #[error("Audit log write failed: {0}")]
    Audit(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Error::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether this error came from a tool invocation (recoverable at stage level)
    pub fn is_tool_error(&self) -> bool {
        matches!(
            self,
            Error::ToolNotFound(_) | Error::ToolTimeout { .. } | Error::ToolExecution { .. }
        )
    }
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;
